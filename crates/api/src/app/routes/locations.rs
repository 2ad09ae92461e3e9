use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};

use stockbook_core::LocationId;
use stockbook_infra::{LedgerStore, NewLocation};

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/", get(list_locations::<S>).post(create_location::<S>))
        .route(
            "/:id",
            get(get_location::<S>)
                .patch(update_location::<S>)
                .delete(delete_location::<S>),
        )
}

pub async fn list_locations<S: LedgerStore>(Extension(services): Extension<Arc<AppServices<S>>>) -> Response {
    errors::respond(StatusCode::OK, services.ledger.list_locations().await)
}

pub async fn create_location<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Json(body): Json<NewLocation>,
) -> Response {
    errors::respond(StatusCode::CREATED, services.ledger.create_location(body).await)
}

pub async fn get_location<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> Response {
    let id: LocationId = match parse_id(&id, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.ledger.get_location(id).await)
}

pub async fn update_location<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
    Json(body): Json<dto::LocationPatch>,
) -> Response {
    let id: LocationId = match parse_id(&id, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.ledger.set_location_active(id, body.active).await)
}

/// `?cascade=true` purges the movements referencing the location first.
pub async fn delete_location<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
    Query(query): Query<dto::DeleteLocationQuery>,
) -> Response {
    let id: LocationId = match parse_id(&id, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.ledger.delete_location(id, query.cascade).await)
}

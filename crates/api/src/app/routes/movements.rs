use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};

use stockbook_core::MovementId;
use stockbook_infra::LedgerStore;
use stockbook_ledger::{AmendMovement, MovementFilter, MovementRequest, ReturnRequest};

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/", post(record_movement::<S>).get(list_movements::<S>))
        .route("/:id", get(get_movement::<S>).patch(amend_movement::<S>))
        .route("/:id/returns", post(record_return::<S>))
        .route("/:id/payment", post(update_payment::<S>))
}

pub async fn record_movement<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Json(body): Json<MovementRequest>,
) -> Response {
    errors::respond(StatusCode::CREATED, services.ledger.record_movement(body).await)
}

pub async fn list_movements<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Query(filter): Query<MovementFilter>,
) -> Response {
    errors::respond(StatusCode::OK, services.ledger.list_movements(&filter).await)
}

pub async fn get_movement<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> Response {
    let id: MovementId = match parse_id(&id, "movement") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.ledger.get_movement(id).await)
}

pub async fn amend_movement<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
    Json(body): Json<AmendMovement>,
) -> Response {
    let id: MovementId = match parse_id(&id, "movement") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.ledger.amend_movement(id, body).await)
}

pub async fn record_return<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
    Json(body): Json<ReturnRequest>,
) -> Response {
    let sale: MovementId = match parse_id(&id, "movement") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::CREATED, services.ledger.record_return(sale, body).await)
}

pub async fn update_payment<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
    Json(body): Json<dto::PaymentUpdateRequest>,
) -> Response {
    let id: MovementId = match parse_id(&id, "movement") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(
        StatusCode::OK,
        services.ledger.update_payment(id, body.status, body.paid_amount).await,
    )
}

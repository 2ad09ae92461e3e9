use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;

use stockbook_infra::LedgerStore;
use stockbook_series::{SeriesPatch, SeriesScope};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/", get(list_series::<S>).post(create_series::<S>))
        .route("/:code", patch(update_series::<S>).delete(delete_series::<S>))
        .route("/:code/allocate", post(allocate::<S>))
}

pub async fn list_series<S: LedgerStore>(Extension(services): Extension<Arc<AppServices<S>>>) -> Response {
    errors::respond(StatusCode::OK, services.ledger.list_series().await)
}

/// Create or replace a series by code.
pub async fn create_series<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Json(body): Json<dto::NewSeries>,
) -> Response {
    let series = match body.into_series() {
        Ok(s) => s,
        Err(err) => return errors::ledger_error_to_response(err),
    };
    errors::respond(StatusCode::CREATED, services.ledger.upsert_series(series).await)
}

pub async fn update_series<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(code): Path<String>,
    Json(body): Json<SeriesPatch>,
) -> Response {
    errors::respond(StatusCode::OK, services.ledger.update_series(&code, body).await)
}

pub async fn delete_series<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(code): Path<String>,
) -> Response {
    errors::no_content(services.ledger.delete_series(&code).await)
}

/// Issue the next reference of a scope. The path segment is a scope
/// (`sale_b2c`, `web`...), not a series code.
pub async fn allocate<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(scope): Path<String>,
    Query(query): Query<dto::AllocateQuery>,
) -> Response {
    let scope: SeriesScope = match scope.parse() {
        Ok(s) => s,
        Err(err) => return errors::ledger_error_to_response(err),
    };
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    let result = services
        .ledger
        .allocate(scope, as_of)
        .await
        .map(|reference| dto::AllocateResponse { scope, reference });
    errors::respond(StatusCode::CREATED, result)
}

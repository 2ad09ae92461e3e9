use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response, routing::post, Json, Router};

use stockbook_infra::{LedgerStore, PurgeFilter};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router<S: LedgerStore>() -> Router {
    Router::new().route("/purge", post(purge::<S>))
}

/// Bulk-delete movements. Blocks every other write while it runs.
pub async fn purge<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Json(filter): Json<PurgeFilter>,
) -> Response {
    errors::respond(StatusCode::OK, services.ledger.purge_movements(filter).await)
}

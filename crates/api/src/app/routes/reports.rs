use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use stockbook_infra::{LedgerStore, SalesQuery};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/sales", get(sales_summary::<S>))
        .route("/receivables", get(receivables::<S>))
}

/// `?since=..&until=..&group_by=channel|sku|category|day`
pub async fn sales_summary<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Query(query): Query<SalesQuery>,
) -> Response {
    errors::respond(StatusCode::OK, services.ledger.sales_summary(query).await)
}

pub async fn receivables<S: LedgerStore>(Extension(services): Extension<Arc<AppServices<S>>>) -> Response {
    errors::respond(StatusCode::OK, services.ledger.receivables().await)
}

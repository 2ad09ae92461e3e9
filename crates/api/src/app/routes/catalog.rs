//! Catalog snapshot feed. The catalog itself is owned elsewhere.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use stockbook_core::LedgerError;
use stockbook_infra::LedgerStore;
use stockbook_reference::{Catalog, ProductRef};

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router<S: LedgerStore>() -> Router {
    Router::new().route("/products/:sku", get(get_product::<S>).put(put_product::<S>))
}

pub async fn get_product<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(sku): Path<String>,
) -> Response {
    match services.catalog.product(sku.trim()) {
        Some(product) => Json(product).into_response(),
        None => errors::ledger_error_to_response(LedgerError::not_found(format!("product {sku}"))),
    }
}

/// Upsert one product. The path sku wins over the body's.
pub async fn put_product<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(sku): Path<String>,
    Json(mut product): Json<ProductRef>,
) -> Response {
    let sku = sku.trim();
    if sku.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "sku cannot be empty");
    }
    product.sku = sku.to_string();
    services.catalog.upsert(product.clone());
    tracing::debug!(sku = %product.sku, active = product.active, "catalog product upserted");
    Json(product).into_response()
}

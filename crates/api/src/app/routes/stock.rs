//! Derived balances and price quotes.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use stockbook_core::{Channel, LocationId};
use stockbook_infra::LedgerStore;

use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn balances_router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/:location", get(get_balances::<S>))
        .route("/:location/:sku", get(get_balance::<S>))
}

pub async fn get_balances<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(location): Path<String>,
) -> Response {
    let location: LocationId = match parse_id(&location, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.ledger.get_balances(location).await)
}

pub async fn get_balance<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path((location, sku)): Path<(String, String)>,
) -> Response {
    let location: LocationId = match parse_id(&location, "location") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .ledger
        .get_balance(&sku, location)
        .await
        .map(|balance| dto::BalanceResponse { sku, location, balance });
    errors::respond(StatusCode::OK, result)
}

pub async fn quote<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Query(query): Query<dto::QuoteQuery>,
) -> Response {
    let channel: Channel = match query.channel.parse() {
        Ok(c) => c,
        Err(err) => return errors::ledger_error_to_response(err),
    };
    errors::respond(StatusCode::OK, services.ledger.quote(&query.sku, channel).await)
}

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, put},
    Json, Router,
};

use stockbook_core::PriceRuleId;
use stockbook_infra::{LedgerStore, NewPriceRule};
use stockbook_pricing::PriceRulePatch;

use crate::app::errors;
use crate::app::routes::common::parse_id;
use crate::app::services::AppServices;

pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/", get(list_price_rules::<S>).post(create_price_rule::<S>))
        .route("/:id", put(update_price_rule::<S>).delete(delete_price_rule::<S>))
}

pub async fn list_price_rules<S: LedgerStore>(Extension(services): Extension<Arc<AppServices<S>>>) -> Response {
    errors::respond(StatusCode::OK, services.ledger.list_price_rules().await)
}

pub async fn create_price_rule<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Json(body): Json<NewPriceRule>,
) -> Response {
    errors::respond(StatusCode::CREATED, services.ledger.create_price_rule(body).await)
}

pub async fn update_price_rule<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
    Json(body): Json<PriceRulePatch>,
) -> Response {
    let id: PriceRuleId = match parse_id(&id, "price rule") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.ledger.update_price_rule(id, body).await)
}

pub async fn delete_price_rule<S: LedgerStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> Response {
    let id: PriceRuleId = match parse_id(&id, "price rule") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::no_content(services.ledger.delete_price_rule(id).await)
}

use axum::{routing::get, Router};

use stockbook_infra::LedgerStore;

pub mod admin;
pub mod catalog;
pub mod common;
pub mod deposits;
pub mod locations;
pub mod movements;
pub mod price_rules;
pub mod reports;
pub mod series;
pub mod stock;
pub mod system;

/// Router for all ledger endpoints over store `S`.
pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/quote", get(stock::quote::<S>))
        .nest("/movements", movements::router::<S>())
        .nest("/balances", stock::balances_router::<S>())
        .nest("/deposits", deposits::router::<S>())
        .nest("/locations", locations::router::<S>())
        .nest("/series", series::router::<S>())
        .nest("/price-rules", price_rules::router::<S>())
        .nest("/reports", reports::router::<S>())
        .nest("/admin", admin::router::<S>())
        .nest("/catalog", catalog::router::<S>())
}

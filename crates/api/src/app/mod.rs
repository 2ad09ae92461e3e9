//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, bus, catalog snapshot and ledger service wiring
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response bodies without a domain counterpart
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;
use tracing::info;

use stockbook_core::LedgerResult;
use stockbook_infra::{LedgerStore, WorkerHandle};

use crate::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// A built application: the router plus the stock projection worker
/// feeding its read model.
#[derive(Debug)]
pub struct App {
    pub router: Router,
    pub projection: WorkerHandle,
}

/// Router over already-wired services.
pub fn router<S: LedgerStore>(services: Arc<services::AppServices<S>>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router::<S>().layer(Extension(services)))
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(crate::middleware::request_log)))
}

/// Wire services from `config` and build the full application.
///
/// Uses Postgres when `database.url` is set and the `postgres` feature is
/// enabled, the in-memory store otherwise.
pub async fn build_app(config: &AppConfig) -> LedgerResult<App> {
    #[cfg(feature = "postgres")]
    if let Some(url) = config.database.url.as_deref() {
        let services = Arc::new(services::postgres(url, &config.database, &config.ledger).await?);
        info!(store = "postgres", "ledger services ready");
        return start(services).await;
    }

    #[cfg(not(feature = "postgres"))]
    if config.database.url.is_some() {
        tracing::warn!("database.url is set but the postgres feature is disabled; using the in-memory store");
    }

    let services = Arc::new(services::in_memory(&config.ledger));
    info!(store = "in_memory", "ledger services ready");
    start(services).await
}

async fn start<S: LedgerStore>(services: Arc<services::AppServices<S>>) -> LedgerResult<App> {
    let projection = services.ledger.start_stock_projection().await?;
    Ok(App {
        router: router(services),
        projection,
    })
}

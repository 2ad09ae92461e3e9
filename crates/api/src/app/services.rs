//! Service wiring: store, event bus, catalog snapshot and the ledger service.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use stockbook_events::{EventEnvelope, InMemoryEventBus};
use stockbook_infra::{InMemoryLedgerStore, LedgerConfig, LedgerService, LedgerStore};
use stockbook_reference::InMemoryCatalog;

#[cfg(feature = "postgres")]
use crate::config::DatabaseConfig;
#[cfg(feature = "postgres")]
use stockbook_core::LedgerResult;
#[cfg(feature = "postgres")]
use stockbook_infra::PostgresLedgerStore;

pub type EnvelopeBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Ledger<S> = LedgerService<S, EnvelopeBus>;

/// Everything a handler needs, shared behind an `Arc`.
#[derive(Debug)]
pub struct AppServices<S> {
    pub ledger: Ledger<S>,
    /// Snapshot of the external product catalog, fed through `/catalog`.
    pub catalog: Arc<InMemoryCatalog>,
}

impl<S: LedgerStore> AppServices<S> {
    pub fn new(store: S, config: &LedgerConfig) -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let bus: EnvelopeBus = Arc::new(InMemoryEventBus::new());
        let ledger = LedgerService::new(store, bus, catalog.clone(), config.clone());
        Self { ledger, catalog }
    }
}

/// In-memory wiring (dev/test).
pub fn in_memory(config: &LedgerConfig) -> AppServices<InMemoryLedgerStore> {
    AppServices::new(InMemoryLedgerStore::new(), config)
}

/// Postgres wiring: connect, apply the schema, build the service.
#[cfg(feature = "postgres")]
pub async fn postgres(
    url: &str,
    database: &DatabaseConfig,
    config: &LedgerConfig,
) -> LedgerResult<AppServices<PostgresLedgerStore>> {
    let store = PostgresLedgerStore::connect(url, database.max_connections, config.purge_timeout()).await?;
    store.migrate().await?;
    Ok(AppServices::new(store, config))
}


//! Transactional store boundary for the ledger.
//!
//! The service layer never talks to a database directly; it drives three
//! traits:
//!
//! - [`LedgerRead`]: queries. Implemented by readers and by write transactions
//!   (a transaction reads its own writes).
//! - [`LedgerTx`]: a serializable unit of work. Every mutating ledger
//!   operation runs inside exactly one `LedgerTx` and either commits all of its
//!   writes or none (dropping the transaction without [`LedgerTx::commit`] rolls
//!   back).
//! - [`LedgerStore`]: hands out readers and transactions.
//!
//! ## Isolation contract
//!
//! - `begin()` must give serializable behaviour for the check-then-write
//!   sequences the ledger performs: two transactions that both read a stock
//!   balance or series counter and then write against it must not both commit
//!   on stale data. A store may either block ([`LedgerTx::lock_stock`],
//!   [`LedgerTx::lock_series`]) or abort one of them with
//!   `LedgerError::ConcurrencyConflict`, which the service retries.
//! - `reader()` may see a slightly older committed state and must never block
//!   writers.
//! - `begin_maintenance()` is reserved for bulk purges; it may run with an
//!   extended statement timeout and callers serialise it themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{LedgerResult, LocationId, MovementId, PriceRuleId};
use stockbook_ledger::{Movement, MovementFilter, StockKey};
use stockbook_pricing::PriceRule;
use stockbook_reference::Location;
use stockbook_series::{DocumentSeries, SeriesScope};

mod in_memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use in_memory::{InMemoryLedgerStore, InMemoryReader, InMemoryTx};
#[cfg(feature = "postgres")]
pub use postgres::{PgReader, PgSession, PgTx, PostgresLedgerStore};

/// Selection for the administrative purge. Empty means everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeFilter {
    /// Only movements dated strictly before this instant.
    #[serde(default)]
    pub before: Option<DateTime<Utc>>,
    /// Only movements touching this location.
    #[serde(default)]
    pub location: Option<LocationId>,
}

impl PurgeFilter {
    pub fn matches(&self, m: &Movement) -> bool {
        self.before.is_none_or(|before| m.date < before)
            && self.location.is_none_or(|l| m.touches(l))
    }
}

#[async_trait]
pub trait LedgerRead: Send {
    async fn location(&mut self, id: LocationId) -> LedgerResult<Option<Location>>;

    async fn locations(&mut self) -> LedgerResult<Vec<Location>>;

    /// Retail location whose normalised name equals `customer_key`.
    async fn find_retail_location(&mut self, customer_key: &str) -> LedgerResult<Option<Location>>;

    /// Whether any movement references the location.
    async fn location_in_use(&mut self, id: LocationId) -> LedgerResult<bool>;

    async fn movement(&mut self, id: MovementId) -> LedgerResult<Option<Movement>>;

    /// Matching movements ordered by (date, id).
    async fn movements(&mut self, filter: &MovementFilter) -> LedgerResult<Vec<Movement>>;

    /// Returns recorded against `sale`.
    async fn returns_for(&mut self, sale: MovementId) -> LedgerResult<Vec<Movement>>;

    /// Derived balance of `sku` at `location`, computed from movement lines.
    async fn balance(&mut self, sku: &str, location: LocationId) -> LedgerResult<i64>;

    /// Non-zero derived balances at `location`, by sku.
    async fn balances(&mut self, location: LocationId) -> LedgerResult<BTreeMap<String, i64>>;

    /// Every non-zero derived balance.
    async fn all_balances(&mut self) -> LedgerResult<BTreeMap<StockKey, i64>>;

    async fn series(&mut self) -> LedgerResult<Vec<DocumentSeries>>;

    async fn price_rules(&mut self) -> LedgerResult<Vec<PriceRule>>;
}

#[async_trait]
pub trait LedgerTx: LedgerRead + Sized {
    /// Serialise concurrent stock checks on the given keys until commit.
    async fn lock_stock(&mut self, keys: &[StockKey]) -> LedgerResult<()>;

    /// Lock every series of `scope` until commit and return them.
    async fn lock_series(&mut self, scope: SeriesScope) -> LedgerResult<Vec<DocumentSeries>>;

    /// Insert or replace a series by code.
    async fn save_series(&mut self, series: &DocumentSeries) -> LedgerResult<()>;

    async fn delete_series(&mut self, code: &str) -> LedgerResult<bool>;

    async fn insert_location(&mut self, location: &Location) -> LedgerResult<()>;

    async fn update_location(&mut self, location: &Location) -> LedgerResult<()>;

    async fn delete_location(&mut self, id: LocationId) -> LedgerResult<bool>;

    async fn insert_movement(&mut self, movement: &Movement) -> LedgerResult<()>;

    /// Persist reference, notes, date and payment. Lines are never rewritten.
    async fn update_movement_header(&mut self, movement: &Movement) -> LedgerResult<()>;

    async fn insert_price_rule(&mut self, rule: &PriceRule) -> LedgerResult<()>;

    async fn update_price_rule(&mut self, rule: &PriceRule) -> LedgerResult<()>;

    async fn delete_price_rule(&mut self, id: PriceRuleId) -> LedgerResult<bool>;

    /// Delete matching movements with their lines; returns how many.
    async fn purge_movements(&mut self, filter: &PurgeFilter) -> LedgerResult<u64>;

    async fn commit(self) -> LedgerResult<()>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Reader: LedgerRead;
    type Tx: LedgerTx;

    async fn reader(&self) -> LedgerResult<Self::Reader>;

    async fn begin(&self) -> LedgerResult<Self::Tx>;

    async fn begin_maintenance(&self) -> LedgerResult<Self::Tx>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    type Reader = S::Reader;
    type Tx = S::Tx;

    async fn reader(&self) -> LedgerResult<Self::Reader> {
        (**self).reader().await
    }

    async fn begin(&self) -> LedgerResult<Self::Tx> {
        (**self).begin().await
    }

    async fn begin_maintenance(&self) -> LedgerResult<Self::Tx> {
        (**self).begin_maintenance().await
    }
}

//! Infrastructure layer: transactional stores, the ledger service and its
//! read models.
//!
//! - `store`: the transactional boundary (in-memory, Postgres behind the `postgres` feature)
//! - `service`: movement recording, returns, payments, quotes and allocation
//! - `deposits`: the Deposit Manager workflow
//! - `admin`: locations, series, price rules and the purge
//! - `reporting`: read-only aggregates
//! - `projections` / `workers`: the stock read model and the thread feeding it

pub mod admin;
pub mod config;
pub mod deposits;
pub mod projections;
pub mod reporting;
pub mod service;
pub mod store;
pub mod workers;


pub use admin::{NewLocation, NewPriceRule, PurgeReport};
pub use config::{LedgerConfig, PaymentPolicy};
pub use deposits::{ConvertDeposit, Deposit, DepositRequest, ReturnDeposit};
pub use projections::{StockProjection, StockProjectionError, StockReadModel};
pub use reporting::{GroupBy, Receivable, SalesQuery, SalesRow, summarize};
pub use service::LedgerService;
pub use store::{InMemoryLedgerStore, LedgerRead, LedgerStore, LedgerTx, PurgeFilter};
#[cfg(feature = "postgres")]
pub use store::PostgresLedgerStore;
pub use workers::{ProjectionWorker, WorkerHandle};

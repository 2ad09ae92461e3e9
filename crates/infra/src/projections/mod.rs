//! Read models fed from the ledger event bus.
//!
//! All projections are:
//! - **Rebuildable**: reconstructed from the store's movement history at any time
//! - **Idempotent**: safe for at-least-once delivery
//! - **Never authoritative**: balances served to callers come from the store

pub mod stock;

pub use stock::{StockProjection, StockProjectionError, StockReadModel};

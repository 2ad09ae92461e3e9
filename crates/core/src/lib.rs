//! `stockbook-core`: primitives shared by every ledger crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod channel;
pub mod error;
pub mod id;
pub mod money;

pub use channel::Channel;
pub use error::{ErrorClass, LedgerError, LedgerResult};
pub use id::{CategoryId, LocationId, MovementId, MovementLineId, PriceRuleId, SupplierId};
pub use money::{BASIS_POINTS, Money};

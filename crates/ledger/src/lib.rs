//! Movement Ledger domain.
//!
//! The ledger is append-only: movements are recorded once, only header fields
//! and payment state change afterwards, and stock balances are always derived
//! from movement lines (see [`balance`]).

pub mod balance;
pub mod events;
pub mod movement;
pub mod payment;
pub mod prepare;
pub mod request;
pub mod returns;

pub use balance::{Balances, Shortfall, StockKey, check_sufficiency, outgoing, scan_balance};
pub use events::{
    LedgerEvent, LedgerPurged, MovementAmended, MovementRecorded, PaymentUpdated, SeriesAllocated,
};
pub use movement::{
    AddOn, Endpoints, LinePricing, Movement, MovementLine, MovementType, Origin, TypeRules,
};
pub use payment::{Payment, PaymentStatus, Reopened};
pub use prepare::{PrepareContext, PreparedMovement, prepare_movement, series_scope_for};
pub use request::{AmendMovement, LineRequest, MAX_LINE_QUANTITY, MovementFilter, MovementRequest, ReturnRequest};
pub use returns::{ReturnCap, check_return, return_caps, return_request};

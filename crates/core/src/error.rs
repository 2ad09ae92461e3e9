//! Ledger error model.

use thiserror::Error;

use crate::id::LocationId;
use crate::money::Money;

/// Result type used across the ledger crates.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// How a caller should react to a [`LedgerError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The request itself is wrong; change the input (or explicitly override) and resubmit.
    FixInput,
    /// A transient serialization failure; the whole operation may be retried from scratch.
    Retry,
    /// Configuration or infrastructure problem an operator cannot fix from the request.
    ContactAdministrator,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::FixInput => "fix_input",
            ErrorClass::Retry => "retry",
            ErrorClass::ContactAdministrator => "contact_administrator",
        }
    }
}

/// Ledger-level error.
///
/// Every failure is raised before any write becomes visible: a request that
/// returns an error has left the ledger untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed request (missing field, non-positive quantity, bad rule value...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The `from`/`to` pair does not fit the movement type.
    #[error("invalid location pair: {0}")]
    InvalidLocationPair(String),

    /// A line references a sku the catalog does not know.
    #[error("unknown sku: {0}")]
    UnknownSku(String),

    /// A referenced location does not exist or is inactive.
    #[error("unknown or inactive location: {0}")]
    UnknownLocation(LocationId),

    /// Outgoing quantity exceeds the derived balance at the source location.
    #[error("insufficient stock for {sku} at {location}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        location: LocationId,
        available: i64,
        requested: i64,
    },

    /// A `partial` payment outside `0 < paid < total`.
    #[error("invalid payment amount {paid} for total {total}")]
    InvalidPaymentAmount { paid: Money, total: Money },

    /// A return would exceed what is still attributed to the original sale.
    #[error("return exceeds sold quantity for {sku}: sold {sold}, already returned {already_returned}, requested {requested}")]
    ReturnExceedsSold {
        sku: String,
        sold: i64,
        already_returned: i64,
        requested: i64,
    },

    /// No usable document series for a scope/year.
    #[error("document series misconfigured: {0}")]
    SeriesMisconfigured(String),

    /// The series counter cannot advance any further.
    #[error("document series exhausted: {0}")]
    SeriesExhausted(String),

    /// Serialization failure on allocation or stock check; safe to retry.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The operation collides with existing state (duplicate code, referenced row...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage failure.
    #[error("store error: {0}")]
    Store(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn location_pair(msg: impl Into<String>) -> Self {
        Self::InvalidLocationPair(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    pub fn series(msg: impl Into<String>) -> Self {
        Self::SeriesMisconfigured(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::ConcurrencyConflict(_) => ErrorClass::Retry,
            LedgerError::SeriesMisconfigured(_)
            | LedgerError::SeriesExhausted(_)
            | LedgerError::Store(_) => ErrorClass::ContactAdministrator,
            _ => ErrorClass::FixInput,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retry
    }

    /// Whether the operator may resubmit with `allow_negative_stock`.
    pub fn is_overridable(&self) -> bool {
        matches!(self, LedgerError::InsufficientStock { .. })
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::InvalidLocationPair(_) => "invalid_location_pair",
            LedgerError::UnknownSku(_) => "unknown_sku",
            LedgerError::UnknownLocation(_) => "unknown_location",
            LedgerError::InsufficientStock { .. } => "insufficient_stock",
            LedgerError::InvalidPaymentAmount { .. } => "invalid_payment_amount",
            LedgerError::ReturnExceedsSold { .. } => "return_exceeds_sold",
            LedgerError::SeriesMisconfigured(_) => "series_misconfigured",
            LedgerError::SeriesExhausted(_) => "series_exhausted",
            LedgerError::ConcurrencyConflict(_) => "concurrency_conflict",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::Store(_) => "store_error",
        }
    }
}

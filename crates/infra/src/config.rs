//! Ledger service configuration.
//!
//! Loaded once by the binary and handed to [`crate::LedgerService::new`];
//! nothing here is read from the store at request time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Attempts after the first one when a transaction hits a serialization conflict.
    pub max_retries: u32,
    pub payment: PaymentPolicy,
    /// Statement timeout for the purge transaction.
    pub purge_timeout_secs: u64,
}

impl LedgerConfig {
    pub fn purge_timeout(&self) -> Duration {
        Duration::from_secs(self.purge_timeout_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            payment: PaymentPolicy::default(),
            purge_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentPolicy {
    /// Whether a payment may move back (e.g. `paid → pending` for a refund).
    /// Allowed moves are logged at warn level.
    pub allow_reopen_paid: bool,
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            allow_reopen_paid: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: LedgerConfig = serde_json::from_str(r#"{"payment": {}}"#).unwrap();
        assert_eq!(cfg, LedgerConfig::default());

        let cfg: LedgerConfig =
            serde_json::from_str(r#"{"max_retries": 0, "payment": {"allow_reopen_paid": false}}"#).unwrap();
        assert_eq!(cfg.max_retries, 0);
        assert!(!cfg.payment.allow_reopen_paid);
        assert_eq!(cfg.purge_timeout(), Duration::from_secs(600));
    }
}

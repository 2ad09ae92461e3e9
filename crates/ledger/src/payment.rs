//! Payment State Tracker.
//!
//! Payment lives on sale movements; there is no separate store. The `partial`
//! bound is checked against the movement total whenever the state is set.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockbook_core::{Channel, LedgerError, LedgerResult, Money};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// Till sales settle on the spot; trade sales are invoiced.
    pub fn default_for(channel: Channel) -> Self {
        match channel {
            Channel::B2C => PaymentStatus::Paid,
            Channel::B2B => PaymentStatus::Pending,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }

    fn rank(self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Partial => 1,
            PaymentStatus::Paid => 2,
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "partial" => Ok(PaymentStatus::Partial),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(LedgerError::validation(format!("unknown payment status '{other}'"))),
        }
    }
}

/// Whether an update moved the payment backwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reopened {
    No,
    Yes { from: PaymentStatus },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub status: PaymentStatus,
    pub paid: Money,
}

impl Payment {
    /// Build a payment state for a movement worth `total`.
    ///
    /// `pending` means nothing paid and `paid` means the full total; a
    /// supplied amount contradicting that is rejected. `partial` requires
    /// `0 < paid < total`.
    pub fn resolve(status: PaymentStatus, paid: Option<Money>, total: Money) -> LedgerResult<Self> {
        let invalid = |paid: Money| LedgerError::InvalidPaymentAmount { paid, total };
        let paid = match status {
            PaymentStatus::Pending => match paid {
                None => Money::ZERO,
                Some(p) if p == Money::ZERO => p,
                Some(p) => return Err(invalid(p)),
            },
            PaymentStatus::Paid => match paid {
                None => total,
                Some(p) if p == total => p,
                Some(p) => return Err(invalid(p)),
            },
            PaymentStatus::Partial => {
                let p = paid.ok_or_else(|| {
                    LedgerError::validation("paid_amount is required for partial payments")
                })?;
                if !(p.is_positive() && p < total) {
                    return Err(invalid(p));
                }
                p
            }
        };
        Ok(Self { status, paid })
    }

    /// Validate a status change on an existing sale and build the new state.
    ///
    /// Forward moves (`pending → partial/paid`, `partial → paid`) and
    /// same-status amount edits always pass. Backward moves are only allowed
    /// when `allow_reopen` is set and are reported as [`Reopened::Yes`].
    pub fn transition(
        &self,
        status: PaymentStatus,
        paid: Option<Money>,
        total: Money,
        allow_reopen: bool,
    ) -> LedgerResult<(Self, Reopened)> {
        let reopened = if status.rank() < self.status.rank() {
            if !allow_reopen {
                return Err(LedgerError::validation(format!(
                    "payment cannot go from {} back to {}",
                    self.status.as_str(),
                    status.as_str()
                )));
            }
            Reopened::Yes { from: self.status }
        } else {
            Reopened::No
        };
        Ok((Self::resolve(status, paid, total)?, reopened))
    }
}

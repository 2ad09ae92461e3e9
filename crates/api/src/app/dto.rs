//! Request/response bodies that have no domain counterpart.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{LedgerResult, LocationId, Money};
use stockbook_ledger::PaymentStatus;
use stockbook_series::{DocumentSeries, SeriesScope};

#[derive(Debug, Deserialize)]
pub struct PaymentUpdateRequest {
    pub status: PaymentStatus,
    #[serde(default)]
    pub paid_amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub sku: String,
    pub channel: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub sku: String,
    pub location: LocationId,
    pub balance: i64,
}

#[derive(Debug, Serialize)]
pub struct PendingDepositResponse {
    pub location: LocationId,
    pub pending: BTreeMap<String, i64>,
}

#[derive(Debug, Deserialize)]
pub struct LocationPatch {
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteLocationQuery {
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewSeries {
    pub code: String,
    pub scope: SeriesScope,
    pub prefix: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub next_number: Option<i64>,
    #[serde(default)]
    pub padding: Option<u8>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl NewSeries {
    pub fn into_series(self) -> LedgerResult<DocumentSeries> {
        let mut series = DocumentSeries::new(&self.code, self.scope, &self.prefix, self.year)?;
        if let Some(name) = self.name {
            series.name = name;
        }
        if let Some(next_number) = self.next_number {
            series.next_number = next_number;
        }
        if let Some(padding) = self.padding {
            series.padding = padding;
        }
        if let Some(active) = self.active {
            series.active = active;
        }
        series.validate()?;
        Ok(series)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AllocateQuery {
    /// Document date the reference is for; defaults to now.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct AllocateResponse {
    pub scope: SeriesScope,
    pub reference: String,
}

//! Read-only aggregates for dashboards and reports.
//!
//! Everything here runs on a reader and never takes write locks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;

use stockbook_core::{Channel, LedgerResult, Money, MovementId};
use stockbook_events::{EventBus, EventEnvelope};
use stockbook_ledger::{Movement, MovementFilter, MovementLine, PaymentStatus};
use stockbook_reference::Catalog;

use crate::service::LedgerService;
use crate::store::{LedgerRead, LedgerStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Channel,
    Sku,
    Category,
    Day,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesQuery {
    /// Inclusive.
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Exclusive.
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub group_by: GroupBy,
}

/// One group of the sales summary. Returns are netted out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesRow {
    pub key: String,
    pub units: i64,
    pub revenue: Money,
    pub cost: Money,
    pub margin: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receivable {
    pub movement_id: MovementId,
    pub reference: Option<String>,
    pub channel: Option<Channel>,
    pub date: DateTime<Utc>,
    pub status: PaymentStatus,
    pub total: Money,
    pub paid: Money,
    pub outstanding: Money,
}

#[derive(Debug, Default)]
struct Totals {
    units: i64,
    revenue: Money,
    cost: Money,
}

impl Totals {
    fn add(&mut self, line: &MovementLine, sign: i64) {
        let (revenue, cost) = (line.total(), line.cost_total());
        self.units += sign * line.quantity;
        if sign < 0 {
            self.revenue = self.revenue - revenue;
            self.cost = self.cost - cost;
        } else {
            self.revenue += revenue;
            self.cost += cost;
        }
    }
}

const UNCATEGORIZED: &str = "uncategorized";

/// Fold sales and returns into per-group totals.
pub fn summarize<'a>(
    movements: impl IntoIterator<Item = &'a Movement>,
    group_by: GroupBy,
    catalog: &dyn Catalog,
) -> Vec<SalesRow> {
    let mut groups: BTreeMap<String, Totals> = BTreeMap::new();
    for m in movements {
        let sign = if m.kind.is_sale() {
            1
        } else if m.kind.is_return() {
            -1
        } else {
            continue;
        };
        for line in &m.lines {
            let key = match group_by {
                GroupBy::Channel => m.channel.map_or("none", Channel::as_str).to_string(),
                GroupBy::Sku => line.sku.clone(),
                GroupBy::Category => catalog
                    .product(&line.sku)
                    .and_then(|p| p.category_id)
                    .map_or_else(|| UNCATEGORIZED.to_string(), |c| c.to_string()),
                GroupBy::Day => m.date.format("%Y-%m-%d").to_string(),
            };
            groups.entry(key).or_default().add(line, sign);
        }
    }
    groups
        .into_iter()
        .map(|(key, t)| SalesRow {
            key,
            units: t.units,
            revenue: t.revenue,
            cost: t.cost,
            margin: t.revenue - t.cost,
        })
        .collect()
}

impl<S, B> LedgerService<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[instrument(skip(self), err)]
    pub async fn sales_summary(&self, query: SalesQuery) -> LedgerResult<Vec<SalesRow>> {
        let filter = MovementFilter {
            since: query.since,
            until: query.until,
            ..MovementFilter::default()
        };
        let movements = self.store.reader().await?.movements(&filter).await?;
        Ok(summarize(&movements, query.group_by, self.catalog.as_ref()))
    }

    /// Sales not fully paid, oldest first.
    #[instrument(skip(self), err)]
    pub async fn receivables(&self) -> LedgerResult<Vec<Receivable>> {
        let movements = self
            .store
            .reader()
            .await?
            .movements(&MovementFilter::default())
            .await?;
        Ok(movements
            .iter()
            .filter_map(|m| {
                let payment = m.payment.filter(|p| p.status != PaymentStatus::Paid)?;
                Some(Receivable {
                    movement_id: m.id,
                    reference: m.reference.clone(),
                    channel: m.channel,
                    date: m.date,
                    status: payment.status,
                    total: m.total(),
                    paid: payment.paid,
                    outstanding: m.outstanding(),
                })
            })
            .collect())
    }
}

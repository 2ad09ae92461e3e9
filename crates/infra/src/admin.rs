//! Back-office administration: locations, document series, price rules and
//! the bulk purge.
//!
//! Series and rule edits take effect on the next allocation or quote;
//! nothing is cached between writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument, warn};

use stockbook_core::{LedgerError, LedgerResult, LocationId, PriceRuleId};
use stockbook_events::{EventBus, EventEnvelope};
use stockbook_ledger::{LedgerEvent, LedgerPurged};
use stockbook_pricing::{PriceRule, PriceRulePatch, RuleKind, RuleScope, RuleTarget};
use stockbook_reference::{Location, LocationKind};
use stockbook_series::{DocumentSeries, SeriesPatch};

use crate::deposits::find_or_create_retail_in_tx;
use crate::service::{Committed, LedgerService, require_location};
use crate::store::{LedgerRead, LedgerStore, LedgerTx, PurgeFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLocation {
    pub kind: LocationKind,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPriceRule {
    pub name: String,
    pub target: RuleTarget,
    pub scope: RuleScope,
    pub kind: RuleKind,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Outcome of a purge or a cascading location delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    pub movements_deleted: u64,
    pub before: Option<DateTime<Utc>>,
    pub location: Option<LocationId>,
    pub location_deleted: bool,
}

impl<S, B> LedgerService<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    // ---------------------------------------------------------------------
    // Locations
    // ---------------------------------------------------------------------

    #[instrument(skip(self, new), fields(kind = new.kind.as_str()), err)]
    pub async fn create_location(&self, new: NewLocation) -> LedgerResult<Location> {
        let location = Location::new(new.kind, &new.name)?;
        let location = &location;
        self.with_retry("create_location", move || async move {
            let mut tx = self.store.begin().await?;
            tx.insert_location(location).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(location.clone(), Vec::new()))
        })
        .await
    }

    pub async fn get_location(&self, id: LocationId) -> LedgerResult<Location> {
        let mut reader = self.store.reader().await?;
        require_location(&mut reader, id).await
    }

    pub async fn list_locations(&self) -> LedgerResult<Vec<Location>> {
        self.store.reader().await?.locations().await
    }

    /// Deactivated locations stay in history but take no new movements.
    #[instrument(skip(self), fields(location = %id), err)]
    pub async fn set_location_active(&self, id: LocationId, active: bool) -> LedgerResult<Location> {
        self.with_retry("set_location_active", move || async move {
            let mut tx = self.store.begin().await?;
            let mut location = require_location(&mut tx, id).await?;
            location.active = active;
            tx.update_location(&location).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(location, Vec::new()))
        })
        .await
    }

    /// Retail location for a customer name (case and whitespace insensitive),
    /// created when missing.
    #[instrument(skip(self), err)]
    pub async fn find_or_create_retail_location(&self, customer_name: &str) -> LedgerResult<Location> {
        self.with_retry("find_or_create_retail_location", move || async move {
            let mut tx = self.store.begin().await?;
            let location = find_or_create_retail_in_tx(&mut tx, customer_name).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(location, Vec::new()))
        })
        .await
    }

    /// Delete a location. While movements reference it this is a `Conflict`
    /// unless `cascade` is set, which purges those movements first.
    #[instrument(skip(self), fields(location = %id), err)]
    pub async fn delete_location(&self, id: LocationId, cascade: bool) -> LedgerResult<PurgeReport> {
        if cascade {
            let filter = PurgeFilter {
                before: None,
                location: Some(id),
            };
            return self.purge(filter, true).await;
        }
        self.with_retry("delete_location", move || async move {
            let _shared = self.maintenance.read().await;
            let mut tx = self.store.begin().await?;
            require_location(&mut tx, id).await?;
            if tx.location_in_use(id).await? {
                return Err(LedgerError::conflict(format!(
                    "location {id} is referenced by movements; delete with cascade to purge them"
                )));
            }
            tx.delete_location(id).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(
                PurgeReport {
                    movements_deleted: 0,
                    before: None,
                    location: Some(id),
                    location_deleted: true,
                },
                Vec::new(),
            ))
        })
        .await
    }

    // ---------------------------------------------------------------------
    // Document series
    // ---------------------------------------------------------------------

    /// Create or replace a series by code.
    #[instrument(skip(self, series), fields(code = %series.code, scope = %series.scope), err)]
    pub async fn upsert_series(&self, series: DocumentSeries) -> LedgerResult<DocumentSeries> {
        series.validate()?;
        let series = &series;
        self.with_retry("upsert_series", move || async move {
            let mut tx = self.store.begin().await?;
            // Lock the scope so the write queues behind in-flight allocations.
            tx.lock_series(series.scope).await?;
            tx.save_series(series).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(series.clone(), Vec::new()))
        })
        .await
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update_series(&self, code: &str, patch: SeriesPatch) -> LedgerResult<DocumentSeries> {
        let patch = &patch;
        self.with_retry("update_series", move || async move {
            let mut tx = self.store.begin().await?;
            let current = tx
                .series()
                .await?
                .into_iter()
                .find(|s| s.code == code)
                .ok_or_else(|| LedgerError::not_found(format!("series {code}")))?;
            let locked = tx.lock_series(current.scope).await?;
            let current = locked
                .into_iter()
                .find(|s| s.code == code)
                .ok_or_else(|| LedgerError::not_found(format!("series {code}")))?;
            let next = current.patched(patch)?;
            if next.next_number < current.next_number {
                warn!(
                    series = %code,
                    from = current.next_number,
                    to = next.next_number,
                    "series counter moved backwards; references may repeat"
                );
            }
            tx.save_series(&next).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(next, Vec::new()))
        })
        .await
    }

    pub async fn list_series(&self) -> LedgerResult<Vec<DocumentSeries>> {
        self.store.reader().await?.series().await
    }

    #[instrument(skip(self), err)]
    pub async fn delete_series(&self, code: &str) -> LedgerResult<()> {
        self.with_retry("delete_series", move || async move {
            let mut tx = self.store.begin().await?;
            if !tx.delete_series(code).await? {
                return Err(LedgerError::not_found(format!("series {code}")));
            }
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new((), Vec::new()))
        })
        .await
    }

    // ---------------------------------------------------------------------
    // Price rules
    // ---------------------------------------------------------------------

    #[instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn create_price_rule(&self, new: NewPriceRule) -> LedgerResult<PriceRule> {
        let mut rule = PriceRule::new(&new.name, new.target, new.scope, new.kind, new.priority)?;
        rule.active = new.active;
        let rule = &rule;
        self.with_retry("create_price_rule", move || async move {
            let mut tx = self.store.begin().await?;
            tx.insert_price_rule(rule).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(rule.clone(), Vec::new()))
        })
        .await
    }

    #[instrument(skip(self, patch), fields(rule = %id), err)]
    pub async fn update_price_rule(&self, id: PriceRuleId, patch: PriceRulePatch) -> LedgerResult<PriceRule> {
        let patch = &patch;
        self.with_retry("update_price_rule", move || async move {
            let mut tx = self.store.begin().await?;
            let current = tx
                .price_rules()
                .await?
                .into_iter()
                .find(|r| r.id == id)
                .ok_or_else(|| LedgerError::not_found(format!("price rule {id}")))?;
            let next = current.patched(patch)?;
            tx.update_price_rule(&next).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(next, Vec::new()))
        })
        .await
    }

    #[instrument(skip(self), fields(rule = %id), err)]
    pub async fn delete_price_rule(&self, id: PriceRuleId) -> LedgerResult<()> {
        self.with_retry("delete_price_rule", move || async move {
            let mut tx = self.store.begin().await?;
            if !tx.delete_price_rule(id).await? {
                return Err(LedgerError::not_found(format!("price rule {id}")));
            }
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new((), Vec::new()))
        })
        .await
    }

    pub async fn list_price_rules(&self) -> LedgerResult<Vec<PriceRule>> {
        self.store.reader().await?.price_rules().await
    }

    // ---------------------------------------------------------------------
    // Purge
    // ---------------------------------------------------------------------

    /// Delete movements matching `filter` in one maintenance transaction.
    ///
    /// Bypasses every ledger invariant. Ordinary writes wait until it is done.
    /// The stock projection is rebuilt afterwards.
    #[instrument(skip(self), err)]
    pub async fn purge_movements(&self, filter: PurgeFilter) -> LedgerResult<PurgeReport> {
        self.purge(filter, false).await
    }

    async fn purge(&self, filter: PurgeFilter, delete_location: bool) -> LedgerResult<PurgeReport> {
        let report = {
            let _exclusive = self.maintenance.write().await;
            let mut tx = self.store.begin_maintenance().await?;
            if let Some(id) = filter.location {
                require_location(&mut tx, id).await?;
            }
            let movements_deleted = tx.purge_movements(&filter).await?;
            let location_deleted = match filter.location {
                Some(id) if delete_location => tx.delete_location(id).await?,
                _ => false,
            };
            tx.commit().await?;
            PurgeReport {
                movements_deleted,
                before: filter.before,
                location: filter.location,
                location_deleted,
            }
        };

        self.publish(vec![LedgerEvent::LedgerPurged(LedgerPurged {
            movements_deleted: report.movements_deleted,
            before: report.before,
            occurred_at: Utc::now(),
        })]);
        info!(
            movements_deleted = report.movements_deleted,
            location = ?report.location,
            "ledger purged"
        );
        self.rebuild_stock_projection().await?;
        Ok(report)
    }
}

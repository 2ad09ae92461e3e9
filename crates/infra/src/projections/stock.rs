use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

use stockbook_core::{LocationId, MovementId};
use stockbook_events::{Applied, EventEnvelope, Projection, ProjectionError, ProjectionRunner};
use stockbook_ledger::{Balances, LedgerEvent, Movement, StockKey};

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize ledger event: {0}")]
    Deserialize(String),

    #[error("stock projection lock poisoned")]
    Poisoned,

    #[error("sequence gap (last={last}, found={found}); projection needs a rebuild")]
    Gap { last: u64, found: u64 },

    #[error("failed to fold movement {movement}: {reason}")]
    Fold { movement: MovementId, reason: String },
}

/// Per-(sku, location) balances folded from `MovementRecorded` events.
///
/// Idempotent per movement id, so a movement seen both by a rebuild and by a
/// late envelope is counted once. A purge published by someone else marks
/// the projection stale.
#[derive(Debug, Default)]
pub struct StockProjection {
    balances: Balances,
    seen: HashSet<MovementId>,
    stale: bool,
}

impl StockProjection {
    pub fn balances(&self) -> &Balances {
        &self.balances
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn record(&mut self, movement: &Movement) -> Result<(), StockProjectionError> {
        if self.seen.contains(&movement.id) {
            return Ok(());
        }
        self.balances.apply(movement).map_err(|e| StockProjectionError::Fold {
            movement: movement.id,
            reason: e.to_string(),
        })?;
        self.seen.insert(movement.id);
        Ok(())
    }
}

impl Projection for StockProjection {
    type Ev = LedgerEvent;

    fn apply(&mut self, envelope: &EventEnvelope<LedgerEvent>) {
        match envelope.payload() {
            LedgerEvent::MovementRecorded(e) => {
                if let Err(err) = self.record(&e.movement) {
                    warn!(error = %err, "stock projection cannot fold movement; marking stale");
                    self.stale = true;
                }
            }
            LedgerEvent::LedgerPurged(_) => self.stale = true,
            // Amendments and payments never touch quantities.
            LedgerEvent::MovementAmended(_)
            | LedgerEvent::PaymentUpdated(_)
            | LedgerEvent::SeriesAllocated(_) => {}
        }
    }

    fn reset(&mut self) {
        self.balances = Balances::new();
        self.seen.clear();
        self.stale = false;
    }
}

/// Shared handle on the stock read model.
///
/// Fed by the projection worker from the bus, rebuilt by the service from the
/// store. Never the source of truth.
#[derive(Debug, Clone)]
pub struct StockReadModel {
    inner: Arc<RwLock<ProjectionRunner<StockProjection>>>,
}

/// A fresh model has folded nothing yet and starts stale.
impl Default for StockReadModel {
    fn default() -> Self {
        let projection = StockProjection {
            stale: true,
            ..StockProjection::default()
        };
        Self {
            inner: Arc::new(RwLock::new(ProjectionRunner::new(projection))),
        }
    }
}

impl StockReadModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a published JSON envelope.
    pub fn handle(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, StockProjectionError> {
        let typed = envelope
            .decode::<LedgerEvent>()
            .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;
        let mut runner = self.inner.write().map_err(|_| StockProjectionError::Poisoned)?;
        match runner.apply(&typed) {
            Ok(applied) => Ok(applied),
            Err(ProjectionError::Gap { last, found }) => {
                runner.projection_mut().stale = true;
                warn!(last, found, "stock projection missed events");
                Err(StockProjectionError::Gap { last, found })
            }
        }
    }

    /// Replace the state with a fold of `movements`.
    ///
    /// `sequence_number` is the bus position read before the movements were
    /// loaded: envelopes up to it are dropped, later ones still apply (and
    /// are deduplicated per movement).
    pub fn rebuild<'a>(
        &self,
        movements: impl IntoIterator<Item = &'a Movement>,
        sequence_number: u64,
    ) -> Result<(), StockProjectionError> {
        let mut runner = self.inner.write().map_err(|_| StockProjectionError::Poisoned)?;
        runner.reset_at(Some(sequence_number));
        let projection = runner.projection_mut();
        for m in movements {
            if let Err(err) = projection.record(m) {
                projection.stale = true;
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn is_stale(&self) -> bool {
        self.inner.read().map(|r| r.projection().is_stale()).unwrap_or(true)
    }

    pub fn last_sequence_number(&self) -> Option<u64> {
        self.inner.read().ok().and_then(|r| r.last_sequence_number())
    }

    pub fn balance(&self, sku: &str, location: LocationId) -> Result<i64, StockProjectionError> {
        let runner = self.inner.read().map_err(|_| StockProjectionError::Poisoned)?;
        Ok(runner.projection().balances().get(sku, location))
    }

    pub fn snapshot(&self) -> Result<BTreeMap<StockKey, i64>, StockProjectionError> {
        let runner = self.inner.read().map_err(|_| StockProjectionError::Poisoned)?;
        Ok(runner
            .projection()
            .balances()
            .iter()
            .map(|(k, v)| (k.clone(), v))
            .collect())
    }
}

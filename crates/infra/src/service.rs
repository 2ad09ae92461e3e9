//! Ledger orchestration.
//!
//! `LedgerService` composes a [`LedgerStore`], an [`EventBus`] and the
//! catalog into the operations the POS, web-order sync and back-office call.
//!
//! ## Write pipeline
//!
//! ```text
//! request
//!   ↓
//! 1. begin a serializable store transaction
//!   ↓
//! 2. validate against registry, catalog and price rules (pure, `stockbook-ledger`)
//!   ↓
//! 3. check return caps and stock sufficiency under lock
//!   ↓
//! 4. allocate a reference from the scope's series (same transaction)
//!   ↓
//! 5. write the movement, commit
//!   ↓
//! 6. publish ledger events to the bus
//! ```
//!
//! A failure at any step before commit leaves the ledger untouched, series
//! counters included. A `ConcurrencyConflict` restarts the whole pipeline up
//! to `max_retries` times. Events are only published after commit; a failed
//! publish is logged and never undoes the write.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use stockbook_core::{Channel, LedgerError, LedgerResult, LocationId, Money, MovementId};
use stockbook_events::{Event, EventBus, EventEnvelope};
use stockbook_ledger::{
    AmendMovement, LedgerEvent, Movement, MovementAmended, MovementFilter, MovementRecorded, MovementRequest,
    PaymentStatus, PaymentUpdated, PrepareContext, PreparedMovement, Reopened, ReturnRequest, SeriesAllocated,
    StockKey, check_return, check_sufficiency, outgoing, prepare_movement, return_request,
};
use stockbook_pricing::{Quote, quote_sku};
use stockbook_reference::Catalog;
use stockbook_series::{SeriesScope, select_series};

use crate::config::LedgerConfig;
use crate::projections::StockReadModel;
use crate::store::{LedgerRead, LedgerStore, LedgerTx};
use crate::workers::{ProjectionWorker, WorkerHandle};

/// Result of a committed unit of work: the value plus the events to publish.
pub(crate) struct Committed<T> {
    pub value: T,
    pub events: Vec<LedgerEvent>,
}

impl<T> Committed<T> {
    pub(crate) fn new(value: T, events: Vec<LedgerEvent>) -> Self {
        Self { value, events }
    }
}

pub struct LedgerService<S, B> {
    pub(crate) store: S,
    bus: B,
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) config: LedgerConfig,
    /// Last published sequence number; held while publishing so envelopes
    /// leave in sequence order.
    sequence: Mutex<u64>,
    /// Shared by ordinary writes, exclusive for purges.
    pub(crate) maintenance: RwLock<()>,
    stock: StockReadModel,
}

impl<S, B> core::fmt::Debug for LedgerService<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S, B> LedgerService<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(store: S, bus: B, catalog: Arc<dyn Catalog>, config: LedgerConfig) -> Self {
        Self {
            store,
            bus,
            catalog,
            config,
            sequence: Mutex::new(0),
            maintenance: RwLock::new(()),
            stock: StockReadModel::new(),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn stock_read_model(&self) -> &StockReadModel {
        &self.stock
    }

    /// Sequence number of the last published envelope.
    pub fn published_sequence(&self) -> u64 {
        self.sequence.lock().map(|s| *s).unwrap_or(0)
    }

    // ---------------------------------------------------------------------
    // Movement Ledger
    // ---------------------------------------------------------------------

    /// Validate and record one movement.
    #[instrument(skip(self, req), fields(kind = %req.kind, lines = req.lines.len()), err)]
    pub async fn record_movement(&self, req: MovementRequest) -> LedgerResult<Movement> {
        if req.return_of.is_some() {
            return Err(LedgerError::validation("use record_return to return against a sale"));
        }
        let req = &req;
        let movement = self
            .with_retry("record_movement", move || async move {
                let _shared = self.maintenance.read().await;
                let mut tx = self.store.begin().await?;
                let mut events = Vec::new();
                let movement = self.record_in_tx(&mut tx, req, &mut events).await?;
                tx.commit().await?;
                Ok::<_, LedgerError>(Committed::new(movement, events))
            })
            .await?;
        info!(movement_id = %movement.id, reference = ?movement.reference, "movement recorded");
        Ok(movement)
    }

    /// Record a return against `sale`, capped per sku by what that sale
    /// sold minus what earlier returns against it brought back.
    #[instrument(skip(self, req), fields(sale_id = %sale, lines = req.lines.len()), err)]
    pub async fn record_return(&self, sale: MovementId, req: ReturnRequest) -> LedgerResult<Movement> {
        let req = &req;
        let movement = self
            .with_retry("record_return", move || async move {
                let _shared = self.maintenance.read().await;
                let mut tx = self.store.begin().await?;
                let original = tx
                    .movement(sale)
                    .await?
                    .ok_or_else(|| LedgerError::not_found(format!("movement {sale}")))?;
                let request = return_request(&original, req)?;
                let mut events = Vec::new();
                let movement = self.record_in_tx(&mut tx, &request, &mut events).await?;
                tx.commit().await?;
                Ok::<_, LedgerError>(Committed::new(movement, events))
            })
            .await?;
        info!(movement_id = %movement.id, reference = ?movement.reference, "return recorded");
        Ok(movement)
    }

    /// Change the payment state of a sale.
    ///
    /// The `partial` bound is checked against the stored line total. Moving
    /// back (e.g. `paid → pending`) follows `payment.allow_reopen_paid`.
    #[instrument(skip(self), fields(movement_id = %id), err)]
    pub async fn update_payment(
        &self,
        id: MovementId,
        status: PaymentStatus,
        paid: Option<Money>,
    ) -> LedgerResult<Movement> {
        self.with_retry("update_payment", move || async move {
            let _shared = self.maintenance.read().await;
            let mut tx = self.store.begin().await?;
            let mut movement = tx
                .movement(id)
                .await?
                .ok_or_else(|| LedgerError::not_found(format!("movement {id}")))?;
            let current = movement.payment.ok_or_else(|| {
                LedgerError::validation(format!("{} movements do not carry a payment", movement.kind))
            })?;

            let (next, reopened) = current.transition(
                status,
                paid,
                movement.total(),
                self.config.payment.allow_reopen_paid,
            )?;
            if let Reopened::Yes { from } = reopened {
                warn!(
                    movement_id = %id,
                    from = from.as_str(),
                    to = status.as_str(),
                    "payment reopened"
                );
            }

            movement.payment = Some(next);
            tx.update_movement_header(&movement).await?;
            tx.commit().await?;

            let event = LedgerEvent::PaymentUpdated(PaymentUpdated {
                movement_id: id,
                previous: current.status,
                status: next.status,
                paid: next.paid,
                occurred_at: Utc::now(),
            });
            Ok::<_, LedgerError>(Committed::new(movement, vec![event]))
        })
        .await
    }

    /// Correct header fields. An empty string clears `reference`/`notes`.
    #[instrument(skip(self, amend), fields(movement_id = %id), err)]
    pub async fn amend_movement(&self, id: MovementId, amend: AmendMovement) -> LedgerResult<Movement> {
        if amend.is_empty() {
            return Err(LedgerError::validation("nothing to amend"));
        }
        let amend = &amend;
        self.with_retry("amend_movement", move || async move {
            let _shared = self.maintenance.read().await;
            let mut tx = self.store.begin().await?;
            let mut movement = tx
                .movement(id)
                .await?
                .ok_or_else(|| LedgerError::not_found(format!("movement {id}")))?;

            if let Some(reference) = &amend.reference {
                movement.reference = non_blank(reference);
            }
            if let Some(notes) = &amend.notes {
                movement.notes = non_blank(notes);
            }
            if let Some(date) = amend.date {
                movement.date = date;
            }
            tx.update_movement_header(&movement).await?;
            tx.commit().await?;

            let event = LedgerEvent::MovementAmended(MovementAmended {
                movement_id: id,
                reference: movement.reference.clone(),
                notes: movement.notes.clone(),
                date: movement.date,
                occurred_at: Utc::now(),
            });
            Ok::<_, LedgerError>(Committed::new(movement, vec![event]))
        })
        .await
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    pub async fn get_movement(&self, id: MovementId) -> LedgerResult<Movement> {
        let mut reader = self.store.reader().await?;
        reader
            .movement(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("movement {id}")))
    }

    pub async fn list_movements(&self, filter: &MovementFilter) -> LedgerResult<Vec<Movement>> {
        let mut reader = self.store.reader().await?;
        reader.movements(filter).await
    }

    /// Derived balance of `sku` at `location`, computed from the ledger.
    #[instrument(skip(self), fields(sku = %sku, location = %location), err)]
    pub async fn get_balance(&self, sku: &str, location: LocationId) -> LedgerResult<i64> {
        let mut reader = self.store.reader().await?;
        require_location(&mut reader, location).await?;
        reader.balance(sku.trim(), location).await
    }

    #[instrument(skip(self), fields(location = %location), err)]
    pub async fn get_balances(&self, location: LocationId) -> LedgerResult<BTreeMap<String, i64>> {
        let mut reader = self.store.reader().await?;
        require_location(&mut reader, location).await?;
        reader.balances(location).await
    }

    // ---------------------------------------------------------------------
    // Pricing Resolver / Series Allocator
    // ---------------------------------------------------------------------

    /// Price `sku` for `channel` against the current rule set.
    #[instrument(skip(self), fields(sku = %sku, channel = %channel), err)]
    pub async fn quote(&self, sku: &str, channel: Channel) -> LedgerResult<Quote> {
        let rules = self.store.reader().await?.price_rules().await?;
        let quote = quote_sku(self.catalog.as_ref(), sku.trim(), channel, &rules)?;
        debug!(
            base = %quote.base,
            price = %quote.price,
            rule = ?quote.applied_rule.as_ref().map(|r| r.id),
            "quote resolved"
        );
        Ok(quote)
    }

    /// Issue the next reference of `scope` on its own, outside any movement.
    #[instrument(skip(self), fields(scope = %scope), err)]
    pub async fn allocate(&self, scope: SeriesScope, as_of: DateTime<Utc>) -> LedgerResult<String> {
        self.with_retry("allocate", move || async move {
            let _shared = self.maintenance.read().await;
            let mut tx = self.store.begin().await?;
            let mut events = Vec::new();
            let reference = allocate_in_tx(&mut tx, scope, as_of, &mut events).await?;
            tx.commit().await?;
            Ok::<_, LedgerError>(Committed::new(reference, events))
        })
        .await
    }

    // ---------------------------------------------------------------------
    // Stock projection
    // ---------------------------------------------------------------------

    /// Start the background worker feeding the stock read model from the bus.
    /// The model is rebuilt from the store first.
    pub async fn start_stock_projection(&self) -> LedgerResult<WorkerHandle> {
        let sub = self.bus.subscribe();
        self.rebuild_stock_projection().await?;
        let model = self.stock.clone();
        ProjectionWorker::spawn("stock-projection", sub, move |env: EventEnvelope<JsonValue>| model.handle(&env))
            .map_err(|e| LedgerError::store(format!("failed to spawn stock projection worker: {e}")))
    }

    /// Refold the stock read model from the full movement history.
    #[instrument(skip(self), err)]
    pub async fn rebuild_stock_projection(&self) -> LedgerResult<()> {
        let sequence = self.published_sequence();
        let movements = self
            .store
            .reader()
            .await?
            .movements(&MovementFilter::default())
            .await?;
        self.stock
            .rebuild(&movements, sequence)
            .map_err(|e| LedgerError::store(e.to_string()))?;
        info!(movements = movements.len(), sequence, "stock projection rebuilt");
        Ok(())
    }

    /// Balances from the read model, rebuilt first if it is stale.
    pub async fn projected_balances(&self) -> LedgerResult<BTreeMap<StockKey, i64>> {
        if self.stock.is_stale() {
            self.rebuild_stock_projection().await?;
        }
        self.stock.snapshot().map_err(|e| LedgerError::store(e.to_string()))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Run `attempt` until it commits, retrying serialization conflicts.
    pub(crate) async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<Committed<T>>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Ok(Committed { value, events }) => {
                    self.publish(events);
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    warn!(operation, retry = retries, error = %err, "retrying after concurrency conflict");
                    tokio::task::yield_now().await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Publish committed events in order. Failures only delay read models.
    pub(crate) fn publish(&self, events: Vec<LedgerEvent>) {
        if events.is_empty() {
            return;
        }
        let Ok(mut sequence) = self.sequence.lock() else {
            warn!("event sequence lock poisoned; events not published");
            return;
        };
        for event in events {
            let envelope = match EventEnvelope::from_typed(*sequence + 1, &event) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(event_type = event.event_type(), error = %err, "failed to encode event");
                    continue;
                }
            };
            *sequence += 1;
            if let Err(err) = self.bus.publish(envelope) {
                warn!(sequence = *sequence, error = ?err, "failed to publish event");
            }
        }
    }

    /// Validate, check and write one movement inside `tx`.
    pub(crate) async fn record_in_tx<T: LedgerTx>(
        &self,
        tx: &mut T,
        req: &MovementRequest,
        events: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Movement> {
        let from = match req.from {
            Some(id) => tx.location(id).await?,
            None => None,
        };
        let to = match req.to {
            Some(id) => tx.location(id).await?,
            None => None,
        };
        let rules = tx.price_rules().await?;

        let PreparedMovement {
            mut movement,
            series_scope,
        } = {
            let ctx = PrepareContext {
                catalog: self.catalog.as_ref(),
                rules: &rules,
                from: from.as_ref(),
                to: to.as_ref(),
                now: Utc::now(),
            };
            prepare_movement(req, &ctx)?
        };

        if let Some(sale_id) = movement.return_of {
            let sale = tx
                .movement(sale_id)
                .await?
                .ok_or_else(|| LedgerError::not_found(format!("movement {sale_id}")))?;
            let prior = tx.returns_for(sale_id).await?;
            check_return(&sale, &prior, &req.lines)?;
        }

        let demand = outgoing(&movement)?;
        if !demand.is_empty() {
            let keys: Vec<StockKey> = demand.keys().cloned().collect();
            tx.lock_stock(&keys).await?;
            let mut available = BTreeMap::new();
            for key in keys {
                let balance = tx.balance(&key.sku, key.location).await?;
                available.insert(key, balance);
            }
            let shortfalls = check_sufficiency(
                &demand,
                |key| available.get(key).copied().unwrap_or(0),
                req.allow_negative_stock,
            )?;
            for s in &shortfalls {
                warn!(
                    sku = %s.key.sku,
                    location = %s.key.location,
                    available = s.available,
                    requested = s.requested,
                    "negative stock override"
                );
            }
        }

        if let Some(scope) = series_scope {
            let reference = allocate_in_tx(tx, scope, movement.date, events).await?;
            movement.reference = Some(reference);
        }

        tx.insert_movement(&movement).await?;
        events.push(LedgerEvent::MovementRecorded(MovementRecorded {
            movement: movement.clone(),
            occurred_at: Utc::now(),
        }));
        Ok(movement)
    }
}

/// Read-increment-persist the scope's counter inside `tx`.
pub(crate) async fn allocate_in_tx<T: LedgerTx>(
    tx: &mut T,
    scope: SeriesScope,
    as_of: DateTime<Utc>,
    events: &mut Vec<LedgerEvent>,
) -> LedgerResult<String> {
    let locked = tx.lock_series(scope).await?;
    let mut series = select_series(&locked, scope, as_of.year())?.clone();
    let reference = series.issue()?;
    tx.save_series(&series).await?;
    info!(series = %series.code, reference = %reference, "reference allocated");
    events.push(LedgerEvent::SeriesAllocated(SeriesAllocated {
        series_code: series.code,
        scope,
        reference: reference.clone(),
        occurred_at: Utc::now(),
    }));
    Ok(reference)
}

pub(crate) async fn require_location<R: LedgerRead>(
    reader: &mut R,
    id: LocationId,
) -> LedgerResult<stockbook_reference::Location> {
    reader
        .location(id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("location {id}")))
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use stockbook_events::InMemoryEventBus;
    use stockbook_ledger::SeriesAllocated;
    use stockbook_reference::InMemoryCatalog;

    use crate::store::InMemoryLedgerStore;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

    fn service(max_retries: u32) -> (LedgerService<InMemoryLedgerStore, Bus>, Bus) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let config = LedgerConfig {
            max_retries,
            ..LedgerConfig::default()
        };
        let service = LedgerService::new(
            InMemoryLedgerStore::new(),
            bus.clone(),
            Arc::new(InMemoryCatalog::new()),
            config,
        );
        (service, bus)
    }

    fn allocated(reference: &str) -> LedgerEvent {
        LedgerEvent::SeriesAllocated(SeriesAllocated {
            series_code: "B2C".into(),
            scope: SeriesScope::SaleB2c,
            reference: reference.into(),
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn conflicts_are_retried_and_events_published_once() {
        let (service, bus) = service(3);
        let sub = bus.subscribe();
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        let value = service
            .with_retry("test", move || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(LedgerError::concurrency("serialization failure"));
                }
                Ok(Committed::new(7, vec![allocated("B2C-000001")]))
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].sequence_number(), 1);
        assert_eq!(service.published_sequence(), 1);
    }

    #[tokio::test]
    async fn conflicts_surface_once_retries_run_out() {
        let (service, bus) = service(1);
        let sub = bus.subscribe();
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        let err = service
            .with_retry("test", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<Committed<()>, _>(LedgerError::concurrency("serialization failure"))
            })
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert!(sub.drain().is_empty());
    }

    #[tokio::test]
    async fn input_errors_are_not_retried() {
        let (service, _bus) = service(5);
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;

        let err = service
            .with_retry("test", move || async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<Committed<()>, _>(LedgerError::validation("quantity must be positive"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "validation_error");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn envelopes_leave_in_sequence_order() {
        let (service, bus) = service(0);
        let sub = bus.subscribe();

        service.publish(vec![allocated("B2C-000001"), allocated("B2C-000002")]);
        service.publish(vec![allocated("B2C-000003")]);

        let sequences: Vec<u64> = sub.drain().iter().map(|e| e.sequence_number()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}

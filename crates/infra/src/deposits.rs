//! Deposit Manager: consignment stock at customer locations.
//!
//! A deposit is not an entity. It is a transfer from a warehouse into the
//! customer's retail location, and the pending deposit is that location's
//! derived balance. Converting records a sale out of the retail location;
//! returning records a transfer back into a warehouse.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use stockbook_core::{Channel, LedgerError, LedgerResult, LocationId, Money};
use stockbook_events::{EventBus, EventEnvelope};
use stockbook_ledger::{LineRequest, Movement, MovementRequest, MovementType, PaymentStatus};
use stockbook_reference::{Location, LocationKind, customer_key};

use crate::service::{Committed, LedgerService, require_location};
use crate::store::{LedgerRead, LedgerStore, LedgerTx};

/// Place stock with a customer, creating their retail location on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub customer_name: String,
    pub warehouse: LocationId,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub location: Location,
    pub movement: Movement,
}

/// Sell part of a deposit. The stock leaves the retail location, never a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertDeposit {
    pub channel: Channel,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub paid_amount: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnDeposit {
    pub warehouse: LocationId,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl<S, B> LedgerService<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    #[instrument(skip(self, req), fields(customer = %req.customer_name, warehouse = %req.warehouse), err)]
    pub async fn place_deposit(&self, req: DepositRequest) -> LedgerResult<Deposit> {
        let req = &req;
        let deposit = self
            .with_retry("place_deposit", move || async move {
                let _shared = self.maintenance.read().await;
                let mut tx = self.store.begin().await?;
                let mut events = Vec::new();

                let warehouse = tx
                    .location(req.warehouse)
                    .await?
                    .ok_or(LedgerError::UnknownLocation(req.warehouse))?;
                if !warehouse.is_warehouse() {
                    return Err(LedgerError::location_pair(format!(
                        "deposits leave from a warehouse, {} is a {} location",
                        warehouse.name,
                        warehouse.kind.as_str()
                    )));
                }
                let location = find_or_create_retail_in_tx(&mut tx, &req.customer_name).await?;

                let mut request = MovementRequest::new(MovementType::Transfer, req.lines.clone())
                    .from(warehouse.id)
                    .to(location.id);
                request.date = req.date;
                request.reference = req.reference.clone();
                request.notes = req.notes.clone();

                let movement = self.record_in_tx(&mut tx, &request, &mut events).await?;
                tx.commit().await?;
                Ok::<_, LedgerError>(Committed::new(Deposit { location, movement }, events))
            })
            .await?;
        info!(
            location = %deposit.location.id,
            movement_id = %deposit.movement.id,
            reference = ?deposit.movement.reference,
            "deposit placed"
        );
        Ok(deposit)
    }

    /// Stock still held at a customer's retail location, by sku.
    #[instrument(skip(self), fields(location = %location), err)]
    pub async fn pending_deposit(&self, location: LocationId) -> LedgerResult<BTreeMap<String, i64>> {
        let mut reader = self.store.reader().await?;
        let loc = require_location(&mut reader, location).await?;
        ensure_retail(&loc)?;
        reader.balances(location).await
    }

    /// Turn part of a deposit into a sale of `channel` out of the retail location.
    ///
    /// The negative-stock override is never honoured here: only what is
    /// actually held at the customer can be sold from it.
    #[instrument(skip(self, req), fields(location = %location, channel = %req.channel), err)]
    pub async fn convert_deposit(&self, location: LocationId, req: ConvertDeposit) -> LedgerResult<Movement> {
        let req = &req;
        let movement = self
            .with_retry("convert_deposit", move || async move {
                let _shared = self.maintenance.read().await;
                let mut tx = self.store.begin().await?;
                let loc = tx.location(location).await?.ok_or(LedgerError::UnknownLocation(location))?;
                ensure_retail(&loc)?;

                let mut request =
                    MovementRequest::new(MovementType::sale_for(req.channel), req.lines.clone()).from(location);
                request.channel = Some(req.channel);
                request.date = req.date;
                request.reference = req.reference.clone();
                request.notes = req.notes.clone();
                request.payment_status = req.payment_status;
                request.paid_amount = req.paid_amount;

                let mut events = Vec::new();
                let movement = self.record_in_tx(&mut tx, &request, &mut events).await?;
                tx.commit().await?;
                Ok::<_, LedgerError>(Committed::new(movement, events))
            })
            .await?;
        info!(movement_id = %movement.id, reference = ?movement.reference, "deposit converted");
        Ok(movement)
    }

    /// Bring deposit stock back from the customer into `req.warehouse`.
    #[instrument(skip(self, req), fields(location = %location, warehouse = %req.warehouse), err)]
    pub async fn return_deposit(&self, location: LocationId, req: ReturnDeposit) -> LedgerResult<Movement> {
        let req = &req;
        let movement = self
            .with_retry("return_deposit", move || async move {
                let _shared = self.maintenance.read().await;
                let mut tx = self.store.begin().await?;
                let loc = tx.location(location).await?.ok_or(LedgerError::UnknownLocation(location))?;
                ensure_retail(&loc)?;
                let warehouse = tx
                    .location(req.warehouse)
                    .await?
                    .ok_or(LedgerError::UnknownLocation(req.warehouse))?;
                if !warehouse.is_warehouse() {
                    return Err(LedgerError::location_pair(format!(
                        "deposits return into a warehouse, {} is a {} location",
                        warehouse.name,
                        warehouse.kind.as_str()
                    )));
                }

                let mut request = MovementRequest::new(MovementType::Transfer, req.lines.clone())
                    .from(location)
                    .to(warehouse.id);
                request.date = req.date;
                request.notes = req.notes.clone();

                let mut events = Vec::new();
                let movement = self.record_in_tx(&mut tx, &request, &mut events).await?;
                tx.commit().await?;
                Ok::<_, LedgerError>(Committed::new(movement, events))
            })
            .await?;
        info!(movement_id = %movement.id, "deposit returned to warehouse");
        Ok(movement)
    }
}

fn ensure_retail(location: &Location) -> LedgerResult<()> {
    if location.kind != LocationKind::Retail {
        return Err(LedgerError::location_pair(format!(
            "{} is a {} location, not a customer deposit",
            location.name,
            location.kind.as_str()
        )));
    }
    Ok(())
}

/// Match a customer by normalised name, creating their retail location if
/// none exists. An inactive match is reactivated.
pub(crate) async fn find_or_create_retail_in_tx<T: LedgerTx>(tx: &mut T, customer_name: &str) -> LedgerResult<Location> {
    let key = customer_key(customer_name);
    if key.is_empty() {
        return Err(LedgerError::validation("customer name cannot be empty"));
    }
    match tx.find_retail_location(&key).await? {
        Some(existing) if existing.active => Ok(existing),
        Some(mut inactive) => {
            inactive.active = true;
            tx.update_location(&inactive).await?;
            info!(location = %inactive.id, "customer location reactivated");
            Ok(inactive)
        }
        None => {
            let location = Location::retail(customer_name)?;
            tx.insert_location(&location).await?;
            info!(location = %location.id, name = %location.name, "customer location created");
            Ok(location)
        }
    }
}

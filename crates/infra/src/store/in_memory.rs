use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockbook_core::{LedgerError, LedgerResult, LocationId, MovementId, PriceRuleId};
use stockbook_ledger::{Balances, Movement, MovementFilter, StockKey, scan_balance};
use stockbook_pricing::PriceRule;
use stockbook_reference::{Location, LocationKind};
use stockbook_series::{DocumentSeries, SeriesScope};

use super::{LedgerRead, LedgerStore, LedgerTx, PurgeFilter};

#[derive(Debug, Clone, Default)]
struct Tables {
    locations: BTreeMap<LocationId, Location>,
    movements: BTreeMap<MovementId, Arc<Movement>>,
    series: BTreeMap<String, DocumentSeries>,
    rules: BTreeMap<PriceRuleId, PriceRule>,
}

impl Tables {
    fn ordered_movements(&self) -> Vec<&Movement> {
        let mut all: Vec<&Movement> = self.movements.values().map(Arc::as_ref).collect();
        all.sort_by_key(|m| (m.date, m.id));
        all
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev and single-process deployments. Committed state is
/// an immutable snapshot; readers clone the `Arc` and never wait on writers.
/// Writers are serialised by an async mutex and work on a private copy that
/// replaces the snapshot on commit, which makes every transaction
/// serializable and all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    committed: Arc<RwLock<Arc<Tables>>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> LedgerResult<Arc<Tables>> {
        self.committed
            .read()
            .map(|t| Arc::clone(&t))
            .map_err(|_| LedgerError::store("lock poisoned"))
    }
}

#[derive(Debug)]
pub struct InMemoryReader {
    tables: Arc<Tables>,
}

#[derive(Debug)]
pub struct InMemoryTx {
    tables: Tables,
    committed: Arc<RwLock<Arc<Tables>>>,
    _writer: OwnedMutexGuard<()>,
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Reader = InMemoryReader;
    type Tx = InMemoryTx;

    async fn reader(&self) -> LedgerResult<InMemoryReader> {
        Ok(InMemoryReader {
            tables: self.snapshot()?,
        })
    }

    async fn begin(&self) -> LedgerResult<InMemoryTx> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let tables = Tables::clone(&*self.snapshot()?);
        Ok(InMemoryTx {
            tables,
            committed: Arc::clone(&self.committed),
            _writer: guard,
        })
    }

    async fn begin_maintenance(&self) -> LedgerResult<InMemoryTx> {
        self.begin().await
    }
}

macro_rules! impl_tables_read {
    ($t:ty) => {
        #[async_trait]
        impl LedgerRead for $t {
            async fn location(&mut self, id: LocationId) -> LedgerResult<Option<Location>> {
                Ok(self.tables.locations.get(&id).cloned())
            }

            async fn locations(&mut self) -> LedgerResult<Vec<Location>> {
                let mut all: Vec<Location> = self.tables.locations.values().cloned().collect();
                all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
                Ok(all)
            }

            async fn find_retail_location(&mut self, customer_key: &str) -> LedgerResult<Option<Location>> {
                Ok(self
                    .tables
                    .locations
                    .values()
                    .find(|l| l.kind == LocationKind::Retail && l.match_key() == customer_key)
                    .cloned())
            }

            async fn location_in_use(&mut self, id: LocationId) -> LedgerResult<bool> {
                Ok(self.tables.movements.values().any(|m| m.touches(id)))
            }

            async fn movement(&mut self, id: MovementId) -> LedgerResult<Option<Movement>> {
                Ok(self.tables.movements.get(&id).map(|m| Movement::clone(m)))
            }

            async fn movements(&mut self, filter: &MovementFilter) -> LedgerResult<Vec<Movement>> {
                Ok(self
                    .tables
                    .ordered_movements()
                    .into_iter()
                    .filter(|m| filter.matches(m))
                    .cloned()
                    .collect())
            }

            async fn returns_for(&mut self, sale: MovementId) -> LedgerResult<Vec<Movement>> {
                Ok(self
                    .tables
                    .ordered_movements()
                    .into_iter()
                    .filter(|m| m.return_of == Some(sale))
                    .cloned()
                    .collect())
            }

            async fn balance(&mut self, sku: &str, location: LocationId) -> LedgerResult<i64> {
                scan_balance(self.tables.movements.values().map(Arc::as_ref), sku, location)
            }

            async fn balances(&mut self, location: LocationId) -> LedgerResult<BTreeMap<String, i64>> {
                let touching = self
                    .tables
                    .movements
                    .values()
                    .map(Arc::as_ref)
                    .filter(|m| m.touches(location));
                Ok(Balances::replay(touching)?.at(location))
            }

            async fn all_balances(&mut self) -> LedgerResult<BTreeMap<StockKey, i64>> {
                let balances = Balances::replay(self.tables.movements.values().map(Arc::as_ref))?;
                Ok(balances.iter().map(|(k, v)| (k.clone(), v)).collect())
            }

            async fn series(&mut self) -> LedgerResult<Vec<DocumentSeries>> {
                Ok(self.tables.series.values().cloned().collect())
            }

            async fn price_rules(&mut self) -> LedgerResult<Vec<PriceRule>> {
                Ok(self.tables.rules.values().cloned().collect())
            }
        }
    };
}

impl_tables_read!(InMemoryReader);
impl_tables_read!(InMemoryTx);

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn lock_stock(&mut self, _keys: &[StockKey]) -> LedgerResult<()> {
        // The writer guard already excludes every other transaction.
        Ok(())
    }

    async fn lock_series(&mut self, scope: SeriesScope) -> LedgerResult<Vec<DocumentSeries>> {
        Ok(self
            .tables
            .series
            .values()
            .filter(|s| s.scope == scope)
            .cloned()
            .collect())
    }

    async fn save_series(&mut self, series: &DocumentSeries) -> LedgerResult<()> {
        self.tables.series.insert(series.code.clone(), series.clone());
        Ok(())
    }

    async fn delete_series(&mut self, code: &str) -> LedgerResult<bool> {
        Ok(self.tables.series.remove(code).is_some())
    }

    async fn insert_location(&mut self, location: &Location) -> LedgerResult<()> {
        if self.tables.locations.contains_key(&location.id) {
            return Err(LedgerError::conflict(format!("location {} already exists", location.id)));
        }
        self.tables.locations.insert(location.id, location.clone());
        Ok(())
    }

    async fn update_location(&mut self, location: &Location) -> LedgerResult<()> {
        match self.tables.locations.get_mut(&location.id) {
            Some(existing) => {
                *existing = location.clone();
                Ok(())
            }
            None => Err(LedgerError::not_found(format!("location {}", location.id))),
        }
    }

    async fn delete_location(&mut self, id: LocationId) -> LedgerResult<bool> {
        if self.tables.movements.values().any(|m| m.touches(id)) {
            return Err(LedgerError::conflict(format!("location {id} is referenced by movements")));
        }
        Ok(self.tables.locations.remove(&id).is_some())
    }

    async fn insert_movement(&mut self, movement: &Movement) -> LedgerResult<()> {
        for id in [movement.from, movement.to].into_iter().flatten() {
            if !self.tables.locations.contains_key(&id) {
                return Err(LedgerError::UnknownLocation(id));
            }
        }
        if self.tables.movements.contains_key(&movement.id) {
            return Err(LedgerError::conflict(format!("movement {} already exists", movement.id)));
        }
        self.tables.movements.insert(movement.id, Arc::new(movement.clone()));
        Ok(())
    }

    async fn update_movement_header(&mut self, movement: &Movement) -> LedgerResult<()> {
        let stored = self
            .tables
            .movements
            .get_mut(&movement.id)
            .ok_or_else(|| LedgerError::not_found(format!("movement {}", movement.id)))?;
        let stored = Arc::make_mut(stored);
        stored.reference = movement.reference.clone();
        stored.notes = movement.notes.clone();
        stored.date = movement.date;
        stored.payment = movement.payment;
        Ok(())
    }

    async fn insert_price_rule(&mut self, rule: &PriceRule) -> LedgerResult<()> {
        if self.tables.rules.contains_key(&rule.id) {
            return Err(LedgerError::conflict(format!("price rule {} already exists", rule.id)));
        }
        self.tables.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn update_price_rule(&mut self, rule: &PriceRule) -> LedgerResult<()> {
        match self.tables.rules.get_mut(&rule.id) {
            Some(existing) => {
                *existing = rule.clone();
                Ok(())
            }
            None => Err(LedgerError::not_found(format!("price rule {}", rule.id))),
        }
    }

    async fn delete_price_rule(&mut self, id: PriceRuleId) -> LedgerResult<bool> {
        Ok(self.tables.rules.remove(&id).is_some())
    }

    async fn purge_movements(&mut self, filter: &PurgeFilter) -> LedgerResult<u64> {
        let before = self.tables.movements.len();
        self.tables.movements.retain(|_, m| !filter.matches(m));
        Ok((before - self.tables.movements.len()) as u64)
    }

    async fn commit(self) -> LedgerResult<()> {
        let mut committed = self
            .committed
            .write()
            .map_err(|_| LedgerError::store("lock poisoned"))?;
        *committed = Arc::new(self.tables);
        Ok(())
    }
}

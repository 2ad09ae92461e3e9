//! Stock balances derived from movement lines.
//!
//! balance(sku, location) = Σ qty into location − Σ qty out of location.
//! [`Balances`] is an in-memory fold of that sum; it can always be rebuilt
//! with [`Balances::replay`] and is never the source of truth.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockbook_core::{LedgerError, LedgerResult, LocationId};

use crate::movement::Movement;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub sku: String,
    pub location: LocationId,
}

impl StockKey {
    pub fn new(sku: impl Into<String>, location: LocationId) -> Self {
        Self {
            sku: sku.into(),
            location,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Balances {
    by_key: BTreeMap<StockKey, i64>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold every movement from an empty state.
    pub fn replay<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> LedgerResult<Self> {
        let mut balances = Self::new();
        for m in movements {
            balances.apply(m)?;
        }
        Ok(balances)
    }

    /// Apply one movement. All or nothing: on overflow nothing changes.
    pub fn apply(&mut self, movement: &Movement) -> LedgerResult<()> {
        let mut next: BTreeMap<StockKey, i64> = BTreeMap::new();
        for line in &movement.lines {
            let out = line.quantity.checked_neg();
            for (location, delta) in [(movement.from, out), (movement.to, Some(line.quantity))] {
                let Some(location) = location else { continue };
                let key = StockKey::new(line.sku.clone(), location);
                let current = next
                    .get(&key)
                    .copied()
                    .unwrap_or_else(|| self.get(&key.sku, key.location));
                let updated = delta
                    .and_then(|d| current.checked_add(d))
                    .ok_or_else(|| overflow(&key))?;
                next.insert(key, updated);
            }
        }
        for (key, value) in next {
            if value == 0 {
                self.by_key.remove(&key);
            } else {
                self.by_key.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn get(&self, sku: &str, location: LocationId) -> i64 {
        self.by_key
            .get(&StockKey::new(sku, location))
            .copied()
            .unwrap_or(0)
    }

    /// Non-zero balances at one location, by sku.
    pub fn at(&self, location: LocationId) -> BTreeMap<String, i64> {
        self.by_key
            .iter()
            .filter(|(k, _)| k.location == location)
            .map(|(k, v)| (k.sku.clone(), *v))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StockKey, i64)> {
        self.by_key.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Balance by direct scan of the history, without any intermediate state.
pub fn scan_balance<'a>(
    movements: impl IntoIterator<Item = &'a Movement>,
    sku: &str,
    location: LocationId,
) -> LedgerResult<i64> {
    movements
        .into_iter()
        .flat_map(|m| m.lines.iter().map(move |l| (m, l)))
        .filter(|(_, l)| l.sku == sku)
        .try_fold(0i64, |acc, (m, l)| {
            let mut next = Some(acc);
            if m.to == Some(location) {
                next = next.and_then(|v| v.checked_add(l.quantity));
            }
            if m.from == Some(location) {
                next = next.and_then(|v| v.checked_sub(l.quantity));
            }
            next.ok_or_else(|| overflow(&StockKey::new(sku, location)))
        })
}

/// Quantity a movement takes out of its source, per (sku, location).
pub fn outgoing(movement: &Movement) -> LedgerResult<BTreeMap<StockKey, i64>> {
    let mut demand: BTreeMap<StockKey, i64> = BTreeMap::new();
    if let Some(from) = movement.from {
        for line in &movement.lines {
            let key = StockKey::new(line.sku.clone(), from);
            let total = demand
                .get(&key)
                .copied()
                .unwrap_or(0)
                .checked_add(line.quantity)
                .ok_or_else(|| overflow(&key))?;
            demand.insert(key, total);
        }
    }
    Ok(demand)
}

fn overflow(key: &StockKey) -> LedgerError {
    LedgerError::validation(format!(
        "stock quantity for {} at {} is out of range",
        key.sku, key.location
    ))
}

/// A demand the current balance does not cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortfall {
    pub key: StockKey,
    pub available: i64,
    pub requested: i64,
}

/// Compare `demand` with `available`.
///
/// Without override the first shortfall is an `InsufficientStock` error. With
/// override the shortfalls are returned so the caller can log them.
pub fn check_sufficiency(
    demand: &BTreeMap<StockKey, i64>,
    available: impl Fn(&StockKey) -> i64,
    allow_negative_stock: bool,
) -> LedgerResult<Vec<Shortfall>> {
    let shortfalls: Vec<Shortfall> = demand
        .iter()
        .filter_map(|(key, &requested)| {
            let available = available(key);
            (requested > available).then(|| Shortfall {
                key: key.clone(),
                available,
                requested,
            })
        })
        .collect();

    match shortfalls.first() {
        Some(first) if !allow_negative_stock => Err(LedgerError::InsufficientStock {
            sku: first.key.sku.clone(),
            location: first.key.location,
            available: first.available,
            requested: first.requested,
        }),
        _ => Ok(shortfalls),
    }
}

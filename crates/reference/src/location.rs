use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockbook_core::{LedgerError, LedgerResult, LocationId};

/// What a location represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    /// Stock owned and held by the business.
    Warehouse,
    /// A customer holding consignment (deposit) stock.
    Retail,
}

impl LocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Warehouse => "warehouse",
            LocationKind::Retail => "retail",
        }
    }
}

impl FromStr for LocationKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warehouse" => Ok(LocationKind::Warehouse),
            "retail" => Ok(LocationKind::Retail),
            other => Err(LedgerError::validation(format!("unknown location type '{other}'"))),
        }
    }
}

/// A stock-holding endpoint of movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub kind: LocationKind,
    pub name: String,
    pub active: bool,
}

impl Location {
    pub fn new(kind: LocationKind, name: &str) -> LedgerResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("location name cannot be empty"));
        }
        Ok(Self {
            id: LocationId::new(),
            kind,
            name: name.to_string(),
            active: true,
        })
    }

    pub fn warehouse(name: &str) -> LedgerResult<Self> {
        Self::new(LocationKind::Warehouse, name)
    }

    /// A retail location standing for the customer called `name`.
    pub fn retail(name: &str) -> LedgerResult<Self> {
        Self::new(LocationKind::Retail, name)
    }

    pub fn is_warehouse(&self) -> bool {
        self.kind == LocationKind::Warehouse
    }

    pub fn is_retail(&self) -> bool {
        self.kind == LocationKind::Retail
    }

    /// Key used to match a retail location to a customer name.
    pub fn match_key(&self) -> String {
        customer_key(&self.name)
    }
}

/// Normalise a customer name for matching: trimmed, lowercased, inner
/// whitespace collapsed.
pub fn customer_key(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

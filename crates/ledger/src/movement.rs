use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{Channel, LedgerError, LocationId, Money, MovementId, MovementLineId};

use crate::payment::Payment;

/// Movement discriminant. Behaviour per type is described by [`TypeRules`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Purchase,
    B2bSale,
    B2cSale,
    B2bReturn,
    B2cReturn,
    Transfer,
    Adjustment,
}

/// Which location fields a movement type populates.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Endpoints {
    /// Stock enters the ledger (`to` only).
    ToOnly,
    /// Stock leaves the ledger (`from` only).
    FromOnly,
    /// Stock moves between two distinct locations.
    Both,
    /// Exactly one side: a count correction in or out.
    Either,
}

/// How line unit prices are handled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LinePricing {
    /// Missing prices are resolved by the Pricing Resolver.
    Resolved,
    /// Prices are optional and taken as given (purchase cost).
    Optional,
    /// No money changes hands; lines must not carry a price.
    None,
}

/// Validation table entry for one movement type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TypeRules {
    pub endpoints: Endpoints,
    pub channel: Option<Channel>,
    pub pricing: LinePricing,
    /// Carries a payment state.
    pub payable: bool,
    /// The `to` side must be a warehouse.
    pub receives_into_warehouse: bool,
}

impl MovementType {
    pub const ALL: [MovementType; 7] = [
        MovementType::Purchase,
        MovementType::B2bSale,
        MovementType::B2cSale,
        MovementType::B2bReturn,
        MovementType::B2cReturn,
        MovementType::Transfer,
        MovementType::Adjustment,
    ];

    pub const fn rules(self) -> TypeRules {
        use LinePricing as P;
        match self {
            MovementType::Purchase => TypeRules {
                endpoints: Endpoints::ToOnly,
                channel: None,
                pricing: P::Optional,
                payable: false,
                receives_into_warehouse: true,
            },
            MovementType::B2bSale => TypeRules {
                endpoints: Endpoints::FromOnly,
                channel: Some(Channel::B2B),
                pricing: P::Resolved,
                payable: true,
                receives_into_warehouse: false,
            },
            MovementType::B2cSale => TypeRules {
                endpoints: Endpoints::FromOnly,
                channel: Some(Channel::B2C),
                pricing: P::Resolved,
                payable: true,
                receives_into_warehouse: false,
            },
            MovementType::B2bReturn => TypeRules {
                endpoints: Endpoints::ToOnly,
                channel: Some(Channel::B2B),
                pricing: P::Resolved,
                payable: false,
                receives_into_warehouse: true,
            },
            MovementType::B2cReturn => TypeRules {
                endpoints: Endpoints::ToOnly,
                channel: Some(Channel::B2C),
                pricing: P::Resolved,
                payable: false,
                receives_into_warehouse: true,
            },
            MovementType::Transfer => TypeRules {
                endpoints: Endpoints::Both,
                channel: None,
                pricing: P::None,
                payable: false,
                receives_into_warehouse: false,
            },
            MovementType::Adjustment => TypeRules {
                endpoints: Endpoints::Either,
                channel: None,
                pricing: P::None,
                payable: false,
                receives_into_warehouse: false,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Purchase => "purchase",
            MovementType::B2bSale => "b2b_sale",
            MovementType::B2cSale => "b2c_sale",
            MovementType::B2bReturn => "b2b_return",
            MovementType::B2cReturn => "b2c_return",
            MovementType::Transfer => "transfer",
            MovementType::Adjustment => "adjustment",
        }
    }

    pub fn is_sale(self) -> bool {
        matches!(self, MovementType::B2bSale | MovementType::B2cSale)
    }

    pub fn is_return(self) -> bool {
        matches!(self, MovementType::B2bReturn | MovementType::B2cReturn)
    }

    pub fn sale_for(channel: Channel) -> Self {
        match channel {
            Channel::B2B => MovementType::B2bSale,
            Channel::B2C => MovementType::B2cSale,
        }
    }

    pub fn return_for(channel: Channel) -> Self {
        match channel {
            Channel::B2B => MovementType::B2bReturn,
            Channel::B2C => MovementType::B2cReturn,
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LedgerError::validation(format!("unknown movement type '{s}'")))
    }
}

/// Where a movement was captured.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Pos,
    Web,
    Import,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Pos => "pos",
            Origin::Web => "web",
            Origin::Import => "import",
        }
    }
}

impl FromStr for Origin {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pos" => Ok(Origin::Pos),
            "web" => Ok(Origin::Web),
            "import" => Ok(Origin::Import),
            other => Err(LedgerError::validation(format!("unknown origin '{other}'"))),
        }
    }
}

/// Accessory sold with a line. Counts toward money, not toward stock of the line's sku.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOn {
    pub accessory_id: String,
    pub price: Money,
    pub quantity: i64,
}

impl AddOn {
    pub fn total(&self) -> Money {
        self.price.times(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementLine {
    pub id: MovementLineId,
    pub sku: String,
    pub quantity: i64,
    pub unit_price: Option<Money>,
    /// Catalog cost at the time of the movement.
    pub unit_cost: Money,
    #[serde(default)]
    pub discount_bp: u32,
    #[serde(default)]
    pub addons: Vec<AddOn>,
}

impl MovementLine {
    /// `unit_price × (1 − discount) × quantity` plus add-ons.
    pub fn total(&self) -> Money {
        let own = self
            .unit_price
            .map(|p| p.extended(self.quantity, self.discount_bp))
            .unwrap_or(Money::ZERO);
        own + self.addons.iter().map(AddOn::total).sum::<Money>()
    }

    pub fn cost_total(&self) -> Money {
        self.unit_cost.times(self.quantity)
    }
}

/// A ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    #[serde(rename = "type")]
    pub kind: MovementType,
    pub channel: Option<Channel>,
    #[serde(default)]
    pub origin: Origin,
    pub date: DateTime<Utc>,
    pub from: Option<LocationId>,
    pub to: Option<LocationId>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub payment: Option<Payment>,
    /// For returns: the sale being returned against.
    pub return_of: Option<MovementId>,
    pub lines: Vec<MovementLine>,
}

impl Movement {
    pub fn total(&self) -> Money {
        self.lines.iter().map(MovementLine::total).sum()
    }

    pub fn cost_total(&self) -> Money {
        self.lines.iter().map(MovementLine::cost_total).sum()
    }

    pub fn units(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn touches(&self, location: LocationId) -> bool {
        self.from == Some(location) || self.to == Some(location)
    }

    /// Amount still owed on a sale; zero for everything else.
    pub fn outstanding(&self) -> Money {
        match &self.payment {
            Some(p) => self.total() - p.paid,
            None => Money::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: Option<i64>, qty: i64, discount_bp: u32) -> MovementLine {
        MovementLine {
            id: MovementLineId::new(),
            sku: "X".into(),
            quantity: qty,
            unit_price: price.map(Money::from_cents),
            unit_cost: Money::from_cents(100),
            discount_bp,
            addons: Vec::new(),
        }
    }

    #[test]
    fn line_total_includes_discount_and_addons() {
        let mut l = line(Some(1_000), 2, 1_000);
        l.addons.push(AddOn {
            accessory_id: "strap".into(),
            price: Money::from_cents(250),
            quantity: 2,
        });
        assert_eq!(l.total(), Money::from_cents(1_800 + 500));
        assert_eq!(l.cost_total(), Money::from_cents(200));
    }

    #[test]
    fn unpriced_lines_have_no_value() {
        assert_eq!(line(None, 5, 0).total(), Money::ZERO);
    }

    #[test]
    fn rules_table_is_consistent_with_type_families() {
        for t in MovementType::ALL {
            let rules = t.rules();
            assert_eq!(rules.payable, t.is_sale(), "{t}");
            if t.is_sale() || t.is_return() {
                assert!(rules.channel.is_some(), "{t}");
            } else {
                assert!(rules.channel.is_none(), "{t}");
            }
            assert_eq!(t.as_str().parse::<MovementType>().unwrap(), t);
        }
        assert_eq!(MovementType::Purchase.rules().endpoints, Endpoints::ToOnly);
        assert_eq!(MovementType::Transfer.rules().endpoints, Endpoints::Both);
        assert_eq!(MovementType::Adjustment.rules().pricing, LinePricing::None);
    }

    #[test]
    fn sale_and_return_types_follow_channel() {
        assert_eq!(MovementType::sale_for(Channel::B2B), MovementType::B2bSale);
        assert_eq!(MovementType::return_for(Channel::B2C), MovementType::B2cReturn);
    }
}

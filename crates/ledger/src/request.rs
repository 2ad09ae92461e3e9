use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockbook_core::{Channel, LocationId, Money, MovementId};

use crate::movement::{AddOn, Movement, MovementType, Origin};
use crate::payment::PaymentStatus;

/// Largest quantity a single line or add-on may carry.
pub const MAX_LINE_QUANTITY: i64 = i32::MAX as i64;

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub sku: String,
    pub quantity: i64,
    /// Resolved by the Pricing Resolver when omitted on sales and returns.
    #[serde(default)]
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub discount_bp: u32,
    #[serde(default)]
    pub addons: Vec<AddOn>,
}

impl LineRequest {
    pub fn new(sku: impl Into<String>, quantity: i64) -> Self {
        Self {
            sku: sku.into(),
            quantity,
            unit_price: None,
            discount_bp: 0,
            addons: Vec::new(),
        }
    }

    pub fn at(mut self, unit_price: Money) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn discounted(mut self, discount_bp: u32) -> Self {
        self.discount_bp = discount_bp;
        self
    }
}

/// Input of `record_movement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    #[serde(rename = "type")]
    pub kind: MovementType,
    /// Optional; when given it must match the type's channel.
    #[serde(default)]
    pub channel: Option<Channel>,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub from: Option<LocationId>,
    #[serde(default)]
    pub to: Option<LocationId>,
    pub lines: Vec<LineRequest>,
    /// Defaults to the time of recording.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    /// User-supplied reference; skips series allocation.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub paid_amount: Option<Money>,
    #[serde(default)]
    pub allow_negative_stock: bool,
    /// Set by the return workflow only.
    #[serde(skip)]
    pub return_of: Option<MovementId>,
}

impl MovementRequest {
    pub fn new(kind: MovementType, lines: Vec<LineRequest>) -> Self {
        Self {
            kind,
            channel: None,
            origin: Origin::Pos,
            from: None,
            to: None,
            lines,
            date: None,
            reference: None,
            notes: None,
            payment_status: None,
            paid_amount: None,
            allow_negative_stock: false,
            return_of: None,
        }
    }

    pub fn from(mut self, location: LocationId) -> Self {
        self.from = Some(location);
        self
    }

    pub fn to(mut self, location: LocationId) -> Self {
        self.to = Some(location);
        self
    }

    pub fn on(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn payment(mut self, status: PaymentStatus, paid: Option<Money>) -> Self {
        self.payment_status = Some(status);
        self.paid_amount = paid;
        self
    }

    pub fn allow_negative_stock(mut self) -> Self {
        self.allow_negative_stock = true;
        self
    }
}

/// Input of `record_return`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub warehouse: LocationId,
    pub lines: Vec<LineRequest>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Header-only correction of a recorded movement. Lines are immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendMovement {
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl AmendMovement {
    pub fn is_empty(&self) -> bool {
        self.reference.is_none() && self.notes.is_none() && self.date.is_none()
    }
}

/// Read-side movement selection. `since` is inclusive, `until` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, rename = "type")]
    pub kind: Option<MovementType>,
    #[serde(default)]
    pub location: Option<LocationId>,
    #[serde(default)]
    pub sku: Option<String>,
}

impl MovementFilter {
    pub fn matches(&self, m: &Movement) -> bool {
        self.since.is_none_or(|since| m.date >= since)
            && self.until.is_none_or(|until| m.date < until)
            && self.kind.is_none_or(|k| m.kind == k)
            && self.location.is_none_or(|l| m.touches(l))
            && self
                .sku
                .as_deref()
                .is_none_or(|sku| m.lines.iter().any(|line| line.sku == sku))
    }
}

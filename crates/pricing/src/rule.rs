use serde::{Deserialize, Serialize};

use stockbook_core::{
    BASIS_POINTS, CategoryId, Channel, LedgerError, LedgerResult, Money, PriceRuleId, SupplierId,
};
use stockbook_reference::ProductRef;

/// Tariff a rule applies to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleTarget {
    /// Public tariff, used for B2C quotes.
    Public,
    B2b,
}

impl RuleTarget {
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::B2B => RuleTarget::B2b,
            Channel::B2C => RuleTarget::Public,
        }
    }

    pub fn channel(self) -> Channel {
        match self {
            RuleTarget::Public => Channel::B2C,
            RuleTarget::B2b => Channel::B2B,
        }
    }
}

/// Which products a rule covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleScope {
    All,
    Category { category_id: CategoryId },
    Supplier { supplier_id: SupplierId },
}

impl RuleScope {
    pub fn matches(&self, product: &ProductRef) -> bool {
        match self {
            RuleScope::All => true,
            RuleScope::Category { category_id } => product.category_id == Some(*category_id),
            RuleScope::Supplier { supplier_id } => product.supplier_id == Some(*supplier_id),
        }
    }

    /// Tie-break rank between rules of equal priority: higher wins.
    pub fn specificity(&self) -> u8 {
        match self {
            RuleScope::All => 0,
            RuleScope::Category { .. } => 1,
            RuleScope::Supplier { .. } => 2,
        }
    }
}

/// How a rule transforms the base price.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RuleKind {
    /// Discount in basis points (2000 = 20% off).
    Percent(u32),
    /// Replaces the base price.
    Fixed(Money),
}

impl RuleKind {
    pub fn apply(&self, base: Money) -> Money {
        match *self {
            RuleKind::Percent(bp) => base.percent_off(bp),
            RuleKind::Fixed(price) => price,
        }
    }

    fn validate(&self) -> LedgerResult<()> {
        match *self {
            RuleKind::Percent(bp) if i64::from(bp) > BASIS_POINTS => Err(LedgerError::validation(
                format!("percent rule value {bp} exceeds {BASIS_POINTS} basis points"),
            )),
            RuleKind::Fixed(price) if price.is_negative() => Err(LedgerError::validation(
                "fixed rule price cannot be negative",
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRule {
    pub id: PriceRuleId,
    pub name: String,
    pub target: RuleTarget,
    pub scope: RuleScope,
    pub kind: RuleKind,
    /// Higher value takes precedence.
    pub priority: i32,
    pub active: bool,
}

impl PriceRule {
    pub fn new(
        name: &str,
        target: RuleTarget,
        scope: RuleScope,
        kind: RuleKind,
        priority: i32,
    ) -> LedgerResult<Self> {
        let rule = Self {
            id: PriceRuleId::new(),
            name: name.trim().to_string(),
            target,
            scope,
            kind,
            priority,
            active: true,
        };
        rule.validate()?;
        Ok(rule)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("price rule name cannot be empty"));
        }
        self.kind.validate()
    }

    /// Active, aimed at `channel`, and covering `product`.
    pub fn applies_to(&self, channel: Channel, product: &ProductRef) -> bool {
        self.active && self.target == RuleTarget::for_channel(channel) && self.scope.matches(product)
    }

    /// Apply a patch and re-validate; on error `self` is left untouched.
    pub fn patched(&self, patch: &PriceRulePatch) -> LedgerResult<Self> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = name.trim().to_string();
        }
        if let Some(target) = patch.target {
            next.target = target;
        }
        if let Some(scope) = patch.scope {
            next.scope = scope;
        }
        if let Some(kind) = patch.kind {
            next.kind = kind;
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(active) = patch.active {
            next.active = active;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial update of a rule. Absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRulePatch {
    pub name: Option<String>,
    pub target: Option<RuleTarget>,
    pub scope: Option<RuleScope>,
    pub kind: Option<RuleKind>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_above_whole_is_rejected() {
        let err = PriceRule::new("too much", RuleTarget::Public, RuleScope::All, RuleKind::Percent(10_001), 0)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn negative_fixed_price_is_rejected() {
        let err = PriceRule::new(
            "negative",
            RuleTarget::B2b,
            RuleScope::All,
            RuleKind::Fixed(Money::from_cents(-1)),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn patch_is_validated_before_applying() {
        let rule = PriceRule::new("ten", RuleTarget::Public, RuleScope::All, RuleKind::Percent(1_000), 0)
            .unwrap();
        let bad = PriceRulePatch {
            kind: Some(RuleKind::Percent(20_000)),
            ..Default::default()
        };
        assert!(rule.patched(&bad).is_err());

        let ok = PriceRulePatch {
            priority: Some(5),
            active: Some(false),
            ..Default::default()
        };
        let next = rule.patched(&ok).unwrap();
        assert_eq!(next.priority, 5);
        assert!(!next.active);
        assert_eq!(next.id, rule.id);
    }

    #[test]
    fn wire_format_is_tagged() {
        let json = serde_json::to_value(RuleKind::Percent(2_000)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "percent", "value": 2000}));
        let scope: RuleScope = serde_json::from_value(serde_json::json!({"type": "all"})).unwrap();
        assert_eq!(scope, RuleScope::All);
    }
}

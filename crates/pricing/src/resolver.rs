use core::cmp::Reverse;

use serde::{Deserialize, Serialize};

use stockbook_core::{Channel, LedgerError, LedgerResult, Money, PriceRuleId};
use stockbook_reference::{Catalog, ProductRef};

use crate::rule::PriceRule;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub id: PriceRuleId,
    pub name: String,
}

/// Result of resolving a unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub sku: String,
    pub channel: Channel,
    /// Catalog base price for the channel.
    pub base: Money,
    pub price: Money,
    pub applied_rule: Option<AppliedRule>,
}

/// Pick the winning rule for `product` on `channel`.
///
/// Order: highest `priority`, then most specific scope (supplier, category,
/// all), then lowest rule id.
pub fn select_rule<'a>(
    rules: &'a [PriceRule],
    channel: Channel,
    product: &ProductRef,
) -> Option<&'a PriceRule> {
    rules
        .iter()
        .filter(|r| r.applies_to(channel, product))
        .max_by_key(|r| (r.priority, r.scope.specificity(), Reverse(r.id)))
}

pub fn quote(product: &ProductRef, channel: Channel, rules: &[PriceRule]) -> Quote {
    let base = product.base_price(channel);
    let (price, applied_rule) = match select_rule(rules, channel, product) {
        Some(rule) => (
            rule.kind.apply(base),
            Some(AppliedRule {
                id: rule.id,
                name: rule.name.clone(),
            }),
        ),
        None => (base, None),
    };
    Quote {
        sku: product.sku.clone(),
        channel,
        base,
        price,
        applied_rule,
    }
}

/// Look `sku` up in the catalog and quote it.
pub fn quote_sku<C: Catalog + ?Sized>(
    catalog: &C,
    sku: &str,
    channel: Channel,
    rules: &[PriceRule],
) -> LedgerResult<Quote> {
    let product = catalog
        .product(sku)
        .ok_or_else(|| LedgerError::UnknownSku(sku.to_string()))?;
    Ok(quote(&product, channel, rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleKind, RuleScope, RuleTarget};
    use stockbook_core::{CategoryId, SupplierId};
    use stockbook_reference::InMemoryCatalog;

    fn product(category: Option<CategoryId>, supplier: Option<SupplierId>) -> ProductRef {
        ProductRef {
            sku: "X".into(),
            name: "Widget".into(),
            base_price_b2c: Money::from_cents(10_000),
            base_price_b2b: Money::from_cents(8_000),
            cost: Money::from_cents(5_000),
            category_id: category,
            supplier_id: supplier,
            active: true,
        }
    }

    fn rule(target: RuleTarget, scope: RuleScope, kind: RuleKind, priority: i32) -> PriceRule {
        PriceRule::new("rule", target, scope, kind, priority).unwrap()
    }

    #[test]
    fn no_rule_quotes_base_price() {
        let q = quote(&product(None, None), Channel::B2B, &[]);
        assert_eq!(q.base, Money::from_cents(8_000));
        assert_eq!(q.price, q.base);
        assert!(q.applied_rule.is_none());
    }

    #[test]
    fn category_rule_beats_global_rule_at_equal_priority() {
        let cat = CategoryId::new();
        let all = rule(RuleTarget::Public, RuleScope::All, RuleKind::Percent(1_000), 0);
        let category = rule(
            RuleTarget::Public,
            RuleScope::Category { category_id: cat },
            RuleKind::Percent(2_000),
            0,
        );
        let q = quote(&product(Some(cat), None), Channel::B2C, &[all, category.clone()]);
        assert_eq!(q.price, Money::from_cents(8_000));
        assert_eq!(q.applied_rule.unwrap().id, category.id);
    }

    #[test]
    fn priority_outranks_specificity() {
        let sup = SupplierId::new();
        let all = rule(RuleTarget::Public, RuleScope::All, RuleKind::Percent(500), 10);
        let supplier = rule(
            RuleTarget::Public,
            RuleScope::Supplier { supplier_id: sup },
            RuleKind::Percent(3_000),
            1,
        );
        let q = quote(&product(None, Some(sup)), Channel::B2C, &[supplier, all.clone()]);
        assert_eq!(q.applied_rule.unwrap().id, all.id);
        assert_eq!(q.price, Money::from_cents(9_500));
    }

    #[test]
    fn rules_for_other_channel_or_category_are_ignored() {
        let b2b_only = rule(RuleTarget::B2b, RuleScope::All, RuleKind::Fixed(Money::from_cents(1)), 0);
        let other_cat = rule(
            RuleTarget::Public,
            RuleScope::Category { category_id: CategoryId::new() },
            RuleKind::Percent(5_000),
            0,
        );
        let mut inactive = rule(RuleTarget::Public, RuleScope::All, RuleKind::Percent(9_000), 99);
        inactive.active = false;
        let q = quote(&product(None, None), Channel::B2C, &[b2b_only, other_cat, inactive]);
        assert_eq!(q.price, Money::from_cents(10_000));
        assert!(q.applied_rule.is_none());
    }

    #[test]
    fn fixed_rule_replaces_base() {
        let fixed = rule(RuleTarget::B2b, RuleScope::All, RuleKind::Fixed(Money::from_cents(4_321)), 0);
        let q = quote(&product(None, None), Channel::B2B, &[fixed]);
        assert_eq!(q.price, Money::from_cents(4_321));
    }

    #[test]
    fn equal_rules_resolve_to_lowest_id() {
        let a = rule(RuleTarget::Public, RuleScope::All, RuleKind::Percent(1_000), 0);
        let b = rule(RuleTarget::Public, RuleScope::All, RuleKind::Percent(2_000), 0);
        let expected = a.id.min(b.id);
        let p = product(None, None);
        assert_eq!(select_rule(&[a.clone(), b.clone()], Channel::B2C, &p).unwrap().id, expected);
        assert_eq!(select_rule(&[b, a], Channel::B2C, &p).unwrap().id, expected);
    }

    #[test]
    fn unknown_sku_is_reported() {
        let catalog = InMemoryCatalog::new();
        let err = quote_sku(&catalog, "NOPE", Channel::B2C, &[]).unwrap_err();
        assert_eq!(err, LedgerError::UnknownSku("NOPE".into()));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_rule(cat: CategoryId, sup: SupplierId) -> impl Strategy<Value = PriceRule> {
            (
                prop_oneof![Just(RuleTarget::Public), Just(RuleTarget::B2b)],
                prop_oneof![
                    Just(RuleScope::All),
                    Just(RuleScope::Category { category_id: cat }),
                    Just(RuleScope::Supplier { supplier_id: sup }),
                ],
                prop_oneof![
                    (0u32..=10_000).prop_map(RuleKind::Percent),
                    (0i64..1_000_000).prop_map(|c| RuleKind::Fixed(Money::from_cents(c))),
                ],
                -5i32..5,
                any::<bool>(),
            )
                .prop_map(|(target, scope, kind, priority, active)| {
                    let mut r = PriceRule::new("generated", target, scope, kind, priority).unwrap();
                    r.active = active;
                    r
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 128, ..ProptestConfig::default() })]

            /// Property: the chosen rule does not depend on the order rules are listed in.
            #[test]
            fn resolution_is_order_independent(
                rules in proptest::collection::vec(arb_rule(CategoryId::new(), SupplierId::new()), 0..12),
                b2b in any::<bool>(),
            ) {
                let channel = if b2b { Channel::B2B } else { Channel::B2C };
                let p = product(None, None);
                let forward = quote(&p, channel, &rules);
                let mut reversed = rules.clone();
                reversed.reverse();
                prop_assert_eq!(forward, quote(&p, channel, &reversed));
            }

            /// Property: percent rules never raise the price above base.
            #[test]
            fn percent_rules_never_exceed_base(bp in 0u32..=10_000, base in 0i64..10_000_000) {
                let mut p = product(None, None);
                p.base_price_b2c = Money::from_cents(base);
                let r = rule(RuleTarget::Public, RuleScope::All, RuleKind::Percent(bp), 0);
                let q = quote(&p, Channel::B2C, &[r]);
                prop_assert!(q.price <= q.base);
                prop_assert!(q.price >= Money::ZERO);
            }
        }
    }
}

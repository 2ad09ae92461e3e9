//! Pricing Resolver.
//!
//! Pure and side-effect free: callers pass the current rule set on every
//! quote, so there is nothing to invalidate when administrators edit rules.

pub mod resolver;
pub mod rule;

pub use resolver::{AppliedRule, Quote, quote, quote_sku, select_rule};
pub use rule::{PriceRule, PriceRulePatch, RuleKind, RuleScope, RuleTarget};

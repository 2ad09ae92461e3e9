//! Request validation: turns a [`MovementRequest`] into a movement ready to be
//! written, or the first reason it cannot be.
//!
//! Stock sufficiency and return caps depend on ledger state and are checked
//! by the caller inside its transaction.

use chrono::{DateTime, Utc};

use stockbook_core::{BASIS_POINTS, Channel, LedgerError, LedgerResult, LocationId, Money, MovementId, MovementLineId};
use stockbook_pricing::{PriceRule, quote};
use stockbook_reference::{Catalog, Location, LocationKind};
use stockbook_series::SeriesScope;

use crate::movement::{Endpoints, LinePricing, Movement, MovementLine, MovementType, Origin};
use crate::payment::{Payment, PaymentStatus};
use crate::request::{LineRequest, MAX_LINE_QUANTITY, MovementRequest};

/// State a request is validated against.
pub struct PrepareContext<'a> {
    pub catalog: &'a dyn Catalog,
    pub rules: &'a [PriceRule],
    /// The locations named by the request, as found in the registry.
    pub from: Option<&'a Location>,
    pub to: Option<&'a Location>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedMovement {
    /// Movement with `reference` unset unless the caller supplied one.
    pub movement: Movement,
    /// Scope to allocate a reference from; `None` when not numbered or
    /// when a reference was supplied.
    pub series_scope: Option<SeriesScope>,
}

pub fn prepare_movement(req: &MovementRequest, ctx: &PrepareContext<'_>) -> LedgerResult<PreparedMovement> {
    let rules = req.kind.rules();

    let channel = match (rules.channel, req.channel) {
        (Some(expected), Some(given)) if expected != given => {
            return Err(LedgerError::validation(format!(
                "{} movements use channel {expected}, not {given}",
                req.kind
            )));
        }
        (None, Some(_)) => {
            return Err(LedgerError::validation(format!(
                "{} movements do not take a channel",
                req.kind
            )));
        }
        (expected, _) => expected,
    };

    check_endpoints(req.kind, rules.endpoints, req.from, req.to)?;
    resolve_location(req.from, ctx.from)?;
    let to = resolve_location(req.to, ctx.to)?;
    if rules.receives_into_warehouse {
        if let Some(to) = to.filter(|l| l.kind != LocationKind::Warehouse) {
            return Err(LedgerError::location_pair(format!(
                "{} must be received into a warehouse, {} is {}",
                req.kind,
                to.name,
                to.kind.as_str()
            )));
        }
    }

    if req.return_of.is_some() && !req.kind.is_return() {
        return Err(LedgerError::validation("only returns can reference a sale"));
    }

    if req.lines.is_empty() {
        return Err(LedgerError::validation("a movement needs at least one line"));
    }
    let lines = req
        .lines
        .iter()
        .map(|line| prepare_line(req.kind, rules.pricing, channel, line, ctx))
        .collect::<LedgerResult<Vec<_>>>()?;

    let mut movement = Movement {
        id: MovementId::new(),
        kind: req.kind,
        channel,
        origin: req.origin,
        date: req.date.unwrap_or(ctx.now),
        from: req.from,
        to: req.to,
        reference: None,
        notes: req.notes.clone().filter(|n| !n.trim().is_empty()),
        payment: None,
        return_of: req.return_of,
        lines,
    };

    match channel.filter(|_| rules.payable) {
        Some(channel) => {
            let status = req
                .payment_status
                .unwrap_or_else(|| PaymentStatus::default_for(channel));
            movement.payment = Some(Payment::resolve(status, req.paid_amount, movement.total())?);
        }
        None if req.payment_status.is_some() || req.paid_amount.is_some() => {
            return Err(LedgerError::validation(format!(
                "{} movements do not carry a payment",
                req.kind
            )));
        }
        None => {}
    }

    let supplied = req
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    let series_scope = match supplied {
        Some(reference) => {
            movement.reference = Some(reference.to_string());
            None
        }
        None => series_scope_for(req.kind, req.origin, to.map(|l| l.kind)),
    };

    Ok(PreparedMovement {
        movement,
        series_scope,
    })
}

/// The numbering scope of a movement, if it is numbered at all.
///
/// Web-origin retail sales have their own series; a transfer into a customer
/// location is a deposit.
pub fn series_scope_for(kind: MovementType, origin: Origin, to: Option<LocationKind>) -> Option<SeriesScope> {
    match kind {
        MovementType::B2cSale if origin == Origin::Web => Some(SeriesScope::Web),
        MovementType::B2cSale => Some(SeriesScope::SaleB2c),
        MovementType::B2bSale => Some(SeriesScope::SaleB2b),
        MovementType::B2bReturn | MovementType::B2cReturn => Some(SeriesScope::Return),
        MovementType::Transfer if to == Some(LocationKind::Retail) => Some(SeriesScope::Deposit),
        MovementType::Transfer | MovementType::Purchase | MovementType::Adjustment => None,
    }
}

fn check_endpoints(
    kind: MovementType,
    endpoints: Endpoints,
    from: Option<LocationId>,
    to: Option<LocationId>,
) -> LedgerResult<()> {
    let ok = match endpoints {
        Endpoints::ToOnly => from.is_none() && to.is_some(),
        Endpoints::FromOnly => from.is_some() && to.is_none(),
        Endpoints::Both => from.is_some() && to.is_some(),
        Endpoints::Either => from.is_some() != to.is_some(),
    };
    if !ok {
        let expected = match endpoints {
            Endpoints::ToOnly => "a destination only",
            Endpoints::FromOnly => "a source only",
            Endpoints::Both => "both a source and a destination",
            Endpoints::Either => "exactly one of source or destination",
        };
        return Err(LedgerError::location_pair(format!("{kind} requires {expected}")));
    }
    if from.is_some() && from == to {
        return Err(LedgerError::location_pair(format!(
            "{kind} source and destination must differ"
        )));
    }
    Ok(())
}

fn resolve_location<'a>(id: Option<LocationId>, found: Option<&'a Location>) -> LedgerResult<Option<&'a Location>> {
    let Some(id) = id else {
        return Ok(None);
    };
    match found {
        Some(loc) if loc.id == id && loc.active => Ok(Some(loc)),
        _ => Err(LedgerError::UnknownLocation(id)),
    }
}

fn prepare_line(
    kind: MovementType,
    pricing: LinePricing,
    channel: Option<Channel>,
    line: &LineRequest,
    ctx: &PrepareContext<'_>,
) -> LedgerResult<MovementLine> {
    let sku = line.sku.trim();
    if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity) {
        return Err(LedgerError::validation(format!(
            "quantity for {sku} must be between 1 and {MAX_LINE_QUANTITY}, got {}",
            line.quantity
        )));
    }
    if i64::from(line.discount_bp) > BASIS_POINTS {
        return Err(LedgerError::validation(format!(
            "discount for {sku} exceeds 100%"
        )));
    }
    for addon in &line.addons {
        if !(1..=MAX_LINE_QUANTITY).contains(&addon.quantity) || addon.price.is_negative() {
            return Err(LedgerError::validation(format!(
                "add-on {} on {sku} needs a positive quantity and a non-negative price",
                addon.accessory_id
            )));
        }
    }
    if line.unit_price.is_some_and(Money::is_negative) {
        return Err(LedgerError::validation(format!("unit price for {sku} cannot be negative")));
    }

    let product = ctx
        .catalog
        .product(sku)
        .ok_or_else(|| LedgerError::UnknownSku(sku.to_string()))?;
    if kind.is_sale() && !product.can_be_sold() {
        return Err(LedgerError::validation(format!("{sku} is archived and cannot be sold")));
    }

    let unit_price = match (pricing, channel) {
        (LinePricing::Resolved, Some(channel)) => Some(
            line.unit_price
                .unwrap_or_else(|| quote(&product, channel, ctx.rules).price),
        ),
        (LinePricing::Resolved, None) | (LinePricing::Optional, _) => line.unit_price,
        (LinePricing::None, _) => {
            if line.unit_price.is_some() || line.discount_bp != 0 || !line.addons.is_empty() {
                return Err(LedgerError::validation(format!(
                    "{kind} lines carry no price, discount or add-ons"
                )));
            }
            None
        }
    };

    let unit_cost = match (kind, unit_price) {
        (MovementType::Purchase, Some(price)) => price,
        _ => product.cost,
    };

    Ok(MovementLine {
        id: MovementLineId::new(),
        sku: product.sku,
        quantity: line.quantity,
        unit_price,
        unit_cost,
        discount_bp: line.discount_bp,
        addons: line.addons.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockbook_pricing::{RuleKind, RuleScope, RuleTarget};
    use stockbook_reference::{InMemoryCatalog, ProductRef};

    struct Fixture {
        catalog: InMemoryCatalog,
        warehouse: Location,
        shop: Location,
        customer: Location,
        rules: Vec<PriceRule>,
    }

    impl Fixture {
        fn new() -> Self {
            let catalog = InMemoryCatalog::with_products([ProductRef {
                sku: "X".into(),
                name: "Widget".into(),
                base_price_b2c: Money::from_cents(5_000),
                base_price_b2b: Money::from_cents(2_500),
                cost: Money::from_cents(1_000),
                category_id: None,
                supplier_id: None,
                active: true,
            }]);
            Self {
                catalog,
                warehouse: Location::warehouse("Main").unwrap(),
                shop: Location::warehouse("Shop").unwrap(),
                customer: Location::retail("Bar Central").unwrap(),
                rules: Vec::new(),
            }
        }

        fn prepare(&self, req: &MovementRequest) -> LedgerResult<PreparedMovement> {
            let find = |id: Option<LocationId>| {
                id.and_then(|id| {
                    [&self.warehouse, &self.shop, &self.customer]
                        .into_iter()
                        .find(|l| l.id == id)
                })
            };
            let ctx = PrepareContext {
                catalog: &self.catalog,
                rules: &self.rules,
                from: find(req.from),
                to: find(req.to),
                now: Utc::now(),
            };
            prepare_movement(req, &ctx)
        }
    }

    #[test]
    fn purchase_takes_destination_only() {
        let f = Fixture::new();
        let bad = MovementRequest::new(MovementType::Purchase, vec![LineRequest::new("X", 1)])
            .from(f.warehouse.id)
            .to(f.shop.id);
        assert!(matches!(f.prepare(&bad), Err(LedgerError::InvalidLocationPair(_))));

        let ok = MovementRequest::new(MovementType::Purchase, vec![LineRequest::new("X", 1).at(Money::from_cents(900))])
            .to(f.warehouse.id);
        let prepared = f.prepare(&ok).unwrap();
        assert_eq!(prepared.movement.lines[0].unit_cost, Money::from_cents(900));
        assert!(prepared.series_scope.is_none());
        assert!(prepared.movement.payment.is_none());
    }

    #[test]
    fn transfer_endpoints_must_differ() {
        let f = Fixture::new();
        let req = MovementRequest::new(MovementType::Transfer, vec![LineRequest::new("X", 1)])
            .from(f.warehouse.id)
            .to(f.warehouse.id);
        assert!(matches!(f.prepare(&req), Err(LedgerError::InvalidLocationPair(_))));
    }

    #[test]
    fn adjustment_takes_exactly_one_side() {
        let f = Fixture::new();
        let none = MovementRequest::new(MovementType::Adjustment, vec![LineRequest::new("X", 1)]);
        assert!(matches!(f.prepare(&none), Err(LedgerError::InvalidLocationPair(_))));
        let out = MovementRequest::new(MovementType::Adjustment, vec![LineRequest::new("X", 1)]).from(f.shop.id);
        assert!(f.prepare(&out).is_ok());
    }

    #[test]
    fn unknown_sku_and_location_are_reported() {
        let f = Fixture::new();
        let req = MovementRequest::new(MovementType::B2cSale, vec![LineRequest::new("NOPE", 1)]).from(f.warehouse.id);
        assert_eq!(f.prepare(&req).unwrap_err(), LedgerError::UnknownSku("NOPE".into()));

        let ghost = LocationId::new();
        let req = MovementRequest::new(MovementType::B2cSale, vec![LineRequest::new("X", 1)]).from(ghost);
        assert_eq!(f.prepare(&req).unwrap_err(), LedgerError::UnknownLocation(ghost));
    }

    #[test]
    fn quantities_outside_the_line_bound_are_rejected() {
        let f = Fixture::new();
        for qty in [0, -3, MAX_LINE_QUANTITY + 1, i64::MAX] {
            let req = MovementRequest::new(MovementType::Purchase, vec![LineRequest::new("X", qty)]).to(f.warehouse.id);
            assert!(matches!(f.prepare(&req), Err(LedgerError::Validation(_))), "qty {qty}");
        }
        let max = MovementRequest::new(MovementType::Purchase, vec![LineRequest::new("X", MAX_LINE_QUANTITY)])
            .to(f.warehouse.id);
        assert!(f.prepare(&max).is_ok());
    }

    #[test]
    fn sale_prices_are_resolved_and_payment_defaults_by_channel() {
        let mut f = Fixture::new();
        f.rules.push(
            PriceRule::new("trade", RuleTarget::B2b, RuleScope::All, RuleKind::Percent(2_000), 0).unwrap(),
        );
        let b2b = MovementRequest::new(MovementType::B2bSale, vec![LineRequest::new("X", 2)]).from(f.warehouse.id);
        let prepared = f.prepare(&b2b).unwrap();
        let m = &prepared.movement;
        assert_eq!(m.channel, Some(Channel::B2B));
        assert_eq!(m.lines[0].unit_price, Some(Money::from_cents(2_000)));
        assert_eq!(m.total(), Money::from_cents(4_000));
        assert_eq!(m.payment.unwrap().status, PaymentStatus::Pending);
        assert_eq!(prepared.series_scope, Some(SeriesScope::SaleB2b));

        let b2c = MovementRequest::new(MovementType::B2cSale, vec![LineRequest::new("X", 1)]).from(f.warehouse.id);
        let m = f.prepare(&b2c).unwrap().movement;
        assert_eq!(m.payment.unwrap(), Payment { status: PaymentStatus::Paid, paid: Money::from_cents(5_000) });
    }

    #[test]
    fn mismatched_channel_is_rejected() {
        let f = Fixture::new();
        let mut req = MovementRequest::new(MovementType::B2cSale, vec![LineRequest::new("X", 1)]).from(f.warehouse.id);
        req.channel = Some(Channel::B2B);
        assert!(matches!(f.prepare(&req), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn web_sales_and_deposits_pick_their_series() {
        let f = Fixture::new();
        let web = MovementRequest::new(MovementType::B2cSale, vec![LineRequest::new("X", 1)])
            .from(f.warehouse.id)
            .origin(Origin::Web);
        assert_eq!(f.prepare(&web).unwrap().series_scope, Some(SeriesScope::Web));

        let deposit = MovementRequest::new(MovementType::Transfer, vec![LineRequest::new("X", 1)])
            .from(f.warehouse.id)
            .to(f.customer.id);
        assert_eq!(f.prepare(&deposit).unwrap().series_scope, Some(SeriesScope::Deposit));

        let internal = MovementRequest::new(MovementType::Transfer, vec![LineRequest::new("X", 1)])
            .from(f.warehouse.id)
            .to(f.shop.id);
        assert_eq!(f.prepare(&internal).unwrap().series_scope, None);
    }

    #[test]
    fn supplied_reference_skips_allocation() {
        let f = Fixture::new();
        let mut req = MovementRequest::new(MovementType::B2cSale, vec![LineRequest::new("X", 1)]).from(f.warehouse.id);
        req.reference = Some(" T-42 ".into());
        let prepared = f.prepare(&req).unwrap();
        assert_eq!(prepared.movement.reference.as_deref(), Some("T-42"));
        assert!(prepared.series_scope.is_none());
    }

    #[test]
    fn transfers_cannot_carry_prices_or_payment() {
        let f = Fixture::new();
        let priced = MovementRequest::new(MovementType::Transfer, vec![LineRequest::new("X", 1).at(Money::from_cents(1))])
            .from(f.warehouse.id)
            .to(f.shop.id);
        assert!(matches!(f.prepare(&priced), Err(LedgerError::Validation(_))));

        let paid = MovementRequest::new(MovementType::Transfer, vec![LineRequest::new("X", 1)])
            .from(f.warehouse.id)
            .to(f.shop.id)
            .payment(PaymentStatus::Paid, None);
        assert!(matches!(f.prepare(&paid), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn returns_land_in_warehouses_only() {
        let f = Fixture::new();
        let req = MovementRequest::new(MovementType::B2bReturn, vec![LineRequest::new("X", 1)]).to(f.customer.id);
        assert!(matches!(f.prepare(&req), Err(LedgerError::InvalidLocationPair(_))));
    }

    #[test]
    fn archived_products_cannot_be_sold_but_can_move() {
        let f = Fixture::new();
        let mut p = f.catalog.product("X").unwrap();
        p.active = false;
        f.catalog.upsert(p);
        let sale = MovementRequest::new(MovementType::B2cSale, vec![LineRequest::new("X", 1)]).from(f.warehouse.id);
        assert!(matches!(f.prepare(&sale), Err(LedgerError::Validation(_))));
        let transfer = MovementRequest::new(MovementType::Transfer, vec![LineRequest::new("X", 1)])
            .from(f.warehouse.id)
            .to(f.shop.id);
        assert!(f.prepare(&transfer).is_ok());
    }

    #[test]
    fn partial_payment_is_checked_against_computed_total() {
        let f = Fixture::new();
        let base = MovementRequest::new(MovementType::B2bSale, vec![LineRequest::new("X", 1).at(Money::from_cents(100))])
            .from(f.warehouse.id);
        for bad in [0, 100, 150] {
            let req = base.clone().payment(PaymentStatus::Partial, Some(Money::from_cents(bad)));
            assert!(matches!(f.prepare(&req), Err(LedgerError::InvalidPaymentAmount { .. })));
        }
        let req = base.payment(PaymentStatus::Partial, Some(Money::from_cents(40)));
        assert_eq!(f.prepare(&req).unwrap().movement.payment.unwrap().paid, Money::from_cents(40));
    }
}

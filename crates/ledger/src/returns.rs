//! Per-sale return caps.
//!
//! A return against a sale may bring back at most what that sale sold minus
//! what earlier returns against the same sale already brought back. Global
//! stock is irrelevant here.

use std::collections::BTreeMap;

use stockbook_core::{LedgerError, LedgerResult, Money};

use crate::movement::{Movement, MovementType};
use crate::request::{LineRequest, MovementRequest, ReturnRequest};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnCap {
    pub sold: i64,
    pub returned: i64,
}

impl ReturnCap {
    pub fn remaining(&self) -> i64 {
        self.sold - self.returned
    }
}

/// Sold and already-returned quantities per sku for `sale`.
///
/// Movements in `prior_returns` that do not reference `sale` are ignored.
pub fn return_caps(sale: &Movement, prior_returns: &[Movement]) -> BTreeMap<String, ReturnCap> {
    let mut caps: BTreeMap<String, ReturnCap> = BTreeMap::new();
    for line in &sale.lines {
        caps.entry(line.sku.clone()).or_default().sold += line.quantity;
    }
    for ret in prior_returns.iter().filter(|r| r.return_of == Some(sale.id)) {
        for line in &ret.lines {
            caps.entry(line.sku.clone()).or_default().returned += line.quantity;
        }
    }
    caps
}

/// Reject `lines` if any sku would exceed its cap.
pub fn check_return(sale: &Movement, prior_returns: &[Movement], lines: &[LineRequest]) -> LedgerResult<()> {
    let caps = return_caps(sale, prior_returns);
    let mut requested: BTreeMap<&str, i64> = BTreeMap::new();
    for line in lines {
        *requested.entry(line.sku.trim()).or_insert(0) += line.quantity;
    }
    for (sku, qty) in requested {
        let cap = caps.get(sku).copied().unwrap_or_default();
        if qty > cap.remaining() {
            return Err(LedgerError::ReturnExceedsSold {
                sku: sku.to_string(),
                sold: cap.sold,
                already_returned: cap.returned,
                requested: qty,
            });
        }
    }
    Ok(())
}

/// Build the return movement request for `sale`.
///
/// The return type follows the sale's channel. Lines without a price take
/// the price and discount the sku was sold at.
pub fn return_request(sale: &Movement, req: &ReturnRequest) -> LedgerResult<MovementRequest> {
    let channel = match (sale.kind.is_sale(), sale.channel) {
        (true, Some(channel)) => channel,
        _ => {
            return Err(LedgerError::validation(format!(
                "movement {} is a {}, only sales can be returned",
                sale.id, sale.kind
            )));
        }
    };

    let lines = req
        .lines
        .iter()
        .map(|line| {
            let mut line = line.clone();
            if line.unit_price.is_none() {
                if let Some(sold) = sale.lines.iter().find(|l| l.sku == line.sku.trim()) {
                    line.unit_price = sold.unit_price.or(Some(Money::ZERO));
                    line.discount_bp = sold.discount_bp;
                }
            }
            line
        })
        .collect();

    let mut request = MovementRequest::new(MovementType::return_for(channel), lines).to(req.warehouse);
    request.origin = sale.origin;
    request.date = req.date;
    request.reference = req.reference.clone();
    request.notes = req.notes.clone();
    request.return_of = Some(sale.id);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::{MovementLine, Origin};
    use chrono::Utc;
    use stockbook_core::{Channel, LocationId, MovementId, MovementLineId};

    fn sale(lines: &[(&str, i64, i64)]) -> Movement {
        Movement {
            id: MovementId::new(),
            kind: MovementType::B2bSale,
            channel: Some(Channel::B2B),
            origin: Origin::Pos,
            date: Utc::now(),
            from: Some(LocationId::new()),
            to: None,
            reference: Some("B2B-000001".into()),
            notes: None,
            payment: None,
            return_of: None,
            lines: lines
                .iter()
                .map(|(sku, qty, price)| MovementLine {
                    id: MovementLineId::new(),
                    sku: sku.to_string(),
                    quantity: *qty,
                    unit_price: Some(Money::from_cents(*price)),
                    unit_cost: Money::ZERO,
                    discount_bp: 500,
                    addons: Vec::new(),
                })
                .collect(),
        }
    }

    fn returned(sale: &Movement, qty: i64) -> Movement {
        let mut m = sale.clone();
        m.id = MovementId::new();
        m.kind = MovementType::B2bReturn;
        m.from = None;
        m.to = Some(LocationId::new());
        m.return_of = Some(sale.id);
        m.lines.truncate(1);
        m.lines[0].quantity = qty;
        m
    }

    #[test]
    fn full_return_fits_but_one_more_does_not() {
        let s = sale(&[("X", 10, 100)]);
        assert!(check_return(&s, &[], &[LineRequest::new("X", 10)]).is_ok());

        let prior = vec![returned(&s, 10)];
        let err = check_return(&s, &prior, &[LineRequest::new("X", 1)]).unwrap_err();
        assert_eq!(
            err,
            LedgerError::ReturnExceedsSold {
                sku: "X".into(),
                sold: 10,
                already_returned: 10,
                requested: 1
            }
        );
    }

    #[test]
    fn split_lines_are_summed_against_the_cap() {
        let s = sale(&[("X", 4, 100)]);
        let lines = [LineRequest::new("X", 3), LineRequest::new("X", 2)];
        assert!(matches!(check_return(&s, &[], &lines), Err(LedgerError::ReturnExceedsSold { requested: 5, .. })));
    }

    #[test]
    fn skus_not_on_the_sale_cannot_be_returned() {
        let s = sale(&[("X", 4, 100)]);
        assert!(matches!(
            check_return(&s, &[], &[LineRequest::new("Y", 1)]),
            Err(LedgerError::ReturnExceedsSold { sold: 0, .. })
        ));
    }

    #[test]
    fn returns_against_other_sales_do_not_count() {
        let s = sale(&[("X", 4, 100)]);
        let other = sale(&[("X", 4, 100)]);
        let caps = return_caps(&s, &[returned(&other, 4)]);
        assert_eq!(caps["X"].remaining(), 4);
    }

    #[test]
    fn return_request_defaults_to_sale_prices() {
        let s = sale(&[("X", 2, 1_250)]);
        let warehouse = LocationId::new();
        let req = ReturnRequest {
            warehouse,
            lines: vec![LineRequest::new("X", 1)],
            date: None,
            reference: None,
            notes: None,
        };
        let built = return_request(&s, &req).unwrap();
        assert_eq!(built.kind, MovementType::B2bReturn);
        assert_eq!(built.to, Some(warehouse));
        assert_eq!(built.return_of, Some(s.id));
        assert_eq!(built.lines[0].unit_price, Some(Money::from_cents(1_250)));
        assert_eq!(built.lines[0].discount_bp, 500);
    }

    #[test]
    fn only_sales_can_be_returned() {
        let mut s = sale(&[("X", 2, 100)]);
        s.kind = MovementType::Transfer;
        let req = ReturnRequest {
            warehouse: LocationId::new(),
            lines: vec![LineRequest::new("X", 1)],
            date: None,
            reference: None,
            notes: None,
        };
        assert!(matches!(return_request(&s, &req), Err(LedgerError::Validation(_))));
    }
}

//! Row-wise reconciliation of list price against discounts and net.
//!
//! `delta` is the part of the list price not explained by the recorded
//! discounts and net; folding it into the upfront discount makes every row
//! balance, which `diff` and `match_residual` then confirm.

use crate::schema::{Amounts, Reconciliation};

fn combine(a: Option<f64>, b: Option<f64>, op: impl Fn(f64, f64) -> f64) -> Option<f64> {
    Some(op(a?, b?))
}

/// Any missing input leaves the dependent outputs missing.
pub fn reconcile(amounts: &Amounts) -> Reconciliation {
    let sub = |a: f64, b: f64| a - b;
    let add = |a: f64, b: f64| a + b;

    let list_price = amounts.list_price;
    let upfront = amounts.upfront;
    let backend = amounts.backend;
    let net = amounts.net;

    let delta = combine(
        combine(combine(list_price, upfront, sub), backend, sub),
        net,
        sub,
    );
    let updated_upfront = combine(delta, upfront, add);
    let diff = combine(
        combine(combine(list_price, backend, sub), updated_upfront, sub),
        net,
        sub,
    );
    let match_amount = combine(list_price, combine(updated_upfront, backend, add), sub);
    let match_residual = combine(match_amount, net, sub);

    Reconciliation {
        delta,
        updated_upfront,
        diff,
        match_amount,
        match_residual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amounts(lp: f64, up: f64, be: f64, net: f64) -> Amounts {
        Amounts {
            list_price: Some(lp),
            upfront: Some(up),
            backend: Some(be),
            net: Some(net),
        }
    }

    #[test]
    fn test_consistent_row_balances() {
        let r = reconcile(&amounts(1000.0, 100.0, 50.0, 850.0));
        assert_eq!(r.delta, Some(0.0));
        assert_eq!(r.updated_upfront, Some(100.0));
        assert_eq!(r.diff, Some(0.0));
        assert_eq!(r.match_amount, Some(850.0));
        assert_eq!(r.match_residual, Some(0.0));
    }

    #[test]
    fn test_unexplained_amount_moves_into_upfront() {
        let r = reconcile(&amounts(1000.0, 100.0, 50.0, 800.0));
        assert!((r.delta.unwrap() - 50.0).abs() < 1e-9);
        assert!((r.updated_upfront.unwrap() - 150.0).abs() < 1e-9);
        assert!(r.diff.unwrap().abs() < 1e-9);
        assert!((r.match_amount.unwrap() - 800.0).abs() < 1e-9);
        assert!(r.match_residual.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_missing_input_propagates() {
        let mut input = amounts(1000.0, 100.0, 50.0, 850.0);
        input.backend = None;
        let r = reconcile(&input);
        assert_eq!(r, Reconciliation::default());

        let mut input = amounts(1000.0, 100.0, 50.0, 850.0);
        input.net = None;
        let r = reconcile(&input);
        assert_eq!(r.delta, None);
        assert_eq!(r.updated_upfront, None);
        assert_eq!(r.match_amount, None);
    }
}

//! Premium-tier capital allocation curve for the kimchi/tether strategy.
//!
//! Pure function of its inputs: a sorted list of breakpoints maps a signed
//! premium (%) to an allocation fraction and an action bias. Between
//! breakpoints the allocation is linearly interpolated; outside the range
//! the nearest endpoint wins (no extrapolation).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocAction {
    BuyKrw,
    SellKrw,
    Flat,
}

impl AllocAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocAction::BuyKrw => "buy_krw",
            AllocAction::SellKrw => "sell_krw",
            AllocAction::Flat => "flat",
        }
    }
}

/// One breakpoint of the piecewise-linear curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CurvePoint {
    pub premium_pct: f64,
    pub allocation_pct: f64,
    pub action: AllocAction,
}

/// Allocation verdict for one premium reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    pub target_allocation_pct: f64,
    pub recommended_notional_usd: f64,
    pub action: AllocAction,
}

/// Evaluate the curve at `premium_pct` against `total_equity_usd`.
///
/// The curve must be sorted by premium; the segment's action bias is taken
/// from the upper breakpoint of the containing segment.
pub fn evaluate(curve: &[CurvePoint], premium_pct: f64, total_equity_usd: f64) -> Allocation {
    let (pct, action) = interpolate(curve, premium_pct);
    Allocation {
        target_allocation_pct: pct,
        recommended_notional_usd: total_equity_usd * pct / 100.0,
        action,
    }
}

fn interpolate(curve: &[CurvePoint], premium_pct: f64) -> (f64, AllocAction) {
    let Some(first) = curve.first() else {
        return (0.0, AllocAction::Flat);
    };
    if premium_pct <= first.premium_pct {
        return (clamp_pct(first.allocation_pct), first.action);
    }
    for window in curve.windows(2) {
        let (left, right) = (window[0], window[1]);
        if premium_pct <= right.premium_pct {
            let span = right.premium_pct - left.premium_pct;
            if span <= 0.0 {
                return (clamp_pct(right.allocation_pct), right.action);
            }
            let weight = (premium_pct - left.premium_pct) / span;
            let value = left.allocation_pct + weight * (right.allocation_pct - left.allocation_pct);
            return (clamp_pct(value), right.action);
        }
    }
    let last = curve[curve.len() - 1];
    (clamp_pct(last.allocation_pct), last.action)
}

fn clamp_pct(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> Vec<CurvePoint> {
        vec![
            CurvePoint { premium_pct: 0.0, allocation_pct: 0.0, action: AllocAction::Flat },
            CurvePoint { premium_pct: 2.0, allocation_pct: 25.0, action: AllocAction::SellKrw },
            CurvePoint { premium_pct: 5.0, allocation_pct: 75.0, action: AllocAction::SellKrw },
        ]
    }

    #[test]
    fn interpolates_between_breakpoints() {
        // Premium from the S2-style setup: ((88_500_000 / 1450) - 60_000) / 60_000 * 100
        let premium = ((88_500_000.0 / 1450.0) - 60_000.0) / 60_000.0 * 100.0;
        let alloc = evaluate(&curve(), premium, 100_000.0);
        assert!((alloc.target_allocation_pct - 21.5).abs() < 0.2);
        assert!((alloc.recommended_notional_usd - 21_500.0).abs() < 200.0);
        assert_eq!(alloc.action, AllocAction::SellKrw);
    }

    #[test]
    fn clamps_outside_range_to_endpoints() {
        let c = curve();
        let below = evaluate(&c, -10.0, 100_000.0);
        assert_eq!(below.target_allocation_pct, 0.0);
        assert_eq!(below.action, AllocAction::Flat);

        let above = evaluate(&c, 12.0, 100_000.0);
        assert_eq!(above.target_allocation_pct, 75.0);
        assert_eq!(above.action, AllocAction::SellKrw);
    }

    #[test]
    fn exact_breakpoint_hits_breakpoint_value() {
        let alloc = evaluate(&curve(), 2.0, 50_000.0);
        assert!((alloc.target_allocation_pct - 25.0).abs() < 1e-9);
        assert!((alloc.recommended_notional_usd - 12_500.0).abs() < 1e-6);
    }

    #[test]
    fn empty_curve_allocates_nothing() {
        let alloc = evaluate(&[], 3.0, 100_000.0);
        assert_eq!(alloc.target_allocation_pct, 0.0);
        assert_eq!(alloc.recommended_notional_usd, 0.0);
    }

    #[test]
    fn allocation_never_leaves_unit_range() {
        let wild = vec![
            CurvePoint { premium_pct: -5.0, allocation_pct: 140.0, action: AllocAction::BuyKrw },
            CurvePoint { premium_pct: 5.0, allocation_pct: -40.0, action: AllocAction::SellKrw },
        ];
        for p in [-10.0, -5.0, -1.0, 0.0, 2.5, 5.0, 10.0] {
            let alloc = evaluate(&wild, p, 10_000.0);
            assert!((0.0..=100.0).contains(&alloc.target_allocation_pct));
        }
    }
}

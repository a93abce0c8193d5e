// ─────────────────────────────────────────────────────────────────────────────
// reconcile.rs — The Reconciler (core of the core)
//
// Given a band profile, a reference price, the current open orders for one
// pair and the available balances, decides exactly which orders to cancel
// and which new orders to place. Every function here is pure: no I/O, no
// shared mutable state. The order view and the combinatorial search
// accumulator are both threaded through as plain values, never globals
// (spec.md §9 — this is the direct fix for the Go original's
// `orderBook`/`validCombos` globals).
// ─────────────────────────────────────────────────────────────────────────────
use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;

use crate::bands::{total_amount, Band, Side};
use crate::orderbook::Order;
use crate::registry::Precision;

// ─── Outputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Outside,
    Excessive,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelAction {
    pub order_id: u64,
    pub side: Side,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceAction {
    pub side: Side,
    pub band_index: usize,
    pub price: Decimal,
    pub quantity: Decimal,
    pub pay_amount: Decimal,
}

// ─── §4.4.1 Cancellable set ───────────────────────────────────────────────────

/// Assigns each order to the first band (in declared order) whose window
/// includes its price, or to `outside` if none does. Partitional: every
/// order lands in exactly one bucket.
fn classify<'a>(bands: &[Band], orders: &[&'a Order], ref_price: Decimal) -> (Vec<&'a Order>, Vec<Vec<&'a Order>>) {
    let mut in_band: Vec<Vec<&Order>> = vec![Vec::new(); bands.len()];
    let mut outside = Vec::new();

    for &order in orders {
        match bands.iter().position(|b| b.includes(order.price, ref_price)) {
            Some(idx) => in_band[idx].push(order),
            None => outside.push(order),
        }
    }
    (outside, in_band)
}

/// Enumerates all size-`k` combinations of `items`, preserving input order —
/// needed so the search is deterministic regardless of how the caller built
/// the slice.
fn combinations<'a>(items: &[&'a Order], k: usize) -> Vec<Vec<&'a Order>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    if k > items.len() {
        return Vec::new();
    }
    let mut result = Vec::new();
    let mut current = Vec::with_capacity(k);
    combinations_helper(items, k, 0, &mut current, &mut result);
    result
}

fn combinations_helper<'a>(
    items: &[&'a Order],
    k: usize,
    start: usize,
    current: &mut Vec<&'a Order>,
    result: &mut Vec<Vec<&'a Order>>,
) {
    if current.len() == k {
        result.push(current.clone());
        return;
    }
    for i in start..items.len() {
        current.push(items[i]);
        combinations_helper(items, k, i + 1, current, result);
        current.pop();
    }
}

/// Finds the best kept subset K of `orders_in_band`: maximum cardinality
/// subject to `min_amount <= total(K) < max_amount`, ties broken by largest
/// total. Returns an empty vec if no subset satisfies the constraint.
///
/// Brute-force over the power set, ordered by decreasing cardinality —
/// acceptable per spec.md §4.4.1 given the small per-band order counts this
/// system expects.
pub fn best_kept_subset<'a>(orders_in_band: &[&'a Order], band: &Band) -> Vec<&'a Order> {
    let n = orders_in_band.len();
    for size in (0..=n).rev() {
        let mut best: Option<(Vec<&Order>, Decimal)> = None;
        for combo in combinations(orders_in_band, size) {
            let total = total_amount(combo.iter().copied());
            if total >= band.min_amount() && total < band.max_amount() {
                let better = match &best {
                    None => true,
                    Some((_, best_total)) => total > *best_total,
                };
                if better {
                    best = Some((combo, total));
                }
            }
        }
        if let Some((combo, _)) = best {
            return combo;
        }
    }
    Vec::new()
}

/// Computes the cancellable set for one side of one pair: every outside
/// order, plus the complement of the best kept subset for every over-filled
/// band. Deduplicated defensively (spec.md §4.4.1 rule: an order can only be
/// produced by one rule under correct partitioning, but we guard anyway).
pub fn cancellable_orders(bands: &[Band], orders: &[&Order], ref_price: Decimal, side: Side) -> Vec<CancelAction> {
    let (outside, in_band) = classify(bands, orders, ref_price);

    let mut seen = HashSet::new();
    let mut cancels = Vec::new();

    for order in outside {
        if seen.insert(order.id) {
            cancels.push(CancelAction { order_id: order.id, side, reason: CancelReason::Outside });
        }
    }

    for (band, orders_in_band) in bands.iter().zip(in_band.iter()) {
        let total = total_amount(orders_in_band.iter().copied());
        if total <= band.max_amount() {
            continue;
        }
        let kept = best_kept_subset(orders_in_band, band);
        let kept_ids: HashSet<u64> = kept.iter().map(|o| o.id).collect();
        for order in orders_in_band {
            if !kept_ids.contains(&order.id) && seen.insert(order.id) {
                cancels.push(CancelAction { order_id: order.id, side, reason: CancelReason::Excessive });
            }
        }
    }

    cancels
}

// ─── §4.4.2 Place set (top-up) ────────────────────────────────────────────────

/// Rounds a price/quantity at the exchange precision boundary using
/// round-half-even (spec.md §9 — monetary outputs must not use naive
/// round-half-up).
fn round_at(value: Decimal, decimal_places: u32) -> Decimal {
    value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointNearestEven)
}

/// Computes at most one top-up place per band, in declared order, sharing
/// `balance` across bands on this side of this cycle (spec.md §4.4.2 — the
/// running balance is decremented as each order is committed). Returns the
/// places and the balance remaining after all bands on this side.
pub fn topups(
    bands: &[Band],
    orders: &[&Order],
    ref_price: Decimal,
    side: Side,
    precision: &Precision,
    mut balance: Decimal,
) -> (Vec<PlaceAction>, Decimal) {
    let (price_dp, amount_dp) = match side {
        Side::Buy => (precision.bid_price_dp, precision.bid_amount_dp),
        Side::Sell => (precision.ask_price_dp, precision.ask_amount_dp),
    };

    let (_, in_band) = classify(bands, orders, ref_price);
    let mut places = Vec::new();

    for (idx, (band, orders_in_band)) in bands.iter().zip(in_band.iter()).enumerate() {
        let filled = total_amount(orders_in_band.iter().copied());
        if filled >= band.min_amount() {
            continue;
        }

        let price = round_at(band.avg_price(ref_price), price_dp);
        if price <= Decimal::ZERO {
            continue;
        }
        let pay_amount = (band.avg_amount() - filled).min(balance);

        if pay_amount < band.dust_cutoff() || pay_amount <= Decimal::ZERO {
            continue;
        }

        let raw_quantity = match side {
            Side::Buy => pay_amount / price,
            Side::Sell => pay_amount,
        };
        let quantity = round_at(raw_quantity, amount_dp);
        if quantity <= Decimal::ZERO {
            continue;
        }

        places.push(PlaceAction { side, band_index: idx, price, quantity, pay_amount });
        balance -= pay_amount;
    }

    (places, balance)
}

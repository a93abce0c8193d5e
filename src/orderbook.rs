// ─────────────────────────────────────────────────────────────────────────────
// orderbook.rs — Order View
//
// An in-memory snapshot of the operator's open orders, indexed by pair and
// side. Rebuilt from scratch every reconciliation cycle from a single
// gateway call — never cached across cycles (spec.md §4.2).
// ─────────────────────────────────────────────────────────────────────────────
use std::collections::HashMap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::bands::Side;
use crate::registry::Registry;

/// A single open order, as reported by the exchange. Remaining quantity is
/// the only field that participates in band accounting. `pair_code` is the
/// exchange-native pair code (spec.md §3), not necessarily our internal pair
/// key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub pair_code: String,
    pub id: u64,
    pub side: Side,
    pub price: Decimal,
    pub init_quantity: Decimal,
    pub rem_quantity: Decimal,
    pub status: i64,
    pub status_desc: String,
    pub timestamp: DateTime<Utc>,
}

/// The wire shape of an order exactly as the exchange reports it, before
/// `side` has been resolved to a `Side`. The exchange encodes side as a
/// numeric code (0 = bid, 1 = ask, mirroring the original Go's
/// `order.Side == 0`/`== 1`); any other code is not a parse error, it is an
/// order this system doesn't understand and must drop (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOrder {
    pub pair_code: String,
    pub id: u64,
    pub side: i64,
    pub price: Decimal,
    pub init_quantity: Decimal,
    pub rem_quantity: Decimal,
    pub status: i64,
    pub status_desc: String,
    pub timestamp: DateTime<Utc>,
}

impl RawOrder {
    pub fn from_order(order: &Order) -> Self {
        Self {
            pair_code: order.pair_code.clone(),
            id: order.id,
            side: order.side.to_code(),
            price: order.price,
            init_quantity: order.init_quantity,
            rem_quantity: order.rem_quantity,
            status: order.status,
            status_desc: order.status_desc.clone(),
            timestamp: order.timestamp,
        }
    }

    fn resolve_side(&self) -> Option<Side> {
        Side::from_code(self.side)
    }

    fn into_order(self, side: Side) -> Order {
        Order {
            pair_code: self.pair_code,
            id: self.id,
            side,
            price: self.price,
            init_quantity: self.init_quantity,
            rem_quantity: self.rem_quantity,
            status: self.status,
            status_desc: self.status_desc,
            timestamp: self.timestamp,
        }
    }
}

/// Bids and asks for a single pair, each keyed by exchange order id.
#[derive(Debug, Clone, Default)]
pub struct PairOrders {
    pub bids: HashMap<u64, Order>,
    pub asks: HashMap<u64, Order>,
}

impl PairOrders {
    pub fn orders_for(&self, side: Side) -> Vec<&Order> {
        match side {
            Side::Buy => self.bids.values().collect(),
            Side::Sell => self.asks.values().collect(),
        }
    }
}

/// `exchange pair code -> {bids, asks}`. Cleared and repopulated at the
/// start of every reconciliation cycle from a single `list_open_orders`
/// gateway call spanning every pair (spec.md §4.4.3 step 1).
#[derive(Debug, Clone, Default)]
pub struct OrderView {
    by_pair: HashMap<String, PairOrders>,
}

impl OrderView {
    pub fn new() -> Self {
        Self { by_pair: HashMap::new() }
    }

    /// Builds a fresh view from the flat list of orders returned by one
    /// `ExchangeGateway::list_open_orders` call spanning every pair. Orders
    /// whose exchange pair code isn't registered to any pair, or whose side
    /// doesn't resolve to bid/ask, are dropped with a warning (spec.md
    /// §4.2) — the returned counts record how many of each.
    pub fn rebuild(orders: Vec<RawOrder>, registry: &Registry) -> (Self, DroppedCounts) {
        let mut view = Self::new();
        let mut dropped = DroppedCounts::default();

        for raw in orders {
            if registry.pair_for_exchange_code(&raw.pair_code).is_none() {
                log::warn!("[ORDERBOOK] dropping order {} — unknown exchange pair code {}", raw.id, raw.pair_code);
                dropped.unknown_pair += 1;
                continue;
            }
            let Some(side) = raw.resolve_side() else {
                log::warn!("[ORDERBOOK] dropping order {} — unrecognized side code {}", raw.id, raw.side);
                dropped.unknown_side += 1;
                continue;
            };

            let entry = view.by_pair.entry(raw.pair_code.clone()).or_default();
            let order = raw.into_order(side);
            match side {
                Side::Buy => { entry.bids.insert(order.id, order); }
                Side::Sell => { entry.asks.insert(order.id, order); }
            }
        }

        (view, dropped)
    }

    /// Looks up orders by exchange pair code (`Registry::exchange_pair_code`,
    /// not the internal pair key).
    pub fn pair(&self, exchange_pair_code: &str) -> PairOrders {
        self.by_pair.get(exchange_pair_code).cloned().unwrap_or_default()
    }

    pub fn insert_for_test(&mut self, exchange_pair_code: &str, order: Order) {
        let entry = self.by_pair.entry(exchange_pair_code.to_string()).or_default();
        match order.side {
            Side::Buy => { entry.bids.insert(order.id, order); }
            Side::Sell => { entry.asks.insert(order.id, order); }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DroppedCounts {
    pub unknown_pair: usize,
    pub unknown_side: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(id: u64, pair: &str, side: i64, price: Decimal, rem: Decimal) -> RawOrder {
        RawOrder {
            pair_code: pair.to_string(),
            id,
            side,
            price,
            init_quantity: rem,
            rem_quantity: rem,
            status: 0,
            status_desc: "open".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn rebuild_drops_unknown_pairs() {
        let registry = Registry::with_defaults();
        let orders = vec![
            raw(1, "ETHDAI", 0, dec!(0.99), dec!(10)),
            raw(2, "DOGEUSD", 0, dec!(0.99), dec!(10)),
        ];
        let (view, dropped) = OrderView::rebuild(orders, &registry);
        assert_eq!(dropped.unknown_pair, 1);
        assert_eq!(view.pair("ETHDAI").bids.len(), 1);
        assert_eq!(view.pair("DOGEUSD").bids.len(), 0);
    }

    #[test]
    fn rebuild_routes_by_side() {
        let registry = Registry::with_defaults();
        let orders = vec![
            raw(1, "ETHDAI", 0, dec!(0.99), dec!(10)),
            raw(2, "ETHDAI", 1, dec!(1.01), dec!(5)),
        ];
        let (view, _) = OrderView::rebuild(orders, &registry);
        let pair_orders = view.pair("ETHDAI");
        assert_eq!(pair_orders.bids.len(), 1);
        assert_eq!(pair_orders.asks.len(), 1);
    }

    #[test]
    fn rebuild_drops_unrecognized_side_codes() {
        let registry = Registry::with_defaults();
        let orders = vec![
            raw(1, "ETHDAI", 0, dec!(0.99), dec!(10)),
            raw(2, "ETHDAI", 7, dec!(1.01), dec!(5)),
        ];
        let (view, dropped) = OrderView::rebuild(orders, &registry);
        assert_eq!(dropped.unknown_side, 1);
        assert_eq!(dropped.unknown_pair, 0);
        let pair_orders = view.pair("ETHDAI");
        assert_eq!(pair_orders.bids.len(), 1);
        assert_eq!(pair_orders.asks.len(), 0);
    }

    #[test]
    fn rebuild_resolves_orders_by_exchange_pair_code() {
        let mut registry = Registry::new();
        registry.insert_pair(
            "ETHDAI".to_string(),
            crate::registry::PairInfo {
                base: "ETH".to_string(),
                quote: "DAI".to_string(),
                exchange_pair_code: "ETH_DAI_SPOT".to_string(),
                precision: crate::registry::Precision::default(),
            },
        );
        let orders = vec![raw(1, "ETH_DAI_SPOT", 0, dec!(0.99), dec!(10))];
        let (view, dropped) = OrderView::rebuild(orders, &registry);
        assert_eq!(dropped.unknown_pair, 0);
        assert_eq!(view.pair("ETH_DAI_SPOT").bids.len(), 1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// driver.rs — Cycle Driver
//
// Runs one reconciliation cycle per pair on a fixed tick, sequentially —
// no cross-pair or cross-band parallelism (spec.md §2 Non-goals: no
// sub-cycle reactive cancellation, this is a simple poll loop). Wires the
// band profile, order view, oracle and gateway together; all the actual
// decision logic lives in `reconcile`.
// ─────────────────────────────────────────────────────────────────────────────
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bands::Side;
use crate::config::BandProfile;
use crate::gateway::ExchangeGateway;
use crate::oracle::PriceOracle;
use crate::orderbook::OrderView;
use crate::reconcile::{cancellable_orders, topups, CancelReason};
use crate::registry::Registry;

pub struct Driver {
    pub registry: Registry,
    pub profile: BandProfile,
    /// Pairs to reconcile each cycle, in configuration order (spec.md
    /// §4.4.3, §6.2's `activePairs`) — an operator's allowlist, not every
    /// pair that happens to have a band profile entry.
    pub active_pairs: Vec<String>,
    pub gateway: Arc<dyn ExchangeGateway>,
    pub oracle: Arc<dyn PriceOracle>,
    pub tick_interval: std::time::Duration,
}

impl Driver {
    /// Runs forever, ticking every `tick_interval`, until a Ctrl-C is
    /// received. The in-flight cycle is always allowed to finish — shutdown
    /// only takes effect at the next tick boundary (spec.md §6 — no
    /// mid-cycle abort).
    pub async fn run(&self) {
        let shutdown = Arc::new(AtomicBool::new(false));
        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("[DRIVER] shutdown requested, finishing current cycle");
                    shutdown.store(true, Ordering::SeqCst);
                }
            });
        }

        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                log::info!("[DRIVER] shutting down");
                break;
            }
            self.run_cycle().await;
        }
    }

    /// One pass over every active pair. Refreshes the order view once from
    /// a single gateway call spanning every pair (spec.md §4.4.3 step 1); a
    /// failure there aborts the whole cycle — no cancels, no places for any
    /// pair (spec.md §4.4.4: "Gateway read failure on the order list aborts
    /// the cycle"). Per-pair failures after that never prevent other pairs
    /// from reconciling (spec.md §7).
    pub async fn run_cycle(&self) {
        let orders = match self.gateway.list_open_orders().await {
            Ok(orders) => orders,
            Err(err) => {
                log::error!("[DRIVER] failed to list open orders, aborting cycle: {}", err);
                return;
            }
        };

        let (view, dropped) = OrderView::rebuild(orders, &self.registry);
        if dropped.unknown_pair > 0 {
            log::warn!("[DRIVER] dropped {} orders with an unrecognized exchange pair code this cycle", dropped.unknown_pair);
        }
        if dropped.unknown_side > 0 {
            log::warn!("[DRIVER] dropped {} orders with an unrecognized side code this cycle", dropped.unknown_side);
        }

        for pair in &self.active_pairs {
            self.run_pair_cycle(pair, &view).await;
        }
    }

    async fn run_pair_cycle(&self, pair: &str, view: &OrderView) {
        let Some(pair_bands) = self.profile.get(pair) else {
            log::warn!("[DRIVER] no band profile for pair {}, skipping", pair);
            return;
        };
        let Some(pair_info) = self.registry.get(pair) else {
            log::warn!("[DRIVER] no registry entry for pair {}, skipping", pair);
            return;
        };

        let pair_orders = view.pair(&pair_info.exchange_pair_code);

        let Some(ref_price) = self.oracle.reference_price(pair).await else {
            log::warn!("[DRIVER] no reference price for {}, skipping cycle", pair);
            return;
        };

        let bids = pair_orders.orders_for(Side::Buy);
        let asks = pair_orders.orders_for(Side::Sell);

        let mut buy_cancels = cancellable_orders(&pair_bands.buy_bands, &bids, ref_price, Side::Buy);
        let mut sell_cancels = cancellable_orders(&pair_bands.sell_bands, &asks, ref_price, Side::Sell);

        let mut cancelled_ids = std::collections::HashSet::new();
        for cancel in buy_cancels.drain(..).chain(sell_cancels.drain(..)) {
            match self.gateway.cancel_order(&pair_info.exchange_pair_code, cancel.order_id).await {
                Ok(()) => {
                    cancelled_ids.insert(cancel.order_id);
                }
                Err(err) => {
                    log::warn!(
                        "[DRIVER] failed to cancel order {} on {} ({:?}): {}",
                        cancel.order_id,
                        pair,
                        cancel.reason,
                        err
                    );
                }
            }
        }

        let remaining_bids: Vec<_> = bids.into_iter().filter(|o| !cancelled_ids.contains(&o.id)).collect();
        let remaining_asks: Vec<_> = asks.into_iter().filter(|o| !cancelled_ids.contains(&o.id)).collect();

        // Balances are queried per side so a failure on one side (e.g. the
        // quote token) doesn't suppress the other side's top-up (spec.md
        // §4.4.4: "Balance query failure for a side skips that side's
        // top-up").
        let quote_balance = match self.gateway.balance(&pair_info.quote).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                log::warn!("[DRIVER] failed to fetch {} balance, skipping buy top-up for {}: {}", pair_info.quote, pair, err);
                None
            }
        };
        let base_balance = match self.gateway.balance(&pair_info.base).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                log::warn!("[DRIVER] failed to fetch {} balance, skipping sell top-up for {}: {}", pair_info.base, pair, err);
                None
            }
        };

        if let Some(quote_balance) = quote_balance {
            let (buy_places, _) = topups(&pair_bands.buy_bands, &remaining_bids, ref_price, Side::Buy, &pair_info.precision, quote_balance);
            self.dispatch_places(pair, &pair_info.exchange_pair_code, buy_places).await;
        }
        if let Some(base_balance) = base_balance {
            let (sell_places, _) = topups(&pair_bands.sell_bands, &remaining_asks, ref_price, Side::Sell, &pair_info.precision, base_balance);
            self.dispatch_places(pair, &pair_info.exchange_pair_code, sell_places).await;
        }

        log::info!(
            "[DRIVER] cycle complete for {}: {} cancelled, ref_price={}",
            pair,
            cancelled_ids.len(),
            ref_price
        );

        log_order_book_summary(pair, &remaining_bids, &remaining_asks);
    }

    async fn dispatch_places(&self, pair: &str, exchange_pair_code: &str, places: Vec<crate::reconcile::PlaceAction>) {
        for place in places {
            match self.gateway.place_order(exchange_pair_code, place.side, place.price, place.quantity).await {
                Ok(id) => log::info!(
                    "[DRIVER] placed order {} on {}: {:?} {} @ {}",
                    id,
                    pair,
                    place.side,
                    place.quantity,
                    place.price
                ),
                Err(err) => log::warn!("[DRIVER] failed to place top-up order on {}: {}", pair, err),
            }
        }
    }
}

/// Logs a table of the current book for one pair, mirroring the original's
/// `PrintBands`/`PrintBand` console dump — useful when running in shadow
/// mode to eyeball what the reconciler would do.
pub fn log_order_book_summary(pair: &str, bids: &[&crate::orderbook::Order], asks: &[&crate::orderbook::Order]) {
    log::info!("[DRIVER] ── {} ──", pair);
    for bid in bids {
        log::info!("[DRIVER]   BID  id={:<10} price={:<14} qty={}", bid.id, bid.price, bid.rem_quantity);
    }
    for ask in asks {
        log::info!("[DRIVER]   ASK  id={:<10} price={:<14} qty={}", ask.id, ask.price, ask.rem_quantity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SimGateway;
    use crate::oracle::PeggedOracle;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn profile_with_one_pair() -> BandProfile {
        let json = serde_json::json!({
            "ETHDAI": {
                "buyBands": [{"minMargin": "0.01", "avgMargin": "0.02", "maxMargin": "0.03", "minAmount": "10", "avgAmount": "20", "maxAmount": "30", "dustCutoff": "0"}],
                "sellBands": [{"minMargin": "0.01", "avgMargin": "0.02", "maxMargin": "0.03", "minAmount": "10", "avgAmount": "20", "maxAmount": "30", "dustCutoff": "0"}]
            }
        });
        let path = std::env::temp_dir().join(format!("band-maker-driver-test-{}.json", std::process::id()));
        std::fs::write(&path, json.to_string()).unwrap();
        let profile = BandProfile::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        profile
    }

    #[tokio::test]
    async fn cycle_places_topup_when_book_is_empty() {
        let mut balances = HashMap::new();
        balances.insert("DAI".to_string(), dec!(1000));
        balances.insert("ETH".to_string(), dec!(100));

        let driver = Driver {
            registry: Registry::with_defaults(),
            profile: profile_with_one_pair(),
            active_pairs: vec!["ETHDAI".to_string()],
            gateway: Arc::new(SimGateway::new(balances)),
            oracle: Arc::new(PeggedOracle::new().with_peg("ETHDAI", dec!(1.0))),
            tick_interval: std::time::Duration::from_millis(10),
        };

        driver.run_cycle().await;

        let open = driver.gateway.list_open_orders().await.unwrap();
        assert_eq!(open.len(), 2); // one buy top-up, one sell top-up
    }

    #[tokio::test]
    async fn cycle_skips_pair_with_no_reference_price() {
        let driver = Driver {
            registry: Registry::with_defaults(),
            profile: profile_with_one_pair(),
            active_pairs: vec!["ETHDAI".to_string()],
            gateway: Arc::new(SimGateway::new(HashMap::new())),
            oracle: Arc::new(PeggedOracle::new()), // no pegs configured
            tick_interval: std::time::Duration::from_millis(10),
        };

        driver.run_cycle().await;

        let open = driver.gateway.list_open_orders().await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn cycle_ignores_pairs_outside_active_list() {
        let mut balances = HashMap::new();
        balances.insert("DAI".to_string(), dec!(1000));
        balances.insert("ETH".to_string(), dec!(100));

        let driver = Driver {
            registry: Registry::with_defaults(),
            profile: profile_with_one_pair(),
            active_pairs: Vec::new(), // ETHDAI has a band profile but isn't active
            gateway: Arc::new(SimGateway::new(balances)),
            oracle: Arc::new(PeggedOracle::new().with_peg("ETHDAI", dec!(1.0))),
            tick_interval: std::time::Duration::from_millis(10),
        };

        driver.run_cycle().await;

        let open = driver.gateway.list_open_orders().await.unwrap();
        assert!(open.is_empty());
    }

    #[tokio::test]
    async fn cycle_aborts_entirely_when_order_list_fails() {
        struct FailingGateway;

        #[async_trait::async_trait]
        impl ExchangeGateway for FailingGateway {
            async fn list_open_orders(&self) -> Result<Vec<crate::orderbook::RawOrder>, crate::gateway::GatewayError> {
                Err(crate::gateway::GatewayError::Network("connection reset".to_string()))
            }
            async fn list_balances(&self) -> Result<HashMap<String, rust_decimal::Decimal>, crate::gateway::GatewayError> {
                let mut balances = HashMap::new();
                balances.insert("DAI".to_string(), dec!(1000));
                balances.insert("ETH".to_string(), dec!(100));
                Ok(balances)
            }
            async fn place_order(
                &self,
                _pair_code: &str,
                _side: Side,
                _price: rust_decimal::Decimal,
                _quantity: rust_decimal::Decimal,
            ) -> Result<u64, crate::gateway::GatewayError> {
                panic!("no place should be attempted when the order read fails");
            }
            async fn cancel_order(&self, _pair_code: &str, _order_id: u64) -> Result<(), crate::gateway::GatewayError> {
                panic!("no cancel should be attempted when the order read fails");
            }
        }

        let driver = Driver {
            registry: Registry::with_defaults(),
            profile: profile_with_one_pair(),
            active_pairs: vec!["ETHDAI".to_string()],
            gateway: Arc::new(FailingGateway),
            oracle: Arc::new(PeggedOracle::new().with_peg("ETHDAI", dec!(1.0))),
            tick_interval: std::time::Duration::from_millis(10),
        };

        // Would panic inside place_order/cancel_order if the cycle proceeded past the failed read.
        driver.run_cycle().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// gateway.rs — Exchange Gateway
//
// The reconciler never talks to an exchange directly; it only ever produces
// CancelAction/PlaceAction values. Something else has to actually execute
// them. `ExchangeGateway` is that boundary — a small async trait with a
// simulated implementation for tests/shadow mode and an HTTP implementation
// for the real exchange (spec.md §5; original's `api.go`).
// ─────────────────────────────────────────────────────────────────────────────
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha512;
use thiserror::Error;

use crate::bands::Side;
use crate::orderbook::{Order, RawOrder};

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("network error talking to exchange: {0}")]
    Network(String),
    #[error("exchange rejected request: {0}")]
    Rejected(String),
    #[error("unexpected exchange response: {0}")]
    Protocol(String),
    #[error("rate limited by exchange")]
    RateLimited,
    #[error("unknown token {0}")]
    UnknownToken(String),
    #[error("unknown order {0}")]
    UnknownOrder(u64),
}

/// Every operation the reconciliation cycle needs from an exchange. Methods
/// take `&self`, not `&mut self` — concurrent pairs may share one gateway
/// (spec.md §5, REDESIGN FLAGS: no `interface{}` type assertions, concrete
/// response types throughout).
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Every open order across every pair, in one call (spec.md §4.4.3 step
    /// 1 — the order view is refreshed from a single gateway call spanning
    /// all pairs, never one call per pair). Side is returned unresolved:
    /// the exchange's numeric code might not map to bid/ask, and that's not
    /// this call's problem to reject — `OrderView::rebuild` drops those
    /// orders with a warning (spec.md §4.2).
    async fn list_open_orders(&self) -> Result<Vec<RawOrder>, GatewayError>;
    async fn list_balances(&self) -> Result<HashMap<String, Decimal>, GatewayError>;
    async fn balance(&self, token: &str) -> Result<Decimal, GatewayError> {
        self.list_balances()
            .await?
            .get(token)
            .copied()
            .ok_or_else(|| GatewayError::UnknownToken(token.to_string()))
    }
    async fn place_order(&self, pair_code: &str, side: Side, price: Decimal, quantity: Decimal) -> Result<u64, GatewayError>;
    async fn cancel_order(&self, pair_code: &str, order_id: u64) -> Result<(), GatewayError>;
}

// ─── Rate limiting ────────────────────────────────────────────────────────────

/// Throttles calls by `(exchange, endpoint_class)`, sleeping out whatever's
/// left of the configured minimum interval before letting a call through.
/// Generalizes the teacher's 2-second response cache into an explicit gate
/// (spec.md §5 — no implicit caching, every call is real, but calls are
/// paced).
pub struct RateLimiter {
    min_interval: HashMap<&'static str, Duration>,
    last_call: Mutex<HashMap<(String, &'static str), Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        let mut min_interval = HashMap::new();
        min_interval.insert("public", Duration::from_millis(250));
        min_interval.insert("private", Duration::from_millis(500));
        Self { min_interval, last_call: Mutex::new(HashMap::new()) }
    }

    pub fn with_interval(mut self, endpoint_class: &'static str, interval: Duration) -> Self {
        self.min_interval.insert(endpoint_class, interval);
        self
    }

    /// Sleeps until `min_interval` has elapsed since the last call of this
    /// class on this exchange, then records the call as happening now.
    pub async fn gate(&self, exchange: &str, endpoint_class: &'static str) {
        let min_interval = self.min_interval.get(endpoint_class).copied().unwrap_or(Duration::from_millis(250));
        let key = (exchange.to_string(), endpoint_class);

        let wait = {
            let guard = self.last_call.lock().unwrap();
            guard.get(&key).and_then(|last| min_interval.checked_sub(last.elapsed()))
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }

        self.last_call.lock().unwrap().insert(key, Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Simulated gateway ────────────────────────────────────────────────────────

/// A deterministic in-memory exchange for tests and shadow-mode runs —
/// orders placed are simply recorded, never matched against any market
/// (spec.md §2 Non-goals: no trade execution modeling). Grounded on the
/// teacher's `SimExchange`.
pub struct SimGateway {
    state: Mutex<SimState>,
}

struct SimState {
    orders: HashMap<String, HashMap<u64, Order>>,
    balances: HashMap<String, Decimal>,
    next_id: u64,
}

impl SimGateway {
    pub fn new(balances: HashMap<String, Decimal>) -> Self {
        Self { state: Mutex::new(SimState { orders: HashMap::new(), balances, next_id: 1 }) }
    }

    pub fn seed_order(&self, pair_code: &str, order: Order) {
        let mut state = self.state.lock().unwrap();
        state.orders.entry(pair_code.to_string()).or_default().insert(order.id, order);
    }
}

#[async_trait]
impl ExchangeGateway for SimGateway {
    async fn list_open_orders(&self) -> Result<Vec<RawOrder>, GatewayError> {
        let state = self.state.lock().unwrap();
        Ok(state.orders.values().flat_map(|m| m.values().map(RawOrder::from_order)).collect())
    }

    async fn list_balances(&self) -> Result<HashMap<String, Decimal>, GatewayError> {
        Ok(self.state.lock().unwrap().balances.clone())
    }

    async fn place_order(&self, pair_code: &str, side: Side, price: Decimal, quantity: Decimal) -> Result<u64, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let order = Order {
            pair_code: pair_code.to_string(),
            id,
            side,
            price,
            init_quantity: quantity,
            rem_quantity: quantity,
            status: 0,
            status_desc: "open".to_string(),
            timestamp: Utc::now(),
        };
        state.orders.entry(pair_code.to_string()).or_default().insert(id, order);
        Ok(id)
    }

    async fn cancel_order(&self, pair_code: &str, order_id: u64) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        match state.orders.get_mut(pair_code).and_then(|m| m.remove(&order_id)) {
            Some(_) => Ok(()),
            None => Err(GatewayError::UnknownOrder(order_id)),
        }
    }
}

// ─── HTTP gateway ─────────────────────────────────────────────────────────────

/// A generic HMAC-SHA512-signed REST gateway, grounded on the original's
/// `api.go` (`createSignature` / `getHMacSha512`). Every private call is
/// signed over `timestamp + method + path + body` and carries the digest,
/// api key and timestamp as headers.
pub struct HttpGateway {
    base_url: String,
    api_key: String,
    api_secret: String,
    client: reqwest::Client,
    limiter: RateLimiter,
}

#[derive(Debug, Deserialize)]
struct OpenOrdersResponse {
    orders: Vec<RawOrder>,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    balances: HashMap<String, Decimal>,
}

#[derive(Debug, Deserialize)]
struct PlaceOrderResponse {
    order_id: u64,
}

impl HttpGateway {
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
        Self { base_url, api_key, api_secret, client: reqwest::Client::new(), limiter: RateLimiter::new() }
    }

    fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let message = format!("{}{}{}{}", timestamp, method, path, body);
        let mut mac = HmacSha512::new_from_slice(self.api_secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn signed_request(
        &self,
        endpoint_class: &'static str,
        method: reqwest::Method,
        path: &str,
        body: String,
    ) -> Result<reqwest::Response, GatewayError> {
        self.limiter.gate(&self.base_url, endpoint_class).await;

        let timestamp = Utc::now().timestamp_millis().to_string();
        let signature = self.sign(&timestamp, method.as_str(), path, &body);
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .request(method, &url)
            .header("API-Key", &self.api_key)
            .header("API-Timestamp", &timestamp)
            .header("API-Signature", &signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| GatewayError::Network(err.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited);
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected(format!("{}: {}", status, text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl ExchangeGateway for HttpGateway {
    async fn list_open_orders(&self) -> Result<Vec<RawOrder>, GatewayError> {
        let response = self.signed_request("private", reqwest::Method::GET, "/v1/orders", String::new()).await?;
        let parsed: OpenOrdersResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Protocol(err.to_string()))?;
        Ok(parsed.orders)
    }

    async fn list_balances(&self) -> Result<HashMap<String, Decimal>, GatewayError> {
        let response = self.signed_request("private", reqwest::Method::GET, "/v1/balances", String::new()).await?;
        let parsed: BalancesResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Protocol(err.to_string()))?;
        Ok(parsed.balances)
    }

    async fn place_order(&self, pair_code: &str, side: Side, price: Decimal, quantity: Decimal) -> Result<u64, GatewayError> {
        let side_str = match side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        let body = serde_json::json!({
            "pair": pair_code,
            "side": side_str,
            "price": price.to_string(),
            "quantity": quantity.to_string(),
        })
        .to_string();
        let response = self.signed_request("private", reqwest::Method::POST, "/v1/orders", body).await?;
        let parsed: PlaceOrderResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Protocol(err.to_string()))?;
        Ok(parsed.order_id)
    }

    async fn cancel_order(&self, pair_code: &str, order_id: u64) -> Result<(), GatewayError> {
        let path = format!("/v1/orders/{}?pair={}", order_id, pair_code);
        self.signed_request("private", reqwest::Method::DELETE, &path, String::new()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn balances() -> HashMap<String, Decimal> {
        let mut m = HashMap::new();
        m.insert("DAI".to_string(), dec!(1000));
        m.insert("ETH".to_string(), dec!(5));
        m
    }

    #[tokio::test]
    async fn sim_gateway_places_and_lists_orders() {
        let gw = SimGateway::new(balances());
        let id = gw.place_order("ETHDAI", Side::Buy, dec!(0.99), dec!(10)).await.unwrap();
        let open = gw.list_open_orders().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, id);
    }

    #[tokio::test]
    async fn sim_gateway_lists_orders_across_every_pair() {
        let gw = SimGateway::new(balances());
        gw.place_order("ETHDAI", Side::Buy, dec!(0.99), dec!(10)).await.unwrap();
        gw.place_order("MKRETH", Side::Sell, dec!(30), dec!(1)).await.unwrap();
        let open = gw.list_open_orders().await.unwrap();
        assert_eq!(open.len(), 2);
    }

    #[tokio::test]
    async fn sim_gateway_cancel_removes_order() {
        let gw = SimGateway::new(balances());
        let id = gw.place_order("ETHDAI", Side::Sell, dec!(1.01), dec!(5)).await.unwrap();
        gw.cancel_order("ETHDAI", id).await.unwrap();
        assert!(gw.list_open_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sim_gateway_cancel_unknown_order_errors() {
        let gw = SimGateway::new(balances());
        let err = gw.cancel_order("ETHDAI", 999).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownOrder(999)));
    }

    #[tokio::test]
    async fn sim_gateway_balance_lookup() {
        let gw = SimGateway::new(balances());
        assert_eq!(gw.balance("DAI").await.unwrap(), dec!(1000));
        assert!(matches!(gw.balance("DOGE").await, Err(GatewayError::UnknownToken(_))));
    }

    #[tokio::test]
    async fn rate_limiter_delays_second_call() {
        let limiter = RateLimiter::new().with_interval("test", Duration::from_millis(50));
        let start = Instant::now();
        limiter.gate("ex", "test").await;
        limiter.gate("ex", "test").await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn signing_is_deterministic() {
        let gw = HttpGateway::new("https://example.com".to_string(), "key".to_string(), "secret".to_string());
        let sig1 = gw.sign("1000", "GET", "/v1/orders", "");
        let sig2 = gw.sign("1000", "GET", "/v1/orders", "");
        assert_eq!(sig1, sig2);
        let sig3 = gw.sign("1001", "GET", "/v1/orders", "");
        assert_ne!(sig1, sig3);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// oracle.rs — Price Source
//
// Supplies the single reference price each reconciliation cycle is anchored
// to. Two implementations: a fixed peg for stable-to-stable pairs, and a
// trimmed-mean oracle that shells out to the `setzer` price-aggregator CLI
// once per configured sub-venue (spec.md §4.3 / original's `getRefPrice`).
// ─────────────────────────────────────────────────────────────────────────────
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no reference price configured for pair {0}")]
    UnknownPair(String),
    #[error("fewer than 3 sub-venues returned a usable price for {pair} ({got} of {attempted})")]
    InsufficientQuotes { pair: String, got: usize, attempted: usize },
}

/// Supplies the reference price for a pair. Implementations may fail, but
/// never fabricate a price — the driver skips the pair's cycle on `None`
/// (spec.md §4.3, §7).
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn reference_price(&self, pair: &str) -> Option<Decimal>;
}

/// A fixed 1:1 (or otherwise constant) peg, for pairs that don't need a
/// live reference — e.g. DAIUSD, mirroring the original's constant-price
/// branch in `getRefPrice`.
#[derive(Debug, Clone, Default)]
pub struct PeggedOracle {
    pegs: HashMap<String, Decimal>,
}

impl PeggedOracle {
    pub fn new() -> Self {
        Self { pegs: HashMap::new() }
    }

    pub fn with_peg(mut self, pair: &str, price: Decimal) -> Self {
        self.pegs.insert(pair.to_string(), price);
        self
    }
}

#[async_trait]
impl PriceOracle for PeggedOracle {
    async fn reference_price(&self, pair: &str) -> Option<Decimal> {
        self.pegs.get(pair).copied()
    }
}

/// One sub-venue `setzer` is asked for a quote, e.g. `gemini` or `kraken`.
#[derive(Debug, Clone)]
pub struct VenueQuery {
    pub venue: String,
    pub setzer_symbol: String,
}

/// Invokes the external `setzer` binary once per configured sub-venue and
/// computes a trimmed mean: sort the successful quotes, drop the lowest and
/// highest, average what remains. Requires at least 3 successful quotes —
/// fewer than that and the cycle for this pair is skipped rather than
/// trusting a thin sample (spec.md §4.3, §8 trimmed-mean property).
#[derive(Debug, Clone)]
pub struct SetzerOracle {
    setzer_path: String,
    per_call_timeout: Duration,
    venues: HashMap<String, Vec<VenueQuery>>,
}

impl SetzerOracle {
    pub fn new(setzer_path: String, per_call_timeout: Duration) -> Self {
        Self { setzer_path, per_call_timeout, venues: HashMap::new() }
    }

    pub fn with_venues(mut self, pair: &str, venues: Vec<VenueQuery>) -> Self {
        self.venues.insert(pair.to_string(), venues);
        self
    }

    async fn query_one(&self, query: &VenueQuery) -> Option<Decimal> {
        let call = Command::new(&self.setzer_path)
            .arg("price")
            .arg(&query.setzer_symbol)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output();

        let output = match timeout(self.per_call_timeout, call).await {
            Ok(Ok(output)) if output.status.success() => output,
            Ok(Ok(output)) => {
                log::warn!(
                    "[ORACLE] setzer exited nonzero for venue {} ({})",
                    query.venue,
                    output.status
                );
                return None;
            }
            Ok(Err(err)) => {
                log::warn!("[ORACLE] failed to spawn setzer for venue {}: {}", query.venue, err);
                return None;
            }
            Err(_) => {
                log::warn!("[ORACLE] setzer timed out for venue {}", query.venue);
                return None;
            }
        };

        let text = String::from_utf8_lossy(&output.stdout);
        match text.trim().parse::<Decimal>() {
            Ok(price) => Some(price),
            Err(err) => {
                log::warn!("[ORACLE] unparseable price from venue {}: {:?} ({})", query.venue, text, err);
                None
            }
        }
    }
}

#[async_trait]
impl PriceOracle for SetzerOracle {
    async fn reference_price(&self, pair: &str) -> Option<Decimal> {
        let queries = self.venues.get(pair)?;
        let mut quotes = Vec::with_capacity(queries.len());
        for query in queries {
            if let Some(price) = self.query_one(query).await {
                quotes.push(price);
            }
        }

        match trimmed_mean(&quotes) {
            Some(price) => Some(price),
            None => {
                log::warn!(
                    "[ORACLE] insufficient quotes for {}: {} of {} sub-venues responded",
                    pair,
                    quotes.len(),
                    queries.len()
                );
                None
            }
        }
    }
}

/// Drops the minimum and maximum of `quotes` and averages the remainder.
/// Returns `None` if fewer than 3 quotes were supplied — a trimmed mean is
/// meaningless below that. Order-independent: the result only depends on
/// the multiset of values.
pub fn trimmed_mean(quotes: &[Decimal]) -> Option<Decimal> {
    if quotes.len() < 3 {
        return None;
    }
    let mut sorted = quotes.to_vec();
    sorted.sort();
    let trimmed = &sorted[1..sorted.len() - 1];
    let sum: Decimal = trimmed.iter().sum();
    Some(sum / Decimal::from(trimmed.len() as u64))
}

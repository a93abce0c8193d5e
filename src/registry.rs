// ─────────────────────────────────────────────────────────────────────────────
// registry.rs — Trading Pair Registry
//
// Maps a pair code (e.g. "ETHDAI") to its two token symbols and to the
// per-exchange metadata the reconciler and gateway need to talk about it:
// the exchange-native pair code and the decimal-place precision record for
// outbound order parameters.
// ─────────────────────────────────────────────────────────────────────────────
use std::collections::HashMap;
use serde::{Deserialize, Serialize};

/// Decimal-place precision for outbound order parameters on one pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Precision {
    pub bid_price_dp: u32,
    pub ask_price_dp: u32,
    pub bid_amount_dp: u32,
    pub ask_amount_dp: u32,
}

impl Default for Precision {
    fn default() -> Self {
        Self { bid_price_dp: 6, ask_price_dp: 6, bid_amount_dp: 6, ask_amount_dp: 6 }
    }
}

/// Everything the reconciler/gateway need to know about a trading pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    pub base: String,
    pub quote: String,
    /// The exchange's own code for this pair, if it differs from ours.
    pub exchange_pair_code: String,
    pub precision: Precision,
}

/// In-memory pair → metadata table. Starts from a small built-in default
/// (the pairs the original market-maker shipped) and can be extended from
/// a config file at startup.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pairs: HashMap<String, PairInfo>,
}

impl Registry {
    pub fn new() -> Self {
        Self { pairs: HashMap::new() }
    }

    /// The default table: DAIUSD, ETHBTC, ETHDAI, MKRBTC, MKRETH.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.insert("DAIUSD", "DAI", "USD", "DAIUSD");
        reg.insert("ETHBTC", "ETH", "BTC", "ETHBTC");
        reg.insert("ETHDAI", "ETH", "DAI", "ETHDAI");
        reg.insert("MKRBTC", "MKR", "BTC", "MKRBTC");
        reg.insert("MKRETH", "MKR", "ETH", "MKRETH");
        reg
    }

    fn insert(&mut self, pair: &str, base: &str, quote: &str, exchange_pair_code: &str) {
        self.pairs.insert(
            pair.to_string(),
            PairInfo {
                base: base.to_string(),
                quote: quote.to_string(),
                exchange_pair_code: exchange_pair_code.to_string(),
                precision: Precision::default(),
            },
        );
    }

    pub fn insert_pair(&mut self, pair: String, info: PairInfo) {
        self.pairs.insert(pair, info);
    }

    pub fn get(&self, pair: &str) -> Option<&PairInfo> {
        self.pairs.get(pair)
    }

    pub fn contains(&self, pair: &str) -> bool {
        self.pairs.contains_key(pair)
    }

    /// The internal pair key whose `exchange_pair_code` matches `exchange_code`,
    /// or `None` if no registered pair uses that exchange-native code. Used to
    /// recognize orders the exchange reports as belonging to a registered pair
    /// even when its own pair code differs from ours.
    pub fn pair_for_exchange_code(&self, exchange_code: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(_, info)| info.exchange_pair_code == exchange_code)
            .map(|(pair, _)| pair.as_str())
    }

    /// Base/quote token symbols for a pair, mirroring the original's
    /// `LookupTokenPair`.
    pub fn lookup_token_pair(&self, pair: &str) -> Option<(&str, &str)> {
        self.pairs.get(pair).map(|p| (p.base.as_str(), p.quote.as_str()))
    }

    pub fn pairs(&self) -> impl Iterator<Item = &String> {
        self.pairs.keys()
    }
}

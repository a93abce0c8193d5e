// ─────────────────────────────────────────────────────────────────────────────
// config.rs — Credentials, runtime settings and band profiles
//
// Three JSON files feed this process: exchange credentials, runtime
// settings (log path, setzer path, tick interval, active pairs) and the
// band profile per pair. All three are loaded once at startup and any
// failure is fatal — there is no partial-config fallback (original's
// `config.go` `LoadCredentials`/`LoadConfig`, generalized to also load and
// validate the band profile).
// ─────────────────────────────────────────────────────────────────────────────
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::bands::{validate_profile, Band, BandParams, ProfileError, Side};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Json { path: String, source: serde_json::Error },
    #[error("band profile for pair {pair} is invalid: {source}")]
    InvalidProfile { pair: String, source: ProfileError },
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let path_str = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path_str.clone(), source })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Json { path: path_str, source })
}

// ─── Credentials ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }
}

// ─── Runtime settings ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub log_path: String,
    pub setzer_path: String,
    pub active_pairs: Vec<String>,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    5_000
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

// ─── Band profile ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPairBands {
    buy_bands: Vec<BandParams>,
    sell_bands: Vec<BandParams>,
}

/// One pair's validated band set, ready for the reconciler.
#[derive(Debug, Clone)]
pub struct PairBands {
    pub buy_bands: Vec<Band>,
    pub sell_bands: Vec<Band>,
}

/// `pair -> {buyBands, sellBands}`, loaded once at startup and validated
/// before the first reconciliation cycle runs. A single invalid or
/// overlapping band aborts startup, naming the offending pair (spec.md §3,
/// §7 — configuration errors are fatal, not skip-and-continue).
#[derive(Debug, Clone, Default)]
pub struct BandProfile {
    pairs: HashMap<String, PairBands>,
}

impl BandProfile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw: HashMap<String, RawPairBands> = load_json(path)?;
        let mut pairs = HashMap::new();

        for (pair, raw_bands) in raw {
            validate_profile(&raw_bands.buy_bands, &raw_bands.sell_bands)
                .map_err(|source| ConfigError::InvalidProfile { pair: pair.clone(), source })?;

            let buy_bands = raw_bands.buy_bands.into_iter().map(|params| Band { side: Side::Buy, params }).collect();
            let sell_bands = raw_bands.sell_bands.into_iter().map(|params| Band { side: Side::Sell, params }).collect();
            pairs.insert(pair, PairBands { buy_bands, sell_bands });
        }

        Ok(Self { pairs })
    }

    pub fn get(&self, pair: &str) -> Option<&PairBands> {
        self.pairs.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &String> {
        self.pairs.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_tmp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn malformed_json_is_rejected() {
        let file = write_tmp("{ not json");
        let err = BandProfile::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn invalid_band_names_the_pair() {
        let json = r#"{
            "ETHDAI": {
                "buyBands": [{"minMargin": "0", "avgMargin": "0.01", "maxMargin": "0.02", "minAmount": "10", "avgAmount": "40", "maxAmount": "80", "dustCutoff": "0"}],
                "sellBands": []
            }
        }"#;
        let file = write_tmp(json);
        let err = BandProfile::load(file.path()).unwrap_err();
        match err {
            ConfigError::InvalidProfile { pair, .. } => assert_eq!(pair, "ETHDAI"),
            other => panic!("expected InvalidProfile, got {:?}", other),
        }
    }

    #[test]
    fn overlapping_bands_are_rejected() {
        let json = r#"{
            "ETHDAI": {
                "buyBands": [
                    {"minMargin": "0.01", "avgMargin": "0.02", "maxMargin": "0.04", "minAmount": "10", "avgAmount": "40", "maxAmount": "80", "dustCutoff": "0"},
                    {"minMargin": "0.03", "avgMargin": "0.04", "maxMargin": "0.05", "minAmount": "10", "avgAmount": "40", "maxAmount": "80", "dustCutoff": "0"}
                ],
                "sellBands": []
            }
        }"#;
        let file = write_tmp(json);
        let err = BandProfile::load(file.path()).unwrap_err();
        match err {
            ConfigError::InvalidProfile { pair, source: ProfileError::Overlap { .. } } => assert_eq!(pair, "ETHDAI"),
            other => panic!("expected overlap InvalidProfile, got {:?}", other),
        }
    }

    #[test]
    fn valid_profile_loads() {
        let json = r#"{
            "ETHDAI": {
                "buyBands": [{"minMargin": "0.002344", "avgMargin": "0.004689", "maxMargin": "0.009378", "minAmount": "10", "avgAmount": "40", "maxAmount": "80", "dustCutoff": "0"}],
                "sellBands": [{"minMargin": "0.1", "avgMargin": "0.15", "maxMargin": "0.2", "minAmount": "4", "avgAmount": "6", "maxAmount": "8", "dustCutoff": "0.01"}]
            }
        }"#;
        let file = write_tmp(json);
        let profile = BandProfile::load(file.path()).unwrap();
        let pair = profile.get("ETHDAI").unwrap();
        assert_eq!(pair.buy_bands.len(), 1);
        assert_eq!(pair.sell_bands.len(), 1);
    }
}

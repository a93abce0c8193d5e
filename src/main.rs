// ─────────────────────────────────────────────────────────────────────────────
// band-maker-rs: automated band-based market-making control loop
// ─────────────────────────────────────────────────────────────────────────────
mod bands;
mod config;
mod driver;
mod gateway;
mod oracle;
mod orderbook;
mod reconcile;
mod registry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::{BandProfile, Credentials, RuntimeConfig};
use driver::Driver;
use gateway::{ExchangeGateway, HttpGateway, SimGateway};
use oracle::PriceOracle;
use registry::Registry;

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("band-maker-rs starting…");

    let config_path = env_path("MM_CONFIG_PATH", "config.json");
    let credentials_path = env_path("MM_CREDENTIALS_PATH", "credentials.json");
    let bands_path = env_path("MM_BANDS_PATH", "bands.json");

    let runtime_config = RuntimeConfig::load(&config_path)
        .unwrap_or_else(|err| panic!("failed to load runtime config from {}: {}", config_path.display(), err));
    let bands_profile = BandProfile::load(&bands_path)
        .unwrap_or_else(|err| panic!("failed to load band profile from {}: {}", bands_path.display(), err));

    let shadow_mode = std::env::var("MM_SHADOW_MODE").map(|v| v != "false" && v != "0").unwrap_or(true);
    log::info!("  Shadow Mode:     {}", if shadow_mode { "ON (no real orders)" } else { "LIVE" });
    log::info!("  Active pairs:    {:?}", runtime_config.active_pairs);
    log::info!("  Tick interval:   {}ms", runtime_config.tick_interval_ms);
    log::info!("  Setzer path:     {}", runtime_config.setzer_path);

    let registry = Registry::with_defaults();

    let gateway: Arc<dyn ExchangeGateway> = if shadow_mode {
        Arc::new(SimGateway::new(Default::default()))
    } else {
        let credentials = Credentials::load(&credentials_path)
            .unwrap_or_else(|err| panic!("failed to load credentials from {}: {}", credentials_path.display(), err));
        let base_url = std::env::var("MM_EXCHANGE_BASE_URL").expect("MM_EXCHANGE_BASE_URL must be set in live mode");
        Arc::new(HttpGateway::new(base_url, credentials.api_key, credentials.api_secret))
    };

    let oracle: Arc<dyn PriceOracle> = build_oracle(&runtime_config);

    let driver = Driver {
        registry,
        profile: bands_profile,
        active_pairs: runtime_config.active_pairs.clone(),
        gateway,
        oracle,
        tick_interval: runtime_config.tick_interval(),
    };

    driver.run().await;
}

/// Builds the price oracle: a fixed peg for stable-to-stable pairs plus a
/// setzer-backed trimmed-mean oracle for everything else, matching the
/// original's split between constant and live reference prices.
fn build_oracle(runtime_config: &RuntimeConfig) -> Arc<dyn PriceOracle> {
    use oracle::{PeggedOracle, SetzerOracle, VenueQuery};
    use rust_decimal_macros::dec;

    let per_call_timeout = Duration::from_secs(5);
    let setzer = SetzerOracle::new(runtime_config.setzer_path.clone(), per_call_timeout).with_venues(
        "ETHDAI",
        vec![
            VenueQuery { venue: "gemini".to_string(), setzer_symbol: "gemini_ethusd".to_string() },
            VenueQuery { venue: "kraken".to_string(), setzer_symbol: "kraken_ethusd".to_string() },
            VenueQuery { venue: "bitstamp".to_string(), setzer_symbol: "bitstamp_ethusd".to_string() },
        ],
    );

    struct CompositeOracle {
        pegged: PeggedOracle,
        live: SetzerOracle,
    }

    #[async_trait::async_trait]
    impl PriceOracle for CompositeOracle {
        async fn reference_price(&self, pair: &str) -> Option<rust_decimal::Decimal> {
            if let Some(price) = self.pegged.reference_price(pair).await {
                return Some(price);
            }
            self.live.reference_price(pair).await
        }
    }

    Arc::new(CompositeOracle { pegged: PeggedOracle::new().with_peg("DAIUSD", dec!(1.00)), live: setzer })
}

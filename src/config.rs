// ===============================
// src/config.rs
// ===============================
//
// Env-driven configuration. Everything has a default except where a value is
// malformed or names an unknown feed -- those are fatal at startup (exit 2),
// never retried.
//
use std::str::FromStr;

use dotenvy::dotenv;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::detector::DetectorCfg;
use crate::feed::{FeedCfg, FeedKind};
use crate::gate::GateCfg;
use crate::gateway::SimCfg;
use crate::strategy::StrategyCfg;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown feed '{0}' (known: binance, hyperliquid)")]
    UnknownFeed(String),
    #[error("invalid value '{value}' for {key}")]
    BadValue { key: String, value: String },
    #[error("no symbols configured")]
    NoSymbols,
    #[error("no feeds configured and no ORACLE_URL set")]
    NoFeeds,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub symbols: Vec<String>,
    pub feeds: Vec<FeedCfg>,

    // Optional REST polling feed (oracle gateway)
    pub oracle_url: Option<String>,
    pub oracle_poll_secs: u64,

    pub detector: DetectorCfg,
    pub gate: GateCfg,
    pub strategy: StrategyCfg,
    pub sim: SimCfg,
    /// Venues the simulator answers for; orders to any other venue are
    /// rejected as unreachable.
    pub sim_venues: Vec<String>,

    pub metrics_port: u16,
    pub record_file: Option<String>,
}

fn parse<T: FromStr>(get: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::BadValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

fn parse_opt<T: FromStr>(get: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::BadValue { key: key.to_string(), value: raw }),
    }
}

fn parse_list(raw: Option<String>, default: &[&str]) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|x| x.trim())
            .filter(|x| !x.is_empty())
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
    })
    .filter(|v: &Vec<String>| !v.is_empty())
    .unwrap_or_else(|| default.iter().map(|s| s.to_string()).collect())
}

/// Load from the process environment (reads `.env` first).
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenv();
    load_from(&|key| std::env::var(key).ok())
}

/// Testable core: all lookups go through `get`.
pub fn load_from(get: &dyn Fn(&str) -> Option<String>) -> Result<Config, ConfigError> {
    // ===== Symbol universe =====
    let symbols: Vec<String> = parse_list(get("SYMBOLS"), &["BTC", "ETH"])
        .into_iter()
        .map(|s| s.to_ascii_uppercase())
        .collect();
    if symbols.is_empty() {
        return Err(ConfigError::NoSymbols);
    }

    // ===== Feeds =====
    // FEEDS=binance,hyperliquid ; each name maps to a venue, a wire protocol
    // and a default websocket endpoint.
    let feed_names = parse_list(get("FEEDS"), &["binance", "hyperliquid"]);
    let heartbeat_secs = parse(get, "HEARTBEAT_SECS", 30u64)?;
    let reconnect_base_secs = parse(get, "RECONNECT_BASE_SECS", 1u64)?;
    let reconnect_cap_secs = parse(get, "RECONNECT_CAP_SECS", 60u64)?;

    let mut feeds = Vec::new();
    for name in &feed_names {
        let (venue, kind, url_key, default_url) = match name.to_ascii_lowercase().as_str() {
            "binance" => (
                "BINANCE",
                FeedKind::BookTicker,
                "BINANCE_WS_URL",
                "wss://stream.binance.com:9443/ws",
            ),
            "hyperliquid" => (
                "HYPERLIQUID",
                FeedKind::AllMids,
                "HYPERLIQUID_WS_URL",
                "wss://api.hyperliquid.xyz/ws",
            ),
            other => return Err(ConfigError::UnknownFeed(other.to_string())),
        };
        // Per-venue symbol override, e.g. BINANCE_SYMBOLS=BTC,ETH
        let venue_symbols: Vec<String> = match get(&format!("{venue}_SYMBOLS")) {
            Some(raw) => parse_list(Some(raw), &[])
                .into_iter()
                .map(|s| s.to_ascii_uppercase())
                .collect(),
            None => symbols.clone(),
        };
        feeds.push(FeedCfg {
            venue: venue.to_string(),
            kind,
            ws_url: get(url_key).unwrap_or_else(|| default_url.to_string()),
            symbols: venue_symbols,
            heartbeat_secs,
            reconnect_base_secs,
            reconnect_cap_secs,
        });
    }

    let oracle_url = get("ORACLE_URL");
    let oracle_poll_secs = parse(get, "ORACLE_POLL_SECS", 11u64)?;

    if feeds.is_empty() && oracle_url.is_none() {
        return Err(ConfigError::NoFeeds);
    }

    // ===== Detector =====
    let detector = DetectorCfg {
        profit_threshold: parse(get, "PROFIT_THRESHOLD", dec!(0.002))?,
        quote_ttl_ns: parse(get, "QUOTE_TTL_MS", 10_000u64)? as i128 * 1_000_000,
        include_mid_only: parse(get, "INCLUDE_MID_ONLY", true)?,
    };

    // ===== Gate / strategy =====
    let gate = GateCfg {
        min_profit: parse(get, "MIN_PROFIT_THRESHOLD", dec!(0.005))?,
        max_age_ns: parse(get, "MAX_AGE_MS", 5_000u64)? as i128 * 1_000_000,
    };
    let strategy = StrategyCfg {
        max_position_size: parse(get, "MAX_POSITION_SIZE", dec!(1000))?,
        max_units: dec!(100),
    };

    // ===== Execution simulator =====
    let sim = SimCfg {
        fill_delay_ms: parse(get, "FILL_DELAY_MS", 100u64)?,
        reject_prob: parse(get, "REJECT_PROB", 0.05f64)?,
        slippage_band: parse(get, "SLIPPAGE_BAND", 0.0005f64)?,
        reference_px: parse(get, "REFERENCE_PX", dec!(50000))?,
        seed: parse_opt(get, "SIM_SEED")?,
    };
    let sim_venues = match get("SIM_VENUES") {
        Some(raw) => parse_list(Some(raw), &[]),
        None => feeds.iter().map(|f| f.venue.clone()).collect(),
    };

    Ok(Config {
        symbols,
        feeds,
        oracle_url,
        oracle_poll_secs,
        detector,
        gate,
        strategy,
        sim,
        sim_venues,
        metrics_port: parse(get, "METRICS_PORT", 9898u16)?,
        record_file: get("RECORD_FILE"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::AHashMap as HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_load() {
        let cfg = load_from(&env(&[])).unwrap();
        assert_eq!(cfg.symbols, vec!["BTC", "ETH"]);
        assert_eq!(cfg.feeds.len(), 2);
        assert_eq!(cfg.feeds[0].venue, "BINANCE");
        assert_eq!(cfg.feeds[1].venue, "HYPERLIQUID");
        assert_eq!(cfg.detector.profit_threshold, dec!(0.002));
        assert_eq!(cfg.gate.max_age_ns, 5_000_000_000);
        assert_eq!(cfg.sim.fill_delay_ms, 100);
        assert_eq!(cfg.sim_venues, vec!["BINANCE", "HYPERLIQUID"]);
        assert!(cfg.oracle_url.is_none());
        assert!(cfg.sim.seed.is_none());
    }

    #[test]
    fn unknown_feed_is_fatal() {
        let err = load_from(&env(&[("FEEDS", "binance,kraken")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFeed(name) if name == "kraken"));
    }

    #[test]
    fn malformed_number_is_fatal() {
        let err = load_from(&env(&[("HEARTBEAT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { key, .. } if key == "HEARTBEAT_SECS"));
    }

    #[test]
    fn malformed_threshold_is_fatal() {
        let err = load_from(&env(&[("PROFIT_THRESHOLD", "0,002")])).unwrap_err();
        assert!(matches!(err, ConfigError::BadValue { key, .. } if key == "PROFIT_THRESHOLD"));
    }

    #[test]
    fn overrides_apply() {
        let cfg = load_from(&env(&[
            ("SYMBOLS", "sol , avax"),
            ("FEEDS", "hyperliquid"),
            ("HYPERLIQUID_SYMBOLS", "sol"),
            ("PROFIT_THRESHOLD", "0.01"),
            ("SIM_SEED", "42"),
            ("SIM_VENUES", "HYPERLIQUID,BINANCE"),
            ("ORACLE_URL", "https://oracle.example/v2/latest"),
        ]))
        .unwrap();
        assert_eq!(cfg.symbols, vec!["SOL", "AVAX"]);
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].symbols, vec!["SOL"]);
        assert_eq!(cfg.detector.profit_threshold, dec!(0.01));
        assert_eq!(cfg.sim.seed, Some(42));
        assert_eq!(cfg.sim_venues.len(), 2);
        assert!(cfg.oracle_url.is_some());
    }
}

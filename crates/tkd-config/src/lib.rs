//! tkd-config
//!
//! Typed application configuration read from the environment.  The daemon
//! bootstraps `.env.local` via dotenvy before calling [`AppConfig::from_env`];
//! production injects env vars directly.
//!
//! The loaded config renders to sorted `key=value` lines and hashes with
//! SHA-256 so operators can tell at a glance whether two processes run the
//! same configuration.  Secrets (the db url) are excluded from the hashed
//! document.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

use tkd_schemas::Micros;

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Selects the synthetic feed; off means the core idles tick-less.
    pub use_synthetic_feed: bool,
    pub feed_symbols: Vec<String>,
    pub feed_tick_interval_ms: u64,
    pub feed_seed: Option<u64>,

    pub max_order_value: Micros,
    pub max_position_size: i64,
    /// Drawdown lock-out threshold as a fraction (0.10 = 10%).
    pub max_drawdown_pct: f64,

    pub risk_wait_ms: u64,
    pub slippage_bps: i64,
    pub max_qty_per_signal: i64,

    pub strategy_window: usize,
    pub strategy_entry_z: f64,

    pub initial_cash: Micros,

    /// Persistence is disabled when absent.
    pub db_url: Option<String>,
    pub api_addr: SocketAddr,
    pub log_level: String,
}

impl AppConfig {
    /// Built-in defaults, before any environment override.
    pub fn defaults() -> Self {
        Self {
            use_synthetic_feed: true,
            feed_symbols: vec!["ACME".to_string(), "BAR".to_string(), "FOO".to_string()],
            feed_tick_interval_ms: 250,
            feed_seed: None,
            max_order_value: Micros::from_units(50_000),
            max_position_size: 1_000,
            max_drawdown_pct: 0.10,
            risk_wait_ms: 50,
            slippage_bps: 5,
            max_qty_per_signal: 100,
            strategy_window: 20,
            strategy_entry_z: 2.0,
            initial_cash: Micros::from_units(100_000),
            db_url: None,
            api_addr: SocketAddr::from(([127, 0, 0, 1], 8890)),
            log_level: "info".to_string(),
        }
    }

    /// Read the configuration from the environment on top of the defaults.
    ///
    /// # Errors
    /// Unparseable values are hard errors naming the offending variable.
    pub fn from_env() -> Result<Self> {
        let base = Self::defaults();

        let cfg = Self {
            use_synthetic_feed: parse_bool("USE_SYNTHETIC_FEED", base.use_synthetic_feed)?,
            feed_symbols: match env_var("FEED_SYMBOLS") {
                Some(raw) => raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
                None => base.feed_symbols,
            },
            feed_tick_interval_ms: parse_env("FEED_TICK_INTERVAL_MS", base.feed_tick_interval_ms)?,
            feed_seed: match env_var("FEED_SEED") {
                Some(raw) => Some(raw.parse().context("parse FEED_SEED")?),
                None => None,
            },
            max_order_value: parse_env("MAX_ORDER_VALUE", base.max_order_value)?,
            max_position_size: parse_env("MAX_POSITION_SIZE", base.max_position_size)?,
            max_drawdown_pct: parse_env("MAX_DRAWDOWN_PCT", base.max_drawdown_pct)?,
            risk_wait_ms: parse_env("RISK_WAIT_MS", base.risk_wait_ms)?,
            slippage_bps: parse_env("SLIPPAGE_BPS", base.slippage_bps)?,
            max_qty_per_signal: parse_env("MAX_QTY_PER_SIGNAL", base.max_qty_per_signal)?,
            strategy_window: parse_env("STRATEGY_WINDOW", base.strategy_window)?,
            strategy_entry_z: parse_env("STRATEGY_ENTRY_Z", base.strategy_entry_z)?,
            initial_cash: parse_env("INITIAL_CASH", base.initial_cash)?,
            db_url: env_var("DB_URL"),
            api_addr: parse_env("API_ADDR", base.api_addr)?,
            log_level: env_var("LOG_LEVEL").unwrap_or(base.log_level),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.feed_symbols.is_empty() {
            bail!("FEED_SYMBOLS must name at least one symbol");
        }
        if !(0.0..1.0).contains(&self.max_drawdown_pct) {
            bail!(
                "MAX_DRAWDOWN_PCT must be in [0, 1), got {}",
                self.max_drawdown_pct
            );
        }
        if !(0..10_000).contains(&self.slippage_bps) {
            bail!("SLIPPAGE_BPS must be in [0, 10000), got {}", self.slippage_bps);
        }
        if self.strategy_window < 2 {
            bail!(
                "STRATEGY_WINDOW must be at least 2, got {}",
                self.strategy_window
            );
        }
        if self.strategy_entry_z < 0.0 {
            bail!(
                "STRATEGY_ENTRY_Z must be non-negative, got {}",
                self.strategy_entry_z
            );
        }
        if self.max_qty_per_signal <= 0 {
            bail!(
                "MAX_QTY_PER_SIGNAL must be positive, got {}",
                self.max_qty_per_signal
            );
        }
        Ok(())
    }

    /// Drawdown limit as a 1e-6 fraction, for integer comparisons.
    pub fn max_drawdown_fraction_micros(&self) -> i64 {
        (self.max_drawdown_pct * 1_000_000.0).round() as i64
    }

    /// SHA-256 over a canonical rendering of everything non-secret: one
    /// `key=value` line per field, keys sorted.  The config document is
    /// flat, so sorted lines are canonical without a JSON round-trip.  The
    /// db url never enters the hash; only whether persistence is on.
    pub fn config_hash(&self) -> String {
        let mut doc: BTreeMap<&str, String> = BTreeMap::new();
        doc.insert("api_addr", self.api_addr.to_string());
        doc.insert(
            "feed_seed",
            self.feed_seed.map(|s| s.to_string()).unwrap_or_default(),
        );
        doc.insert("feed_symbols", self.feed_symbols.join(","));
        doc.insert(
            "feed_tick_interval_ms",
            self.feed_tick_interval_ms.to_string(),
        );
        doc.insert("initial_cash", self.initial_cash.to_string());
        doc.insert("log_level", self.log_level.clone());
        doc.insert("max_drawdown_pct", self.max_drawdown_pct.to_string());
        doc.insert("max_order_value", self.max_order_value.to_string());
        doc.insert("max_position_size", self.max_position_size.to_string());
        doc.insert("max_qty_per_signal", self.max_qty_per_signal.to_string());
        doc.insert("persistence_enabled", self.db_url.is_some().to_string());
        doc.insert("risk_wait_ms", self.risk_wait_ms.to_string());
        doc.insert("slippage_bps", self.slippage_bps.to_string());
        doc.insert("strategy_entry_z", self.strategy_entry_z.to_string());
        doc.insert("strategy_window", self.strategy_window.to_string());
        doc.insert("use_synthetic_feed", self.use_synthetic_feed.to_string());

        let mut hasher = Sha256::new();
        for (key, value) in &doc {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Env helpers
// ---------------------------------------------------------------------------

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => match raw.parse() {
            Ok(v) => Ok(v),
            Err(err) => bail!("parse {key}={raw}: {err}"),
        },
        None => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> Result<bool> {
    match env_var(key) {
        Some(raw) => {
            if raw == "1" || raw.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if raw == "0" || raw.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                bail!("parse {key}={raw}: expected one of 1/0/true/false")
            }
        }
        None => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

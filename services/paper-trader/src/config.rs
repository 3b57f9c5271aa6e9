//! Bot Configuration
//!
//! `Settings` holds endpoints and credentials read from the environment.
//! `EngineConfig` holds the trading-engine constants; the binary always uses
//! its defaults, tests shorten the durations.

use market_feed::FeedSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::indicators::IndicatorPeriods;
use crate::journal::DEFAULT_LOG_CAPACITY;
use crate::reasoning::{DEFAULT_GATEWAY_URL, DEFAULT_TIMEOUT_SECS};
use crate::types::RiskLevel;

/// Environment variable prefix, e.g. `PAPER_TRADER_GATEWAY_URL`
pub const ENV_PREFIX: &str = "PAPER_TRADER";

/// Runtime settings loaded from the environment
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Reasoning gateway base URL
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,
    #[serde(default = "default_finnhub_ws_url")]
    pub finnhub_ws_url: String,
    /// Without a key the bot trades on simulated prices
    #[serde(default, skip_serializing)]
    pub finnhub_api_key: Option<String>,
    #[serde(default = "default_feed_symbol")]
    pub feed_symbol: String,
    #[serde(default = "default_asset_name")]
    pub asset_name: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How often the binary prints a snapshot
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            finnhub_ws_url: default_finnhub_ws_url(),
            finnhub_api_key: None,
            feed_symbol: default_feed_symbol(),
            asset_name: default_asset_name(),
            risk_level: RiskLevel::default(),
            log_level: default_log_level(),
            report_interval_secs: default_report_interval_secs(),
        }
    }
}

fn default_gateway_url() -> String { DEFAULT_GATEWAY_URL.to_string() }
fn default_gateway_timeout_secs() -> u64 { DEFAULT_TIMEOUT_SECS }
fn default_finnhub_ws_url() -> String { "wss://ws.finnhub.io".to_string() }
fn default_feed_symbol() -> String { "BINANCE:BTCUSDT".to_string() }
fn default_asset_name() -> String { "BTC".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_report_interval_secs() -> u64 { 15 }

impl Settings {
    /// Load from `PAPER_TRADER_*` variables.
    ///
    /// A bare `FINNHUB_API_KEY` is used when the prefixed key is unset.
    pub fn load() -> anyhow::Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        Ok(settings.with_key_fallback(std::env::var("FINNHUB_API_KEY").ok()))
    }

    fn with_key_fallback(mut self, fallback: Option<String>) -> Self {
        self.finnhub_api_key = self
            .finnhub_api_key
            .take()
            .or(fallback)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }

    /// Tracing level, falling back to INFO on an unknown name
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }

    /// Feed settings with the fixed feed constants
    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            ws_url: self.finnhub_ws_url.clone(),
            api_key: self.finnhub_api_key.clone(),
            symbol: self.feed_symbol.clone(),
            ..FeedSettings::default()
        }
    }
}

/// Trading-engine constants
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bar bucket width
    pub bar_width: Duration,
    /// Bars kept in history
    pub max_bars: usize,
    /// Decision cycle period
    pub cycle_period: Duration,
    /// First cycle after start, slightly after the first bar can form
    pub initial_delay: Duration,
    pub periods: IndicatorPeriods,
    pub initial_cash: f64,
    /// Trade log and decision log capacity
    pub log_capacity: usize,
    /// Buys need strictly more cash than this
    pub min_trade_cash: f64,
    /// Bars included in each decision request
    pub recent_bars: usize,
    /// Also run a cycle whenever a tick opens a new bar
    pub decide_on_new_bar: bool,
    pub asset_name: String,
    pub risk_level: RiskLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bar_width: Duration::from_secs(15),
            max_bars: 100,
            cycle_period: Duration::from_secs(15),
            initial_delay: Duration::from_millis(2100),
            periods: IndicatorPeriods::default(),
            initial_cash: 10_000.0,
            log_capacity: DEFAULT_LOG_CAPACITY,
            min_trade_cash: 10.0,
            recent_bars: 5,
            decide_on_new_bar: false,
            asset_name: default_asset_name(),
            risk_level: RiskLevel::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with the asset and risk level taken from `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            asset_name: settings.asset_name.clone(),
            risk_level: settings.risk_level,
            ..Self::default()
        }
    }
}

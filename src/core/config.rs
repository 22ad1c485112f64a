// Configuration for the Market Pulse Pipeline
// JSON file + environment overrides, validated at startup

use crate::core::types::Timeframe;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Process-wide configuration. Defaults reproduce the reference deployment:
/// BTCUSDT spot klines, 500-candle buffers, 30 days of bootstrap history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub symbol: String,
    pub ws_base_url: String,
    pub rest_base_url: String,

    /// Per-timeframe candle buffer bound.
    pub max_candles: usize,
    /// Days of history fetched per timeframe at startup.
    pub bootstrap_days: u32,
    /// Timeout applied to each historical REST call.
    pub request_timeout_secs: u64,
    /// Liveness ping interval on the feed connection.
    pub heartbeat_interval_secs: u64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            ws_base_url: "wss://stream.binance.com:9443".to_string(),
            rest_base_url: "https://api.binance.com".to_string(),
            max_candles: 500,
            bootstrap_days: 30,
            request_timeout_secs: 10,
            heartbeat_interval_secs: 30,
        }
    }
}

impl PulseConfig {
    /// Load configuration: defaults, then an optional JSON file, then
    /// environment overrides. A missing file is logged, not fatal.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                config = serde_json::from_str(&content)?;
                info!(path = path, "Configuration loaded");
            } else {
                warn!(path = path, "Config file not found, using defaults");
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn apply_env(&mut self) {
        if let Ok(symbol) = std::env::var("PULSE_SYMBOL") {
            self.symbol = symbol;
        }
        if let Ok(url) = std::env::var("PULSE_WS_URL") {
            self.ws_base_url = url;
        }
        if let Ok(url) = std::env::var("PULSE_REST_URL") {
            self.rest_base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.is_empty() {
            return Err(ConfigError::Validation("symbol must not be empty".to_string()));
        }
        if self.max_candles < 30 {
            return Err(ConfigError::Validation(
                "max_candles must be at least 30 (pulse warm-up minimum)".to_string(),
            ));
        }
        if self.bootstrap_days == 0 {
            return Err(ConfigError::Validation("bootstrap_days must be >= 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "heartbeat_interval_secs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Combined-stream WebSocket URL subscribing to klines for every
    /// timeframe at once.
    pub fn stream_url(&self) -> String {
        let streams: Vec<String> = Timeframe::ALL
            .iter()
            .map(|tf| format!("{}@kline_{}", self.symbol.to_lowercase(), tf.interval()))
            .collect();
        format!("{}/stream?streams={}", self.ws_base_url, streams.join("/"))
    }

    /// Historical klines REST endpoint.
    pub fn klines_url(&self) -> String {
        format!("{}/api/v3/klines", self.rest_base_url)
    }
}

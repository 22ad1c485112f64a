// Historical Bootstrap
// Seeds the candle store from the klines REST endpoint before the live
// feed takes over.

use crate::core::config::PulseConfig;
use crate::core::types::{Candle, Timeframe};
use crate::store::CandleStore;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Hard per-request row cap imposed by the exchange.
pub const BINANCE_MAX_KLINES: usize = 1_000;

#[derive(Debug, Error)]
pub enum HistoricalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed kline row: {0}")]
    MalformedRow(String),
}

/// Candles needed to cover `days` of history on a timeframe, capped at the
/// exchange's per-request limit.
pub fn candle_limit(timeframe: Timeframe, days: u32) -> usize {
    ((timeframe.candles_per_day() * days) as usize).min(BINANCE_MAX_KLINES)
}

// Kline rows arrive as mixed-type arrays:
// [open_time, "open", "high", "low", "close", "volume", close_time, ...]
fn row_to_candle(row: &[serde_json::Value]) -> Result<Candle, HistoricalError> {
    let malformed = || HistoricalError::MalformedRow(format!("{:?}", row));

    if row.len() < 6 {
        return Err(malformed());
    }
    let timestamp = row[0].as_i64().ok_or_else(malformed)?;
    let mut fields = [0.0; 5];
    for (i, field) in fields.iter_mut().enumerate() {
        *field = row[i + 1]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(malformed)?;
    }
    Ok(Candle::new(timestamp, fields[0], fields[1], fields[2], fields[3], fields[4]))
}

/// Fetch historical candles for one timeframe.
pub async fn fetch_historical(
    client: &reqwest::Client,
    config: &PulseConfig,
    timeframe: Timeframe,
    days: u32,
) -> Result<Vec<Candle>, HistoricalError> {
    let limit = candle_limit(timeframe, days);
    let rows: Vec<Vec<serde_json::Value>> = client
        .get(config.klines_url())
        .query(&[
            ("symbol", config.symbol.as_str()),
            ("interval", timeframe.interval()),
            ("limit", &limit.to_string()),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    rows.iter().map(|row| row_to_candle(row)).collect()
}

/// Bootstrap every timeframe. A failed timeframe is logged and skipped so
/// the others still load; the live feed will fill the gap over time.
pub async fn initialize_all_timeframes(
    client: &reqwest::Client,
    config: &PulseConfig,
    store: &CandleStore,
) {
    info!(symbol = %config.symbol, days = config.bootstrap_days, "Bootstrapping historical candles");

    for tf in Timeframe::ALL {
        match fetch_historical(client, config, tf, config.bootstrap_days).await {
            Ok(candles) => {
                store.initialize_historical(tf, candles);
            }
            Err(e) => {
                error!(timeframe = %tf, error = %e, "Historical fetch failed, continuing without it");
            }
        }
        // Brief pause between requests to stay friendly to the API.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_candle_limit_per_timeframe() {
        // 30 days: 5m and 15m hit the request cap, 1h and 4h do not.
        assert_eq!(candle_limit(Timeframe::M5, 30), 1_000);
        assert_eq!(candle_limit(Timeframe::M15, 30), 1_000);
        assert_eq!(candle_limit(Timeframe::H1, 30), 720);
        assert_eq!(candle_limit(Timeframe::H4, 30), 180);
        assert_eq!(candle_limit(Timeframe::M5, 1), 288);
    }

    #[test]
    fn test_row_to_candle() {
        let row = vec![
            json!(1_700_000_000_000i64),
            json!("100.1"),
            json!("101.2"),
            json!("99.3"),
            json!("100.8"),
            json!("12.34"),
            json!(1_700_000_299_999i64),
        ];
        let candle = row_to_candle(&row).unwrap();
        assert_eq!(candle.timestamp, 1_700_000_000_000);
        assert_eq!(candle.open, 100.1);
        assert_eq!(candle.high, 101.2);
        assert_eq!(candle.low, 99.3);
        assert_eq!(candle.close, 100.8);
        assert_eq!(candle.volume, 12.34);
    }

    #[test]
    fn test_row_to_candle_rejects_bad_rows() {
        assert!(row_to_candle(&[json!(1), json!("1.0")]).is_err());

        let numeric_price = vec![
            json!(1_700_000_000_000i64),
            json!(100.1),
            json!("101.2"),
            json!("99.3"),
            json!("100.8"),
            json!("12.34"),
        ];
        assert!(row_to_candle(&numeric_price).is_err());
    }
}

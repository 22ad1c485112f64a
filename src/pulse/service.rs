// Pulse Service
// Turns a candle series into a full pulse record and watches for
// threshold crossings.

use crate::core::types::{Signal, Timeframe};
use crate::indicators::{calculate_indicators, IndicatorValues};
use crate::pulse::composite::{calculate_pulse_score, ScoreBreakdown, BEARISH_THRESHOLD, BULLISH_THRESHOLD};
use crate::store::CandleStore;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Minimum candles before a pulse is considered meaningful.
pub const MIN_PULSE_CANDLES: usize = 30;

/// OHLCV of the candle a pulse was computed against.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PriceSnapshot {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One complete pulse record for a symbol/timeframe pair. This is the
/// payload broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct PulseData {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Period-start timestamp of the candle scored.
    pub timestamp: i64,
    pub price: PriceSnapshot,
    pub indicators: IndicatorValues,
    pub pulse_score: f64,
    pub signal: Signal,
    pub breakdown: ScoreBreakdown,
}

/// Computes pulse records over a shared candle store.
pub struct PulseService {
    store: Arc<CandleStore>,
    symbol: String,
}

impl PulseService {
    pub fn new(store: Arc<CandleStore>, symbol: impl Into<String>) -> Self {
        Self {
            store,
            symbol: symbol.into(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Compute the pulse for one timeframe. `None` while the series is still
    /// warming up (fewer than `MIN_PULSE_CANDLES` candles).
    pub fn calculate_pulse(&self, timeframe: Timeframe) -> Option<PulseData> {
        let candles = self.store.get_candles(timeframe, None);
        if candles.len() < MIN_PULSE_CANDLES {
            debug!(
                timeframe = %timeframe,
                count = candles.len(),
                "Insufficient candles for pulse"
            );
            return None;
        }

        let latest = *candles.last()?;
        let indicators = calculate_indicators(&candles);
        let pulse = calculate_pulse_score(&indicators);

        Some(PulseData {
            symbol: self.symbol.clone(),
            timeframe,
            timestamp: latest.timestamp,
            price: PriceSnapshot {
                open: latest.open,
                high: latest.high,
                low: latest.low,
                close: latest.close,
                volume: latest.volume,
            },
            indicators,
            pulse_score: pulse.score,
            signal: pulse.signal,
            breakdown: pulse.breakdown,
        })
    }

    /// Compute pulses for every timeframe. Timeframes still warming up map
    /// to `None`.
    pub fn calculate_all_pulses(&self) -> HashMap<Timeframe, Option<PulseData>> {
        Timeframe::ALL
            .iter()
            .map(|&tf| (tf, self.calculate_pulse(tf)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    Up,
    Down,
}

impl fmt::Display for CrossDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrossDirection::Up => write!(f, "up"),
            CrossDirection::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdCrossing {
    pub threshold: f64,
    pub direction: CrossDirection,
}

/// Detect whether the score crossed the bearish or bullish threshold since
/// the previous pulse. The first pulse for a timeframe never crosses.
pub fn check_threshold_crossing(
    previous_score: Option<f64>,
    current_score: f64,
) -> Option<ThresholdCrossing> {
    let previous = previous_score?;

    for threshold in [BEARISH_THRESHOLD, BULLISH_THRESHOLD] {
        if previous < threshold && current_score >= threshold {
            return Some(ThresholdCrossing {
                threshold,
                direction: CrossDirection::Up,
            });
        }
        if previous > threshold && current_score <= threshold {
            return Some(ThresholdCrossing {
                threshold,
                direction: CrossDirection::Down,
            });
        }
    }
    None
}

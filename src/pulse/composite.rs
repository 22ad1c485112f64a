// Composite Pulse Scorer
// Normalizes each indicator to a shared 0-100 bullish scale, applies fixed
// weights and classifies the summed score.

use crate::core::types::Signal;
use crate::indicators::IndicatorValues;
use serde::Serialize;

/// Signal classification thresholds over the composite score.
pub const BEARISH_THRESHOLD: f64 = 20.0;
pub const BULLISH_THRESHOLD: f64 = 80.0;

const WEIGHT_ROC: f64 = 0.20;
const WEIGHT_STOCHASTIC: f64 = 0.15;
const WEIGHT_AD_OSC: f64 = 0.15;
const WEIGHT_CMF: f64 = 0.20;
const WEIGHT_RSI: f64 = 0.15;
const WEIGHT_MACD: f64 = 0.15;

/// Weighted per-indicator contributions to the composite score.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreBreakdown {
    pub roc: f64,
    pub stochastic: f64,
    pub ad_osc: f64,
    pub cmf: f64,
    pub rsi: f64,
    pub macd: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PulseScore {
    /// Composite 0-100 score, rounded to 2 decimal places.
    pub score: f64,
    pub signal: Signal,
    pub breakdown: ScoreBreakdown,
}

/// Map `value` from `[min, max]` onto 0-100, clamping first. With `invert`
/// the low end of the domain maps to 100.
fn normalize(value: f64, min: f64, max: f64, invert: bool) -> f64 {
    let clamped = value.clamp(min, max);
    let normalized = (clamped - min) / (max - min) * 100.0;
    if invert {
        100.0 - normalized
    } else {
        normalized
    }
}

/// Score one indicator snapshot. Each indicator is normalized so that
/// higher means more bullish, weighted and summed; low composite scores
/// denote bearish conditions, high scores bullish. VWAP is informational
/// and does not enter the composite.
pub fn calculate_pulse_score(indicators: &IndicatorValues) -> PulseScore {
    let breakdown = ScoreBreakdown {
        roc: normalize(indicators.roc, -10.0, 10.0, true) * WEIGHT_ROC,
        stochastic: (100.0 - indicators.stochastic) * WEIGHT_STOCHASTIC,
        ad_osc: normalize(indicators.ad_osc, -1_000_000.0, 1_000_000.0, true) * WEIGHT_AD_OSC,
        cmf: normalize(indicators.cmf, -1.0, 1.0, true) * WEIGHT_CMF,
        rsi: (100.0 - indicators.rsi) * WEIGHT_RSI,
        macd: normalize(indicators.macd.histogram, -500.0, 500.0, true) * WEIGHT_MACD,
    };

    let score = breakdown.roc
        + breakdown.stochastic
        + breakdown.ad_osc
        + breakdown.cmf
        + breakdown.rsi
        + breakdown.macd;

    let signal = if score <= BEARISH_THRESHOLD {
        Signal::Bearish
    } else if score >= BULLISH_THRESHOLD {
        Signal::Bullish
    } else {
        Signal::Neutral
    };

    PulseScore {
        score: (score * 100.0).round() / 100.0,
        signal,
        breakdown,
    }
}

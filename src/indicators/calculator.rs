// Technical Indicator Calculator
// ROC, Stochastic %K, A/D, session VWAP, CMF, Wilder RSI, MACD over one
// candle series. Every indicator degrades to a neutral default on short
// input instead of failing.

use crate::core::types::Candle;
use chrono::{Local, TimeZone, Utc};
use serde::Serialize;
use tracing::warn;

const ROC_PERIOD: usize = 14;
const STOCHASTIC_PERIOD: usize = 14;
const CMF_PERIOD: usize = 21;
const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// MACD line, signal line and histogram. Zeros until enough history exists
/// for each component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MacdValue {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// One complete indicator snapshot for a candle series.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndicatorValues {
    pub roc: f64,
    pub stochastic: f64,
    pub ad_osc: f64,
    pub vwap: f64,
    pub cmf: f64,
    pub rsi: f64,
    pub macd: MacdValue,
}

/// Compute every indicator over `candles` (oldest-first). Short series are
/// tolerated: each indicator falls back to its neutral default until its own
/// warm-up is met.
pub fn calculate_indicators(candles: &[Candle]) -> IndicatorValues {
    if candles.len() < 30 {
        warn!(count = candles.len(), "Computing indicators on a short series");
    }

    IndicatorValues {
        roc: rate_of_change(candles, ROC_PERIOD),
        stochastic: stochastic_k(candles, STOCHASTIC_PERIOD),
        ad_osc: ad_oscillator(candles),
        vwap: session_vwap(candles, start_of_local_day_ms()),
        cmf: chaikin_money_flow(candles, CMF_PERIOD),
        rsi: wilder_rsi(candles, RSI_PERIOD),
        macd: macd(candles, MACD_FAST, MACD_SLOW, MACD_SIGNAL),
    }
}

/// Rate of Change: percent move of the latest close against the close
/// `period` candles back. 0 until `period + 1` candles exist.
fn rate_of_change(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 0.0;
    }
    let current = candles[candles.len() - 1].close;
    let past = candles[candles.len() - 1 - period].close;
    if past == 0.0 {
        return 0.0;
    }
    (current - past) / past * 100.0
}

/// Stochastic %K over the last `period` candles. 0 until the window fills
/// or when the window is flat (highest high equals lowest low).
fn stochastic_k(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period {
        return 0.0;
    }
    let window = &candles[candles.len() - period..];
    let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if highest == lowest {
        return 0.0;
    }
    let close = candles[candles.len() - 1].close;
    (close - lowest) / (highest - lowest) * 100.0
}

/// Accumulation/Distribution line over the whole series. Flat candles carry
/// no money flow and are skipped.
fn ad_oscillator(candles: &[Candle]) -> f64 {
    candles
        .iter()
        .filter_map(|c| c.money_flow_multiplier().map(|mfm| mfm * c.volume))
        .sum()
}

/// Volume-weighted average price over candles belonging to the current
/// session (timestamp at or after `day_start_ms`). Falls back to the latest
/// close only when no candle is in the session yet; a session with zero
/// traded volume reports 0, and an empty series reports 0.
pub(crate) fn session_vwap(candles: &[Candle], day_start_ms: i64) -> f64 {
    let last_close = match candles.last() {
        Some(c) => c.close,
        None => return 0.0,
    };

    let mut pv_sum = 0.0;
    let mut vol_sum = 0.0;
    let mut in_session = false;
    for c in candles.iter().filter(|c| c.timestamp >= day_start_ms) {
        in_session = true;
        pv_sum += c.typical_price() * c.volume;
        vol_sum += c.volume;
    }
    if !in_session {
        return last_close;
    }
    if vol_sum == 0.0 {
        return 0.0;
    }
    pv_sum / vol_sum
}

/// Chaikin Money Flow over the last `period` candles. Flat candles are
/// excluded from both the money-flow sum and the volume sum. 0 when the
/// remaining volume is zero or the window has not filled.
fn chaikin_money_flow(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period {
        return 0.0;
    }
    let window = &candles[candles.len() - period..];
    let mut mfv_sum = 0.0;
    let mut vol_sum = 0.0;
    for c in window {
        if let Some(mfm) = c.money_flow_multiplier() {
            mfv_sum += mfm * c.volume;
            vol_sum += c.volume;
        }
    }
    if vol_sum == 0.0 {
        return 0.0;
    }
    mfv_sum / vol_sum
}

/// Wilder-smoothed RSI. Neutral 50 until `period + 1` candles exist; 100
/// when the smoothed loss is zero.
fn wilder_rsi(candles: &[Candle], period: usize) -> f64 {
    if candles.len() < period + 1 {
        return 50.0;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss += -delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for i in (period + 1)..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// SMA-seeded EMA series. Output index 0 corresponds to input index
/// `period - 1`; empty when the input is shorter than `period`.
fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if data.len() < period {
        return Vec::new();
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(data.len() - period + 1);
    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    out.push(seed);
    for &value in &data[period..] {
        let prev = out[out.len() - 1];
        out.push((value - prev) * multiplier + prev);
    }
    out
}

/// MACD(12, 26) with a 9-period signal. All zeros until 26 closes exist;
/// the signal and histogram stay 0 until the MACD line itself has 9 points.
fn macd(candles: &[Candle], fast: usize, slow: usize, signal_period: usize) -> MacdValue {
    if candles.len() < slow {
        return MacdValue::default();
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let fast_ema = ema(&closes, fast);
    let slow_ema = ema(&closes, slow);

    // Both series end at the latest close; align them from the tail.
    let offset = fast_ema.len() - slow_ema.len();
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, s)| fast_ema[i + offset] - s)
        .collect();

    let macd_value = macd_line[macd_line.len() - 1];
    let signal_line = ema(&macd_line, signal_period);
    match signal_line.last() {
        Some(&signal) => MacdValue {
            macd: macd_value,
            signal,
            histogram: macd_value - signal,
        },
        None => MacdValue {
            macd: macd_value,
            signal: 0.0,
            histogram: 0.0,
        },
    }
}

/// Millisecond timestamp of local midnight today. VWAP sessions reset at
/// the host's local day boundary.
fn start_of_local_day_ms() -> i64 {
    let today = Local::now().date_naive();
    match today.and_hms_opt(0, 0, 0) {
        Some(naive) => match naive.and_local_timezone(Local).earliest() {
            Some(midnight) => midnight.timestamp_millis(),
            None => Utc
                .from_utc_datetime(&naive)
                .timestamp_millis(),
        },
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_candle(timestamp: i64, close: f64) -> Candle {
        Candle::new(timestamp, close, close + 1.0, close - 1.0, close, 10.0)
    }

    fn rising_series(len: usize) -> Vec<Candle> {
        (0..len)
            .map(|i| make_candle(i as i64 * 300_000, 100.0 + i as f64))
            .collect()
    }

    #[test]
    fn test_short_series_yields_neutral_defaults() {
        let candles = rising_series(5);
        let values = calculate_indicators(&candles);
        assert_eq!(values.roc, 0.0);
        assert_eq!(values.stochastic, 0.0);
        assert_eq!(values.rsi, 50.0);
        assert_eq!(values.cmf, 0.0);
        assert_eq!(values.macd, MacdValue::default());
    }

    #[test]
    fn test_empty_series() {
        let values = calculate_indicators(&[]);
        assert_eq!(values.vwap, 0.0);
        assert_eq!(values.ad_osc, 0.0);
        assert_eq!(values.rsi, 50.0);
    }

    #[test]
    fn test_roc_on_steady_climb() {
        let candles = rising_series(20);
        // close 119 now vs close 105 fourteen candles back
        let expected = (119.0 - 105.0) / 105.0 * 100.0;
        let roc = rate_of_change(&candles, 14);
        assert!((roc - expected).abs() < 1e-9);
    }

    #[test]
    fn test_stochastic_extremes() {
        let candles = rising_series(20);
        // Rising closes sit near the top of the 14-candle range.
        let k = stochastic_k(&candles, 14);
        assert!(k > 80.0 && k <= 100.0);

        let flat: Vec<Candle> = (0..20)
            .map(|i| Candle::new(i, 100.0, 100.0, 100.0, 100.0, 10.0))
            .collect();
        assert_eq!(stochastic_k(&flat, 14), 0.0);
    }

    #[test]
    fn test_rsi_all_gains_is_100() {
        let candles = rising_series(40);
        assert_eq!(wilder_rsi(&candles, 14), 100.0);
    }

    #[test]
    fn test_rsi_all_losses_is_low() {
        let candles: Vec<Candle> = (0..40)
            .map(|i| make_candle(i, 200.0 - i as f64))
            .collect();
        let rsi = wilder_rsi(&candles, 14);
        assert!(rsi < 1.0, "rsi = {}", rsi);
    }

    #[test]
    fn test_cmf_skips_flat_candles() {
        // 21 candles closing at the high: CMF should be exactly +1 with the
        // flat candle contributing to neither sum.
        let mut candles: Vec<Candle> = (0..21)
            .map(|i| Candle::new(i, 95.0, 100.0, 90.0, 100.0, 10.0))
            .collect();
        candles[10] = Candle::new(10, 100.0, 100.0, 100.0, 100.0, 1_000_000.0);
        let cmf = chaikin_money_flow(&candles, 21);
        assert!((cmf - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_session_vwap_uses_session_candles_only() {
        let day_start = 1_000_000;
        let candles = vec![
            // Before the session boundary, ignored.
            Candle::new(500_000, 10.0, 10.0, 10.0, 10.0, 1_000.0),
            // In session.
            Candle::new(1_000_000, 100.0, 100.0, 100.0, 100.0, 10.0),
            Candle::new(1_300_000, 200.0, 200.0, 200.0, 200.0, 10.0),
        ];
        let vwap = session_vwap(&candles, day_start);
        assert!((vwap - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_session_vwap_falls_back_to_last_close() {
        let candles = vec![Candle::new(500_000, 10.0, 12.0, 8.0, 11.0, 1_000.0)];
        // No candle reaches the session boundary.
        assert_eq!(session_vwap(&candles, 1_000_000), 11.0);
    }

    #[test]
    fn test_session_vwap_zero_volume_session_is_zero() {
        // Session candles exist but nothing traded: no fallback to close.
        let zero_vol = vec![
            Candle::new(500_000, 10.0, 12.0, 8.0, 11.0, 1_000.0),
            Candle::new(2_000_000, 10.0, 12.0, 8.0, 11.0, 0.0),
        ];
        assert_eq!(session_vwap(&zero_vol, 1_000_000), 0.0);
    }

    #[test]
    fn test_ema_seeds_with_sma() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&data, 3);
        assert_eq!(out.len(), 3);
        assert!((out[0] - 2.0).abs() < 1e-12);
        // (4 - 2) * 0.5 + 2 = 3
        assert!((out[1] - 3.0).abs() < 1e-12);
        assert!(ema(&data, 6).is_empty());
    }

    #[test]
    fn test_macd_signal_needs_nine_points() {
        // 26 <= len < 34: MACD line exists, signal does not.
        let candles = rising_series(30);
        let value = macd(&candles, 12, 26, 9);
        assert!(value.macd != 0.0);
        assert_eq!(value.signal, 0.0);
        assert_eq!(value.histogram, 0.0);

        let candles = rising_series(40);
        let value = macd(&candles, 12, 26, 9);
        assert!(value.signal != 0.0);
        assert!((value.histogram - (value.macd - value.signal)).abs() < 1e-12);
    }

    #[test]
    fn test_macd_positive_on_uptrend() {
        let candles = rising_series(60);
        let value = macd(&candles, 12, 26, 9);
        assert!(value.macd > 0.0);
        assert!(value.signal > 0.0);
    }

    #[test]
    fn test_ad_oscillator_direction() {
        // Closes at the high accumulate, closes at the low distribute.
        let accumulating: Vec<Candle> = (0..10)
            .map(|i| Candle::new(i, 95.0, 100.0, 90.0, 100.0, 10.0))
            .collect();
        assert!(ad_oscillator(&accumulating) > 0.0);

        let distributing: Vec<Candle> = (0..10)
            .map(|i| Candle::new(i, 95.0, 100.0, 90.0, 90.0, 10.0))
            .collect();
        assert!(ad_oscillator(&distributing) < 0.0);
    }
}

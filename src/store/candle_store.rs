// Bounded Candle Store
// Per-timeframe rolling OHLCV buffers, upsert keyed by period timestamp

use crate::core::types::{Candle, Timeframe};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

/// Default per-timeframe buffer bound.
pub const MAX_CANDLES: usize = 500;

/// In-memory candle series for every timeframe the pipeline tracks.
/// Each series is kept oldest-first and never exceeds `max_candles`.
/// Shared across the feed ingester, the pulse service and any readers.
pub struct CandleStore {
    max_candles: usize,
    series: RwLock<HashMap<Timeframe, Vec<Candle>>>,
}

impl CandleStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CANDLES)
    }

    pub fn with_capacity(max_candles: usize) -> Self {
        let mut series = HashMap::new();
        for tf in Timeframe::ALL {
            series.insert(tf, Vec::with_capacity(max_candles));
        }
        Self {
            max_candles,
            series: RwLock::new(series),
        }
    }

    /// Insert or replace a candle. A candle with a timestamp already present
    /// replaces that entry in place (live updates to a forming candle); a new
    /// timestamp is appended, evicting the oldest candle once the buffer is
    /// full. Series length and ordering are unchanged by replacement.
    pub fn upsert(&self, timeframe: Timeframe, candle: Candle) {
        let mut series = self.series.write();
        let buffer = series
            .get_mut(&timeframe)
            .expect("store is seeded with every timeframe");

        // Updates target the most recent candles; scan from the tail.
        if let Some(pos) = buffer.iter().rposition(|c| c.timestamp == candle.timestamp) {
            buffer[pos] = candle;
            return;
        }

        buffer.push(candle);
        if buffer.len() > self.max_candles {
            buffer.remove(0);
        }
    }

    /// Copy out up to `limit` of the newest candles, oldest-first. `None`
    /// returns the full series.
    pub fn get_candles(&self, timeframe: Timeframe, limit: Option<usize>) -> Vec<Candle> {
        let series = self.series.read();
        let buffer = series
            .get(&timeframe)
            .expect("store is seeded with every timeframe");
        match limit {
            Some(n) if n < buffer.len() => buffer[buffer.len() - n..].to_vec(),
            _ => buffer.clone(),
        }
    }

    /// The most recent candle for a timeframe, if any.
    pub fn get_latest(&self, timeframe: Timeframe) -> Option<Candle> {
        self.series
            .read()
            .get(&timeframe)
            .expect("store is seeded with every timeframe")
            .last()
            .copied()
    }

    pub fn get_count(&self, timeframe: Timeframe) -> usize {
        self.series
            .read()
            .get(&timeframe)
            .expect("store is seeded with every timeframe")
            .len()
    }

    /// Replace a series wholesale with bootstrap history. Input order does
    /// not matter; the result is sorted by timestamp and trimmed to the
    /// newest `max_candles`.
    pub fn initialize_historical(&self, timeframe: Timeframe, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > self.max_candles {
            candles.drain(..candles.len() - self.max_candles);
        }
        let count = candles.len();
        self.series.write().insert(timeframe, candles);
        info!(timeframe = %timeframe, count = count, "Historical candles loaded");
    }

    /// Drop every candle but keep all series present.
    pub fn clear(&self) {
        let mut series = self.series.write();
        for tf in Timeframe::ALL {
            series.insert(tf, Vec::with_capacity(self.max_candles));
        }
        debug!("Candle store cleared");
    }
}

impl Default for CandleStore {
    fn default() -> Self {
        Self::new()
    }
}

// Core Type Definitions for the Market Pulse Pipeline
// Timeframes, OHLCV candles, signals, connection state

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Timeframe
// ============================================================================

/// Candle bucket duration. The set is closed: every series the pipeline
/// maintains belongs to exactly one of these four timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Timeframe::M5, Timeframe::M15, Timeframe::H1, Timeframe::H4];

    /// The Binance interval label for this timeframe.
    pub fn interval(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
        }
    }

    /// Map a feed interval label back to a timeframe. Unknown labels return
    /// `None`; callers drop the message with a warning rather than failing.
    pub fn from_interval(interval: &str) -> Option<Timeframe> {
        match interval {
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            _ => None,
        }
    }

    /// Candles per calendar day, used to size the historical bootstrap.
    pub fn candles_per_day(&self) -> u32 {
        match self {
            Timeframe::M5 => 288,
            Timeframe::M15 => 96,
            Timeframe::H1 => 24,
            Timeframe::H4 => 6,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.interval())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::from_interval(s)
            .ok_or_else(|| format!("Invalid timeframe: '{}'. Expected 5m, 15m, 1h or 4h", s))
    }
}

// ============================================================================
// Candle (OHLCV)
// ============================================================================

/// One OHLCV candle. `timestamp` is the period start in ms since epoch and
/// is the identity key within a timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self { timestamp, open, high, low, close, volume }
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Money Flow Multiplier: ((close-low)-(high-close))/(high-low).
    /// `None` for flat candles (high == low), which contribute to neither
    /// sum in the A/D oscillator or CMF.
    pub fn money_flow_multiplier(&self) -> Option<f64> {
        if self.high == self.low {
            return None;
        }
        Some(((self.close - self.low) - (self.high - self.close)) / (self.high - self.low))
    }
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Candle(t={}, O={:.2}, H={:.2}, L={:.2}, C={:.2}, V={:.4})",
            self.timestamp, self.open, self.high, self.low, self.close, self.volume
        )
    }
}

// ============================================================================
// Signal
// ============================================================================

/// Coarse classification of the composite pulse score. Low scores are
/// bearish, high scores bullish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Bullish,
    Neutral,
    Bearish,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Bullish => write!(f, "bullish"),
            Signal::Neutral => write!(f, "neutral"),
            Signal::Bearish => write!(f, "bearish"),
        }
    }
}

// ============================================================================
// Connection State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// Indicators: per-timeframe technical indicator calculation

pub mod calculator;

pub use calculator::{calculate_indicators, IndicatorValues, MacdValue};

// Store: bounded in-memory candle series per timeframe

pub mod candle_store;

pub use candle_store::{CandleStore, MAX_CANDLES};

// Feed: live WebSocket kline ingestion and historical REST bootstrap

pub mod binance_ws;
pub mod historical;

pub use binance_ws::{BinanceWebSocket, FeedParseError, KlineUpdate};
pub use historical::{fetch_historical, initialize_all_timeframes, HistoricalError};

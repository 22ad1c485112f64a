// Market Pulse Pipeline
// Streaming kline ingestion -> bounded candle store -> indicator scoring
// -> broadcast of composite pulse updates.

pub mod core;
pub mod feed;
pub mod indicators;
pub mod pulse;
pub mod store;

pub use crate::core::config::PulseConfig;
pub use crate::core::events::{EventBus, PulseEvent};
pub use crate::core::types::{Candle, ConnectionStatus, Signal, Timeframe};
pub use crate::feed::binance_ws::BinanceWebSocket;
pub use crate::pulse::orchestrator::PulseOrchestrator;
pub use crate::pulse::service::{PulseData, PulseService};
pub use crate::store::candle_store::CandleStore;

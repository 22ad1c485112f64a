// Core: shared types, configuration, logging and the event bus

pub mod config;
pub mod events;
pub mod logger;
pub mod types;

pub use config::{ConfigError, PulseConfig};
pub use events::{EventBus, PulseEvent};
pub use logger::setup_logging;
pub use types::{Candle, ConnectionStatus, Signal, Timeframe};

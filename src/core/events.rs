// Event System for the Market Pulse Pipeline
// Typed pub/sub fan-out over tokio broadcast plus direct callbacks

use crate::core::types::{Candle, Timeframe};
use crate::pulse::service::PulseData;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Everything the pipeline publishes. The feed ingester produces the
/// lifecycle and candle events; the orchestrator produces `PulseUpdate`.
/// Events are fanned out, never consumed destructively.
#[derive(Debug, Clone)]
pub enum PulseEvent {
    /// Feed connection established.
    Connected,
    /// Feed connection lost or closed.
    Disconnected,
    /// Connection-level error. Reported for observability only; reconnection
    /// is driven by the subsequent `Disconnected`.
    FeedError(String),
    /// A candle period finished; triggers rescoring.
    CandleClosed { timeframe: Timeframe, candle: Candle },
    /// A still-forming candle changed; for live chart ticking only.
    CandleUpdate { timeframe: Timeframe, candle: Candle },
    /// A freshly computed pulse record.
    PulseUpdate(PulseData),
}

impl PulseEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PulseEvent::Connected => "connected",
            PulseEvent::Disconnected => "disconnected",
            PulseEvent::FeedError(_) => "feed_error",
            PulseEvent::CandleClosed { .. } => "candle_closed",
            PulseEvent::CandleUpdate { .. } => "candle_update",
            PulseEvent::PulseUpdate(_) => "pulse_update",
        }
    }
}

impl fmt::Display for PulseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PulseEvent({})", self.kind())
    }
}

type EventCallback = Arc<dyn Fn(&PulseEvent) + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct EventBusStats {
    total_published: u64,
    total_delivered: u64,
}

/// Snapshot of event bus statistics.
#[derive(Debug, Clone)]
pub struct EventBusStatsSnapshot {
    pub total_published: u64,
    pub total_delivered: u64,
    pub callback_count: usize,
    pub channel_receivers: usize,
}

/// Central event bus. Channel subscribers get every event in publish order;
/// callback subscribers run synchronously on the publishing thread.
pub struct EventBus {
    tx: broadcast::Sender<PulseEvent>,
    callbacks: RwLock<Vec<EventCallback>>,
    stats: RwLock<EventBusStats>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            tx,
            callbacks: RwLock::new(Vec::new()),
            stats: RwLock::new(EventBusStats::default()),
        }
    }

    /// Register a synchronous callback invoked for every event.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(&PulseEvent) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// Get an independent receiver for all events.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<PulseEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to every subscriber.
    pub fn publish(&self, event: PulseEvent) {
        self.stats.write().total_published += 1;

        // A send error only means there are no channel receivers right now.
        let _ = self.tx.send(event.clone());

        let callbacks = self.callbacks.read();
        if !callbacks.is_empty() {
            for callback in callbacks.iter() {
                callback(&event);
            }
            self.stats.write().total_delivered += callbacks.len() as u64;
        }
    }

    pub fn stats(&self) -> EventBusStatsSnapshot {
        let stats = self.stats.read();
        EventBusStatsSnapshot {
            total_published: stats.total_published,
            total_delivered: stats.total_delivered,
            callback_count: self.callbacks.read().len(),
            channel_receivers: self.tx.receiver_count(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// Pulse Orchestrator
// Recomputes pulses on candle close, tracks threshold crossings and
// broadcasts records over the event bus.

use crate::core::events::{EventBus, PulseEvent};
use crate::core::types::Timeframe;
use crate::pulse::service::{check_threshold_crossing, PulseData, PulseService};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct PulseOrchestrator {
    service: PulseService,
    bus: Arc<EventBus>,
    previous_scores: RwLock<HashMap<Timeframe, f64>>,
}

impl PulseOrchestrator {
    pub fn new(service: PulseService, bus: Arc<EventBus>) -> Self {
        Self {
            service,
            bus,
            previous_scores: RwLock::new(HashMap::new()),
        }
    }

    /// React to a closed candle: recompute the pulse for that timeframe,
    /// log any threshold crossing against the previous score, and broadcast
    /// the new record. Returns `None` while the series is warming up.
    pub fn on_candle_closed(&self, timeframe: Timeframe) -> Option<PulseData> {
        let pulse = self.service.calculate_pulse(timeframe)?;

        let previous = self.previous_scores.read().get(&timeframe).copied();
        if let Some(crossing) = check_threshold_crossing(previous, pulse.pulse_score) {
            info!(
                timeframe = %timeframe,
                threshold = crossing.threshold,
                direction = %crossing.direction,
                score = pulse.pulse_score,
                signal = %pulse.signal,
                "Pulse threshold crossed"
            );
        }
        self.previous_scores.write().insert(timeframe, pulse.pulse_score);

        info!(
            timeframe = %timeframe,
            score = pulse.pulse_score,
            signal = %pulse.signal,
            "Pulse updated"
        );
        self.bus.publish(PulseEvent::PulseUpdate(pulse.clone()));
        Some(pulse)
    }

    /// Current pulse for one timeframe, computed on demand without
    /// publishing. Used to serve initial snapshots to new subscribers.
    pub fn snapshot(&self, timeframe: Timeframe) -> Option<PulseData> {
        self.service.calculate_pulse(timeframe)
    }

    pub fn snapshot_all(&self) -> HashMap<Timeframe, Option<PulseData>> {
        self.service.calculate_all_pulses()
    }

    /// Run the orchestrator off the event bus: every `CandleClosed` triggers
    /// a rescore. Exits when the bus is dropped.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe_channel();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(PulseEvent::CandleClosed { timeframe, .. }) => {
                        self.on_candle_closed(timeframe);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Orchestrator lagged behind event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Candle;
    use crate::store::CandleStore;

    fn make_candle(timestamp: i64, close: f64) -> Candle {
        Candle::new(timestamp, close, close + 1.0, close - 1.0, close, 10.0)
    }

    fn seeded_orchestrator(count: usize) -> (Arc<CandleStore>, Arc<EventBus>, PulseOrchestrator) {
        let store = Arc::new(CandleStore::new());
        for i in 0..count {
            store.upsert(Timeframe::M5, make_candle(i as i64 * 300_000, 100.0 + i as f64));
        }
        let bus = Arc::new(EventBus::new());
        let service = PulseService::new(store.clone(), "BTCUSDT");
        let orchestrator = PulseOrchestrator::new(service, bus.clone());
        (store, bus, orchestrator)
    }

    #[test]
    fn test_candle_close_publishes_pulse_update() {
        let (_store, bus, orchestrator) = seeded_orchestrator(40);
        let mut rx = bus.subscribe_channel();

        let pulse = orchestrator.on_candle_closed(Timeframe::M5).unwrap();
        match rx.try_recv().unwrap() {
            PulseEvent::PulseUpdate(published) => {
                assert_eq!(published.timestamp, pulse.timestamp);
                assert_eq!(published.pulse_score, pulse.pulse_score);
            }
            other => panic!("unexpected event: {}", other),
        }
    }

    #[test]
    fn test_warmup_timeframe_publishes_nothing() {
        let (_store, bus, orchestrator) = seeded_orchestrator(10);
        let mut rx = bus.subscribe_channel();
        assert!(orchestrator.on_candle_closed(Timeframe::M5).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_previous_score_tracked_per_timeframe() {
        let (store, _bus, orchestrator) = seeded_orchestrator(40);
        let first = orchestrator.on_candle_closed(Timeframe::M5).unwrap();
        assert_eq!(
            orchestrator.previous_scores.read().get(&Timeframe::M5).copied(),
            Some(first.pulse_score)
        );

        store.upsert(Timeframe::M5, make_candle(40 * 300_000, 90.0));
        let second = orchestrator.on_candle_closed(Timeframe::M5).unwrap();
        assert_eq!(
            orchestrator.previous_scores.read().get(&Timeframe::M5).copied(),
            Some(second.pulse_score)
        );
        assert!(orchestrator.previous_scores.read().get(&Timeframe::H1).is_none());
    }

    #[test]
    fn test_snapshot_does_not_publish() {
        let (_store, bus, orchestrator) = seeded_orchestrator(40);
        let mut rx = bus.subscribe_channel();
        assert!(orchestrator.snapshot(Timeframe::M5).is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawned_orchestrator_reacts_to_closed_candles() {
        let (_store, bus, orchestrator) = seeded_orchestrator(40);
        let orchestrator = Arc::new(orchestrator);
        let handle = orchestrator.clone().spawn();

        let mut rx = bus.subscribe_channel();
        bus.publish(PulseEvent::CandleClosed {
            timeframe: Timeframe::M5,
            candle: make_candle(40 * 300_000, 141.0),
        });

        // First event back is our own CandleClosed, then the PulseUpdate.
        let mut got_pulse = false;
        for _ in 0..2 {
            match tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv()).await {
                Ok(Ok(PulseEvent::PulseUpdate(pulse))) => {
                    assert_eq!(pulse.timeframe, Timeframe::M5);
                    got_pulse = true;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => panic!("bus recv failed: {}", e),
                Err(_) => panic!("timed out waiting for pulse update"),
            }
        }
        assert!(got_pulse);
        handle.abort();
    }
}

// Binance WebSocket Feed
// Combined kline stream for every timeframe, with heartbeat and capped
// exponential reconnect backoff.

use crate::core::config::PulseConfig;
use crate::core::events::{EventBus, PulseEvent};
use crate::core::types::{Candle, ConnectionStatus, Timeframe};
use crate::store::CandleStore;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Reconnect delays per consecutive failed attempt. Later attempts stay at
/// the final value.
pub const RECONNECT_DELAYS_MS: [u64; 6] = [1_000, 2_000, 4_000, 8_000, 16_000, 30_000];

/// Backoff delay for the given 0-based reconnect attempt.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let index = (attempt as usize).min(RECONNECT_DELAYS_MS.len() - 1);
    Duration::from_millis(RECONNECT_DELAYS_MS[index])
}

#[derive(Debug, Error)]
pub enum FeedParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("not a kline event: {0}")]
    NotKline(String),
    #[error("invalid number in field '{field}': '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("unknown interval: '{0}'")]
    UnknownInterval(String),
}

// Combined-stream envelope: {"stream": "...", "data": {...}}
#[derive(Debug, Deserialize)]
struct RawStreamMessage {
    #[serde(default)]
    data: Option<RawKlineEvent>,
}

#[derive(Debug, Deserialize)]
struct RawKlineEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "k", default)]
    kline: Option<RawKline>,
}

// Binance sends prices and volumes as strings.
#[derive(Debug, Deserialize)]
struct RawKline {
    #[serde(rename = "t")]
    start_time: i64,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

/// One parsed kline frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KlineUpdate {
    pub timeframe: Timeframe,
    pub candle: Candle,
    pub is_closed: bool,
}

fn parse_f64_field(field: &'static str, value: &str) -> Result<f64, FeedParseError> {
    value.parse::<f64>().map_err(|_| FeedParseError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Parse one combined-stream text frame into a kline update. Frames that
/// are valid JSON but not kline events (subscribe acks, other event types)
/// come back as `NotKline`.
pub fn parse_kline_message(text: &str) -> Result<KlineUpdate, FeedParseError> {
    let message: RawStreamMessage = serde_json::from_str(text)?;
    let event = message
        .data
        .ok_or_else(|| FeedParseError::NotKline("no data field".to_string()))?;
    if event.event_type != "kline" {
        return Err(FeedParseError::NotKline(event.event_type));
    }
    let kline = event
        .kline
        .ok_or_else(|| FeedParseError::NotKline("kline event without k field".to_string()))?;

    let timeframe = Timeframe::from_interval(&kline.interval)
        .ok_or_else(|| FeedParseError::UnknownInterval(kline.interval.clone()))?;

    Ok(KlineUpdate {
        timeframe,
        candle: Candle::new(
            kline.start_time,
            parse_f64_field("o", &kline.open)?,
            parse_f64_field("h", &kline.high)?,
            parse_f64_field("l", &kline.low)?,
            parse_f64_field("c", &kline.close)?,
            parse_f64_field("v", &kline.volume)?,
        ),
        is_closed: kline.is_closed,
    })
}

/// Apply one text frame to the store and publish the matching candle event.
/// Non-kline frames are ignored quietly; malformed kline frames are counted
/// and logged.
pub fn process_message(
    text: &str,
    store: &CandleStore,
    bus: &EventBus,
    parse_errors: &AtomicU64,
) {
    match parse_kline_message(text) {
        Ok(update) => {
            store.upsert(update.timeframe, update.candle);
            if update.is_closed {
                debug!(
                    timeframe = %update.timeframe,
                    timestamp = update.candle.timestamp,
                    close = update.candle.close,
                    "Candle closed"
                );
                bus.publish(PulseEvent::CandleClosed {
                    timeframe: update.timeframe,
                    candle: update.candle,
                });
            } else {
                bus.publish(PulseEvent::CandleUpdate {
                    timeframe: update.timeframe,
                    candle: update.candle,
                });
            }
        }
        Err(FeedParseError::NotKline(_)) => {}
        Err(e) => {
            parse_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Dropped malformed feed message");
        }
    }
}

/// Snapshot of feed counters.
#[derive(Debug, Clone)]
pub struct FeedStatsSnapshot {
    pub status: ConnectionStatus,
    pub messages_received: u64,
    pub parse_errors: u64,
    pub reconnect_attempt: u32,
}

/// Live kline ingester. One combined-stream connection covers all four
/// timeframes; lost connections are retried with capped backoff until
/// `disconnect` is called.
#[derive(Clone)]
pub struct BinanceWebSocket {
    config: Arc<PulseConfig>,
    store: Arc<CandleStore>,
    bus: Arc<EventBus>,
    state: Arc<RwLock<ConnectionStatus>>,
    // Held true for the whole life of the run loop, including backoff
    // sleeps, so a duplicate connect() can never spawn a second loop.
    running: Arc<AtomicBool>,
    intentional_close: Arc<AtomicBool>,
    reconnect_attempt: Arc<AtomicU32>,
    messages_received: Arc<AtomicU64>,
    parse_errors: Arc<AtomicU64>,
    shutdown: Arc<Notify>,
}

impl BinanceWebSocket {
    pub fn new(config: PulseConfig, store: Arc<CandleStore>, bus: Arc<EventBus>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            bus,
            state: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            running: Arc::new(AtomicBool::new(false)),
            intentional_close: Arc::new(AtomicBool::new(false)),
            reconnect_attempt: Arc::new(AtomicU32::new(0)),
            messages_received: Arc::new(AtomicU64::new(0)),
            parse_errors: Arc::new(AtomicU64::new(0)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Start the connection task. A second call while connected or already
    /// connecting is a logged no-op.
    pub fn connect(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            info!(status = %self.status(), "Feed already active, ignoring connect");
            return;
        }
        *self.state.write() = ConnectionStatus::Connecting;
        self.intentional_close.store(false, Ordering::SeqCst);
        let feed = self.clone();
        tokio::spawn(feed.run());
    }

    /// Close the connection and stop reconnecting.
    pub fn disconnect(&self) {
        info!("Feed disconnect requested");
        self.intentional_close.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn stats(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            status: self.status(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            reconnect_attempt: self.reconnect_attempt.load(Ordering::SeqCst),
        }
    }

    async fn run(self) {
        loop {
            let url = self.config.stream_url();
            info!(url = %url, "Connecting to kline stream");

            match connect_async(url.as_str()).await {
                Ok((stream, _response)) => {
                    *self.state.write() = ConnectionStatus::Connected;
                    self.reconnect_attempt.store(0, Ordering::SeqCst);
                    info!(symbol = %self.config.symbol, "Feed connected");
                    self.bus.publish(PulseEvent::Connected);

                    self.read_loop(stream).await;

                    *self.state.write() = ConnectionStatus::Disconnected;
                    self.bus.publish(PulseEvent::Disconnected);
                }
                Err(e) => {
                    *self.state.write() = ConnectionStatus::Disconnected;
                    warn!(error = %e, "Feed connection failed");
                    self.bus.publish(PulseEvent::FeedError(e.to_string()));
                }
            }

            if self.intentional_close.load(Ordering::SeqCst) {
                info!("Feed closed, not reconnecting");
                self.running.store(false, Ordering::SeqCst);
                return;
            }

            let attempt = self.reconnect_attempt.fetch_add(1, Ordering::SeqCst);
            let delay = reconnect_delay(attempt);
            warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after delay"
            );
            tokio::time::sleep(delay).await;
            if self.intentional_close.load(Ordering::SeqCst) {
                self.running.store(false, Ordering::SeqCst);
                return;
            }
            *self.state.write() = ConnectionStatus::Connecting;
        }
    }

    async fn read_loop(&self, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        let (mut write, mut read) = stream.split();
        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval_secs));
        // Skip the immediate first tick.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.messages_received.fetch_add(1, Ordering::Relaxed);
                            process_message(&text, &self.store, &self.bus, &self.parse_errors);
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = write.send(Message::Pong(payload)).await {
                                warn!(error = %e, "Failed to answer ping");
                                return;
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("Heartbeat pong received");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(frame = ?frame, "Feed closed by server");
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "Feed read error");
                            self.bus.publish(PulseEvent::FeedError(e.to_string()));
                            return;
                        }
                        None => {
                            warn!("Feed stream ended");
                            return;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                        warn!(error = %e, "Heartbeat ping failed");
                        return;
                    }
                }
                _ = self.shutdown.notified() => {
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_kline_json(interval: &str, start_time: i64, close: f64, is_closed: bool) -> String {
        format!(
            r#"{{"stream":"btcusdt@kline_{interval}","data":{{"e":"kline","E":1700000000000,"s":"BTCUSDT","k":{{"t":{start_time},"T":{},"s":"BTCUSDT","i":"{interval}","o":"100.0","h":"101.5","l":"99.5","c":"{close}","v":"12.5","x":{is_closed}}}}}}}"#,
            start_time + 300_000,
        )
    }

    #[test]
    fn test_parse_closed_kline() {
        let text = make_kline_json("5m", 1_700_000_000_000, 100.5, true);
        let update = parse_kline_message(&text).unwrap();
        assert_eq!(update.timeframe, Timeframe::M5);
        assert!(update.is_closed);
        assert_eq!(update.candle.timestamp, 1_700_000_000_000);
        assert_eq!(update.candle.close, 100.5);
        assert_eq!(update.candle.volume, 12.5);
    }

    #[test]
    fn test_parse_forming_kline() {
        let text = make_kline_json("1h", 1_700_000_000_000, 99.9, false);
        let update = parse_kline_message(&text).unwrap();
        assert_eq!(update.timeframe, Timeframe::H1);
        assert!(!update.is_closed);
    }

    #[test]
    fn test_parse_rejects_non_kline() {
        assert!(matches!(
            parse_kline_message(r#"{"result":null,"id":1}"#),
            Err(FeedParseError::NotKline(_))
        ));
        assert!(matches!(
            parse_kline_message(r#"{"stream":"x","data":{"e":"aggTrade"}}"#),
            Err(FeedParseError::NotKline(_))
        ));
        assert!(matches!(
            parse_kline_message("not json"),
            Err(FeedParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_interval() {
        let text = make_kline_json("2h", 1_700_000_000_000, 100.0, true);
        assert!(matches!(
            parse_kline_message(&text),
            Err(FeedParseError::UnknownInterval(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_number() {
        let text = r#"{"stream":"s","data":{"e":"kline","k":{"t":1,"i":"5m","o":"abc","h":"1","l":"1","c":"1","v":"1","x":true}}}"#;
        assert!(matches!(
            parse_kline_message(text),
            Err(FeedParseError::InvalidNumber { field: "o", .. })
        ));
    }

    #[test]
    fn test_reconnect_delay_caps() {
        assert_eq!(reconnect_delay(0), Duration::from_secs(1));
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(4), Duration::from_secs(16));
        assert_eq!(reconnect_delay(5), Duration::from_secs(30));
        assert_eq!(reconnect_delay(50), Duration::from_secs(30));
    }

    #[test]
    fn test_process_message_updates_store_and_publishes() {
        let store = CandleStore::new();
        let bus = EventBus::new();
        let errors = AtomicU64::new(0);
        let mut rx = bus.subscribe_channel();

        let text = make_kline_json("5m", 1_700_000_000_000, 100.5, true);
        process_message(&text, &store, &bus, &errors);

        assert_eq!(store.get_count(Timeframe::M5), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            PulseEvent::CandleClosed { timeframe: Timeframe::M5, .. }
        ));
        assert_eq!(errors.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_process_message_counts_malformed_frames() {
        let store = CandleStore::new();
        let bus = EventBus::new();
        let errors = AtomicU64::new(0);

        process_message("garbage", &store, &bus, &errors);
        // Non-kline control frames are ignored without counting.
        process_message(r#"{"result":null,"id":1}"#, &store, &bus, &errors);

        assert_eq!(errors.load(Ordering::Relaxed), 1);
        assert_eq!(store.get_count(Timeframe::M5), 0);
    }

    #[tokio::test]
    async fn test_duplicate_connect_during_backoff_is_ignored() {
        let config = PulseConfig {
            ws_base_url: "ws://127.0.0.1:1".to_string(),
            ..PulseConfig::default()
        };
        let store = Arc::new(CandleStore::new());
        let bus = Arc::new(EventBus::new());
        let mut rx = bus.subscribe_channel();
        let feed = BinanceWebSocket::new(config, store, bus);

        feed.connect();
        tokio::time::sleep(Duration::from_millis(300)).await;
        // Inside the first 1s backoff window; must not start a second loop.
        feed.connect();

        tokio::time::sleep(Duration::from_millis(2_200)).await;
        feed.disconnect();

        // A single loop fails at ~0s and ~1s; the next attempt is due at
        // ~3s. A second loop would add failures at ~0.3s and ~1.3s.
        let mut failures = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, PulseEvent::FeedError(_)) {
                failures += 1;
            }
        }
        assert_eq!(failures, 2);
    }

    #[test]
    fn test_forming_update_replaces_in_place() {
        let store = CandleStore::new();
        let bus = EventBus::new();
        let errors = AtomicU64::new(0);

        process_message(&make_kline_json("5m", 1_000, 100.0, false), &store, &bus, &errors);
        process_message(&make_kline_json("5m", 1_000, 100.7, false), &store, &bus, &errors);

        assert_eq!(store.get_count(Timeframe::M5), 1);
        assert_eq!(store.get_latest(Timeframe::M5).unwrap().close, 100.7);
    }
}

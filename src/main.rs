// Market Pulse Pipeline binary
// Bootstraps history, runs the live feed and logs pulse updates until
// interrupted.

use market_pulse::core::logger::setup_logging;
use market_pulse::feed::historical::initialize_all_timeframes;
use market_pulse::{
    BinanceWebSocket, CandleStore, EventBus, PulseConfig, PulseOrchestrator, PulseService,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging(std::env::var("PULSE_LOG_LEVEL").ok().as_deref(), false);

    let config_path = std::env::args().nth(1);
    let config = PulseConfig::load(config_path.as_deref())?;
    config.validate()?;
    info!(symbol = %config.symbol, "Starting market pulse pipeline");

    let store = Arc::new(CandleStore::with_capacity(config.max_candles));
    let bus = Arc::new(EventBus::new());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()?;
    initialize_all_timeframes(&client, &config, &store).await;

    let service = PulseService::new(store.clone(), config.symbol.clone());
    let orchestrator = Arc::new(PulseOrchestrator::new(service, bus.clone()));
    let _orchestrator_task = orchestrator.clone().spawn();

    // Log a startup snapshot for every timeframe that bootstrapped.
    for (tf, pulse) in orchestrator.snapshot_all() {
        match pulse {
            Some(p) => info!(timeframe = %tf, score = p.pulse_score, signal = %p.signal, "Initial pulse"),
            None => info!(timeframe = %tf, "Initial pulse pending, series warming up"),
        }
    }

    let feed = BinanceWebSocket::new(config, store, bus);
    feed.connect();

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    feed.disconnect();
    // Give the feed a moment to send its close frame.
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Market pulse pipeline stopped");
    Ok(())
}

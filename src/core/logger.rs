// Structured Logging Setup
// tracing-subscriber with env filter, optional JSON output

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Setup structured logging for the whole process. Safe to call more than
/// once; only the first call installs a subscriber.
pub fn setup_logging(log_level: Option<&str>, json_format: bool) {
    let log_level_str = log_level.unwrap_or("INFO");

    let level = match log_level_str.to_uppercase().as_str() {
        "TRACE" => Level::TRACE,
        "DEBUG" => Level::DEBUG,
        "INFO" => Level::INFO,
        "WARN" | "WARNING" => Level::WARN,
        "ERROR" => Level::ERROR,
        _ => Level::INFO,
    };

    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env()
            .add_directive(level.into())
            // Suppress noisy transport crates
            .add_directive("tokio_tungstenite=warn".parse().expect("valid directive"))
            .add_directive("tungstenite=warn".parse().expect("valid directive"))
            .add_directive("hyper=warn".parse().expect("valid directive"))
            .add_directive("reqwest=warn".parse().expect("valid directive"));

        if json_format {
            tracing_subscriber::fmt()
                .json()
                .with_target(true)
                .with_env_filter(filter)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_target(true)
                .with_env_filter(filter)
                .init();
        }

        tracing::info!(log_level = %log_level_str, "Logging initialized");
    });
}

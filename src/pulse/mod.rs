// Pulse: composite scoring, per-timeframe pulse records, orchestration

pub mod composite;
pub mod orchestrator;
pub mod service;

pub use composite::{calculate_pulse_score, PulseScore, ScoreBreakdown};
pub use orchestrator::PulseOrchestrator;
pub use service::{check_threshold_crossing, PulseData, PulseService, ThresholdCrossing};

pub mod buffer;
pub mod commands;
pub mod controller;
pub mod engine;
pub mod event_log;
pub mod export;
pub mod metrics;
pub mod noise;
pub mod replay;
pub mod state;

pub use commands::{dispatch, Intent, IntentReply};
pub use controller::StreamController;
pub use engine::{EngineSnapshot, TelemetryEngine, TickOutcome};
pub use event_log::{LogEntry, Severity};
pub use metrics::{DriftLevel, MetricsSnapshot};
pub use state::{SessionState, StreamPhase, ViewMode};

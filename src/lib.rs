// Library interface for TreadLap modules
// This allows integration tests and benches to access the core functionality

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod laps;
pub mod live;
pub mod logging;
pub mod models;
pub mod rolling;
pub mod samples;
pub mod scheduler;
pub mod simulation;
pub mod zones;

// Re-export commonly used types for convenience
pub use models::*;
pub use config::AppConfig;
pub use engine::{EngineSettings, EngineState, LapEvent, StopReason, WorkoutEngine};
pub use export::{ExportFormat, SessionSnapshot};
pub use live::{Inbound, LiveSession, LiveUpdate};
pub use rolling::{max_window_average, RollingMaxAverage};
pub use scheduler::{IntervalScheduler, PhasePosition, PlannedPhase};
pub use simulation::{run_simulated_session, Simulator};
pub use zones::{zone_seconds, ZoneAggregator, ZoneDistribution};
pub use error::{EngineError, TreadLapError, Result};
pub use logging::{LogConfig, LogLevel, LogFormat};

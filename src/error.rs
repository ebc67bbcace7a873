//! Unified error hierarchy for TreadLap
//!
//! Only lifecycle misuse, overrides naming no lap, and the configuration and
//! export boundaries produce errors. Missing or late samples are never errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::EngineState;
use crate::export::ExportError;
use crate::models::LapField;

/// Top-level error type for all TreadLap operations
#[derive(Debug, Error)]
pub enum TreadLapError {
    /// Workout engine lifecycle errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Snapshot and lap export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Workout engine errors
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    /// Operation not allowed in the current state
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: EngineState,
    },

    /// No work lap with the given repetition index
    #[error("No work lap with rep index {rep_index}")]
    LapNotFound { rep_index: u32 },

    /// Override value is not a finite number
    #[error("Invalid {field:?} value: {value}")]
    InvalidValue { field: LapField, value: f64 },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be parsed
    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Config could not be serialized
    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    /// A field holds a value the engine cannot use
    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Result type alias for TreadLap operations
pub type Result<T> = std::result::Result<T, TreadLapError>;

impl TreadLapError {
    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TreadLapError::Engine(EngineError::InvalidValue { .. }) => ErrorSeverity::Info,
            TreadLapError::Engine(_) => ErrorSeverity::Warning,
            TreadLapError::Config(ConfigError::InvalidField { .. }) => ErrorSeverity::Warning,
            TreadLapError::Config(_) => ErrorSeverity::Error,
            TreadLapError::Export(_) => ErrorSeverity::Error,
            TreadLapError::Io(_) => ErrorSeverity::Error,
            TreadLapError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            TreadLapError::Engine(EngineError::InvalidTransition { operation, state }) => {
                format!("The workout is {}; it cannot {} right now.", state, operation)
            }
            TreadLapError::Engine(EngineError::LapNotFound { rep_index }) => {
                format!("There is no work interval #{} to edit.", rep_index)
            }
            TreadLapError::Config(ConfigError::Parse { path, .. }) => {
                format!("Could not read settings from {}. Please check the file.", path.display())
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

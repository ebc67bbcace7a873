use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::EngineState;
use crate::models::{Lap, Sample, WorkoutConfig, ZoneThresholds};
use crate::zones::{ZoneDistribution, ZoneSeconds};

pub mod csv;
pub mod json;
pub mod text;

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Csv,
    Json,
    Text,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Result<Self, ExportError> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ExportError::UnsupportedFormat(path.display().to_string()))?;
        Self::from_str(ext)
    }
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] ::csv::Error),
}

/// Complete entity set of one session, in a JSON-compatible shape.
///
/// Persistence collaborators store this verbatim; `WorkoutEngine::restore`
/// turns it back into a stopped engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub state: EngineState,
    pub config: Option<WorkoutConfig>,
    pub thresholds: ZoneThresholds,
    pub run_start_ts: i64,
    pub elapsed_sec: u64,
    pub laps: Vec<Lap>,
    pub heart_rate: Vec<Sample>,
    pub speed: Vec<Sample>,
    pub incline: Vec<Sample>,
    pub zone_seconds: ZoneSeconds,
}

impl SessionSnapshot {
    pub fn zone_distribution(&self) -> ZoneDistribution {
        ZoneDistribution::from_seconds(self.zone_seconds)
    }

    /// Flattened per-lap rows for tables and CSV
    pub fn lap_rows(&self) -> Vec<LapRow> {
        self.laps.iter().enumerate().map(|(i, lap)| LapRow::from_lap(i, lap)).collect()
    }
}

/// One lap flattened for tabular output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRow {
    pub index: usize,
    pub lap: String,
    pub start_ts: i64,
    pub end_ts: Option<i64>,
    pub duration_sec: Option<f64>,
    pub max_30s_bpm: Option<f64>,
    pub speed: Option<f64>,
    pub speed_source: String,
    pub incline: Option<f64>,
    pub incline_source: String,
}

impl LapRow {
    pub fn from_lap(index: usize, lap: &Lap) -> Self {
        Self {
            index,
            lap: lap.label(),
            start_ts: lap.start_ts,
            end_ts: lap.end_ts,
            duration_sec: lap.duration_ms().map(|ms| ms as f64 / 1000.0),
            max_30s_bpm: lap.max_window_avg_bpm.map(|v| (v * 10.0).round() / 10.0),
            speed: lap.speed_value,
            speed_source: lap.speed_source.to_string(),
            incline: lap.incline_value,
            incline_source: lap.incline_source.to_string(),
        }
    }
}

/// Write a snapshot in the given format
pub fn export_session<P: AsRef<Path>>(
    snapshot: &SessionSnapshot,
    format: ExportFormat,
    output_path: P,
) -> Result<(), ExportError> {
    let path = output_path.as_ref();
    match format {
        ExportFormat::Json => json::export_snapshot(snapshot, path)?,
        ExportFormat::Csv => csv::export_laps(&snapshot.laps, path)?,
        ExportFormat::Text => text::export_session_report(snapshot, path)?,
    }
    tracing::info!(?format, path = %path.display(), laps = snapshot.laps.len(), "Session exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricSource, Phase};

    #[test]
    fn test_format_parsing() {
        assert_eq!(ExportFormat::from_str("JSON").unwrap(), ExportFormat::Json);
        assert_eq!(ExportFormat::from_str("txt").unwrap(), ExportFormat::Text);
        assert!(ExportFormat::from_str("pdf").is_err());
        assert_eq!(ExportFormat::from_path(Path::new("laps.csv")).unwrap(), ExportFormat::Csv);
        assert!(ExportFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_lap_row() {
        let mut lap = Lap::open(Phase::Work, 3, 45_000);
        lap.end_ts = Some(75_000);
        lap.max_window_avg_bpm = Some(171.26);
        lap.set_metric(crate::models::LapField::Speed, Some(12.5), MetricSource::CandidateEnd);

        let row = LapRow::from_lap(4, &lap);
        assert_eq!(row.lap, "Work #3");
        assert_eq!(row.duration_sec, Some(30.0));
        assert_eq!(row.max_30s_bpm, Some(171.3));
        assert_eq!(row.speed_source, "candidate_end");
        assert_eq!(row.incline_source, "unknown");
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::EngineSettings;
use crate::error::ConfigError;
use crate::laps::DEFAULT_REST_NEUTRAL_VALUE;
use crate::logging::LogConfig;
use crate::models::{WorkoutConfig, ZoneThresholds};
use crate::rolling::DEFAULT_ROLLING_WINDOW_MS;
use crate::samples::{DEFAULT_MAX_POINTS, DEFAULT_WINDOW_MS};
use crate::zones::DEFAULT_GAP_CAP_SEC;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default workout layout
    pub workout: WorkoutConfig,

    /// Heart-rate zone boundaries
    pub zones: ZoneSettings,

    /// Live heart-rate window
    pub window: WindowSettings,

    /// Lap and zone analysis
    pub analysis: AnalysisSettings,

    /// Simulated sample stream
    pub simulation: SimulationSettings,

    /// Logging output
    pub logging: LogConfig,
}

/// Heart-rate zone boundaries as entered by the user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneSettings {
    /// Five boundaries z1..z5; out-of-order values are coerced upward on load
    pub thresholds: [f64; 5],
}

/// Live window bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSettings {
    pub horizon_ms: i64,
    pub max_points: usize,
}

/// Analysis tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Window for the per-lap max sustained heart rate
    pub rolling_window_ms: i64,

    /// Longest gap one sample pair may attribute to a zone
    pub zone_gap_cap_sec: f64,

    /// Speed/incline recorded for rest laps
    pub rest_neutral_value: f64,
}

/// Simulator parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// RNG seed so runs are reproducible
    pub seed: u64,

    /// Mean spacing of heart-rate samples
    pub hr_interval_ms: i64,

    /// Random spread around the mean spacing
    pub hr_jitter_ms: i64,

    pub resting_hr: f64,
    pub warmup_hr: f64,
    pub work_hr: f64,
    pub rest_hr: f64,

    /// Seconds for heart rate to close ~63% of the gap to its target
    pub hr_time_constant_sec: f64,

    pub warmup_speed: f64,
    pub work_speed: f64,
    pub work_incline: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            workout: WorkoutConfig::default(),
            zones: ZoneSettings::default(),
            window: WindowSettings::default(),
            analysis: AnalysisSettings::default(),
            simulation: SimulationSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for ZoneSettings {
    fn default() -> Self {
        ZoneSettings {
            thresholds: *ZoneThresholds::default().bounds(),
        }
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        WindowSettings {
            horizon_ms: DEFAULT_WINDOW_MS,
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            rolling_window_ms: DEFAULT_ROLLING_WINDOW_MS,
            zone_gap_cap_sec: DEFAULT_GAP_CAP_SEC,
            rest_neutral_value: DEFAULT_REST_NEUTRAL_VALUE,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            seed: 42,
            hr_interval_ms: 500,
            hr_jitter_ms: 150,
            resting_hr: 70.0,
            warmup_hr: 125.0,
            work_hr: 172.0,
            rest_hr: 135.0,
            hr_time_constant_sec: 20.0,
            warmup_speed: 7.0,
            work_speed: 12.0,
            work_incline: 6.0,
        }
    }
}

impl AppConfig {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("treadlap")
            .join("config.toml")
    }

    /// Load configuration from a TOML file, normalizing zone thresholds
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let mut config: AppConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.normalize();
        config.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }

        let content = self.to_toml()?;
        fs::write(path, content).with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?)
    }

    /// Coerce zone thresholds to a non-decreasing sequence
    pub fn normalize(&mut self) {
        let (normalized, changed) = ZoneThresholds::normalize(self.zones.thresholds);
        if changed {
            tracing::warn!(
                raw = ?self.zones.thresholds,
                normalized = ?normalized,
                "Zone thresholds were not ascending; normalized"
            );
            self.zones.thresholds = normalized;
        }
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.window.horizon_ms <= 0 {
            return Err(invalid("window.horizon_ms", "must be positive"));
        }
        if self.window.max_points == 0 {
            return Err(invalid("window.max_points", "must be at least 1"));
        }
        if self.analysis.rolling_window_ms <= 0 {
            return Err(invalid("analysis.rolling_window_ms", "must be positive"));
        }
        if !(self.analysis.zone_gap_cap_sec > 0.0) {
            return Err(invalid("analysis.zone_gap_cap_sec", "must be positive"));
        }
        if self.simulation.hr_interval_ms <= 0 {
            return Err(invalid("simulation.hr_interval_ms", "must be positive"));
        }
        if self.simulation.hr_jitter_ms < 0 || self.simulation.hr_jitter_ms >= self.simulation.hr_interval_ms {
            return Err(invalid("simulation.hr_jitter_ms", "must be in 0..hr_interval_ms"));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> ZoneThresholds {
        ZoneThresholds::new(self.zones.thresholds)
    }

    /// Engine tunables derived from this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            window_horizon_ms: self.window.horizon_ms,
            window_max_points: self.window.max_points,
            rolling_window_ms: self.analysis.rolling_window_ms,
            zone_gap_cap_sec: self.analysis.zone_gap_cap_sec,
            rest_neutral_value: self.analysis.rest_neutral_value,
        }
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine_settings(), EngineSettings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.workout = WorkoutConfig::new(0, 30, 15, 2, 0);
        config.simulation.seed = 7;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[workout]\nwarmup_sec = 0\nwork_sec = 20\nrest_sec = 10\nreps = 8\ncooldown_sec = 0\n",
        )
        .unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.workout.reps, 8);
        assert_eq!(loaded.analysis.rolling_window_ms, 30_000);
        assert_eq!(loaded.window.max_points, 1200);
    }

    #[test]
    fn test_thresholds_normalized_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[zones]\nthresholds = [130.0, 120.0, 150.0, 170.0, 160.0]\n").unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.zones.thresholds, [130.0, 130.0, 150.0, 170.0, 170.0]);
    }

    #[test]
    fn test_nan_first_threshold_normalized_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[zones]\nthresholds = [nan, 120.0, 140.0, 160.0, 180.0]\n").unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.zones.thresholds, [120.0, 120.0, 140.0, 160.0, 180.0]);
        assert_eq!(loaded.thresholds().zone_of(200.0), 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[analysis]\nrolling_window_ms = 0\n").unwrap();
        assert!(AppConfig::load(&path).is_err());

        fs::write(&path, "[workout\n").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        let config = AppConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}

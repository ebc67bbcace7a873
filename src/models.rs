use serde::{Deserialize, Serialize};
use std::fmt;

/// Measurement channels delivered by the transport or simulation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    HeartRate,
    Speed,
    Incline,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::HeartRate, Channel::Speed, Channel::Incline];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::HeartRate => write!(f, "heart_rate"),
            Channel::Speed => write!(f, "speed"),
            Channel::Incline => write!(f, "incline"),
        }
    }
}

/// Where a sample came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Live reading from a connected sensor or treadmill
    Device,
    /// Generated by the simulator when no device is connected
    Simulated,
    /// Entered by the user
    Manual,
}

impl SampleSource {
    /// Device and simulated readings both count as live readings
    pub fn is_live(&self) -> bool {
        matches!(self, SampleSource::Device | SampleSource::Simulated)
    }
}

/// Single timestamped observation on one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds on the host clock
    pub timestamp: i64,

    /// bpm, km/h or percent depending on the channel
    pub value: f64,

    pub source: SampleSource,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64, source: SampleSource) -> Self {
        Self {
            timestamp,
            value,
            source,
        }
    }

    pub fn device(timestamp: i64, value: f64) -> Self {
        Self::new(timestamp, value, SampleSource::Device)
    }
}

/// Fixed interval workout layout, all durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutConfig {
    pub warmup_sec: u32,
    pub work_sec: u32,
    pub rest_sec: u32,
    pub reps: u32,
    pub cooldown_sec: u32,
}

impl WorkoutConfig {
    pub fn new(warmup_sec: u32, work_sec: u32, rest_sec: u32, reps: u32, cooldown_sec: u32) -> Self {
        Self {
            warmup_sec,
            work_sec,
            rest_sec,
            reps,
            cooldown_sec,
        }
    }

    /// Length of one work + rest cycle
    pub fn cycle_sec(&self) -> u64 {
        u64::from(self.work_sec) + u64::from(self.rest_sec)
    }

    /// Length of the repeated work/rest block
    pub fn main_sec(&self) -> u64 {
        u64::from(self.reps) * self.cycle_sec()
    }

    pub fn total_sec(&self) -> u64 {
        u64::from(self.warmup_sec) + self.main_sec() + u64::from(self.cooldown_sec)
    }
}

impl Default for WorkoutConfig {
    fn default() -> Self {
        Self {
            warmup_sec: 600,
            work_sec: 240,
            rest_sec: 60,
            reps: 4,
            cooldown_sec: 300,
        }
    }
}

/// Workout phase an elapsed-time position maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Warmup,
    Work,
    Rest,
    Cooldown,
    /// Terminal, never carries a lap
    Done,
}

impl Phase {
    pub fn is_repeated(&self) -> bool {
        matches!(self, Phase::Work | Phase::Rest)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Warmup => write!(f, "Warmup"),
            Phase::Work => write!(f, "Work"),
            Phase::Rest => write!(f, "Rest"),
            Phase::Cooldown => write!(f, "Cooldown"),
            Phase::Done => write!(f, "Done"),
        }
    }
}

/// How a lap's speed or incline value was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// Set explicitly by the user while the lap was open
    Manual,
    /// Last live reading seen while the lap was open
    CandidateEnd,
    /// Most recent live reading from any phase
    LastKnown,
    /// Fixed neutral value (rest laps)
    Forced,
    Unknown,
    /// Overwritten after the lap closed
    ManualEdit,
}

impl fmt::Display for MetricSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricSource::Manual => write!(f, "manual"),
            MetricSource::CandidateEnd => write!(f, "candidate_end"),
            MetricSource::LastKnown => write!(f, "last_known"),
            MetricSource::Forced => write!(f, "forced"),
            MetricSource::Unknown => write!(f, "unknown"),
            MetricSource::ManualEdit => write!(f, "manual_edit"),
        }
    }
}

/// Lap field that can be overridden by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapField {
    Speed,
    Incline,
}

impl LapField {
    /// Channel whose readings feed this field
    pub fn channel(&self) -> Channel {
        match self {
            LapField::Speed => Channel::Speed,
            LapField::Incline => Channel::Incline,
        }
    }

    pub fn from_channel(channel: Channel) -> Option<Self> {
        match channel {
            Channel::Speed => Some(LapField::Speed),
            Channel::Incline => Some(LapField::Incline),
            Channel::HeartRate => None,
        }
    }
}

impl std::str::FromStr for LapField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "speed" => Ok(LapField::Speed),
            "incline" | "grade" => Ok(LapField::Incline),
            _ => Err(format!("Invalid lap field: {}", s)),
        }
    }
}

/// One scheduled phase instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    /// Never `Phase::Done`
    pub phase: Phase,

    /// 0 for warmup/cooldown, 1..=reps for work/rest
    pub rep_index: u32,

    pub start_ts: i64,

    /// `None` while the lap is open
    pub end_ts: Option<i64>,

    /// Highest sustained heart-rate average over the analysis window
    pub max_window_avg_bpm: Option<f64>,

    pub speed_value: Option<f64>,
    pub incline_value: Option<f64>,
    pub speed_source: MetricSource,
    pub incline_source: MetricSource,
}

impl Lap {
    pub fn open(phase: Phase, rep_index: u32, start_ts: i64) -> Self {
        Self {
            phase,
            rep_index,
            start_ts,
            end_ts: None,
            max_window_avg_bpm: None,
            speed_value: None,
            incline_value: None,
            speed_source: MetricSource::Unknown,
            incline_source: MetricSource::Unknown,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_ts.is_none()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.end_ts.map(|end| end - self.start_ts)
    }

    pub fn value(&self, field: LapField) -> Option<f64> {
        match field {
            LapField::Speed => self.speed_value,
            LapField::Incline => self.incline_value,
        }
    }

    pub fn source(&self, field: LapField) -> MetricSource {
        match field {
            LapField::Speed => self.speed_source,
            LapField::Incline => self.incline_source,
        }
    }

    pub fn set_metric(&mut self, field: LapField, value: Option<f64>, source: MetricSource) {
        match field {
            LapField::Speed => {
                self.speed_value = value;
                self.speed_source = source;
            }
            LapField::Incline => {
                self.incline_value = value;
                self.incline_source = source;
            }
        }
    }

    /// Short label such as "Work #2"
    pub fn label(&self) -> String {
        if self.phase.is_repeated() {
            format!("{} #{}", self.phase, self.rep_index)
        } else {
            self.phase.to_string()
        }
    }
}

/// Five ordered heart-rate boundaries defining zones S0..S5
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 5]", into = "[f64; 5]")]
pub struct ZoneThresholds([f64; 5]);

impl ZoneThresholds {
    pub const ZONE_COUNT: usize = 6;

    /// Build thresholds, coercing out-of-order boundaries upward so the
    /// sequence is non-decreasing.
    pub fn new(raw: [f64; 5]) -> Self {
        let (normalized, _) = Self::normalize(raw);
        Self(normalized)
    }

    /// Returns the normalized boundaries and whether any value was changed.
    ///
    /// A NaN first boundary takes the first number that follows it; all-NaN
    /// input falls back to the defaults.
    pub fn normalize(raw: [f64; 5]) -> ([f64; 5], bool) {
        let mut out = raw;
        let mut changed = false;
        if out[0].is_nan() {
            match out.iter().copied().find(|b| !b.is_nan()) {
                Some(first) => out[0] = first,
                None => return (Self::default().0, true),
            }
            changed = true;
        }
        for i in 1..out.len() {
            if out[i] < out[i - 1] || out[i].is_nan() {
                out[i] = out[i - 1];
                changed = true;
            }
        }
        (out, changed)
    }

    pub fn bounds(&self) -> &[f64; 5] {
        &self.0
    }

    /// Zone index 0..=5 for a value, using half-open intervals
    pub fn zone_of(&self, value: f64) -> usize {
        self.0.iter().take_while(|&&bound| value >= bound).count()
    }
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self([120.0, 140.0, 155.0, 170.0, 185.0])
    }
}

impl From<[f64; 5]> for ZoneThresholds {
    fn from(raw: [f64; 5]) -> Self {
        Self::new(raw)
    }
}

impl From<ZoneThresholds> for [f64; 5] {
    fn from(thresholds: ZoneThresholds) -> Self {
        thresholds.0
    }
}

/// Inclusive millisecond range used for queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start <= ts && ts <= self.end
    }
}

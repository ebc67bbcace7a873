//! Sample storage for a workout session
//!
//! `SampleStore` keeps every sample for the whole session and answers range
//! queries. `WindowBuffer` mirrors recent heart-rate points for live display and
//! is bounded both by age and by point count.

use std::collections::HashMap;

use crate::models::{Channel, Sample, TimeRange};

/// Default live window horizon (10 minutes)
pub const DEFAULT_WINDOW_MS: i64 = 10 * 60 * 1000;

/// Default hard cap on live points (~2 Hz for 10 minutes)
pub const DEFAULT_MAX_POINTS: usize = 10 * 60 * 2;

/// Append-only per-channel sample record
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    channels: HashMap<Channel, Vec<Sample>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample. Nothing is ever removed until `clear`.
    pub fn ingest(&mut self, channel: Channel, sample: Sample) {
        self.channels.entry(channel).or_default().push(sample);
    }

    /// Samples with `start <= ts <= end`, ascending by timestamp.
    ///
    /// Insertion order is not trusted; samples with equal timestamps keep
    /// their arrival order.
    pub fn range_query(&self, channel: Channel, range: TimeRange) -> Vec<Sample> {
        let mut out: Vec<Sample> = self
            .channel(channel)
            .iter()
            .filter(|s| range.contains(s.timestamp))
            .copied()
            .collect();
        out.sort_by_key(|s| s.timestamp);
        out
    }

    /// All samples on a channel, ascending by timestamp
    pub fn sorted(&self, channel: Channel) -> Vec<Sample> {
        let mut out = self.channel(channel).to_vec();
        out.sort_by_key(|s| s.timestamp);
        out
    }

    /// Raw samples in arrival order
    pub fn channel(&self, channel: Channel) -> &[Sample] {
        self.channels.get(&channel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.channel(channel).len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.values().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

/// Bounded, time-ordered buffer of recent heart-rate points
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    points: Vec<Sample>,
    horizon_ms: i64,
    max_points: usize,
}

impl WindowBuffer {
    pub fn new(horizon_ms: i64, max_points: usize) -> Self {
        Self {
            points: Vec::new(),
            horizon_ms,
            max_points,
        }
    }

    /// Insert a point in timestamp order and prune by age, then by count.
    ///
    /// The age cutoff is measured from the newest timestamp held, so a late
    /// sample never pulls the horizon backwards.
    pub fn push(&mut self, sample: Sample) {
        let at = self.points.partition_point(|s| s.timestamp <= sample.timestamp);
        self.points.insert(at, sample);
        self.prune();
    }

    fn prune(&mut self) {
        let latest = match self.points.last() {
            Some(s) => s.timestamp,
            None => return,
        };
        let cutoff = latest - self.horizon_ms;

        let stale = self.points.partition_point(|s| s.timestamp < cutoff);
        if stale > 0 {
            self.points.drain(..stale);
        }

        if self.points.len() > self.max_points {
            let excess = self.points.len() - self.max_points;
            self.points.drain(..excess);
        }
    }

    pub fn points(&self) -> &[Sample] {
        &self.points
    }

    /// Point with the newest timestamp
    pub fn latest(&self) -> Option<&Sample> {
        self.points.last()
    }

    /// Seconds since the most recent point, `None` before the first point
    pub fn seconds_since_last(&self, now_ms: i64) -> Option<f64> {
        self.latest()
            .map(|s| (now_ms - s.timestamp).max(0) as f64 / 1000.0)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}

impl Default for WindowBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS, DEFAULT_MAX_POINTS)
    }
}

/// "Last seen" label for a live reading: whole seconds, floored, or "--"
/// before the first reading
pub fn format_seconds_ago(seconds: Option<f64>) -> String {
    match seconds {
        None => "--".to_string(),
        Some(s) => format!("{}", s.max(0.0).floor() as u64),
    }
}

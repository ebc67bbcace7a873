//! Workout engine
//!
//! Owns all session state: the scheduler position, stored samples, the live
//! heart-rate window, and the lap list. Driven by a 1 Hz `tick` and by sample
//! ingestion; both must be serialized by the caller (single event loop or a
//! mutex), the engine itself is not reentrant.
//!
//! Lifecycle: `idle -> running -> stopped`, and `reset` back to `idle`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::EngineError;
use crate::export::SessionSnapshot;
use crate::laps::{LapResolver, DEFAULT_REST_NEUTRAL_VALUE};
use crate::models::{Channel, Lap, LapField, Phase, Sample, SampleSource, TimeRange, WorkoutConfig, ZoneThresholds};
use crate::rolling::{RollingMaxAverage, DEFAULT_ROLLING_WINDOW_MS};
use crate::samples::{SampleStore, WindowBuffer, DEFAULT_MAX_POINTS, DEFAULT_WINDOW_MS};
use crate::scheduler::{IntervalScheduler, PhasePosition};
use crate::zones::{ZoneAggregator, ZoneDistribution, ZoneSeconds, DEFAULT_GAP_CAP_SEC};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Idle => write!(f, "idle"),
            EngineState::Running => write!(f, "running"),
            EngineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Scheduler reached `Done`
    Completed,
    /// `stop` was called before the plan finished
    Stopped,
}

/// Lap lifecycle change produced by `start`, `tick` or `stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapEvent {
    Opened { index: usize, phase: Phase, rep_index: u32 },
    Closed { index: usize },
    Finished { reason: StopReason },
}

/// Tunables for one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Age horizon of the live heart-rate window
    pub window_horizon_ms: i64,
    /// Hard cap on live heart-rate points
    pub window_max_points: usize,
    /// Window for the lap max-average heart rate
    pub rolling_window_ms: i64,
    /// Longest gap a single sample pair may add to a zone
    pub zone_gap_cap_sec: f64,
    /// Speed/incline recorded for rest laps
    pub rest_neutral_value: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            window_horizon_ms: DEFAULT_WINDOW_MS,
            window_max_points: DEFAULT_MAX_POINTS,
            rolling_window_ms: DEFAULT_ROLLING_WINDOW_MS,
            zone_gap_cap_sec: DEFAULT_GAP_CAP_SEC,
            rest_neutral_value: DEFAULT_REST_NEUTRAL_VALUE,
        }
    }
}

/// Single owned workout session
#[derive(Debug, Clone)]
pub struct WorkoutEngine {
    settings: EngineSettings,
    state: EngineState,
    stop_reason: Option<StopReason>,
    session_id: Uuid,
    scheduler: Option<IntervalScheduler>,
    position: PhasePosition,
    elapsed_sec: u64,
    run_start_ts: i64,
    store: SampleStore,
    window: WindowBuffer,
    laps: Vec<Lap>,
    resolver: LapResolver,
    zones: ZoneAggregator,
    rolling: RollingMaxAverage,
}

impl WorkoutEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            state: EngineState::Idle,
            stop_reason: None,
            session_id: Uuid::new_v4(),
            scheduler: None,
            position: PhasePosition::done(),
            elapsed_sec: 0,
            run_start_ts: 0,
            store: SampleStore::new(),
            window: WindowBuffer::new(settings.window_horizon_ms, settings.window_max_points),
            laps: Vec::new(),
            resolver: LapResolver::new(settings.rest_neutral_value),
            zones: ZoneAggregator::new(ZoneThresholds::default(), settings.zone_gap_cap_sec),
            rolling: RollingMaxAverage::new(settings.rolling_window_ms),
        }
    }

    /// Start a run now, using the wall clock as the lap time base
    pub fn start(&mut self, config: WorkoutConfig) -> Result<Vec<LapEvent>, EngineError> {
        self.start_at(config, Utc::now().timestamp_millis())
    }

    /// Start a run whose first tick corresponds to `start_ts` (ms).
    ///
    /// Only valid while idle. Clears all session data and opens the first lap.
    pub fn start_at(&mut self, config: WorkoutConfig, start_ts: i64) -> Result<Vec<LapEvent>, EngineError> {
        if self.state != EngineState::Idle {
            return Err(EngineError::InvalidTransition {
                operation: "start",
                state: self.state,
            });
        }

        self.clear_session();
        self.session_id = Uuid::new_v4();
        self.run_start_ts = start_ts;

        let scheduler = IntervalScheduler::new(config);
        self.position = scheduler.position(0);
        self.scheduler = Some(scheduler);
        self.state = EngineState::Running;

        tracing::info!(
            session = %self.session_id,
            total_sec = config.total_sec(),
            reps = config.reps,
            "Workout started"
        );

        let mut events = Vec::new();
        if self.position.phase == Phase::Done {
            self.finish(StopReason::Completed, &mut events);
        } else {
            self.open_lap(self.position, start_ts, &mut events);
        }
        Ok(events)
    }

    /// Advance the run by one second.
    ///
    /// A no-op unless running. Closing and opening laps is the only effect.
    pub fn tick(&mut self) -> Vec<LapEvent> {
        let mut events = Vec::new();
        let scheduler = match (self.state, self.scheduler) {
            (EngineState::Running, Some(scheduler)) => scheduler,
            _ => {
                tracing::trace!(state = %self.state, "Tick ignored");
                return events;
            }
        };

        self.elapsed_sec += 1;
        let next = scheduler.position(self.elapsed_sec);
        let now = self.current_ts();

        if next.key() != self.position.key() {
            self.close_open_lap(now, &mut events);
            if next.phase == Phase::Done {
                self.position = next;
                self.finish(StopReason::Completed, &mut events);
                return events;
            }
            self.open_lap(next, now, &mut events);
        }

        self.position = next;
        events
    }

    /// End the run early, closing the open lap at the current tick.
    pub fn stop(&mut self) -> Result<Vec<LapEvent>, EngineError> {
        if self.state != EngineState::Running {
            return Err(EngineError::InvalidTransition {
                operation: "stop",
                state: self.state,
            });
        }

        let mut events = Vec::new();
        let now = self.current_ts();
        self.close_open_lap(now, &mut events);
        self.finish(StopReason::Stopped, &mut events);
        Ok(events)
    }

    /// Return to idle, discarding samples and laps
    pub fn reset(&mut self) -> Result<(), EngineError> {
        if self.state == EngineState::Running {
            return Err(EngineError::InvalidTransition {
                operation: "reset",
                state: self.state,
            });
        }

        self.clear_session();
        self.scheduler = None;
        self.state = EngineState::Idle;
        tracing::info!("Session reset");
        Ok(())
    }

    /// Record a sample on a channel.
    ///
    /// Accepted in every state. Only samples arriving while a lap is open feed
    /// that lap's speed/incline candidates. Non-finite values are discarded.
    pub fn ingest(&mut self, channel: Channel, timestamp: i64, value: f64, source: SampleSource) {
        self.ingest_sample(channel, Sample::new(timestamp, value, source));
    }

    pub fn ingest_sample(&mut self, channel: Channel, sample: Sample) {
        if !sample.value.is_finite() {
            tracing::warn!(%channel, timestamp = sample.timestamp, "Discarding non-finite sample");
            return;
        }

        tracing::trace!(%channel, timestamp = sample.timestamp, value = sample.value, "Sample ingested");
        self.store.ingest(channel, sample);

        match LapField::from_channel(channel) {
            None => self.window.push(sample),
            Some(field) => {
                let lap_open = self.state == EngineState::Running && self.current_lap().is_some();
                self.resolver.record_reading(field, sample.value, sample.source, lap_open);
            }
        }
    }

    /// Replace zone thresholds, coercing out-of-order boundaries upward
    pub fn set_zone_thresholds(&mut self, raw: [f64; 5]) {
        let (normalized, changed) = ZoneThresholds::normalize(raw);
        if changed {
            tracing::warn!(?raw, ?normalized, "Zone thresholds were not ascending; normalized");
        }
        self.zones.set_thresholds(ZoneThresholds::new(normalized));
    }

    pub fn zone_thresholds(&self) -> &ZoneThresholds {
        self.zones.thresholds()
    }

    /// Set a work lap's speed or incline by repetition index.
    ///
    /// Targets the open lap as a manual override when it is the matching work
    /// lap; otherwise edits the closed work lap after the fact.
    pub fn apply_manual_override(&mut self, rep_index: u32, field: LapField, value: f64) -> Result<(), EngineError> {
        if !value.is_finite() {
            return Err(EngineError::InvalidValue { field, value });
        }

        let open_matches = self.state == EngineState::Running
            && self
                .current_lap()
                .map_or(false, |lap| lap.phase == Phase::Work && lap.rep_index == rep_index);

        if open_matches {
            self.resolver.set_manual(field, value);
            tracing::info!(rep_index, ?field, value, "Manual override for open lap");
            return Ok(());
        }

        let lap = self
            .laps
            .iter_mut()
            .find(|lap| lap.phase == Phase::Work && lap.rep_index == rep_index && !lap.is_open())
            .ok_or(EngineError::LapNotFound { rep_index })?;

        LapResolver::apply_edit(lap, field, value)?;
        tracing::info!(rep_index, ?field, value, "Lap edited");
        Ok(())
    }

    /// Time in each zone for heart-rate samples in `range`.
    ///
    /// Without a range, covers the run from the first lap start to the last
    /// lap end (or the current tick while a lap is open).
    pub fn zone_seconds(&self, range: Option<TimeRange>) -> ZoneSeconds {
        match range.or_else(|| self.run_span()) {
            Some(range) => self.zones.compute(&self.store.range_query(Channel::HeartRate, range)),
            None => [0.0; ZoneThresholds::ZONE_COUNT],
        }
    }

    pub fn zone_distribution(&self, range: Option<TimeRange>) -> ZoneDistribution {
        ZoneDistribution::from_seconds(self.zone_seconds(range))
    }

    /// Zone totals for one lap, `None` for an unknown index
    pub fn lap_zone_seconds(&self, index: usize) -> Option<ZoneSeconds> {
        let lap = self.laps.get(index)?;
        let end = lap.end_ts.unwrap_or_else(|| self.current_ts());
        Some(self.zone_seconds(Some(TimeRange::new(lap.start_ts, end))))
    }

    /// Time span covered by the run so far
    pub fn run_span(&self) -> Option<TimeRange> {
        let first = self.laps.first()?;
        let last = self.laps.last()?;
        let end = last.end_ts.unwrap_or_else(|| self.current_ts());
        Some(TimeRange::new(first.start_ts, end))
    }

    /// All samples on a channel, sorted by timestamp
    pub fn session_samples(&self, channel: Channel) -> Vec<Sample> {
        self.store.sorted(channel)
    }

    pub fn laps(&self) -> &[Lap] {
        &self.laps
    }

    /// The open lap, if any
    pub fn current_lap(&self) -> Option<&Lap> {
        self.laps.last().filter(|lap| lap.is_open())
    }

    /// Recent heart-rate points for live display
    pub fn live_window(&self) -> &[Sample] {
        self.window.points()
    }

    pub fn seconds_since_last_heart_rate(&self, now_ms: i64) -> Option<f64> {
        self.window.seconds_since_last(now_ms)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn position(&self) -> PhasePosition {
        self.position
    }

    pub fn elapsed_sec(&self) -> u64 {
        self.elapsed_sec
    }

    pub fn config(&self) -> Option<&WorkoutConfig> {
        self.scheduler.as_ref().map(IntervalScheduler::config)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Host-clock timestamp of the current tick
    pub fn current_ts(&self) -> i64 {
        self.run_start_ts + (self.elapsed_sec as i64) * 1000
    }

    /// Copy of the full entity set for persistence or export
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            exported_at: Utc::now(),
            state: self.state,
            config: self.config().copied(),
            thresholds: *self.zones.thresholds(),
            run_start_ts: self.run_start_ts,
            elapsed_sec: self.elapsed_sec,
            laps: self.laps.clone(),
            heart_rate: self.session_samples(Channel::HeartRate),
            speed: self.session_samples(Channel::Speed),
            incline: self.session_samples(Channel::Incline),
            zone_seconds: self.zone_seconds(None),
        }
    }

    /// Rebuild a stopped engine from a snapshot.
    ///
    /// A lap left open in the snapshot is closed at the snapshot's last tick,
    /// the same way `stop` would. Post-hoc lap edits work on the result.
    pub fn restore(snapshot: SessionSnapshot, settings: EngineSettings) -> Self {
        let mut engine = Self::new(settings);
        engine.session_id = snapshot.session_id;
        engine.scheduler = snapshot.config.map(IntervalScheduler::new);
        engine.run_start_ts = snapshot.run_start_ts;
        engine.elapsed_sec = snapshot.elapsed_sec;
        engine.zones.set_thresholds(snapshot.thresholds);
        engine.position = engine
            .scheduler
            .map(|s| s.position(snapshot.elapsed_sec))
            .unwrap_or_else(PhasePosition::done);

        engine.laps = snapshot.laps;
        let open_since = engine.current_lap().map(|lap| lap.start_ts);

        for (channel, samples) in [
            (Channel::HeartRate, snapshot.heart_rate),
            (Channel::Speed, snapshot.speed),
            (Channel::Incline, snapshot.incline),
        ] {
            for sample in samples {
                engine.store.ingest(channel, sample);
                match LapField::from_channel(channel) {
                    None => engine.window.push(sample),
                    Some(field) => {
                        // Replay so an open lap resolves from its own readings
                        let in_open_lap = open_since.map_or(false, |start| sample.timestamp >= start);
                        engine.resolver.record_reading(field, sample.value, sample.source, in_open_lap);
                    }
                }
            }
        }

        if open_since.is_some() {
            let mut events = Vec::new();
            let now = engine.current_ts();
            engine.close_open_lap(now, &mut events);
        }

        engine.state = if engine.laps.is_empty() && engine.scheduler.is_none() {
            EngineState::Idle
        } else {
            EngineState::Stopped
        };
        engine.stop_reason = match (engine.state, engine.position.phase) {
            (EngineState::Stopped, Phase::Done) => Some(StopReason::Completed),
            (EngineState::Stopped, _) => Some(StopReason::Stopped),
            _ => None,
        };

        tracing::info!(session = %engine.session_id, laps = engine.laps.len(), "Session restored");
        engine
    }

    fn open_lap(&mut self, position: PhasePosition, start_ts: i64, events: &mut Vec<LapEvent>) {
        self.resolver.open_lap();
        self.laps.push(Lap::open(position.phase, position.rep_index, start_ts));
        let index = self.laps.len() - 1;

        tracing::info!(
            index,
            phase = %position.phase,
            rep = position.rep_index,
            remaining_sec = position.remaining_sec,
            "Lap opened"
        );
        events.push(LapEvent::Opened {
            index,
            phase: position.phase,
            rep_index: position.rep_index,
        });
    }

    fn close_open_lap(&mut self, end_ts: i64, events: &mut Vec<LapEvent>) {
        let start_ts = match self.current_lap() {
            Some(lap) => lap.start_ts,
            None => return,
        };

        let heart_rate = self
            .store
            .range_query(Channel::HeartRate, TimeRange::new(start_ts, end_ts));
        let max_avg = self.rolling.compute(&heart_rate);

        let index = self.laps.len() - 1;
        if let Some(lap) = self.laps.last_mut() {
            lap.end_ts = Some(end_ts);
            lap.max_window_avg_bpm = max_avg;
            self.resolver.close_lap(lap);

            tracing::info!(
                index,
                lap = %lap.label(),
                duration_ms = end_ts - start_ts,
                max_window_avg_bpm = ?max_avg,
                speed = ?lap.speed_value,
                speed_source = %lap.speed_source,
                "Lap closed"
            );
        }
        events.push(LapEvent::Closed { index });
    }

    fn finish(&mut self, reason: StopReason, events: &mut Vec<LapEvent>) {
        self.state = EngineState::Stopped;
        self.stop_reason = Some(reason);
        tracing::info!(?reason, elapsed_sec = self.elapsed_sec, laps = self.laps.len(), "Workout finished");
        events.push(LapEvent::Finished { reason });
    }

    fn clear_session(&mut self) {
        self.store.clear();
        self.window.clear();
        self.laps.clear();
        self.resolver.reset();
        self.elapsed_sec = 0;
        self.run_start_ts = 0;
        self.position = PhasePosition::done();
        self.stop_reason = None;
    }
}

impl Default for WorkoutEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricSource;

    fn started(config: WorkoutConfig) -> WorkoutEngine {
        let mut engine = WorkoutEngine::default();
        engine.start_at(config, 0).unwrap();
        engine
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut engine = WorkoutEngine::default();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.stop().is_err());

        engine.start_at(WorkoutConfig::new(0, 10, 5, 1, 0), 0).unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert!(engine.start_at(WorkoutConfig::default(), 0).is_err());
        assert!(engine.reset().is_err());

        engine.stop().unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.stop_reason(), Some(StopReason::Stopped));
        assert!(engine.start_at(WorkoutConfig::default(), 0).is_err());

        engine.reset().unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.laps().is_empty());
        assert!(engine.session_samples(Channel::HeartRate).is_empty());
        assert!(engine.live_window().is_empty());
    }

    #[test]
    fn test_start_opens_first_lap() {
        let engine = started(WorkoutConfig::new(5, 10, 5, 1, 0));
        let lap = engine.current_lap().unwrap();
        assert_eq!((lap.phase, lap.rep_index, lap.start_ts), (Phase::Warmup, 0, 0));
    }

    #[test]
    fn test_empty_config_finishes_immediately() {
        let mut engine = WorkoutEngine::default();
        let events = engine.start_at(WorkoutConfig::new(0, 0, 0, 0, 0), 0).unwrap();
        assert_eq!(events, vec![LapEvent::Finished { reason: StopReason::Completed }]);
        assert!(engine.laps().is_empty());
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[test]
    fn test_tick_after_done_is_noop() {
        let mut engine = started(WorkoutConfig::new(0, 2, 1, 1, 0));
        for _ in 0..3 {
            engine.tick();
        }
        assert_eq!(engine.state(), EngineState::Stopped);
        let laps_before = engine.laps().to_vec();
        assert!(engine.tick().is_empty());
        assert_eq!(engine.elapsed_sec(), 3);
        assert_eq!(engine.laps(), laps_before.as_slice());
    }

    #[test]
    fn test_tick_events() {
        let mut engine = started(WorkoutConfig::new(0, 2, 1, 1, 0));
        assert!(engine.tick().is_empty());
        assert_eq!(
            engine.tick(),
            vec![
                LapEvent::Closed { index: 0 },
                LapEvent::Opened { index: 1, phase: Phase::Rest, rep_index: 1 },
            ]
        );
        assert_eq!(
            engine.tick(),
            vec![
                LapEvent::Closed { index: 1 },
                LapEvent::Finished { reason: StopReason::Completed },
            ]
        );
    }

    #[test]
    fn test_stop_mid_lap_resolves() {
        let mut engine = started(WorkoutConfig::new(0, 60, 30, 2, 0));
        for s in 0..20 {
            engine.ingest(Channel::HeartRate, s * 1000, 150.0, SampleSource::Device);
            engine.tick();
        }
        engine.ingest(Channel::Speed, 19_500, 11.0, SampleSource::Device);
        engine.stop().unwrap();

        let lap = &engine.laps()[0];
        assert_eq!(lap.end_ts, Some(20_000));
        assert_eq!(lap.speed_value, Some(11.0));
        assert_eq!(lap.speed_source, MetricSource::CandidateEnd);
        assert!((lap.max_window_avg_bpm.unwrap() - 150.0).abs() < 1e-9);
        assert!(engine.current_lap().is_none());
    }

    #[test]
    fn test_idle_ingestion_is_stored_but_not_candidate() {
        let mut engine = WorkoutEngine::default();
        engine.ingest(Channel::Speed, 0, 9.0, SampleSource::Device);
        assert_eq!(engine.session_samples(Channel::Speed).len(), 1);

        let mut engine = started(WorkoutConfig::new(0, 5, 0, 1, 0));
        engine.stop().unwrap();
        engine.ingest(Channel::Speed, 6000, 9.0, SampleSource::Device);
        assert_eq!(engine.session_samples(Channel::Speed).len(), 1);
        assert_eq!(engine.laps()[0].speed_source, MetricSource::Unknown);
    }

    #[test]
    fn test_live_window_ordered_after_late_ingest() {
        let mut engine = WorkoutEngine::default();
        engine.ingest(Channel::HeartRate, 2_000, 130.0, SampleSource::Device);
        engine.ingest(Channel::HeartRate, 1_000, 120.0, SampleSource::Device);

        assert_eq!(engine.live_window().last().map(|s| (s.timestamp, s.value)), Some((2_000, 130.0)));
        assert_eq!(engine.seconds_since_last_heart_rate(2_000), Some(0.0));
    }

    #[test]
    fn test_non_finite_sample_discarded() {
        let mut engine = WorkoutEngine::default();
        engine.ingest(Channel::HeartRate, 0, f64::NAN, SampleSource::Device);
        assert!(engine.session_samples(Channel::HeartRate).is_empty());
        assert!(engine.live_window().is_empty());
    }

    #[test]
    fn test_override_unknown_lap() {
        let mut engine = started(WorkoutConfig::new(0, 5, 5, 2, 0));
        assert_eq!(
            engine.apply_manual_override(2, LapField::Speed, 8.0),
            Err(EngineError::LapNotFound { rep_index: 2 })
        );
        assert!(matches!(
            engine.apply_manual_override(1, LapField::Speed, f64::INFINITY),
            Err(EngineError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_thresholds_normalized() {
        let mut engine = WorkoutEngine::default();
        engine.set_zone_thresholds([150.0, 140.0, 160.0, 170.0, 180.0]);
        assert_eq!(engine.zone_thresholds().bounds(), &[150.0, 150.0, 160.0, 170.0, 180.0]);
    }

    #[test]
    fn test_zone_seconds_without_run_is_zero() {
        let mut engine = WorkoutEngine::default();
        engine.ingest(Channel::HeartRate, 0, 150.0, SampleSource::Device);
        engine.ingest(Channel::HeartRate, 1000, 150.0, SampleSource::Device);
        assert_eq!(engine.zone_seconds(None), [0.0; 6]);
        let explicit = engine.zone_seconds(Some(TimeRange::new(0, 1000)));
        assert_eq!(explicit.iter().sum::<f64>(), 1.0);
    }
}

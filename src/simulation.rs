//! Simulated sample stream
//!
//! Stands in for a heart-rate strap and treadmill when none is connected.
//! Heart rate follows a first-order lag towards a per-phase target and is
//! emitted at irregular ~2 Hz spacing; speed and incline are reported once per
//! second and drop to zero during rest.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationSettings;
use crate::engine::{LapEvent, WorkoutEngine};
use crate::error::EngineError;
use crate::models::{Channel, Phase, Sample, SampleSource, WorkoutConfig};

/// Offset of the per-second speed/incline reading inside the second
const TREADMILL_OFFSET_MS: i64 = 250;

/// Deterministic (seeded) sample generator
#[derive(Debug, Clone)]
pub struct Simulator {
    settings: SimulationSettings,
    rng: StdRng,
    heart_rate: f64,
    last_hr_ts: Option<i64>,
    next_hr_ts: Option<i64>,
}

impl Simulator {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            settings,
            rng: StdRng::seed_from_u64(settings.seed),
            heart_rate: settings.resting_hr,
            last_hr_ts: None,
            next_hr_ts: None,
        }
    }

    /// Heart rate the simulated athlete drifts towards in a phase
    pub fn target_heart_rate(&self, phase: Phase) -> f64 {
        let s = &self.settings;
        match phase {
            Phase::Warmup => s.warmup_hr,
            Phase::Work => s.work_hr,
            Phase::Rest => s.rest_hr,
            Phase::Cooldown => (s.warmup_hr + s.resting_hr) / 2.0,
            Phase::Done => s.resting_hr,
        }
    }

    /// Treadmill (speed, incline) reported in a phase
    pub fn treadmill(&self, phase: Phase) -> (f64, f64) {
        let s = &self.settings;
        match phase {
            Phase::Warmup | Phase::Cooldown => (s.warmup_speed, 0.0),
            Phase::Work => (s.work_speed, s.work_incline),
            Phase::Rest | Phase::Done => (0.0, 0.0),
        }
    }

    /// All samples falling in `[second_start_ts, second_start_ts + 1000)`
    pub fn samples_for_second(&mut self, phase: Phase, second_start_ts: i64) -> Vec<(Channel, Sample)> {
        let mut out = Vec::new();
        let second_end = second_start_ts + 1000;
        let target = self.target_heart_rate(phase);

        let mut next = self.next_hr_ts.unwrap_or(second_start_ts);
        while next < second_end {
            let dt_sec = self
                .last_hr_ts
                .map_or(0.0, |last| (next - last).max(0) as f64 / 1000.0);
            let alpha = 1.0 - (-dt_sec / self.settings.hr_time_constant_sec.max(0.1)).exp();
            let noise: f64 = self.rng.gen_range(-1.5..=1.5);
            self.heart_rate += (target - self.heart_rate) * alpha;

            let bpm = (self.heart_rate + noise).round().max(30.0);
            out.push((Channel::HeartRate, Sample::new(next, bpm, SampleSource::Simulated)));

            self.last_hr_ts = Some(next);
            let jitter = self.settings.hr_jitter_ms;
            let spread = if jitter > 0 { self.rng.gen_range(-jitter..=jitter) } else { 0 };
            next += (self.settings.hr_interval_ms + spread).max(1);
        }
        self.next_hr_ts = Some(next);

        let (speed, incline) = self.treadmill(phase);
        let ts = second_start_ts + TREADMILL_OFFSET_MS;
        out.push((Channel::Speed, Sample::new(ts, speed, SampleSource::Simulated)));
        out.push((Channel::Incline, Sample::new(ts, incline, SampleSource::Simulated)));

        out
    }
}

/// Run a whole workout synchronously on simulated samples.
///
/// Samples for each second are ingested before the tick that ends it, so every
/// lap sees the readings produced during its own phase.
pub fn run_simulated_session(
    engine: &mut WorkoutEngine,
    config: WorkoutConfig,
    settings: SimulationSettings,
    start_ts: i64,
) -> Result<Vec<LapEvent>, EngineError> {
    let mut simulator = Simulator::new(settings);
    let mut events = engine.start_at(config, start_ts)?;

    let _span = tracing::info_span!("simulated_session", total_sec = config.total_sec()).entered();

    for _ in 0..config.total_sec() {
        if engine.state() != crate::engine::EngineState::Running {
            break;
        }
        let phase = engine.position().phase;
        for (channel, sample) in simulator.samples_for_second(phase, engine.current_ts()) {
            engine.ingest_sample(channel, sample);
        }
        events.extend(engine.tick());
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricSource;

    #[test]
    fn test_same_seed_same_stream() {
        let settings = SimulationSettings::default();
        let mut a = Simulator::new(settings);
        let mut b = Simulator::new(settings);
        for s in 0..20 {
            assert_eq!(
                a.samples_for_second(Phase::Work, s * 1000),
                b.samples_for_second(Phase::Work, s * 1000)
            );
        }
    }

    #[test]
    fn test_heart_rate_spacing_is_irregular_and_ordered() {
        let mut sim = Simulator::new(SimulationSettings::default());
        let mut hr_ts = Vec::new();
        for s in 0..30 {
            for (channel, sample) in sim.samples_for_second(Phase::Work, s * 1000) {
                if channel == Channel::HeartRate {
                    assert!(sample.timestamp >= s * 1000 && sample.timestamp < (s + 1) * 1000);
                    hr_ts.push(sample.timestamp);
                }
            }
        }
        let gaps: Vec<i64> = hr_ts.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.iter().all(|&g| (350..=650).contains(&g)));
        assert!(gaps.iter().any(|&g| g != gaps[0]));
    }

    #[test]
    fn test_heart_rate_rises_during_work() {
        let mut sim = Simulator::new(SimulationSettings::default());
        let mut last = 0.0;
        for s in 0..120 {
            for (channel, sample) in sim.samples_for_second(Phase::Work, s * 1000) {
                if channel == Channel::HeartRate {
                    last = sample.value;
                }
            }
        }
        assert!(last > 160.0);
    }

    #[test]
    fn test_run_simulated_session() {
        let mut engine = WorkoutEngine::default();
        let config = WorkoutConfig::new(10, 30, 15, 2, 10);
        run_simulated_session(&mut engine, config, SimulationSettings::default(), 0).unwrap();

        let laps = engine.laps();
        assert_eq!(laps.len(), 6);
        assert_eq!(laps.last().unwrap().end_ts, Some(110_000));

        let work = &laps[1];
        assert_eq!(work.speed_value, Some(12.0));
        assert_eq!(work.speed_source, MetricSource::CandidateEnd);
        assert!(work.max_window_avg_bpm.is_some());

        let rest = &laps[2];
        assert_eq!(rest.speed_source, MetricSource::Forced);
    }
}

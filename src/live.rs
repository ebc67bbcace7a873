//! Live event loop
//!
//! One task owns the engine. Ticks come from a `tokio::time::interval`, and
//! everything else (samples, overrides, stop requests) arrives over a single
//! `mpsc` channel, so ticks and ingestion are strictly serialized without any
//! lock around the engine.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SimulationSettings;
use crate::engine::{EngineState, LapEvent, WorkoutEngine};
use crate::error::EngineError;
use crate::models::{Channel, LapField, Sample, WorkoutConfig};
use crate::scheduler::{position_at, PhasePosition};
use crate::simulation::Simulator;

/// Message delivered to a running session
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Sample { channel: Channel, sample: Sample },
    Override { rep_index: u32, field: LapField, value: f64 },
    Thresholds([f64; 5]),
    Stop,
}

/// Status published after every tick
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub elapsed_sec: u64,
    pub position: PhasePosition,
    pub heart_rate: Option<f64>,
    /// Seconds since the last heart-rate sample, on the session clock
    pub last_seen_sec: Option<f64>,
    pub events: Vec<LapEvent>,
}

/// Engine plus the clock that drives it
pub struct LiveSession {
    engine: WorkoutEngine,
    tick_period: Duration,
    updates: Option<mpsc::UnboundedSender<LiveUpdate>>,
}

impl LiveSession {
    pub fn new(engine: WorkoutEngine, tick_period: Duration) -> Self {
        Self {
            engine,
            tick_period,
            updates: None,
        }
    }

    /// Publish a `LiveUpdate` after every tick
    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<LiveUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Start the workout and run until it completes or a stop request arrives.
    ///
    /// Returns the stopped engine. A closed inbound channel is not an error;
    /// the clock keeps driving the plan to its end.
    pub async fn run(
        mut self,
        config: WorkoutConfig,
        start_ts: i64,
        mut inbound: mpsc::Receiver<Inbound>,
    ) -> Result<WorkoutEngine, EngineError> {
        let events = self.engine.start_at(config, start_ts)?;
        self.publish(events);

        let mut ticker = tokio::time::interval(self.tick_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        // The first tick of an interval completes immediately
        ticker.tick().await;

        let mut inbound_open = true;

        while self.engine.state() == EngineState::Running {
            tokio::select! {
                _ = ticker.tick() => {
                    let events = self.engine.tick();
                    self.publish(events);
                }
                message = inbound.recv(), if inbound_open => match message {
                    Some(message) => self.handle(message)?,
                    None => {
                        tracing::debug!("Inbound channel closed");
                        inbound_open = false;
                    }
                },
            }
        }

        Ok(self.engine)
    }

    fn handle(&mut self, message: Inbound) -> Result<(), EngineError> {
        match message {
            Inbound::Sample { channel, sample } => self.engine.ingest_sample(channel, sample),
            Inbound::Override { rep_index, field, value } => {
                if let Err(e) = self.engine.apply_manual_override(rep_index, field, value) {
                    tracing::warn!(error = %e, "Override rejected");
                }
            }
            Inbound::Thresholds(raw) => self.engine.set_zone_thresholds(raw),
            Inbound::Stop => {
                let events = self.engine.stop()?;
                self.publish(events);
            }
        }
        Ok(())
    }

    fn publish(&mut self, events: Vec<LapEvent>) {
        let Some(updates) = &self.updates else {
            return;
        };

        let now = self.engine.current_ts();
        let update = LiveUpdate {
            elapsed_sec: self.engine.elapsed_sec(),
            position: self.engine.position(),
            heart_rate: self.engine.live_window().last().map(|s| s.value),
            last_seen_sec: self.engine.seconds_since_last_heart_rate(now),
            events,
        };

        if updates.send(update).is_err() {
            tracing::debug!("Update receiver dropped");
            self.updates = None;
        }
    }
}

/// Feed a simulated sample stream into a session.
///
/// Runs on its own clock with the same period as the session; sample
/// timestamps follow the session clock (`start_ts + second * 1000`), so a
/// shortened period replays the workout faster than real time.
pub fn spawn_simulator(
    inbound: mpsc::Sender<Inbound>,
    settings: SimulationSettings,
    config: WorkoutConfig,
    start_ts: i64,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut simulator = Simulator::new(settings);
        let mut ticker = tokio::time::interval(period);

        for second in 0..config.total_sec() {
            ticker.tick().await;
            let phase = position_at(second, &config).phase;
            let second_start = start_ts + second as i64 * 1000;

            for (channel, sample) in simulator.samples_for_second(phase, second_start) {
                if inbound.send(Inbound::Sample { channel, sample }).await.is_err() {
                    tracing::debug!("Session gone, simulator exiting");
                    return;
                }
            }
        }
    })
}

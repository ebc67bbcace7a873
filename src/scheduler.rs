//! Interval scheduling
//!
//! Maps elapsed whole seconds onto the workout layout. Pure and deterministic:
//! the same `(elapsed, config)` always yields the same position. Phases with a
//! zero planned duration are never produced, and the trailing rest after the
//! final work repetition is scheduled like every other rest.

use serde::{Deserialize, Serialize};

use crate::models::{Phase, WorkoutConfig};

/// Where in the workout an elapsed time falls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePosition {
    pub phase: Phase,
    /// 0 for warmup, cooldown and done
    pub rep_index: u32,
    /// Seconds left in the current phase, 0 once done
    pub remaining_sec: u64,
}

impl PhasePosition {
    pub fn done() -> Self {
        Self {
            phase: Phase::Done,
            rep_index: 0,
            remaining_sec: 0,
        }
    }

    /// Lap identity; a change means the open lap must be closed
    pub fn key(&self) -> (Phase, u32) {
        (self.phase, self.rep_index)
    }
}

/// One entry of the planned phase sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPhase {
    pub phase: Phase,
    pub rep_index: u32,
    pub start_sec: u64,
    pub duration_sec: u64,
}

impl PlannedPhase {
    pub fn end_sec(&self) -> u64 {
        self.start_sec + self.duration_sec
    }
}

/// Scheduler for a single workout layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalScheduler {
    config: WorkoutConfig,
}

impl IntervalScheduler {
    pub fn new(config: WorkoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkoutConfig {
        &self.config
    }

    pub fn total_sec(&self) -> u64 {
        self.config.total_sec()
    }

    /// Position for `elapsed_sec` seconds since the run started
    pub fn position(&self, elapsed_sec: u64) -> PhasePosition {
        position_at(elapsed_sec, &self.config)
    }

    /// Every phase the run will pass through, in order
    pub fn plan(&self) -> Vec<PlannedPhase> {
        plan(&self.config)
    }
}

/// Compute `(phase, rep_index, remaining)` for an elapsed time.
pub fn position_at(elapsed_sec: u64, config: &WorkoutConfig) -> PhasePosition {
    let warmup = u64::from(config.warmup_sec);
    let work = u64::from(config.work_sec);
    let cycle = config.cycle_sec();
    let main = config.main_sec();
    let total = config.total_sec();
    let t = elapsed_sec;

    if t >= total {
        return PhasePosition::done();
    }

    if t < warmup {
        return PhasePosition {
            phase: Phase::Warmup,
            rep_index: 0,
            remaining_sec: warmup - t,
        };
    }

    // main > 0 implies cycle > 0
    if t < warmup + main {
        let t2 = t - warmup;
        let rep_index = (t2 / cycle) as u32 + 1;
        let within = t2 % cycle;

        return if within < work {
            PhasePosition {
                phase: Phase::Work,
                rep_index,
                remaining_sec: work - within,
            }
        } else {
            PhasePosition {
                phase: Phase::Rest,
                rep_index,
                remaining_sec: cycle - within,
            }
        };
    }

    PhasePosition {
        phase: Phase::Cooldown,
        rep_index: 0,
        remaining_sec: total - t,
    }
}

/// Planned phase sequence, skipping zero-duration phases.
pub fn plan(config: &WorkoutConfig) -> Vec<PlannedPhase> {
    let mut out = Vec::new();
    let mut cursor = 0u64;

    let mut push = |phase: Phase, rep_index: u32, duration_sec: u64| {
        if duration_sec > 0 {
            out.push(PlannedPhase {
                phase,
                rep_index,
                start_sec: cursor,
                duration_sec,
            });
            cursor += duration_sec;
        }
    };

    push(Phase::Warmup, 0, u64::from(config.warmup_sec));
    for rep in 1..=config.reps {
        push(Phase::Work, rep, u64::from(config.work_sec));
        push(Phase::Rest, rep, u64::from(config.rest_sec));
    }
    push(Phase::Cooldown, 0, u64::from(config.cooldown_sec));

    out
}

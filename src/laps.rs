//! End-of-lap speed/incline resolution
//!
//! Work laps take, in order: a manual value entered during the lap, the last
//! live reading seen while the lap was open, then the most recent live reading
//! from any phase. Rest laps are forced to a neutral value. Warmup and
//! cooldown carry the last known value for context only.

use crate::error::EngineError;
use crate::models::{Lap, LapField, MetricSource, Phase, SampleSource};

/// Neutral speed/incline recorded for rest laps
pub const DEFAULT_REST_NEUTRAL_VALUE: f64 = 0.0;

/// Per-field optional values (speed, incline)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct FieldSlots {
    speed: Option<f64>,
    incline: Option<f64>,
}

impl FieldSlots {
    fn get(&self, field: LapField) -> Option<f64> {
        match field {
            LapField::Speed => self.speed,
            LapField::Incline => self.incline,
        }
    }

    fn set(&mut self, field: LapField, value: f64) {
        match field {
            LapField::Speed => self.speed = Some(value),
            LapField::Incline => self.incline = Some(value),
        }
    }
}

/// Inputs available for one field when a lap closes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldInputs {
    pub manual: Option<f64>,
    pub candidate: Option<f64>,
    pub last_known: Option<f64>,
}

/// Decide a lap field's value and where it came from.
pub fn resolve_field(phase: Phase, inputs: FieldInputs, rest_neutral_value: f64) -> (Option<f64>, MetricSource) {
    match phase {
        Phase::Work => {
            if let Some(value) = inputs.manual {
                (Some(value), MetricSource::Manual)
            } else if let Some(value) = inputs.candidate {
                (Some(value), MetricSource::CandidateEnd)
            } else {
                match inputs.last_known {
                    Some(value) if value > 0.0 => (Some(value), MetricSource::LastKnown),
                    other => (other, MetricSource::Unknown),
                }
            }
        }
        Phase::Rest => (Some(rest_neutral_value), MetricSource::Forced),
        Phase::Warmup | Phase::Cooldown => match inputs.last_known {
            Some(value) => (Some(value), MetricSource::LastKnown),
            None => (None, MetricSource::Unknown),
        },
        Phase::Done => (None, MetricSource::Unknown),
    }
}

/// Tracks per-lap candidates and overrides, and resolves laps at close
#[derive(Debug, Clone)]
pub struct LapResolver {
    rest_neutral_value: f64,
    manual: FieldSlots,
    candidate: FieldSlots,
    last_known: FieldSlots,
}

impl LapResolver {
    pub fn new(rest_neutral_value: f64) -> Self {
        Self {
            rest_neutral_value,
            manual: FieldSlots::default(),
            candidate: FieldSlots::default(),
            last_known: FieldSlots::default(),
        }
    }

    /// Forget per-lap state when a new lap opens
    pub fn open_lap(&mut self) {
        self.manual = FieldSlots::default();
        self.candidate = FieldSlots::default();
    }

    /// Forget everything, including last known readings
    pub fn reset(&mut self) {
        *self = Self::new(self.rest_neutral_value);
    }

    /// Feed a speed or incline reading.
    ///
    /// Live readings always update the last known value but only become lap
    /// candidates while a lap is open. Manual readings count as an override
    /// for the open lap.
    pub fn record_reading(&mut self, field: LapField, value: f64, source: SampleSource, lap_open: bool) {
        if source.is_live() {
            self.last_known.set(field, value);
            if lap_open {
                self.candidate.set(field, value);
            }
        } else if lap_open {
            self.manual.set(field, value);
        }
    }

    /// Explicit override for the open lap
    pub fn set_manual(&mut self, field: LapField, value: f64) {
        self.manual.set(field, value);
    }

    pub fn last_known(&self, field: LapField) -> Option<f64> {
        self.last_known.get(field)
    }

    pub fn candidate(&self, field: LapField) -> Option<f64> {
        self.candidate.get(field)
    }

    fn inputs(&self, field: LapField) -> FieldInputs {
        FieldInputs {
            manual: self.manual.get(field),
            candidate: self.candidate.get(field),
            last_known: self.last_known.get(field),
        }
    }

    /// Write resolved speed and incline into a lap being closed
    pub fn close_lap(&self, lap: &mut Lap) {
        for field in [LapField::Speed, LapField::Incline] {
            let (value, source) = resolve_field(lap.phase, self.inputs(field), self.rest_neutral_value);
            lap.set_metric(field, value, source);
        }
    }

    /// Post-hoc edit of a closed work lap
    pub fn apply_edit(lap: &mut Lap, field: LapField, value: f64) -> Result<(), EngineError> {
        if lap.phase != Phase::Work || lap.is_open() {
            return Err(EngineError::LapNotFound {
                rep_index: lap.rep_index,
            });
        }
        lap.set_metric(field, Some(value), MetricSource::ManualEdit);
        Ok(())
    }
}

impl Default for LapResolver {
    fn default() -> Self {
        Self::new(DEFAULT_REST_NEUTRAL_VALUE)
    }
}

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::DomainError;

/// Step grid of one loop, used to quantize strikes for step patterns.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LoopTiming {
    /// Beats per minute.
    pub bpm: f32,
    pub steps_per_beat: u32,
    pub steps_per_cycle: usize,
}

impl LoopTiming {
    pub fn new(bpm: f32, steps_per_beat: u32, steps_per_cycle: usize) -> Result<Self, DomainError> {
        let timing = Self {
            bpm,
            steps_per_beat,
            steps_per_cycle,
        };
        timing.validate()?;
        Ok(timing)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if !(10.0..=400.0).contains(&self.bpm) {
            return Err(DomainError::validation(
                "loop bpm must be between 10 and 400",
            ));
        }
        if self.steps_per_beat == 0 {
            return Err(DomainError::validation("steps_per_beat must be > 0"));
        }
        if self.steps_per_cycle == 0 {
            return Err(DomainError::validation("steps_per_cycle must be > 0"));
        }
        Ok(())
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    pub fn step_seconds(&self) -> f64 {
        self.seconds_per_beat() / self.steps_per_beat as f64
    }

    pub fn cycle_seconds(&self) -> f64 {
        self.step_seconds() * self.steps_per_cycle as f64
    }

    pub fn cycle_duration(&self) -> Duration {
        Duration::seconds_f64(self.cycle_seconds())
    }

    /// Step whose tick has most recently fired at `seconds` into the loop.
    ///
    /// Negative or non-finite times clamp to step 0.
    pub fn step_at(&self, seconds: f64) -> usize {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        let step = (seconds / self.step_seconds()).floor() as usize;
        step % self.steps_per_cycle
    }
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            steps_per_beat: 1,
            steps_per_cycle: 16,
        }
    }
}

use std::collections::BTreeSet;

use serde::Serialize;

use crate::distance::interval_vector;
use crate::DomainError;

/// Expected onset times within one cycle, in seconds.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TimedPattern {
    times: Vec<f64>,
    cycle_seconds: f64,
    /// Received intervals needed before a melody performance is judged.
    confirm_run: Option<usize>,
}

impl TimedPattern {
    pub fn new(times: Vec<f64>, cycle_seconds: f64) -> Result<Self, DomainError> {
        if !cycle_seconds.is_finite() || cycle_seconds <= 0.0 {
            return Err(DomainError::validation("cycle length must be positive"));
        }
        if times.is_empty() {
            return Err(DomainError::validation("pattern requires at least one time"));
        }
        if times.iter().any(|t| !t.is_finite() || *t < 0.0 || *t >= cycle_seconds) {
            return Err(DomainError::validation(format!(
                "pattern times must lie within [0, {cycle_seconds})"
            )));
        }
        if times.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(DomainError::validation("pattern times must be ascending"));
        }
        Ok(Self {
            times,
            cycle_seconds,
            confirm_run: None,
        })
    }

    pub fn with_confirm_run(mut self, run: usize) -> Self {
        self.confirm_run = Some(run);
        self
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn cycle_seconds(&self) -> f64 {
        self.cycle_seconds
    }

    pub fn intervals(&self) -> Vec<f64> {
        interval_vector(&self.times)
    }

    /// Melody confirmation run, clamped to `[1, intervals]`.
    ///
    /// Defaults to the full interval count of the pattern.
    pub fn confirm_run(&self) -> usize {
        let intervals = self.len().saturating_sub(1).max(1);
        self.confirm_run.unwrap_or(intervals).clamp(1, intervals)
    }
}

/// Expected step indices within a loop of `steps_per_cycle` steps.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct StepPattern {
    steps: BTreeSet<usize>,
    steps_per_cycle: usize,
}

impl StepPattern {
    pub fn new(
        steps: impl IntoIterator<Item = usize>,
        steps_per_cycle: usize,
    ) -> Result<Self, DomainError> {
        if steps_per_cycle == 0 {
            return Err(DomainError::validation("steps_per_cycle must be > 0"));
        }
        let steps: BTreeSet<usize> = steps.into_iter().collect();
        if steps.is_empty() {
            return Err(DomainError::validation("pattern requires at least one step"));
        }
        if let Some(step) = steps.iter().find(|s| **s >= steps_per_cycle) {
            return Err(DomainError::validation(format!(
                "step {step} outside cycle of {steps_per_cycle}"
            )));
        }
        Ok(Self {
            steps,
            steps_per_cycle,
        })
    }

    /// Builds a pattern from a 0/1 row with one column per step.
    pub fn from_row(row: &[u8], steps_per_cycle: usize) -> Result<Self, DomainError> {
        if row.len() != steps_per_cycle {
            return Err(DomainError::validation(format!(
                "row has {} columns, but steps_per_cycle={steps_per_cycle}",
                row.len()
            )));
        }
        let steps = row
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0)
            .map(|(i, _)| i);
        Self::new(steps, steps_per_cycle)
    }

    /// Expected steps in ascending order.
    pub fn steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps_per_cycle(&self) -> usize {
        self.steps_per_cycle
    }
}

/// Rows of a clouds x steps matrix, validated as a whole.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepMatrix {
    rows: Vec<StepPattern>,
}

impl StepMatrix {
    pub fn new(rows: &[Vec<u8>], steps_per_cycle: usize) -> Result<Self, DomainError> {
        let Some(first) = rows.first() else {
            return Err(DomainError::validation("step matrix cannot be empty"));
        };
        if first.len() != steps_per_cycle {
            return Err(DomainError::validation(format!(
                "step matrix has {} columns, but steps_per_cycle={steps_per_cycle}",
                first.len()
            )));
        }
        if rows.iter().any(|row| row.len() != first.len()) {
            return Err(DomainError::validation(
                "all step matrix rows must have the same number of columns",
            ));
        }
        let rows = rows
            .iter()
            .map(|row| StepPattern::from_row(row, steps_per_cycle))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[StepPattern] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<StepPattern> {
        self.rows
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    Timed(TimedPattern),
    Steps(StepPattern),
}

impl Pattern {
    pub fn expected_count(&self) -> usize {
        match self {
            Pattern::Timed(pattern) => pattern.len(),
            Pattern::Steps(pattern) => pattern.len(),
        }
    }

    pub fn as_timed(&self) -> Option<&TimedPattern> {
        match self {
            Pattern::Timed(pattern) => Some(pattern),
            Pattern::Steps(_) => None,
        }
    }

    pub fn as_steps(&self) -> Option<&StepPattern> {
        match self {
            Pattern::Steps(pattern) => Some(pattern),
            Pattern::Timed(_) => None,
        }
    }
}

impl From<TimedPattern> for Pattern {
    fn from(pattern: TimedPattern) -> Self {
        Pattern::Timed(pattern)
    }
}

impl From<StepPattern> for Pattern {
    fn from(pattern: StepPattern) -> Self {
        Pattern::Steps(pattern)
    }
}

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration as StdDuration, Instant};

use nimbus_domain::{InputEvent, RawInput};
use serde::{Deserialize, Serialize};
use time::Duration;

/// Monotonic time source for round windows.
pub trait Clock {
    /// Time elapsed since the clock's own origin.
    fn now(&self) -> StdDuration;
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> StdDuration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock. Clones share the same time, so a test or a replay can
/// keep one handle and move time under a controller that owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<StdDuration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f64) {
        let step = StdDuration::try_from_secs_f64(seconds).unwrap_or_default();
        self.now.set(self.now.get() + step);
    }

    /// Moves to `seconds` since origin. Time never goes backwards.
    pub fn set(&self, seconds: f64) {
        let target = StdDuration::try_from_secs_f64(seconds).unwrap_or_default();
        if target > self.now.get() {
            self.now.set(target);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> StdDuration {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PlayMode {
    #[default]
    Beat,
    Melody,
}

/// Inputs received since the start of the current round.
#[derive(Debug)]
pub struct RoundWindow<C: Clock> {
    clock: C,
    start: StdDuration,
    duration: Duration,
    inputs: Vec<InputEvent>,
    mode: PlayMode,
}

impl<C: Clock> RoundWindow<C> {
    pub fn new(clock: C, duration: Duration) -> Self {
        let start = clock.now();
        Self {
            clock,
            start,
            duration,
            inputs: Vec::new(),
            mode: PlayMode::Beat,
        }
    }

    /// Starts a fresh round now. Calling it twice leaves the same empty round.
    pub fn reset(&mut self) {
        self.start = self.clock.now();
        self.inputs.clear();
    }

    pub fn register_input(&mut self, input: RawInput) -> InputEvent {
        let event = InputEvent::new(self.elapsed(), input.note);
        self.inputs.push(event);
        event
    }

    /// Seconds since the round started.
    pub fn elapsed(&self) -> f64 {
        self.clock.now().saturating_sub(self.start).as_secs_f64()
    }

    pub fn is_timed_out(&self) -> bool {
        self.elapsed() > self.duration.as_seconds_f64()
    }

    pub fn inputs(&self) -> &[InputEvent] {
        &self.inputs
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PlayMode) {
        self.mode = mode;
    }
}

use nimbus_domain::{Pattern, PatternBook, RawInput};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::{debug, info, warn};

use crate::error::TutorError;
use crate::mastery::{MasteryTracker, RoundMetrics};
use crate::matching::{MatchEngine, MatchOutcome};
use crate::queue::InputReceiver;
use crate::window::{Clock, PlayMode, RoundWindow};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Stage {
    Active(usize),
    Complete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressionState {
    pub current_index: usize,
    pub all_mastered: bool,
    /// Set once a melody performance has been judged `End`.
    pub melody_resolved: bool,
}

/// What the presentation layer gets back from every tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickReport {
    pub outcome: MatchOutcome,
    pub stage: Stage,
    /// The active cloud changed during this tick.
    pub advanced: bool,
    /// A fresh round started during this tick.
    pub round_restarted: bool,
    pub state: ProgressionState,
}

struct Cloud {
    id: String,
    pattern: Pattern,
    round_duration: Duration,
}

/// Drives the clouds of a book from first to last.
pub struct ProgressionController<C: Clock> {
    clouds: Vec<Cloud>,
    engine: MatchEngine,
    tracker: MasteryTracker,
    round: RoundWindow<C>,
    round_index: usize,
    current: usize,
    stage: Stage,
    melody_resolved: bool,
}

impl<C: Clock> ProgressionController<C> {
    pub fn from_book(book: &PatternBook, clock: C) -> Result<Self, TutorError> {
        let patterns = book.patterns()?;
        let tracker = MasteryTracker::for_patterns(&patterns, &book.timing, book.tolerances.steps);
        let timed_duration = Duration::seconds_f64(book.cycle_seconds);
        let clouds: Vec<Cloud> = book
            .clouds
            .iter()
            .zip(patterns)
            .map(|(spec, pattern)| Cloud {
                id: spec.id.clone(),
                round_duration: match pattern {
                    Pattern::Timed(_) => timed_duration,
                    Pattern::Steps(_) => book.timing.cycle_duration(),
                },
                pattern,
            })
            .collect();
        let round = RoundWindow::new(clock, clouds[0].round_duration);
        info!(clouds = clouds.len(), "progression ready");
        Ok(Self {
            clouds,
            engine: MatchEngine::from_book(book),
            tracker,
            round,
            round_index: 0,
            current: 0,
            stage: Stage::Active(0),
            melody_resolved: false,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> ProgressionState {
        ProgressionState {
            current_index: self.current,
            all_mastered: self.tracker.is_every_pattern_mastered(),
            melody_resolved: self.melody_resolved,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_pattern_id(&self) -> &str {
        &self.clouds[self.current].id
    }

    pub fn current_pattern(&self) -> &Pattern {
        &self.clouds[self.current].pattern
    }

    pub fn tracker(&self) -> &MasteryTracker {
        &self.tracker
    }

    pub fn round(&self) -> &RoundWindow<C> {
        &self.round
    }

    pub fn round_index(&self) -> usize {
        self.round_index
    }

    pub fn mode(&self) -> PlayMode {
        self.round.mode()
    }

    /// Adds an input to the round. Melody notes are refused in beat mode
    /// until every cloud is mastered; returns whether the input was kept.
    pub fn register_input(&mut self, input: RawInput) -> bool {
        if input.note.is_some()
            && self.round.mode() == PlayMode::Beat
            && !self.tracker.is_every_pattern_mastered()
        {
            warn!(note = ?input.note, "no melody without the beat");
            return false;
        }
        let event = self.round.register_input(input);
        debug!(timestamp = event.timestamp, note = ?event.note, "input registered");
        true
    }

    /// Moves every queued input into the round, in arrival order, and
    /// returns how many were kept.
    pub fn drain(&mut self, receiver: &mut InputReceiver) -> usize {
        let mut kept = 0;
        while let Some(input) = receiver.try_recv() {
            if self.register_input(input) {
                kept += 1;
            }
        }
        kept
    }

    /// Makes cloud `index` the active one and starts a fresh round for it.
    pub fn select(&mut self, index: usize) -> Result<(), TutorError> {
        let index = nimbus_domain::DomainError::check_index(index, self.clouds.len())?;
        self.current = index;
        if self.stage != Stage::Complete {
            self.stage = Stage::Active(index);
        }
        self.round.set_duration(self.clouds[index].round_duration);
        self.restart_round();
        Ok(())
    }

    pub fn enter_melody_mode(&mut self) -> Result<(), TutorError> {
        if !self.tracker.is_every_pattern_mastered() {
            warn!("melody requested before every cloud is mastered");
            return Err(TutorError::MelodyLocked);
        }
        if self.round.mode() != PlayMode::Melody {
            info!(cloud = %self.current_pattern_id(), "entering melody mode");
            self.round.set_mode(PlayMode::Melody);
            self.restart_round();
        }
        Ok(())
    }

    pub fn leave_melody_mode(&mut self) {
        if self.round.mode() != PlayMode::Beat {
            self.round.set_mode(PlayMode::Beat);
            self.restart_round();
        }
    }

    /// Discards the round in progress without touching mastery.
    pub fn reset_round(&mut self) {
        self.restart_round();
    }

    /// Clears every cloud's mastery and history and starts over at cloud 0.
    pub fn reset_progress(&mut self) {
        self.tracker.reset_all();
        self.melody_resolved = false;
        self.stage = Stage::Active(0);
        self.current = 0;
        self.round.set_mode(PlayMode::Beat);
        self.round.set_duration(self.clouds[0].round_duration);
        self.restart_round();
    }

    /// One evaluation cycle: timeout check, then a single match.
    pub fn tick(&mut self) -> TickReport {
        if self.round.is_timed_out() {
            return self.close_timed_out_round();
        }

        let outcome = self.engine.evaluate(&self.round, self.current_pattern());
        let mut advanced = false;
        let mut round_restarted = false;
        match outcome {
            MatchOutcome::None | MatchOutcome::Progress | MatchOutcome::Reset => {}
            MatchOutcome::Next => {
                if self.stage != Stage::Complete {
                    self.confirm_current();
                    advanced = self.advance();
                }
                self.restart_round();
                round_restarted = true;
            }
            MatchOutcome::End => {
                if !self.melody_resolved {
                    info!(cloud = %self.current_pattern_id(), "melody resolved");
                }
                self.melody_resolved = true;
                self.restart_round();
                round_restarted = true;
            }
            MatchOutcome::Cheat
            | MatchOutcome::TooFast
            | MatchOutcome::TooSlow
            | MatchOutcome::WrongNotes => {
                debug!(?outcome, cloud = %self.current_pattern_id(), "round forfeited");
                self.restart_round();
                round_restarted = true;
            }
        }
        if outcome != MatchOutcome::None {
            debug!(?outcome, round = self.round_index, "tick");
        }
        self.report(outcome, advanced, round_restarted)
    }

    fn close_timed_out_round(&mut self) -> TickReport {
        let mut outcome = MatchOutcome::Reset;
        let mut advanced = false;
        if let Some(metrics) = self.record_step_round() {
            // The last strike landed in the same tick as the deadline.
            if metrics.is_clean() && self.stage != Stage::Complete {
                outcome = MatchOutcome::Next;
                advanced = self.advance();
            }
        }
        debug!(?outcome, round = self.round_index, "round timed out");
        self.restart_round();
        self.report(outcome, advanced, true)
    }

    fn report(&self, outcome: MatchOutcome, advanced: bool, round_restarted: bool) -> TickReport {
        TickReport {
            outcome,
            stage: self.stage,
            advanced,
            round_restarted,
            state: self.state(),
        }
    }

    fn restart_round(&mut self) {
        self.round.reset();
        self.round_index += 1;
    }

    /// Feeds the round's strikes to the tracker when the active cloud is a
    /// step pattern and returns that round's metrics.
    fn record_step_round(&mut self) -> Option<RoundMetrics> {
        let pattern = self.clouds[self.current].pattern.as_steps()?;
        let steps = self
            .engine
            .steps
            .quantize(self.round.inputs(), pattern.steps_per_cycle());
        for step in steps {
            if let Err(err) = self
                .tracker
                .register_prediction(self.round_index, self.current, step)
            {
                warn!(%err, "prediction rejected");
            }
        }
        match self.tracker.evaluate_round(self.round_index, self.current) {
            Ok(metrics) => Some(metrics),
            Err(err) => {
                warn!(%err, "round evaluation failed");
                None
            }
        }
    }

    fn confirm_current(&mut self) {
        let confirmed = match self.record_step_round() {
            Some(metrics) => metrics.is_clean(),
            None => self.tracker.mark_mastered(self.current).is_ok(),
        };
        if !confirmed {
            warn!(cloud = %self.current_pattern_id(), "match not confirmed by tracker");
        }
    }

    /// Moves to the next unresolved cloud, or to `Complete`.
    fn advance(&mut self) -> bool {
        match self.tracker.next_unresolved_pattern() {
            Some(next) => {
                let changed = next != self.current;
                self.current = next;
                self.stage = Stage::Active(next);
                self.round.set_duration(self.clouds[next].round_duration);
                if changed {
                    info!(cloud = %self.current_pattern_id(), index = next, "next cloud");
                }
                changed
            }
            None => {
                info!("every cloud mastered");
                self.stage = Stage::Complete;
                true
            }
        }
    }
}

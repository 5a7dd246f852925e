//! Per-tick classification of a round's inputs against the active pattern.
//!
//! Timed patterns are judged on their interval vectors, never on absolute
//! onsets, so a player who starts the round late but keeps the spacing still
//! matches. Step patterns are quantized onto the loop grid and matched with
//! ring tolerance.

use std::collections::BTreeSet;

use nimbus_domain::events::timestamps;
use nimbus_domain::{
    abs_differences, padded_intervals, InputEvent, LoopTiming, Pattern, PatternBook,
};
use serde::{Deserialize, Serialize};

use crate::mastery::greedy_match;
use crate::window::{Clock, PlayMode, RoundWindow};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchOutcome {
    /// Nothing new; the round continues.
    None,
    Progress,
    Next,
    Cheat,
    TooFast,
    TooSlow,
    Reset,
    End,
    WrongNotes,
}

impl MatchOutcome {
    /// Outcomes that cost the player the current round.
    pub fn is_violation(self) -> bool {
        matches!(
            self,
            MatchOutcome::Cheat
                | MatchOutcome::TooFast
                | MatchOutcome::TooSlow
                | MatchOutcome::WrongNotes
        )
    }
}

pub trait MatchStrategy {
    fn evaluate(&self, inputs: &[InputEvent], pattern: &Pattern) -> MatchOutcome;
}

/// Elementwise `|reference - received| < tolerance`.
///
/// `None` when the vectors differ in length or a difference is not finite.
fn interval_matches(reference: &[f64], received: &[f64], tolerance: f64) -> Option<Vec<bool>> {
    if reference.len() != received.len() {
        return None;
    }
    let diffs = abs_differences(reference, received);
    if diffs.iter().any(|d| !d.is_finite()) {
        return None;
    }
    Some(diffs.into_iter().map(|d| d < tolerance).collect())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatMatcher {
    pub tolerance: f64,
}

impl Default for BeatMatcher {
    fn default() -> Self {
        Self { tolerance: 0.12 }
    }
}

impl MatchStrategy for BeatMatcher {
    fn evaluate(&self, inputs: &[InputEvent], pattern: &Pattern) -> MatchOutcome {
        let Some(pattern) = pattern.as_timed() else {
            return MatchOutcome::None;
        };
        if inputs.len() < 2 {
            return MatchOutcome::None;
        }
        if inputs.len() > pattern.len() {
            return MatchOutcome::Cheat;
        }

        let reference = pattern.intervals();
        let received = padded_intervals(&timestamps(inputs), reference.len());
        let Some(matches) = interval_matches(&reference, &received, self.tolerance) else {
            return MatchOutcome::None;
        };

        if matches.iter().all(|m| *m) {
            MatchOutcome::Next
        } else if matches.iter().any(|m| *m) {
            MatchOutcome::Progress
        } else {
            MatchOutcome::None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MelodyMatcher {
    pub tolerance: f64,
    pub allowed_notes: BTreeSet<u8>,
}

impl Default for MelodyMatcher {
    fn default() -> Self {
        Self {
            tolerance: 0.01,
            allowed_notes: BTreeSet::from([49, 51, 63]),
        }
    }
}

impl MatchStrategy for MelodyMatcher {
    fn evaluate(&self, inputs: &[InputEvent], pattern: &Pattern) -> MatchOutcome {
        let Some(pattern) = pattern.as_timed() else {
            return MatchOutcome::None;
        };
        if inputs.len() < 2 {
            return MatchOutcome::None;
        }
        let reference = pattern.intervals();
        if reference.is_empty() {
            return MatchOutcome::None;
        }
        let received = padded_intervals(&timestamps(inputs), reference.len());

        let first = received[0];
        if !first.is_finite() || first < reference[0] - self.tolerance {
            return MatchOutcome::TooFast;
        }
        if first > reference[0] + self.tolerance {
            return MatchOutcome::TooSlow;
        }

        // Longer than the pattern: nothing lines up any more.
        let Some(matches) = interval_matches(&reference, &received, self.tolerance) else {
            return MatchOutcome::None;
        };

        let run = pattern.confirm_run();
        let played = inputs.len() - 1;
        if played < run || !matches[..run].iter().all(|m| *m) {
            return MatchOutcome::None;
        }

        let in_key = inputs.iter().all(|event| {
            event
                .note
                .map_or(false, |note| self.allowed_notes.contains(&note))
        });
        if in_key {
            MatchOutcome::End
        } else {
            MatchOutcome::WrongNotes
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMatcher {
    pub timing: LoopTiming,
    pub tolerance: usize,
}

impl StepMatcher {
    /// Steps of `inputs` on the loop grid, first occurrence order, no repeats.
    pub fn quantize(&self, inputs: &[InputEvent], steps_per_cycle: usize) -> Vec<usize> {
        let mut steps = Vec::with_capacity(inputs.len());
        for event in inputs {
            let step = self.timing.step_at(event.timestamp) % steps_per_cycle.max(1);
            if !steps.contains(&step) {
                steps.push(step);
            }
        }
        steps
    }
}

impl Default for StepMatcher {
    fn default() -> Self {
        Self {
            timing: LoopTiming::default(),
            tolerance: 0,
        }
    }
}

impl MatchStrategy for StepMatcher {
    fn evaluate(&self, inputs: &[InputEvent], pattern: &Pattern) -> MatchOutcome {
        let Some(pattern) = pattern.as_steps() else {
            return MatchOutcome::None;
        };
        if inputs.is_empty() {
            return MatchOutcome::None;
        }
        let predictions = self.quantize(inputs, pattern.steps_per_cycle());
        let hits = greedy_match(
            pattern.steps(),
            &predictions,
            self.tolerance,
            pattern.steps_per_cycle(),
        );
        if hits.len() == pattern.len() {
            MatchOutcome::Next
        } else if !hits.is_empty() {
            MatchOutcome::Progress
        } else {
            MatchOutcome::None
        }
    }
}

/// Picks the strategy for a pattern representation and play mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchEngine {
    pub beat: BeatMatcher,
    pub melody: MelodyMatcher,
    pub steps: StepMatcher,
}

impl MatchEngine {
    pub fn from_book(book: &PatternBook) -> Self {
        Self {
            beat: BeatMatcher {
                tolerance: book.tolerances.beat_seconds,
            },
            melody: MelodyMatcher {
                tolerance: book.tolerances.melody_seconds,
                allowed_notes: book.melody_notes.iter().copied().collect(),
            },
            steps: StepMatcher {
                timing: book.timing,
                tolerance: book.tolerances.steps,
            },
        }
    }

    pub fn strategy(&self, pattern: &Pattern, mode: PlayMode) -> &dyn MatchStrategy {
        match (pattern, mode) {
            (Pattern::Steps(_), _) => &self.steps,
            (Pattern::Timed(_), PlayMode::Beat) => &self.beat,
            (Pattern::Timed(_), PlayMode::Melody) => &self.melody,
        }
    }

    pub fn evaluate<C: Clock>(&self, round: &RoundWindow<C>, pattern: &Pattern) -> MatchOutcome {
        self.strategy(pattern, round.mode())
            .evaluate(round.inputs(), pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_domain::{StepPattern, TimedPattern};

    fn beat_pattern() -> Pattern {
        TimedPattern::new(vec![0.0, 0.937, 1.875, 2.812], 3.75)
            .unwrap()
            .into()
    }

    fn strikes(times: &[f64]) -> Vec<InputEvent> {
        times.iter().map(|t| InputEvent::strike(*t)).collect()
    }

    fn notes(times: &[f64], note: u8) -> Vec<InputEvent> {
        times.iter().map(|t| InputEvent::new(*t, Some(note))).collect()
    }

    #[test]
    fn beat_full_match_is_next() {
        let outcome = BeatMatcher::default()
            .evaluate(&strikes(&[0.01, 0.94, 1.88, 2.80]), &beat_pattern());
        assert_eq!(outcome, MatchOutcome::Next);
    }

    #[test]
    fn beat_partial_match_is_progress() {
        let matcher = BeatMatcher::default();
        assert_eq!(
            matcher.evaluate(&strikes(&[0.01]), &beat_pattern()),
            MatchOutcome::None
        );
        assert_eq!(
            matcher.evaluate(&strikes(&[0.01, 0.94]), &beat_pattern()),
            MatchOutcome::Progress
        );
    }

    #[test]
    fn beat_extra_strikes_are_cheating() {
        let matcher = BeatMatcher::default();
        let perfect = strikes(&[0.0, 0.937, 1.875, 2.812, 3.7]);
        assert_eq!(matcher.evaluate(&perfect, &beat_pattern()), MatchOutcome::Cheat);
        let sloppy = strikes(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(matcher.evaluate(&sloppy, &beat_pattern()), MatchOutcome::Cheat);
    }

    #[test]
    fn beat_without_any_matching_gap_is_none() {
        let outcome = BeatMatcher::default().evaluate(&strikes(&[0.0, 0.3, 0.6]), &beat_pattern());
        assert_eq!(outcome, MatchOutcome::None);
    }

    #[test]
    fn beat_is_phase_invariant() {
        let matcher = BeatMatcher::default();
        let base = [0.01, 0.94, 1.88, 2.80];
        for inputs in [&base[..2], &base[..3], &base[..]] {
            let expected = matcher.evaluate(&strikes(inputs), &beat_pattern());
            for shift in [0.05, 0.3, 0.7] {
                let shifted: Vec<InputEvent> =
                    strikes(inputs).iter().map(|e| e.shifted(shift)).collect();
                assert_eq!(matcher.evaluate(&shifted, &beat_pattern()), expected);
            }
        }
    }

    #[test]
    fn beat_survives_non_finite_timestamps() {
        let outcome =
            BeatMatcher::default().evaluate(&strikes(&[0.0, f64::NAN, 1.0]), &beat_pattern());
        assert_eq!(outcome, MatchOutcome::None);
    }

    #[test]
    fn melody_first_gap_sets_tempo_hint() {
        let matcher = MelodyMatcher::default();
        assert_eq!(
            matcher.evaluate(&notes(&[0.0, 0.5], 63), &beat_pattern()),
            MatchOutcome::TooFast
        );
        assert_eq!(
            matcher.evaluate(&notes(&[0.0, 1.2], 63), &beat_pattern()),
            MatchOutcome::TooSlow
        );
        assert_eq!(
            matcher.evaluate(&notes(&[0.0, f64::INFINITY], 63), &beat_pattern()),
            MatchOutcome::TooFast
        );
    }

    #[test]
    fn melody_waits_for_confirmation_run() {
        let matcher = MelodyMatcher::default();
        let partial = notes(&[0.0, 0.937, 1.875], 63);
        assert_eq!(matcher.evaluate(&partial, &beat_pattern()), MatchOutcome::None);
        let full = notes(&[0.0, 0.937, 1.875, 2.812], 63);
        assert_eq!(matcher.evaluate(&full, &beat_pattern()), MatchOutcome::End);
    }

    #[test]
    fn melody_confirmation_run_is_per_pattern() {
        let pattern: Pattern = TimedPattern::new(vec![0.0, 0.937, 1.875, 2.812], 3.75)
            .unwrap()
            .with_confirm_run(2)
            .into();
        let partial = notes(&[0.0, 0.937, 1.875], 51);
        assert_eq!(
            MelodyMatcher::default().evaluate(&partial, &pattern),
            MatchOutcome::End
        );
    }

    #[test]
    fn builtin_piano_ends_after_twelve_notes() {
        let book = PatternBook::builtin();
        let piano = book.patterns().unwrap().remove(3);
        let engine = MatchEngine::from_book(&book);
        let melody = engine.strategy(&piano, PlayMode::Melody);
        let times = piano.as_timed().unwrap().times()[..12].to_vec();
        assert_eq!(
            melody.evaluate(&notes(&times[..11], 63), &piano),
            MatchOutcome::None
        );
        assert_eq!(melody.evaluate(&notes(&times, 63), &piano), MatchOutcome::End);
    }

    #[test]
    fn melody_validates_pitches() {
        let matcher = MelodyMatcher::default();
        let mut inputs = notes(&[0.0, 0.937, 1.875, 2.812], 49);
        inputs[2].note = Some(60);
        assert_eq!(matcher.evaluate(&inputs, &beat_pattern()), MatchOutcome::WrongNotes);
        inputs[2].note = None;
        assert_eq!(matcher.evaluate(&inputs, &beat_pattern()), MatchOutcome::WrongNotes);
    }

    #[test]
    fn melody_never_cheats() {
        let inputs = notes(&[0.0, 0.937, 1.875, 2.812, 3.7], 63);
        assert_eq!(
            MelodyMatcher::default().evaluate(&inputs, &beat_pattern()),
            MatchOutcome::None
        );
    }

    #[test]
    fn steps_match_on_the_grid() {
        let pattern: Pattern = StepPattern::new([0, 4, 8, 12], 16).unwrap().into();
        let matcher = StepMatcher::default();
        // 120 bpm, one step per beat: 0.5 s per step.
        assert_eq!(matcher.evaluate(&strikes(&[0.1]), &pattern), MatchOutcome::Progress);
        assert_eq!(
            matcher.evaluate(&strikes(&[0.1, 2.2, 4.1, 6.3]), &pattern),
            MatchOutcome::Next
        );
        assert_eq!(matcher.evaluate(&strikes(&[0.7]), &pattern), MatchOutcome::None);
        assert_eq!(matcher.evaluate(&[], &pattern), MatchOutcome::None);
    }

    #[test]
    fn quantize_dedupes_in_arrival_order() {
        let matcher = StepMatcher::default();
        let steps = matcher.quantize(&strikes(&[2.1, 0.2, 2.3, 8.4]), 16);
        assert_eq!(steps, vec![4, 0]);
    }

    #[test]
    fn strategies_ignore_foreign_patterns() {
        let steps: Pattern = StepPattern::new([0], 4).unwrap().into();
        assert_eq!(
            BeatMatcher::default().evaluate(&strikes(&[0.0, 1.0]), &steps),
            MatchOutcome::None
        );
        assert_eq!(
            StepMatcher::default().evaluate(&strikes(&[0.0]), &beat_pattern()),
            MatchOutcome::None
        );
    }

    #[test]
    fn engine_takes_tuning_from_book() {
        let mut book = PatternBook::builtin();
        book.tolerances.beat_seconds = 0.001;
        book.melody_notes = vec![70];
        let engine = MatchEngine::from_book(&book);
        assert_eq!(engine.beat.tolerance, 0.001);
        assert!(engine.melody.allowed_notes.contains(&70));
        let outcome = engine
            .strategy(&beat_pattern(), PlayMode::Beat)
            .evaluate(&strikes(&[0.01, 0.94, 1.88, 2.80]), &beat_pattern());
        assert_eq!(outcome, MatchOutcome::None);
    }

    #[test]
    fn violations() {
        assert!(MatchOutcome::Cheat.is_violation());
        assert!(MatchOutcome::WrongNotes.is_violation());
        assert!(!MatchOutcome::Reset.is_violation());
        assert!(!MatchOutcome::Next.is_violation());
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::matching::MatchOutcome;
use crate::progression::TickReport;

/// Running tally of what a session produced, for the end-of-session summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionAnalytics {
    pub ticks: u64,
    pub rounds: u64,
    pub advances: u32,
    pub outcomes: BTreeMap<MatchOutcome, u32>,
    pub longest_clean_streak: u32,
    current_streak: u32,
}

impl SessionAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        if report.round_restarted {
            self.rounds += 1;
        }
        if report.advanced {
            self.advances += 1;
        }
        if report.outcome != MatchOutcome::None {
            *self.outcomes.entry(report.outcome).or_insert(0) += 1;
        }
        match report.outcome {
            MatchOutcome::Next | MatchOutcome::End => {
                self.current_streak += 1;
                self.longest_clean_streak = self.longest_clean_streak.max(self.current_streak);
            }
            outcome if outcome.is_violation() || outcome == MatchOutcome::Reset => {
                self.current_streak = 0;
            }
            _ => {}
        }
    }

    pub fn count(&self, outcome: MatchOutcome) -> u32 {
        self.outcomes.get(&outcome).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progression::{ProgressionState, Stage};

    fn report(outcome: MatchOutcome, advanced: bool) -> TickReport {
        TickReport {
            outcome,
            stage: Stage::Active(0),
            advanced,
            round_restarted: outcome != MatchOutcome::None && outcome != MatchOutcome::Progress,
            state: ProgressionState {
                current_index: 0,
                all_mastered: false,
                melody_resolved: false,
            },
        }
    }

    #[test]
    fn analytics_tallies_outcomes() {
        let mut analytics = SessionAnalytics::new();
        for (outcome, advanced) in [
            (MatchOutcome::None, false),
            (MatchOutcome::Progress, false),
            (MatchOutcome::Next, true),
            (MatchOutcome::Next, true),
            (MatchOutcome::Cheat, false),
            (MatchOutcome::Next, false),
        ] {
            analytics.record(&report(outcome, advanced));
        }
        assert_eq!(analytics.ticks, 6);
        assert_eq!(analytics.rounds, 4);
        assert_eq!(analytics.advances, 2);
        assert_eq!(analytics.count(MatchOutcome::Next), 3);
        assert_eq!(analytics.count(MatchOutcome::None), 0);
        assert_eq!(analytics.longest_clean_streak, 2);
    }
}

use anyhow::{bail, Result};
use nimbus_domain::{PatternBook, RawInput};
use nimbus_tutor::{ManualClock, MatchOutcome, SessionAnalytics, TickReport};
use serde::{Deserialize, Serialize};

use crate::session::Session;

/// One recorded pad event, `at` seconds after the session started.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayEvent {
    pub at: f64,
    #[serde(default)]
    pub note: Option<u8>,
    #[serde(default)]
    pub melody_cue: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayLine {
    pub at: f64,
    pub cloud: String,
    #[serde(flatten)]
    pub report: TickReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub lines: Vec<ReplayLine>,
    pub played_notes: usize,
    pub analytics: SessionAnalytics,
}

/// Feeds recorded events through a session on a simulated clock ticking
/// every `tick_seconds`, and keeps every report that is not `None`.
pub fn replay(book: PatternBook, events: &[ReplayEvent], tick_seconds: f64) -> Result<ReplaySummary> {
    if !(tick_seconds.is_finite() && tick_seconds > 0.0) {
        bail!("tick length must be a positive number of seconds, got {tick_seconds}");
    }
    let mut events = events.to_vec();
    events.retain(|event| event.at.is_finite() && event.at >= 0.0);
    events.sort_by(|a, b| a.at.total_cmp(&b.at));

    let tail = book.cycle_seconds.max(book.timing.cycle_seconds());
    let end = events.last().map(|event| event.at).unwrap_or(0.0) + tail;

    let clock = ManualClock::new();
    let mut session = Session::new(book, clock.clone())?;
    let mut lines = Vec::new();
    let mut played_notes = 0;
    let mut pending = events.iter().peekable();
    let mut tick = 0u64;

    loop {
        let now = tick as f64 * tick_seconds;
        if now > end {
            break;
        }
        while let Some(event) = pending.next_if(|event| event.at <= now) {
            clock.set(event.at);
            if event.melody_cue {
                session.melody_cue()?;
            } else {
                session.register(event.note.map_or_else(RawInput::strike, RawInput::note));
            }
        }
        clock.set(now);
        let report = session.step(&mut |_: u8| played_notes += 1)?;
        if report.outcome != MatchOutcome::None {
            lines.push(ReplayLine {
                at: now,
                cloud: session.controller().current_pattern_id().to_owned(),
                report,
            });
        }
        tick += 1;
    }

    Ok(ReplaySummary {
        lines,
        played_notes,
        analytics: session.analytics().clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_domain::CloudSpec;
    use nimbus_tutor::Stage;

    fn strikes(times: &[f64]) -> Vec<ReplayEvent> {
        times
            .iter()
            .map(|at| ReplayEvent {
                at: *at,
                note: None,
                melody_cue: false,
            })
            .collect()
    }

    fn two_cloud_book() -> PatternBook {
        let mut book = PatternBook::builtin();
        book.clouds = vec![
            CloudSpec::timed("bongo", 47, vec![0.0, 0.937, 1.875, 2.812]),
            CloudSpec::timed("cowbell", 56, vec![0.0, 0.937, 1.875, 2.812]),
        ];
        book
    }

    #[test]
    fn steady_beat_advances_to_next_cloud() {
        let summary = replay(two_cloud_book(), &strikes(&[0.01, 0.94, 1.88, 2.80]), 0.05).unwrap();
        let first = summary
            .lines
            .iter()
            .find(|line| line.report.outcome == MatchOutcome::Next)
            .unwrap();
        assert!(first.report.advanced);
        assert_eq!(first.report.stage, Stage::Active(1));
        assert_eq!(summary.analytics.advances, 1);
        // The mastered bongo plays its four onsets in the following round.
        assert!(summary.played_notes >= 4);
    }

    #[test]
    fn silence_only_times_out() {
        let summary = replay(two_cloud_book(), &[], 0.1).unwrap();
        assert!(summary
            .lines
            .iter()
            .all(|line| line.report.outcome == MatchOutcome::Reset));
        assert_eq!(summary.analytics.advances, 0);
        assert_eq!(summary.played_notes, 0);
    }

    #[test]
    fn early_melody_cue_is_refused() {
        let events = vec![ReplayEvent {
            at: 0.2,
            note: None,
            melody_cue: true,
        }];
        let summary = replay(two_cloud_book(), &events, 0.1).unwrap();
        assert!(summary.lines.iter().all(|line| !line.report.state.melody_resolved));
    }

    #[test]
    fn rejects_bad_tick_length() {
        assert!(replay(two_cloud_book(), &[], 0.0).is_err());
        assert!(replay(two_cloud_book(), &[], f64::NAN).is_err());
    }
}

use anyhow::Result;
use nimbus_domain::{PatternBook, RawInput};
use nimbus_tutor::{
    Clock, InputReceiver, MatchOutcome, PlayMode, PlaybackSchedule, ProgressionController,
    SessionAnalytics, Stage, TickReport, TutorError,
};
use tracing::{info, warn};

/// Glue between the polling loop and the core: ticks the controller, keeps
/// the playback schedule in step with mastery and tallies the outcomes.
pub struct Session<C: Clock> {
    book: PatternBook,
    controller: ProgressionController<C>,
    schedule: PlaybackSchedule,
    analytics: SessionAnalytics,
}

impl<C: Clock> Session<C> {
    pub fn new(book: PatternBook, clock: C) -> Result<Self> {
        let controller = ProgressionController::from_book(&book, clock)?;
        Ok(Self {
            book,
            controller,
            schedule: PlaybackSchedule::default(),
            analytics: SessionAnalytics::new(),
        })
    }

    pub fn controller(&self) -> &ProgressionController<C> {
        &self.controller
    }

    pub fn analytics(&self) -> &SessionAnalytics {
        &self.analytics
    }

    /// Drains queued pad inputs into the round and sounds the active
    /// cloud's instrument once per strike kept in beat mode.
    pub fn drain(&mut self, receiver: &mut InputReceiver, feedback: &mut dyn FnMut(u8)) -> usize {
        let kept = self.controller.drain(receiver);
        if self.controller.mode() == PlayMode::Beat {
            let instrument = self.book.clouds[self.controller.current_index()].instrument;
            for _ in 0..kept {
                feedback(instrument);
            }
        }
        kept
    }

    pub fn register(&mut self, input: RawInput) -> bool {
        self.controller.register_input(input)
    }

    /// Enters melody mode when allowed. The round restarts, so the
    /// accompaniment starts over with it.
    pub fn melody_cue(&mut self) -> Result<()> {
        let entering = self.controller.mode() != PlayMode::Melody;
        match self.controller.enter_melody_mode() {
            Ok(()) if entering => {
                info!("melody mode: play the cloud's tune");
                self.rearm_playback()?;
            }
            Ok(()) => {}
            Err(TutorError::MelodyLocked) => {
                warn!("no melody without the beat: master every cloud first")
            }
            Err(err) => warn!(%err, "melody mode unavailable"),
        }
        Ok(())
    }

    fn rearm_playback(&mut self) -> Result<()> {
        self.schedule =
            PlaybackSchedule::for_mastered(&self.book, &self.controller.tracker().mastered_flags())?;
        Ok(())
    }

    /// Runs one tick and hands due playback notes to `play`.
    pub fn step(&mut self, play: &mut dyn FnMut(u8)) -> Result<TickReport> {
        let report = self.controller.tick();
        self.analytics.record(&report);
        announce(&report, self.controller.current_pattern_id());

        if report.round_restarted {
            self.rearm_playback()?;
        }
        for note in self.schedule.due(self.controller.round().elapsed()) {
            play(note);
        }
        Ok(report)
    }
}

fn announce(report: &TickReport, cloud: &str) {
    match report.outcome {
        MatchOutcome::None | MatchOutcome::Progress => {}
        MatchOutcome::Next if report.stage == Stage::Complete && report.advanced => {
            info!("you command the dance of the clouds")
        }
        MatchOutcome::Next if report.advanced => info!(%cloud, "you've got the beat"),
        MatchOutcome::Next => info!(%cloud, "beat matched"),
        MatchOutcome::Cheat => info!(%cloud, "no rhythm, no clouds"),
        MatchOutcome::TooFast => info!("feel the beat, slow down"),
        MatchOutcome::TooSlow => info!("feel the beat, speed up"),
        MatchOutcome::WrongNotes => info!("those notes don't break the spell"),
        MatchOutcome::End => info!("you broke the spell"),
        MatchOutcome::Reset if report.advanced => info!(%cloud, "you've got the beat"),
        MatchOutcome::Reset => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_domain::CloudSpec;
    use nimbus_tutor::{input_queue, ManualClock};

    fn book() -> PatternBook {
        let mut book = PatternBook::builtin();
        book.clouds = vec![
            CloudSpec::timed("bongo", 47, vec![0.0, 0.937, 1.875, 2.812]),
            CloudSpec::timed("cowbell", 56, vec![0.0, 0.937, 1.875, 2.812]),
        ];
        book
    }

    fn master_cloud(session: &mut Session<ManualClock>, clock: &ManualClock) -> TickReport {
        for gap in [0.01, 0.93, 0.94, 0.92] {
            clock.advance(gap);
            assert!(session.register(RawInput::strike()));
        }
        session.step(&mut |_: u8| {}).unwrap()
    }

    #[test]
    fn melody_cue_restarts_the_accompaniment() {
        let clock = ManualClock::new();
        let mut session = Session::new(book(), clock.clone()).unwrap();
        assert_eq!(master_cloud(&mut session, &clock).stage, Stage::Active(1));
        assert_eq!(master_cloud(&mut session, &clock).stage, Stage::Complete);

        // Both downbeats fired when the last round began; one second in,
        // the second beat of each cloud is due.
        let mut played = Vec::new();
        clock.advance(1.0);
        session.step(&mut |note: u8| played.push(note)).unwrap();
        played.sort_unstable();
        assert_eq!(played, vec![47, 56]);

        session.melody_cue().unwrap();
        assert_eq!(session.controller().mode(), PlayMode::Melody);
        played.clear();
        session.step(&mut |note: u8| played.push(note)).unwrap();
        played.sort_unstable();
        assert_eq!(played, vec![47, 56]);
    }

    #[test]
    fn locked_melody_cue_keeps_beat_mode() {
        let clock = ManualClock::new();
        let mut session = Session::new(book(), clock).unwrap();
        session.melody_cue().unwrap();
        assert_eq!(session.controller().mode(), PlayMode::Beat);
    }

    #[test]
    fn kept_strikes_echo_the_active_instrument() {
        let clock = ManualClock::new();
        let mut session = Session::new(book(), clock).unwrap();
        let (mut sender, mut receiver) = input_queue(8);
        sender.send(RawInput::strike());
        sender.send(RawInput::note(63));
        sender.send(RawInput::strike());

        let mut echoed = Vec::new();
        let kept = session.drain(&mut receiver, &mut |note: u8| echoed.push(note));
        assert_eq!(kept, 2);
        assert_eq!(echoed, vec![47, 47]);
        assert_eq!(session.controller().round().inputs().len(), 2);
    }
}

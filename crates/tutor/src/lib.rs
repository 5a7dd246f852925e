pub mod analytics;
pub mod error;
pub mod mastery;
pub mod matching;
pub mod midi;
pub mod playback;
pub mod progression;
pub mod queue;
pub mod window;

pub use analytics::SessionAnalytics;
pub use error::TutorError;
pub use mastery::{CloudProgress, CloudStatus, MasteryTracker, RoundMetrics};
pub use matching::{BeatMatcher, MatchEngine, MatchOutcome, MatchStrategy, MelodyMatcher, StepMatcher};
pub use midi::{MidiDevice, MidiManager, MidiNoteOut, PadMessage};
pub use playback::PlaybackSchedule;
pub use progression::{ProgressionController, ProgressionState, Stage, TickReport};
pub use queue::{input_queue, InputReceiver, InputSender};
pub use window::{Clock, ManualClock, MonotonicClock, PlayMode, RoundWindow};

pub mod book;
pub mod distance;
pub mod error;
pub mod events;
pub mod pattern;
pub mod timing;

pub use crate::book::{CloudSpec, PatternBook, Tolerances};
pub use crate::distance::{abs_differences, interval_vector, padded_intervals, ring_distance};
pub use crate::error::DomainError;
pub use crate::events::{InputEvent, RawInput};
pub use crate::pattern::{Pattern, StepMatrix, StepPattern, TimedPattern};
pub use crate::timing::LoopTiming;

use serde::{Deserialize, Serialize};

/// Strike as delivered by an input source, before the round window stamps it.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawInput {
    /// MIDI pitch for melodic input; `None` for a plain pad strike.
    pub note: Option<u8>,
}

impl RawInput {
    pub fn strike() -> Self {
        Self { note: None }
    }

    pub fn note(note: u8) -> Self {
        Self { note: Some(note) }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct InputEvent {
    /// Seconds since the start of the round.
    pub timestamp: f64,
    pub note: Option<u8>,
}

impl InputEvent {
    pub fn new(timestamp: f64, note: Option<u8>) -> Self {
        Self { timestamp, note }
    }

    pub fn strike(timestamp: f64) -> Self {
        Self::new(timestamp, None)
    }

    pub fn shifted(&self, offset: f64) -> Self {
        Self::new(self.timestamp + offset, self.note)
    }
}

/// Timestamps of `events` in arrival order.
pub fn timestamps(events: &[InputEvent]) -> Vec<f64> {
    events.iter().map(|event| event.timestamp).collect()
}

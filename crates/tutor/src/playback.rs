//! Fire-and-forget playback of mastered clouds.
//!
//! No matching happens here: each `(offset, note)` pair fires once per round
//! when the round's elapsed time reaches its offset.

use nimbus_domain::{DomainError, PatternBook};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSchedule {
    events: Vec<(f64, u8)>,
    next: usize,
}

impl PlaybackSchedule {
    pub fn new(mut events: Vec<(f64, u8)>) -> Self {
        events.retain(|(offset, _)| offset.is_finite());
        events.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { events, next: 0 }
    }

    /// Onsets of every cloud for which `mastered` holds.
    pub fn for_mastered(book: &PatternBook, mastered: &[bool]) -> Result<Self, DomainError> {
        let mut events = Vec::new();
        for (index, done) in mastered.iter().enumerate() {
            if *done {
                events.extend(book.onsets(index)?);
            }
        }
        Ok(Self::new(events))
    }

    /// Re-arms every event for a new round.
    pub fn restart(&mut self) {
        self.next = 0;
    }

    /// Notes whose offset has been reached and that have not fired yet.
    pub fn due(&mut self, elapsed: f64) -> Vec<u8> {
        let start = self.next;
        while self.next < self.events.len() && self.events[self.next].0 <= elapsed {
            self.next += 1;
        }
        self.events[start..self.next]
            .iter()
            .map(|(_, note)| *note)
            .collect()
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.events.len()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

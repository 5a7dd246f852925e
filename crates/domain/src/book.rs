use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pattern::{Pattern, StepMatrix, TimedPattern};
use crate::timing::LoopTiming;
use crate::DomainError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tolerances {
    /// Interval tolerance for beat mode, in seconds.
    pub beat_seconds: f64,
    /// Interval tolerance for melody mode, in seconds.
    pub melody_seconds: f64,
    /// Ring-distance tolerance for step patterns.
    pub steps: usize,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            beat_seconds: 0.12,
            melody_seconds: 0.01,
            steps: 0,
        }
    }
}

/// One cloud of the book: either onset `times` in seconds or a 0/1 step `row`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CloudSpec {
    pub id: String,
    /// Program/note number used when the cloud is played back.
    pub instrument: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub times: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm_run: Option<usize>,
}

impl CloudSpec {
    pub fn timed(id: impl Into<String>, instrument: u8, times: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            instrument,
            times: Some(times),
            row: None,
            confirm_run: None,
        }
    }

    pub fn stepped(id: impl Into<String>, instrument: u8, row: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            instrument,
            times: None,
            row: Some(row),
            confirm_run: None,
        }
    }
}

/// Pattern source for a session: clouds in progression order plus tuning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatternBook {
    /// Length of one round for timed clouds, in seconds.
    pub cycle_seconds: f64,
    #[serde(default)]
    pub timing: LoopTiming,
    #[serde(default)]
    pub tolerances: Tolerances,
    #[serde(default = "default_melody_notes")]
    pub melody_notes: Vec<u8>,
    pub clouds: Vec<CloudSpec>,
}

fn default_melody_notes() -> Vec<u8> {
    vec![63, 49, 51]
}

impl PatternBook {
    /// The four-cloud drum book the game ships with.
    pub fn builtin() -> Self {
        Self {
            cycle_seconds: 3.75,
            timing: LoopTiming::default(),
            tolerances: Tolerances::default(),
            melody_notes: default_melody_notes(),
            clouds: vec![
                CloudSpec::timed("bongo", 47, vec![0.0, 0.937, 1.875, 2.812]),
                CloudSpec::timed("cowbell", 56, vec![0.0, 0.937, 1.875, 2.812]),
                CloudSpec::timed(
                    "hihat",
                    44,
                    vec![0.468, 0.703, 1.406, 1.640, 2.343, 2.578, 3.281, 3.515],
                ),
                // Twelve notes in time break the spell; the rest of the tune is
                // accompaniment.
                CloudSpec {
                    confirm_run: Some(11),
                    ..CloudSpec::timed(
                        "piano",
                        0,
                        (0..22).map(|i| (i as f64 * 0.166 * 1000.0).round() / 1000.0).collect(),
                    )
                },
            ],
        }
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, DomainError> {
        let book: Self = serde_yaml::from_str(source)
            .map_err(|err| DomainError::Serialization(err.to_string()))?;
        book.validate()?;
        Ok(book)
    }

    pub fn from_json_str(source: &str) -> Result<Self, DomainError> {
        let book: Self = serde_json::from_str(source)
            .map_err(|err| DomainError::Serialization(err.to_string()))?;
        book.validate()?;
        Ok(book)
    }

    /// Loads a book, picking the format from the file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| DomainError::Serialization(format!("read {path:?}: {err}")))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    pub fn to_yaml(&self) -> Result<String, DomainError> {
        serde_yaml::to_string(self).map_err(|err| DomainError::Serialization(err.to_string()))
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        self.patterns().map(|_| ())
    }

    pub fn len(&self) -> usize {
        self.clouds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clouds.is_empty()
    }

    pub fn cloud(&self, index: usize) -> Result<&CloudSpec, DomainError> {
        DomainError::check_index(index, self.clouds.len()).map(|i| &self.clouds[i])
    }

    /// Builds the validated patterns, in cloud order.
    pub fn patterns(&self) -> Result<Vec<Pattern>, DomainError> {
        if self.clouds.is_empty() {
            return Err(DomainError::validation("pattern book has no clouds"));
        }
        self.timing.validate()?;
        if !self.tolerances.beat_seconds.is_finite()
            || !self.tolerances.melody_seconds.is_finite()
            || self.tolerances.beat_seconds < 0.0
            || self.tolerances.melody_seconds < 0.0
        {
            return Err(DomainError::validation("tolerances must be non-negative"));
        }

        let rows: Vec<Vec<u8>> = self
            .clouds
            .iter()
            .filter_map(|cloud| cloud.row.clone())
            .collect();
        let step_rows = if rows.is_empty() {
            Vec::new()
        } else {
            StepMatrix::new(&rows, self.timing.steps_per_cycle)?.into_rows()
        };
        let mut step_rows = step_rows.into_iter();

        let mut patterns = Vec::with_capacity(self.clouds.len());
        for cloud in &self.clouds {
            let pattern = match (&cloud.times, &cloud.row) {
                (Some(times), None) => {
                    let mut timed = TimedPattern::new(times.clone(), self.cycle_seconds)?;
                    if let Some(run) = cloud.confirm_run {
                        timed = timed.with_confirm_run(run);
                    }
                    Pattern::Timed(timed)
                }
                (None, Some(_)) => match step_rows.next() {
                    Some(steps) => Pattern::Steps(steps),
                    None => return Err(DomainError::validation("step rows out of sync")),
                },
                _ => {
                    return Err(DomainError::validation(format!(
                        "cloud {} needs exactly one of `times` or `row`",
                        cloud.id
                    )))
                }
            };
            patterns.push(pattern);
        }
        Ok(patterns)
    }

    /// `(offset, instrument)` pairs of a cloud, for playback scheduling.
    ///
    /// Step clouds are expanded on the loop grid.
    pub fn onsets(&self, index: usize) -> Result<Vec<(f64, u8)>, DomainError> {
        let cloud = self.cloud(index)?;
        let offsets: Vec<f64> = match (&cloud.times, &cloud.row) {
            (Some(times), _) => times.clone(),
            (None, Some(row)) => row
                .iter()
                .enumerate()
                .filter(|(_, v)| **v != 0)
                .map(|(i, _)| i as f64 * self.timing.step_seconds())
                .collect(),
            (None, None) => Vec::new(),
        };
        Ok(offsets
            .into_iter()
            .map(|offset| (offset, cloud.instrument))
            .collect())
    }
}

impl Default for PatternBook {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_book_is_valid() {
        let book = PatternBook::builtin();
        let patterns = book.patterns().unwrap();
        assert_eq!(patterns.len(), 4);
        assert_eq!(patterns[3].expected_count(), 22);
        let piano = patterns[3].as_timed().unwrap();
        assert!((piano.times()[21] - 3.486).abs() < 1e-9);
        assert_eq!(piano.confirm_run(), 11);
    }

    #[test]
    fn loads_yaml_with_defaults() {
        let source = r#"
cycle_seconds: 4.0
clouds:
  - id: kick
    instrument: 36
    times: [0.0, 1.0, 2.0, 3.0]
  - id: snare
    instrument: 38
    row: [0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0]
"#;
        let book = PatternBook::from_yaml_str(source).unwrap();
        assert_eq!(book.tolerances, Tolerances::default());
        assert_eq!(book.melody_notes, vec![63, 49, 51]);
        let patterns = book.patterns().unwrap();
        assert!(patterns[0].as_timed().is_some());
        assert_eq!(
            patterns[1].as_steps().unwrap().steps().collect::<Vec<_>>(),
            vec![4, 12]
        );
    }

    #[test]
    fn loads_json() {
        let source = r#"{
            "cycle_seconds": 2.0,
            "tolerances": {"beat_seconds": 0.1, "melody_seconds": 0.02, "steps": 1},
            "clouds": [{"id": "a", "instrument": 1, "times": [0.0, 0.5], "confirm_run": 1}]
        }"#;
        let book = PatternBook::from_json_str(source).unwrap();
        assert_eq!(book.tolerances.steps, 1);
        let patterns = book.patterns().unwrap();
        assert_eq!(patterns[0].as_timed().unwrap().confirm_run(), 1);
    }

    #[test]
    fn rejects_malformed_rows() {
        let source = r#"
cycle_seconds: 4.0
clouds:
  - id: short
    instrument: 38
    row: [1, 0, 1]
"#;
        let err = PatternBook::from_yaml_str(source).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn rejects_ambiguous_cloud() {
        let mut book = PatternBook::builtin();
        book.clouds[0].row = Some(vec![1; 16]);
        assert!(book.validate().is_err());
        book.clouds[0].times = None;
        book.clouds[0].row = None;
        assert!(book.validate().is_err());
    }

    #[test]
    fn reports_syntax_errors_as_serialization() {
        let err = PatternBook::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, DomainError::Serialization(_)));
    }

    #[test]
    fn onsets_carry_instrument() {
        let mut book = PatternBook::builtin();
        let onsets = book.onsets(1).unwrap();
        assert_eq!(onsets.len(), 4);
        assert!(onsets.iter().all(|(_, note)| *note == 56));
        book.clouds.push(CloudSpec::stepped("steps", 42, {
            let mut row = vec![0; 16];
            row[2] = 1;
            row
        }));
        assert_eq!(book.onsets(4).unwrap(), vec![(1.0, 42)]);
        assert!(book.onsets(9).is_err());
    }

    #[test]
    fn yaml_round_trip_keeps_book() {
        let book = PatternBook::builtin();
        let yaml = book.to_yaml().unwrap();
        assert_eq!(PatternBook::from_yaml_str(&yaml).unwrap(), book);
    }
}

//! Per-cloud bookkeeping across rounds.
//!
//! Each cloud keeps the steps the player predicted in every round, the
//! expected steps those predictions hit, and a `mastered` flag. The flag is
//! monotonic: a later round with misses never clears it. Only
//! [`MasteryTracker::reset_all`] does.

use std::collections::{BTreeMap, BTreeSet};

use nimbus_domain::{ring_distance, DomainError, LoopTiming, Pattern, StepMatrix};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CloudProgress {
    /// Round index -> predicted steps, in insertion order, without duplicates.
    pub predictions_by_round: BTreeMap<usize, Vec<usize>>,
    /// Round index -> expected steps that were hit.
    pub hits_by_round: BTreeMap<usize, BTreeSet<usize>>,
    pub mastered: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundMetrics {
    pub expected_count: usize,
    pub hit_count: usize,
    pub missed_count: usize,
}

impl RoundMetrics {
    pub fn is_clean(&self) -> bool {
        self.missed_count == 0 && self.expected_count > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudStatus {
    pub mastered: bool,
    pub rounds_recorded: Vec<usize>,
    pub hits_by_round: BTreeMap<usize, Vec<usize>>,
}

/// Greedy assignment of predictions to expected steps.
///
/// Expected steps are visited in ascending order; each takes the first unused
/// prediction (by insertion order) within `tolerance` on the ring. There is no
/// backtracking, so ties always go to the earliest prediction.
pub(crate) fn greedy_match(
    expected: impl IntoIterator<Item = usize>,
    predictions: &[usize],
    tolerance: usize,
    steps_per_cycle: usize,
) -> BTreeSet<usize> {
    let mut used = vec![false; predictions.len()];
    let mut hits = BTreeSet::new();
    for step in expected {
        let eligible = predictions.iter().enumerate().find(|(i, p)| {
            !used[*i] && ring_distance(**p, step, steps_per_cycle) <= tolerance
        });
        if let Some((i, _)) = eligible {
            used[i] = true;
            hits.insert(step);
        }
    }
    hits
}

#[derive(Debug, Clone)]
struct TrackedCloud {
    expected: Vec<usize>,
    steps_per_cycle: usize,
    progress: CloudProgress,
}

#[derive(Debug, Clone)]
pub struct MasteryTracker {
    clouds: Vec<TrackedCloud>,
    tolerance: usize,
}

impl MasteryTracker {
    pub fn from_matrix(matrix: &StepMatrix, tolerance: usize) -> Self {
        let clouds = matrix
            .rows()
            .iter()
            .map(|row| TrackedCloud {
                expected: row.steps().collect(),
                steps_per_cycle: row.steps_per_cycle(),
                progress: CloudProgress::default(),
            })
            .collect();
        Self { clouds, tolerance }
    }

    /// Tracks every pattern of a book. Timed patterns have no expected steps;
    /// they only become mastered through [`MasteryTracker::mark_mastered`].
    pub fn for_patterns(patterns: &[Pattern], timing: &LoopTiming, tolerance: usize) -> Self {
        let clouds = patterns
            .iter()
            .map(|pattern| match pattern {
                Pattern::Steps(steps) => TrackedCloud {
                    expected: steps.steps().collect(),
                    steps_per_cycle: steps.steps_per_cycle(),
                    progress: CloudProgress::default(),
                },
                Pattern::Timed(_) => TrackedCloud {
                    expected: Vec::new(),
                    steps_per_cycle: timing.steps_per_cycle.max(1),
                    progress: CloudProgress::default(),
                },
            })
            .collect();
        Self { clouds, tolerance }
    }

    pub fn len(&self) -> usize {
        self.clouds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clouds.is_empty()
    }

    pub fn tolerance(&self) -> usize {
        self.tolerance
    }

    fn cloud(&self, pattern_idx: usize) -> Result<&TrackedCloud, DomainError> {
        DomainError::check_index(pattern_idx, self.clouds.len()).map(|i| &self.clouds[i])
    }

    fn cloud_mut(&mut self, pattern_idx: usize) -> Result<&mut TrackedCloud, DomainError> {
        let index = DomainError::check_index(pattern_idx, self.clouds.len())?;
        Ok(&mut self.clouds[index])
    }

    pub fn register_prediction(
        &mut self,
        round_idx: usize,
        pattern_idx: usize,
        step_idx: usize,
    ) -> Result<(), DomainError> {
        let cloud = self.cloud_mut(pattern_idx)?;
        let step = step_idx % cloud.steps_per_cycle;
        let predictions = cloud
            .progress
            .predictions_by_round
            .entry(round_idx)
            .or_default();
        if !predictions.contains(&step) {
            predictions.push(step);
        }
        Ok(())
    }

    pub fn evaluate_round(
        &mut self,
        round_idx: usize,
        pattern_idx: usize,
    ) -> Result<RoundMetrics, DomainError> {
        let tolerance = self.tolerance;
        let cloud = self.cloud_mut(pattern_idx)?;
        let predictions = cloud
            .progress
            .predictions_by_round
            .get(&round_idx)
            .cloned()
            .unwrap_or_default();
        let hits = greedy_match(
            cloud.expected.iter().copied(),
            &predictions,
            tolerance,
            cloud.steps_per_cycle,
        );

        let metrics = RoundMetrics {
            expected_count: cloud.expected.len(),
            hit_count: hits.len(),
            missed_count: cloud.expected.len() - hits.len(),
        };
        cloud.progress.hits_by_round.insert(round_idx, hits);

        debug!(round_idx, pattern_idx, ?metrics, "evaluated round");
        if metrics.is_clean() && !cloud.progress.mastered {
            cloud.progress.mastered = true;
            info!(pattern_idx, round_idx, "cloud mastered");
        }
        Ok(metrics)
    }

    pub fn mark_mastered(&mut self, pattern_idx: usize) -> Result<(), DomainError> {
        let cloud = self.cloud_mut(pattern_idx)?;
        if !cloud.progress.mastered {
            cloud.progress.mastered = true;
            info!(pattern_idx, "cloud mastered");
        }
        Ok(())
    }

    pub fn is_mastered(&self, pattern_idx: usize) -> Result<bool, DomainError> {
        Ok(self.cloud(pattern_idx)?.progress.mastered)
    }

    pub fn next_unresolved_pattern(&self) -> Option<usize> {
        self.clouds.iter().position(|cloud| !cloud.progress.mastered)
    }

    pub fn is_every_pattern_mastered(&self) -> bool {
        self.clouds.iter().all(|cloud| cloud.progress.mastered)
    }

    pub fn mastered_flags(&self) -> Vec<bool> {
        self.clouds.iter().map(|cloud| cloud.progress.mastered).collect()
    }

    /// Drops the round history of one cloud; its mastery survives.
    pub fn reset_pattern(&mut self, pattern_idx: usize) -> Result<(), DomainError> {
        let cloud = self.cloud_mut(pattern_idx)?;
        cloud.progress = CloudProgress {
            mastered: cloud.progress.mastered,
            ..CloudProgress::default()
        };
        Ok(())
    }

    /// Forgets everything, mastery included.
    pub fn reset_all(&mut self) {
        for cloud in &mut self.clouds {
            cloud.progress = CloudProgress::default();
        }
    }

    pub fn progress(&self, pattern_idx: usize) -> Result<&CloudProgress, DomainError> {
        Ok(&self.cloud(pattern_idx)?.progress)
    }

    pub fn status(&self, pattern_idx: usize) -> Result<CloudStatus, DomainError> {
        let progress = &self.cloud(pattern_idx)?.progress;
        Ok(CloudStatus {
            mastered: progress.mastered,
            rounds_recorded: progress.predictions_by_round.keys().copied().collect(),
            hits_by_round: progress
                .hits_by_round
                .iter()
                .map(|(round, hits)| (*round, hits.iter().copied().collect()))
                .collect(),
        })
    }
}

// ========================================================================================
//                            The Incremental Selector
// ========================================================================================
//
// Greedy forward selection. The first feature comes from the single-feature
// scores; every later feature is the unselected column with the highest score
// conditioned on the columns already chosen. Each round recomputes the block
// statistics from the partitions, so only aggregated matrices are touched after
// the reduction.

use crate::dataset::PartitionedDataset;
use crate::progress::{SelectionProgressObserver, SelectionStage};
use crate::reduce::{BlockStats, Execution, ReduceError, ScoreStats};
use crate::score::{argmax, conditional_scores, select_initial};
use crate::types::SelectedSet;
use ndarray_linalg::error::LinalgError;
use std::time::Instant;
use thiserror::Error;

/// How often, in selected features, elapsed time is logged at info level.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 50;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("The number of features to select must be at least 1.")]
    ZeroTarget,

    #[error("Cannot select features from an empty feature space.")]
    EmptyFeatureSpace,

    #[error("Statistic aggregation failed: {0}")]
    Reduce(#[from] ReduceError),

    #[error("Pseudo-inverse of the selected block failed: {0}")]
    Linalg(#[from] LinalgError),

    #[error("Round produced {scores} scores for {unselected} unselected features.")]
    ShapeMismatch { scores: usize, unselected: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorOptions {
    /// Number of features requested (`k`).
    pub target: usize,
    pub execution: Execution,
    pub progress_interval: usize,
}

impl SelectorOptions {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            execution: Execution::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// How the selection loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionStatus {
    Complete,
    /// No genuinely new feature could be found. `round` is the 1-based
    /// incremental round that failed (0 when even the first pick failed).
    Stalled {
        round: usize,
        requested: usize,
        selected: usize,
    },
}

#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    pub selected: SelectedSet,
    /// Winning score of every selected feature, in selection order.
    pub scores: Vec<f64>,
    pub status: SelectionStatus,
    /// Incremental rounds that extended the selected set.
    pub rounds: usize,
}

/// Result of scoring one round, before the duplicate check.
///
/// [`IncrementalSelector::round`] only scores unselected columns, so a
/// `Candidate` naming an already-selected feature cannot come from it; the
/// loop still treats one as a stall rather than growing the set twice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Round {
    Candidate { feature: usize, score: f64 },
    NoCandidate,
}

impl Round {
    /// The winning feature and its score, if it extends `selected`.
    pub fn new_feature(self, selected: &SelectedSet) -> Option<(usize, f64)> {
        match self {
            Self::Candidate { feature, score } if !selected.contains(feature) => {
                Some((feature, score))
            }
            Self::Candidate { .. } | Self::NoCandidate => None,
        }
    }
}

pub struct IncrementalSelector<'a> {
    dataset: &'a PartitionedDataset,
    options: SelectorOptions,
}

impl<'a> IncrementalSelector<'a> {
    /// Validates the request. A target larger than the feature space is clamped.
    pub fn new(
        dataset: &'a PartitionedDataset,
        mut options: SelectorOptions,
    ) -> Result<Self, SelectionError> {
        if options.target == 0 {
            return Err(SelectionError::ZeroTarget);
        }
        let dimension = dataset.dimension();
        if dimension == 0 {
            return Err(SelectionError::EmptyFeatureSpace);
        }
        if options.target > dimension {
            log::warn!(
                "Requested {} features but the feature space only has {}; selecting all of them",
                options.target,
                dimension
            );
            options.target = dimension;
        }
        Ok(Self { dataset, options })
    }

    /// Scores every unselected column given `selected` and returns the best one.
    pub fn round(&self, selected: &SelectedSet) -> Result<Round, SelectionError> {
        let split = selected.split(self.dataset.dimension());
        if split.unselected.is_empty() {
            return Ok(Round::NoCandidate);
        }

        let block = BlockStats::compute(self.dataset.partitions(), &split, self.options.execution)?;
        let scored = conditional_scores(&block)?;
        if scored.scores.len() != split.unselected.len() {
            return Err(SelectionError::ShapeMismatch {
                scores: scored.scores.len(),
                unselected: split.unselected.len(),
            });
        }
        if scored.rank < block.selected_len() {
            log::debug!(
                "Selected block is rank-deficient ({} of {}); using the pseudo-inverse",
                scored.rank,
                block.selected_len()
            );
        }

        Ok(match argmax(scored.scores.view()) {
            Some(position) => Round::Candidate {
                feature: split.unselected[position],
                score: scored.scores[position],
            },
            None => Round::NoCandidate,
        })
    }

    /// Runs the initial scorer and then incremental rounds until `target`
    /// features are selected or a round stalls.
    pub fn run(
        &self,
        observer: &mut dyn SelectionProgressObserver,
    ) -> Result<SelectionOutcome, SelectionError> {
        let started = Instant::now();
        let target = self.options.target;

        observer.on_stage_start(SelectionStage::InitialScores, self.dataset.num_partitions());
        let stats = ScoreStats::compute(self.dataset.partitions(), self.options.execution)?;
        let initial = select_initial(&stats);
        observer.on_stage_finish(SelectionStage::InitialScores);

        let Some(initial) = initial else {
            log::warn!("Every feature scored NaN (all-zero columns); nothing can be selected");
            return Ok(SelectionOutcome {
                selected: SelectedSet::new(),
                scores: Vec::new(),
                status: SelectionStatus::Stalled {
                    round: 0,
                    requested: target,
                    selected: 0,
                },
                rounds: 0,
            });
        };
        log::info!(
            "Initial feature {} (score {:.6e})",
            initial.feature,
            initial.score
        );

        let mut selected = SelectedSet::new();
        selected.insert(initial.feature);
        let mut scores = vec![initial.score];
        let mut rounds = 0usize;
        let mut status = SelectionStatus::Complete;

        observer.on_stage_start(SelectionStage::IncrementalRounds, target);
        observer.on_stage_advance(SelectionStage::IncrementalRounds, selected.len());

        while selected.len() < target {
            let attempted = rounds + 1;
            let Some((feature, score)) = self.round(&selected)?.new_feature(&selected) else {
                log::warn!(
                    "Selection stalled in round {attempted}: no new feature found ({} of {} selected)",
                    selected.len(),
                    target
                );
                status = SelectionStatus::Stalled {
                    round: attempted,
                    requested: target,
                    selected: selected.len(),
                };
                break;
            };

            selected.insert(feature);
            scores.push(score);
            rounds = attempted;
            log::debug!("Round {rounds}: selected feature {feature} (score {score:.6e})");
            observer.on_stage_advance(SelectionStage::IncrementalRounds, selected.len());

            if self.options.progress_interval > 0
                && selected.len() % self.options.progress_interval == 0
            {
                log::info!(
                    "Selected {} of {} features in {:.3?}",
                    selected.len(),
                    target,
                    started.elapsed()
                );
            }
        }
        observer.on_stage_finish(SelectionStage::IncrementalRounds);

        log::info!(
            "Total selected features: {} / {} ({:.3?})",
            selected.len(),
            target,
            started.elapsed()
        );

        Ok(SelectionOutcome {
            selected,
            scores,
            status,
            rounds,
        })
    }
}

/// Convenience wrapper: validate, then run the full selection.
pub fn select_features(
    dataset: &PartitionedDataset,
    options: SelectorOptions,
    observer: &mut dyn SelectionProgressObserver,
) -> Result<SelectionOutcome, SelectionError> {
    IncrementalSelector::new(dataset, options)?.run(observer)
}

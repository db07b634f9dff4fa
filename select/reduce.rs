//! # Sufficient-Statistics Reduction
//!
//! Every quantity the selector needs is a sum over rows, so it can be computed
//! per partition and then added up. This module holds the map/combine primitive
//! and the two statistics built on it: the per-feature score statistics used to
//! pick the first feature, and the block statistics recomputed every round.

use crate::dataset::Partition;
use crate::linalg::column_sum_squares;
use crate::types::FeatureSplit;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How partition-local work is scheduled. Both modes produce the same result up
/// to floating-point rounding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// Map partitions on the rayon pool and combine with a parallel tree reduction.
    #[default]
    Parallel,
    /// Map and fold partitions one after another, in partition order.
    Sequential,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("Cannot aggregate statistics over a dataset with no partitions.")]
    NoPartitions,
}

/// A per-partition aggregate whose global value is the combination of the parts.
///
/// `combine` must be associative and commutative.
pub trait SufficientStatistic: Sized + Send {
    fn combine(self, other: Self) -> Self;
}

/// Maps every partition through `local` and folds the results with `combine`.
///
/// This is a full barrier: the result exists only once every partition has
/// reported.
pub fn aggregate<P, S, L, C>(
    partitions: &[P],
    execution: Execution,
    local: L,
    combine: C,
) -> Result<S, ReduceError>
where
    P: Sync,
    S: Send,
    L: Fn(&P) -> S + Sync + Send,
    C: Fn(S, S) -> S + Sync + Send,
{
    let combined = match execution {
        Execution::Parallel => partitions.par_iter().map(&local).reduce_with(&combine),
        Execution::Sequential => partitions.iter().map(&local).reduce(&combine),
    };
    combined.ok_or(ReduceError::NoPartitions)
}

/// [`aggregate`] specialised to a [`SufficientStatistic`].
pub fn reduce_statistic<P, S, L>(
    partitions: &[P],
    execution: Execution,
    local: L,
) -> Result<S, ReduceError>
where
    P: Sync,
    S: SufficientStatistic,
    L: Fn(&P) -> S + Sync + Send,
{
    aggregate(partitions, execution, local, S::combine)
}

/// Statistics behind the single-feature score.
///
/// `e` is `Y^T X` (2 x F) and `v` is the column sum of squares of `X` (F).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreStats {
    pub e: Array2<f64>,
    pub v: Array1<f64>,
}

impl ScoreStats {
    pub fn local(features: ArrayView2<f64>, response: ArrayView2<f64>) -> Self {
        Self {
            e: response.t().dot(&features),
            v: column_sum_squares(features),
        }
    }

    pub fn compute(partitions: &[Partition], execution: Execution) -> Result<Self, ReduceError> {
        reduce_statistic(partitions, execution, |p: &Partition| {
            Self::local(p.features(), p.response())
        })
    }
}

impl SufficientStatistic for ScoreStats {
    fn combine(mut self, other: Self) -> Self {
        self.e += &other.e;
        self.v += &other.v;
        self
    }
}

/// Statistics for one selection round, given the split of columns into the
/// selected block `X1` (l columns) and the unselected block `X2` (m columns).
///
/// | field | definition    | shape |
/// |-------|---------------|-------|
/// | `a`   | `X1^T X1`     | l x l |
/// | `cy1` | `Y^T X1`      | 2 x l |
/// | `cy2` | `Y^T X2`      | 2 x m |
/// | `c12` | `X1^T X2`     | l x m |
/// | `v2`  | col sum sq X2 | m     |
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStats {
    pub a: Array2<f64>,
    pub cy1: Array2<f64>,
    pub cy2: Array2<f64>,
    pub c12: Array2<f64>,
    pub v2: Array1<f64>,
}

impl BlockStats {
    /// Computes the block products of one partition.
    ///
    /// Products against `X2` are taken against the full matrix and then narrowed
    /// to the unselected columns, so `X2` itself is never copied out.
    pub fn local(
        features: ArrayView2<f64>,
        response: ArrayView2<f64>,
        split: &FeatureSplit,
    ) -> Self {
        let x1 = features.select(Axis(1), &split.selected);
        let cross = x1.t().dot(&features);
        let response_cross = response.t().dot(&features);
        let energy = column_sum_squares(features);

        Self {
            a: x1.t().dot(&x1),
            cy1: response.t().dot(&x1),
            cy2: response_cross.select(Axis(1), &split.unselected),
            c12: cross.select(Axis(1), &split.unselected),
            v2: energy.select(Axis(0), &split.unselected),
        }
    }

    pub fn compute(
        partitions: &[Partition],
        split: &FeatureSplit,
        execution: Execution,
    ) -> Result<Self, ReduceError> {
        reduce_statistic(partitions, execution, |p: &Partition| {
            Self::local(p.features(), p.response(), split)
        })
    }

    pub fn selected_len(&self) -> usize {
        self.a.nrows()
    }
}

impl SufficientStatistic for BlockStats {
    fn combine(mut self, other: Self) -> Self {
        self.a += &other.a;
        self.cy1 += &other.cy1;
        self.cy2 += &other.cy2;
        self.c12 += &other.c12;
        self.v2 += &other.v2;
        self
    }
}

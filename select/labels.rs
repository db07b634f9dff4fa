//! # Label Statistics
//!
//! Class counts and the two constant response vectors derived from them. The
//! record is computed once, before any scoring, and never changes afterwards.

use crate::dataset::ParsedPartition;
use crate::parse::POSITIVE_LABEL;
use crate::reduce::{Execution, ReduceError, SufficientStatistic, reduce_statistic};
use ahash::AHashMap;
use itertools::Itertools;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("The input contains no rows, so no label statistics can be derived.")]
    NoRows,

    #[error(
        "The input contains no {class} rows ({positive} positive, {negative} negative); both classes are required."
    )]
    EmptyClass {
        class: &'static str,
        positive: usize,
        negative: usize,
    },
}

/// Row counts per distinct raw label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelCounts(AHashMap<String, usize>);

impl LabelCounts {
    pub fn record(&mut self, label: &str) {
        match self.0.get_mut(label) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(label.to_string(), 1);
            }
        }
    }

    pub fn get(&self, label: &str) -> usize {
        self.0.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Label/count pairs sorted by label, for stable reporting.
    pub fn sorted(&self) -> Vec<(String, usize)> {
        self.0
            .iter()
            .map(|(label, &count)| (label.clone(), count))
            .sorted()
            .collect()
    }
}

impl SufficientStatistic for LabelCounts {
    fn combine(mut self, other: Self) -> Self {
        for (label, count) in other.0 {
            *self.0.entry(label).or_insert(0) += count;
        }
        self
    }
}

/// Immutable per-run class statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStatistics {
    pub num_instances: usize,
    pub num_positive: usize,
    pub num_negative: usize,
    pub y_pos: [f64; 2],
    pub y_neg: [f64; 2],
    counts: Vec<(String, usize)>,
}

/// `[1/sqrt(c) - sqrt(c)/n, -sqrt(c)/n]` for a class of `c` rows out of `n`.
fn response_vector(class_count: usize, total: usize) -> [f64; 2] {
    let class = class_count as f64;
    let second = -class.sqrt() / total as f64;
    [1.0 / class.sqrt() + second, second]
}

impl LabelStatistics {
    /// Builds the record from class counts. Both classes must be non-empty.
    pub fn from_counts(num_positive: usize, num_negative: usize) -> Result<Self, LabelError> {
        if num_positive == 0 && num_negative == 0 {
            return Err(LabelError::NoRows);
        }
        if num_positive == 0 {
            return Err(LabelError::EmptyClass {
                class: "positive",
                positive: num_positive,
                negative: num_negative,
            });
        }
        if num_negative == 0 {
            return Err(LabelError::EmptyClass {
                class: "negative",
                positive: num_positive,
                negative: num_negative,
            });
        }

        let num_instances = num_positive + num_negative;
        Ok(Self {
            num_instances,
            num_positive,
            num_negative,
            y_pos: response_vector(num_positive, num_instances),
            y_neg: response_vector(num_negative, num_instances),
            counts: Vec::new(),
        })
    }

    /// Builds the record from merged per-label counts.
    pub fn from_label_counts(counts: &LabelCounts) -> Result<Self, LabelError> {
        let num_positive = counts.get(POSITIVE_LABEL);
        let num_negative = counts.total() - num_positive;
        let mut stats = Self::from_counts(num_positive, num_negative)?;
        stats.counts = counts.sorted();
        Ok(stats)
    }

    /// Counts labels in every partition and merges the counts by key.
    pub fn aggregate(
        partitions: &[ParsedPartition],
        execution: Execution,
    ) -> Result<Self, LabelError> {
        let counts = reduce_statistic(partitions, execution, |p: &ParsedPartition| {
            p.label_counts().clone()
        })
        .map_err(|err| match err {
            ReduceError::NoPartitions => LabelError::NoRows,
        })?;
        Self::from_label_counts(&counts)
    }

    /// The response row assigned to a row of the given class.
    pub fn response_for(&self, positive: bool) -> [f64; 2] {
        if positive { self.y_pos } else { self.y_neg }
    }

    /// Recovers the class from a response row by exact comparison.
    ///
    /// Returns `None` when the row matches neither vector, or both of them (which
    /// happens when the classes are exactly balanced).
    pub fn classify(&self, response: [f64; 2]) -> Option<bool> {
        let is_pos = response == self.y_pos;
        let is_neg = response == self.y_neg;
        match (is_pos, is_neg) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        }
    }

    /// Every distinct raw label and its row count, sorted by label.
    pub fn label_counts(&self) -> &[(String, usize)] {
        &self.counts
    }
}

impl fmt::Display for LabelStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "# instances: {} (pos: {}, neg: {})",
            self.num_instances, self.num_positive, self.num_negative
        )?;
        writeln!(f, "yPos: [{},{}]", self.y_pos[0], self.y_pos[1])?;
        write!(f, "yNeg: [{},{}]", self.y_neg[0], self.y_neg[1])
    }
}

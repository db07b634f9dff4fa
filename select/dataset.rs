// ========================================================================================
//                              The Partitioned Dataset
// ========================================================================================
//
// Rows are parsed once, per partition, into dense feature matrices. The response
// matrix needs the global class counts, so construction is two-phase: parse every
// partition, aggregate the label statistics, then attach the response rows. After
// that the dataset is read-only for the rest of the run.

use crate::io::{RawLine, collect_lines, split_into_partitions};
use crate::labels::{LabelCounts, LabelError, LabelStatistics};
use crate::parse::{ParseError, is_positive_label, parse_row};
use crate::reduce::Execution;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("Failed to parse input: {0}")]
    Parse(#[from] ParseError),
    #[error("Invalid class distribution: {0}")]
    Labels(#[from] LabelError),
}

/// A partition after parsing, before its response matrix exists.
#[derive(Debug, Clone)]
pub struct ParsedPartition {
    features: Array2<f64>,
    positive: Vec<bool>,
    label_counts: LabelCounts,
}

impl ParsedPartition {
    /// Expands every line of one chunk into a dense row of width `dimension`.
    pub fn parse(lines: &[RawLine<'_>], dimension: usize) -> Result<Self, ParseError> {
        let mut features = Array2::zeros((lines.len(), dimension));
        let mut positive = Vec::with_capacity(lines.len());
        let mut label_counts = LabelCounts::default();

        for (row, line) in features.rows_mut().into_iter().zip(lines) {
            let label = parse_row(line.text, line.number, row)?;
            positive.push(is_positive_label(label));
            label_counts.record(label);
        }

        Ok(Self {
            features,
            positive,
            label_counts,
        })
    }

    pub fn label_counts(&self) -> &LabelCounts {
        &self.label_counts
    }
}

/// One immutable slice of the dataset: `X` (rows x F), `Y` (rows x 2) and the
/// class of every row.
#[derive(Debug, Clone)]
pub struct Partition {
    features: Array2<f64>,
    response: Array2<f64>,
    positive: Vec<bool>,
}

impl Partition {
    fn from_parsed(parsed: ParsedPartition, stats: &LabelStatistics) -> Self {
        let mut response = Array2::zeros((parsed.positive.len(), 2));
        for (mut row, &is_positive) in response.rows_mut().into_iter().zip(&parsed.positive) {
            let values = stats.response_for(is_positive);
            row[0] = values[0];
            row[1] = values[1];
        }
        Self {
            features: parsed.features,
            response,
            positive: parsed.positive,
        }
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn response(&self) -> ArrayView2<'_, f64> {
        self.response.view()
    }

    pub fn positive(&self) -> &[bool] {
        &self.positive
    }

    pub fn rows(&self) -> usize {
        self.features.nrows()
    }
}

/// The cached, partitioned dataset shared by every phase of a run.
#[derive(Debug, Clone)]
pub struct PartitionedDataset {
    partitions: Vec<Partition>,
    dimension: usize,
}

impl PartitionedDataset {
    /// Parses every chunk. The first malformed row fails the whole load.
    pub fn parse(
        chunks: &[Vec<RawLine<'_>>],
        dimension: usize,
        execution: Execution,
    ) -> Result<Vec<ParsedPartition>, ParseError> {
        match execution {
            Execution::Parallel => chunks
                .par_iter()
                .map(|chunk| ParsedPartition::parse(chunk, dimension))
                .collect(),
            Execution::Sequential => chunks
                .iter()
                .map(|chunk| ParsedPartition::parse(chunk, dimension))
                .collect(),
        }
    }

    /// Freezes parsed partitions into the dataset, filling each response row
    /// with `yPos` or `yNeg`.
    pub fn assemble(
        parsed: Vec<ParsedPartition>,
        stats: &LabelStatistics,
        dimension: usize,
    ) -> Self {
        let partitions = parsed
            .into_par_iter()
            .map(|p| Partition::from_parsed(p, stats))
            .collect();
        Self {
            partitions,
            dimension,
        }
    }

    /// Parses, counts labels and assembles in one go.
    pub fn load(
        chunks: &[Vec<RawLine<'_>>],
        dimension: usize,
        execution: Execution,
    ) -> Result<(Self, LabelStatistics), DatasetError> {
        let parsed = Self::parse(chunks, dimension, execution)?;
        let stats = LabelStatistics::aggregate(&parsed, execution)?;
        log::info!(
            "Parsed {} rows into {} partitions ({} positive, {} negative)",
            stats.num_instances,
            parsed.len(),
            stats.num_positive,
            stats.num_negative
        );
        Ok((Self::assemble(parsed, &stats, dimension), stats))
    }

    /// Loads from in-memory text, split into `partitions` contiguous chunks.
    pub fn from_text(
        text: &str,
        partitions: usize,
        dimension: usize,
        execution: Execution,
    ) -> Result<(Self, LabelStatistics), DatasetError> {
        let chunks = split_into_partitions(collect_lines(text), partitions);
        Self::load(&chunks, dimension, execution)
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn num_rows(&self) -> usize {
        self.partitions.iter().map(Partition::rows).sum()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

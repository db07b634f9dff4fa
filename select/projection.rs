// ========================================================================================
//                               The Projection Writer
// ========================================================================================
//
// Materializes the selected columns of every partition, with the response
// columns appended, and writes them back out in the sparse text format.
// Selected features are re-indexed 1..|S| in ascending original-index order.

use crate::dataset::{Partition, PartitionedDataset};
use crate::io::{InputError, InputFile, collect_lines};
use crate::labels::LabelStatistics;
use crate::parse::{ParseError, POSITIVE_LABEL, parse_row};
use crate::reduce::Execution;
use crate::types::SelectedSet;
use ndarray::{Array2, ArrayView2, Axis, concatenate, s};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Label written for rows of the negative class.
pub const NEGATIVE_LABEL: &str = "0";

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Failed to write the projection: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read the projection back: {0}")]
    Input(#[from] InputError),

    #[error("Malformed projection row: {0}")]
    Parse(#[from] ParseError),

    #[error("Could not concatenate partition blocks: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// The final `n x (|S| + 2)` matrix: selected features, then the two response
/// columns. Rows are in partition order.
#[derive(Debug, Clone)]
pub struct Projection {
    matrix: Array2<f64>,
    positive: Vec<bool>,
    features: Vec<usize>,
}

fn project_partition(partition: &Partition, features: &[usize]) -> Array2<f64> {
    let rows = partition.rows();
    let width = features.len();
    let mut block = Array2::zeros((rows, width + 2));
    block
        .slice_mut(s![.., ..width])
        .assign(&partition.features().select(Axis(1), features));
    block
        .slice_mut(s![.., width..])
        .assign(&partition.response());
    block
}

impl Projection {
    /// Slices every partition to the selected columns and stacks the blocks.
    pub fn assemble(
        dataset: &PartitionedDataset,
        selected: &SelectedSet,
        execution: Execution,
    ) -> Result<Self, ProjectionError> {
        let features = selected.sorted();
        let blocks: Vec<Array2<f64>> = match execution {
            Execution::Parallel => dataset
                .partitions()
                .par_iter()
                .map(|p| project_partition(p, &features))
                .collect(),
            Execution::Sequential => dataset
                .partitions()
                .iter()
                .map(|p| project_partition(p, &features))
                .collect(),
        };

        let matrix = if blocks.is_empty() {
            Array2::zeros((0, features.len() + 2))
        } else {
            let views: Vec<ArrayView2<f64>> = blocks.iter().map(Array2::view).collect();
            concatenate(Axis(0), &views)?
        };
        let positive = dataset
            .partitions()
            .iter()
            .flat_map(|p| p.positive().iter().copied())
            .collect();

        Ok(Self {
            matrix,
            positive,
            features,
        })
    }

    pub fn matrix(&self) -> ArrayView2<'_, f64> {
        self.matrix.view()
    }

    /// Selected feature columns only, without the response.
    pub fn feature_columns(&self) -> ArrayView2<'_, f64> {
        self.matrix.slice(s![.., ..self.features.len()])
    }

    /// Original 0-based indices of the written columns, ascending.
    pub fn features(&self) -> &[usize] {
        &self.features
    }

    pub fn shape(&self) -> (usize, usize) {
        self.matrix.dim()
    }

    /// Label for `row`, recovered from its response columns.
    ///
    /// Balanced classes make both response vectors equal; the stored class
    /// flag decides then.
    pub fn label(&self, row: usize, stats: &LabelStatistics) -> &'static str {
        let width = self.features.len();
        let response = [self.matrix[[row, width]], self.matrix[[row, width + 1]]];
        let positive = stats
            .classify(response)
            .unwrap_or(self.positive[row]);
        if positive { POSITIVE_LABEL } else { NEGATIVE_LABEL }
    }

    /// Serializes every row as `label rank:value ...`, omitting exact zeros.
    pub fn write<W: Write>(&self, stats: &LabelStatistics, writer: &mut W) -> io::Result<()> {
        let mut buffer = ryu::Buffer::new();
        let features = self.feature_columns();

        for (idx, row) in features.rows().into_iter().enumerate() {
            writer.write_all(self.label(idx, stats).as_bytes())?;
            for (rank, &value) in row.iter().enumerate() {
                if value == 0.0 {
                    continue;
                }
                write!(writer, " {}:{}", rank + 1, buffer.format(value))?;
            }
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }

    pub fn write_to_path(&self, stats: &LabelStatistics, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::with_capacity(1 << 20, file);
        self.write(stats, &mut writer)?;
        log::info!(
            "Wrote {} rows x {} features to '{}'",
            self.matrix.nrows(),
            self.features.len(),
            path.display()
        );
        Ok(())
    }
}

/// Reads a written projection back into its labels and a dense `rows x dimension`
/// matrix, with `dimension` the number of selected features.
pub fn read_projection(
    path: &Path,
    dimension: usize,
) -> Result<(Vec<String>, Array2<f64>), ProjectionError> {
    let input = InputFile::open(path)?;
    let lines = collect_lines(input.text()?);
    let mut matrix = Array2::zeros((lines.len(), dimension));
    let mut labels = Vec::with_capacity(lines.len());
    for (row, line) in matrix.rows_mut().into_iter().zip(&lines) {
        let label = parse_row(line.text, line.number, row)?;
        labels.push(label.to_string());
    }
    Ok((labels, matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    const TEXT: &str = "1 1:5 3:2\n0 2:1\n0 1:0.25 3:4\n1 2:-7.5\n0 3:1\n";

    fn load(partitions: usize) -> (PartitionedDataset, LabelStatistics) {
        PartitionedDataset::from_text(TEXT, partitions, 3, Execution::Sequential).unwrap()
    }

    #[test]
    fn assembly_keeps_sorted_columns_and_partition_order() {
        let (dataset, stats) = load(3);
        let selected: SelectedSet = [2, 0].into_iter().collect();
        let projection = Projection::assemble(&dataset, &selected, Execution::Parallel).unwrap();

        assert_eq!(projection.features(), &[0, 2]);
        assert_eq!(projection.shape(), (5, 4));
        assert_eq!(
            projection.feature_columns(),
            array![[5.0, 2.0], [0.0, 0.0], [0.25, 4.0], [0.0, 0.0], [0.0, 1.0]]
        );
        let response = projection.matrix().slice(s![.., 2..]).to_owned();
        assert_eq!(response.row(0).to_vec(), stats.y_pos.to_vec());
        assert_eq!(response.row(1).to_vec(), stats.y_neg.to_vec());
    }

    #[test]
    fn writer_omits_zeros_and_reindexes() {
        let (dataset, stats) = load(2);
        let selected: SelectedSet = [2, 0].into_iter().collect();
        let projection = Projection::assemble(&dataset, &selected, Execution::Sequential).unwrap();

        let mut out = Vec::new();
        projection.write(&stats, &mut out).unwrap();
        let written = String::from_utf8(out).unwrap();
        assert_eq!(
            written,
            "1 1:5.0 2:2.0\n0\n0 1:0.25 2:4.0\n1\n0 2:1.0\n"
        );
    }

    #[test]
    fn balanced_classes_fall_back_to_row_flags() {
        let text = "1 1:1\n0 1:2\n1 2:3\n0 2:4\n";
        let (dataset, stats) =
            PartitionedDataset::from_text(text, 2, 2, Execution::Parallel).unwrap();
        assert_eq!(stats.y_pos, stats.y_neg);

        let selected: SelectedSet = [0, 1].into_iter().collect();
        let projection = Projection::assemble(&dataset, &selected, Execution::Parallel).unwrap();
        let labels: Vec<_> = (0..4).map(|row| projection.label(row, &stats)).collect();
        assert_eq!(labels, vec!["1", "0", "1", "0"]);
    }

    #[test]
    fn all_features_round_trip_through_a_file() {
        let (dataset, stats) = load(2);
        let everything: SelectedSet = (0..3).collect();
        let projection = Projection::assemble(&dataset, &everything, Execution::Parallel).unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("projection.txt");
        projection.write_to_path(&stats, &path).unwrap();

        let (labels, matrix) = read_projection(&path, 3).unwrap();
        assert_eq!(labels, vec!["1", "0", "0", "1", "0"]);
        assert_eq!(matrix, projection.feature_columns());
    }

    #[test]
    fn empty_selection_writes_labels_only() {
        let (dataset, stats) = load(1);
        let projection =
            Projection::assemble(&dataset, &SelectedSet::new(), Execution::Sequential).unwrap();
        assert_eq!(projection.shape(), (5, 2));

        let mut out = Vec::new();
        projection.write(&stats, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1\n0\n0\n1\n0\n");
    }

    /// Accepts `remaining` bytes, then fails every write.
    struct FullDisk {
        remaining: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("disk full"));
            }
            let taken = buf.len().min(self.remaining);
            self.remaining -= taken;
            Ok(taken)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_value_write_is_reported() {
        let (dataset, stats) = load(1);
        let selected: SelectedSet = [0].into_iter().collect();
        let projection = Projection::assemble(&dataset, &selected, Execution::Sequential).unwrap();

        // The label fits; the first `rank:value` pair does not.
        let mut sink = FullDisk { remaining: 3 };
        let err = projection.write(&stats, &mut sink).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
    }
}

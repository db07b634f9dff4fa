use approx::assert_relative_eq;
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write;
use std::fs;
use tempfile::tempdir;

use stepwise::config::ResolvedConfig;
use stepwise::dataset::{DatasetError, PartitionedDataset};
use stepwise::pipeline::{self, PipelineError};
use stepwise::progress::NoopSelectionProgress;
use stepwise::projection::{Projection, read_projection};
use stepwise::reduce::{BlockStats, Execution, ScoreStats};
use stepwise::selector::{SelectionStatus, SelectorOptions, select_features};
use stepwise::types::SelectedSet;

/// Sparse rows where roughly half the entries are zero.
fn sparse_dataset(rows: usize, dimension: usize, seed: u64) -> (String, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut dense = Array2::zeros((rows, dimension));
    let mut text = String::new();
    for (row, mut values) in dense.rows_mut().into_iter().enumerate() {
        text.push_str(if row % 4 == 1 { "1" } else { "-1" });
        for col in 0..dimension {
            if rng.gen_bool(0.5) {
                let value: f64 = rng.gen_range(-10.0..10.0);
                values[col] = value;
                write!(text, " {}:{}", col + 1, value).unwrap();
            }
        }
        text.push('\n');
    }
    (text, dense)
}

fn config(dimension: usize, target: usize, partitions: usize, output: &std::path::Path) -> ResolvedConfig {
    ResolvedConfig {
        dataset: None,
        dimension,
        target,
        partitions,
        output: output.to_path_buf(),
        progress_interval: 2,
        execution: Execution::Parallel,
    }
}

#[test]
fn malformed_row_reports_its_line() {
    let text = "1 1:5 3:2\n0 2:1\n1 1:1 2:1 2:1\n0 1:0 3:4\n";
    let err = PartitionedDataset::from_text(text, 2, 3, Execution::Parallel).unwrap_err();
    match err {
        DatasetError::Parse(parse) => {
            assert_eq!(parse.line(), 3);
            assert!(parse.to_string().contains("strictly greater"));
        }
        other => panic!("expected a parse error, got {other:?}"),
    }

    let cleaned = "1 1:5 3:2\n0 2:1\n0 1:0 3:4\n";
    let (_, stats) = PartitionedDataset::from_text(cleaned, 2, 3, Execution::Parallel).unwrap();
    assert_eq!(stats.num_instances, 3);
    assert_eq!(stats.num_positive, 1);
    assert_eq!(stats.num_negative, 2);
    assert_relative_eq!(stats.y_pos[1], -1.0 / 3.0);
    assert_relative_eq!(stats.y_pos[0], 1.0 - 1.0 / 3.0);
}

#[test]
fn statistics_are_invariant_to_partitioning() {
    let (text, _) = sparse_dataset(48, 10, 11);
    let (reference, _) = PartitionedDataset::from_text(&text, 1, 10, Execution::Sequential).unwrap();
    let reference_scores = ScoreStats::compute(reference.partitions(), Execution::Sequential).unwrap();
    let selected: SelectedSet = [7, 2, 4].into_iter().collect();
    let split = selected.split(10);
    let reference_block =
        BlockStats::compute(reference.partitions(), &split, Execution::Sequential).unwrap();

    for partitions in 2..=8 {
        let (dataset, _) =
            PartitionedDataset::from_text(&text, partitions, 10, Execution::Parallel).unwrap();
        let scores = ScoreStats::compute(dataset.partitions(), Execution::Parallel).unwrap();
        let block = BlockStats::compute(dataset.partitions(), &split, Execution::Parallel).unwrap();

        for (a, b) in scores.e.iter().zip(reference_scores.e.iter()) {
            assert_relative_eq!(a, b, max_relative = 1e-10, epsilon = 1e-12);
        }
        for (a, b) in block.a.iter().zip(reference_block.a.iter()) {
            assert_relative_eq!(a, b, max_relative = 1e-10, epsilon = 1e-12);
        }
        for (a, b) in block.cy2.iter().zip(reference_block.cy2.iter()) {
            assert_relative_eq!(a, b, max_relative = 1e-10, epsilon = 1e-12);
        }
    }
}

#[test]
fn selecting_every_feature_round_trips_the_matrix() {
    let dimension = 7;
    let (text, dense) = sparse_dataset(40, dimension, 23);
    let dir = tempdir().unwrap();
    let input = dir.path().join("train.txt");
    let output = dir.path().join("selected.txt");
    fs::write(&input, &text).unwrap();

    let report = pipeline::run(
        &input,
        &config(dimension, dimension, 3, &output),
        &mut NoopSelectionProgress,
    )
    .unwrap();
    assert_eq!(report.outcome.status, SelectionStatus::Complete);
    assert_eq!(report.outcome.rounds, dimension - 1);
    assert_eq!(report.result_size, (40, dimension));

    let (labels, matrix) = read_projection(&output, dimension).unwrap();
    assert_eq!(matrix, dense);
    let positives = labels.iter().filter(|label| *label == "1").count();
    assert_eq!(positives, report.labels.num_positive);
    assert!(labels.iter().all(|label| label == "1" || label == "0"));
}

#[test]
fn selected_indices_do_not_depend_on_partition_count() {
    let (text, _) = sparse_dataset(60, 12, 5);
    let select = |partitions: usize| {
        let (dataset, _) =
            PartitionedDataset::from_text(&text, partitions, 12, Execution::Parallel).unwrap();
        select_features(&dataset, SelectorOptions::new(6), &mut NoopSelectionProgress)
            .unwrap()
            .selected
            .in_selection_order()
            .to_vec()
    };
    let reference = select(1);
    assert_eq!(reference.len(), 6);
    for partitions in [2, 5, 9] {
        assert_eq!(select(partitions), reference);
    }
}

#[test]
fn projection_columns_follow_ascending_feature_order() {
    let (text, dense) = sparse_dataset(20, 6, 17);
    let (dataset, _) = PartitionedDataset::from_text(&text, 4, 6, Execution::Parallel).unwrap();
    let selected: SelectedSet = [5, 1, 3].into_iter().collect();
    let projection = Projection::assemble(&dataset, &selected, Execution::Parallel).unwrap();
    assert_eq!(projection.features(), &[1, 3, 5]);
    assert_eq!(projection.feature_columns(), dense.select(Axis(1), &[1, 3, 5]));
}

#[test]
fn single_class_input_fails_the_run() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train.txt");
    fs::write(&input, "0 1:1\n0 2:2\n0 1:3 2:1\n").unwrap();
    let err = pipeline::run(
        &input,
        &config(2, 1, 2, &dir.path().join("out.txt")),
        &mut NoopSelectionProgress,
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::Dataset(DatasetError::Labels(_))));
}

// ========================================================================================
//                                 Run Orchestration
// ========================================================================================
//
// Input mapping -> partition parsing -> label statistics -> dataset assembly ->
// initial scoring and incremental rounds -> projection -> output file. Each phase
// is timed; the first error aborts the run.

use crate::config::ResolvedConfig;
use crate::dataset::{DatasetError, PartitionedDataset};
use crate::io::{InputError, InputFile, collect_lines, split_into_partitions};
use crate::labels::LabelStatistics;
use crate::progress::{SelectionProgressObserver, SelectionStage};
use crate::projection::{Projection, ProjectionError};
use crate::selector::{SelectionError, SelectionOutcome, SelectorOptions, select_features};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Feature selection failed: {0}")]
    Selection(#[from] SelectionError),

    #[error("Failed to assemble the projection: {0}")]
    Projection(#[from] ProjectionError),

    /// The selection itself succeeded; only writing the output failed.
    #[error(
        "Failed to write output '{}': {source} (selected features: {selected:?})",
        path.display()
    )]
    Write {
        path: PathBuf,
        #[source]
        source: ProjectionError,
        selected: Vec<usize>,
    },
}

/// Wall-clock time spent in each phase.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseTimings {
    pub load: Duration,
    pub selection: Duration,
    pub projection: Duration,
    pub write: Duration,
    pub total: Duration,
}

/// Everything a caller needs to report on a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub labels: LabelStatistics,
    pub outcome: SelectionOutcome,
    /// Rows by selected features; the two response columns are not counted.
    pub result_size: (usize, usize),
    pub timings: PhaseTimings,
    pub output: PathBuf,
}

fn selector_options(config: &ResolvedConfig) -> SelectorOptions {
    SelectorOptions {
        target: config.target,
        execution: config.execution,
        progress_interval: config.progress_interval,
    }
}

/// Maps `input`, parses it into `config.partitions` chunks and builds the
/// immutable dataset together with its label statistics.
pub fn load_dataset(
    input: &Path,
    config: &ResolvedConfig,
    observer: &mut dyn SelectionProgressObserver,
) -> Result<(PartitionedDataset, LabelStatistics), PipelineError> {
    let file = InputFile::open(input)?;
    let lines = collect_lines(file.text()?);
    log::info!(
        "Read {} rows from '{}' ({} bytes)",
        lines.len(),
        file.path().display(),
        file.len()
    );
    let chunks = split_into_partitions(lines, config.partitions);

    observer.on_stage_start(SelectionStage::Parse, chunks.len());
    let parsed = PartitionedDataset::parse(&chunks, config.dimension, config.execution)
        .map_err(DatasetError::from)?;
    observer.on_stage_finish(SelectionStage::Parse);

    observer.on_stage_start(SelectionStage::LabelStatistics, parsed.len());
    let stats = LabelStatistics::aggregate(&parsed, config.execution).map_err(DatasetError::from)?;
    observer.on_stage_finish(SelectionStage::LabelStatistics);

    let dataset = PartitionedDataset::assemble(parsed, &stats, config.dimension);
    log::info!(
        "Dataset ready: {} rows, {} partitions, {} features",
        dataset.num_rows(),
        dataset.num_partitions(),
        dataset.dimension()
    );
    Ok((dataset, stats))
}

/// The whole run, from input file to written projection.
pub fn run(
    input: &Path,
    config: &ResolvedConfig,
    observer: &mut dyn SelectionProgressObserver,
) -> Result<RunReport, PipelineError> {
    let started = Instant::now();
    let mut timings = PhaseTimings::default();

    let phase = Instant::now();
    let (dataset, labels) = load_dataset(input, config, observer)?;
    timings.load = phase.elapsed();

    let phase = Instant::now();
    let outcome = select_features(&dataset, selector_options(config), observer)?;
    timings.selection = phase.elapsed();

    let phase = Instant::now();
    observer.on_stage_start(SelectionStage::Projection, dataset.num_partitions());
    let projection = Projection::assemble(&dataset, &outcome.selected, config.execution)?;
    observer.on_stage_finish(SelectionStage::Projection);
    timings.projection = phase.elapsed();

    let phase = Instant::now();
    projection
        .write_to_path(&labels, &config.output)
        .map_err(|err| PipelineError::Write {
            path: config.output.clone(),
            source: err.into(),
            selected: outcome.selected.in_selection_order().to_vec(),
        })?;
    timings.write = phase.elapsed();
    timings.total = started.elapsed();

    Ok(RunReport {
        labels,
        result_size: (projection.shape().0, projection.features().len()),
        outcome,
        timings,
        output: config.output.clone(),
    })
}

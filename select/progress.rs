use std::fmt;

/// Phases reported while a selection run executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SelectionStage {
    Parse,
    LabelStatistics,
    InitialScores,
    IncrementalRounds,
    Projection,
}

impl SelectionStage {
    pub fn describe(self) -> &'static str {
        match self {
            Self::Parse => "input parsing",
            Self::LabelStatistics => "label statistics",
            Self::InitialScores => "initial feature scores",
            Self::IncrementalRounds => "incremental selection",
            Self::Projection => "projection assembly",
        }
    }
}

impl fmt::Display for SelectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Observer for reporting progress through a selection run.
///
/// `total` and `completed` are measured in stage-specific units: partitions for
/// parsing and projection, selected features for the incremental rounds.
pub trait SelectionProgressObserver {
    fn on_stage_start(&mut self, stage: SelectionStage, total: usize) {
        let _ = (stage, total);
    }
    fn on_stage_advance(&mut self, stage: SelectionStage, completed: usize) {
        let _ = (stage, completed);
    }
    fn on_stage_finish(&mut self, stage: SelectionStage) {
        let _ = stage;
    }
}

#[derive(Default)]
pub struct NoopSelectionProgress;

impl SelectionProgressObserver for NoopSelectionProgress {}

#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use stepwise::config::RunConfig;
use stepwise::pipeline::{self, RunReport};
use stepwise::progress::{NoopSelectionProgress, SelectionProgressObserver, SelectionStage};
use stepwise::reduce::Execution;
use stepwise::selector::SelectionStatus;

#[derive(Args)]
pub struct SelectArgs {
    /// Path to the sparse training file (`label idx:value ...` per line)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Dataset preset fixing the feature-space size (ads, dorothea)
    #[arg(long, conflicts_with = "num_features")]
    pub dataset: Option<String>,

    /// Explicit feature-space size
    #[arg(long, value_name = "F")]
    pub num_features: Option<usize>,

    /// Number of features to select
    #[arg(long, value_name = "K")]
    pub select: Option<usize>,

    /// Where to write the selected projection
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Number of partitions (defaults to the number of CPUs)
    #[arg(long, value_name = "N")]
    pub partitions: Option<usize>,

    /// TOML run configuration; explicit flags take precedence
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log elapsed time every N selected features
    #[arg(long, value_name = "N")]
    pub progress_interval: Option<usize>,

    /// Reduce partitions one after another instead of on the thread pool
    #[arg(long)]
    pub sequential: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,
}

impl SelectArgs {
    fn overrides(&self) -> RunConfig {
        RunConfig {
            dataset: self.dataset.clone(),
            num_features: self.num_features,
            select: self.select,
            partitions: self.partitions,
            output: self.output.clone(),
            progress_interval: self.progress_interval,
            execution: self.sequential.then_some(Execution::Sequential),
        }
    }
}

#[derive(Parser)]
#[command(
    name = "stepwise",
    about = "Greedy forward feature selection from sufficient statistics",
    long_about = "Selects features one at a time by how much response correlation each adds \
                 beyond the features already chosen, computed from per-partition matrix \
                 products, and writes the selected columns back in the sparse text format."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Select features and write the projection
    #[command(about = "Select features (outputs: selected_features.txt)")]
    Select(SelectArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

/// Terminal progress for a selection run: a spinner for the short phases and a
/// bar over the selected-feature count for the incremental rounds.
struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn new() -> Self {
        Self { bar: None }
    }

    fn draw_target() -> ProgressDrawTarget {
        if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        }
    }
}

impl SelectionProgressObserver for BarProgress {
    fn on_stage_start(&mut self, stage: SelectionStage, total: usize) {
        let bar = match stage {
            SelectionStage::IncrementalRounds => {
                let bar = ProgressBar::with_draw_target(Some(total as u64), Self::draw_target());
                if let Ok(style) = ProgressStyle::with_template(
                    "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                ) {
                    bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
                }
                bar
            }
            _ => {
                let bar = ProgressBar::with_draw_target(None, Self::draw_target());
                if let Ok(style) = ProgressStyle::with_template("> {spinner} {msg} [{elapsed}]") {
                    bar.set_style(style);
                }
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        bar.set_message(stage.describe());
        self.bar = Some(bar);
    }

    fn on_stage_advance(&mut self, stage: SelectionStage, completed: usize) {
        if let (SelectionStage::IncrementalRounds, Some(bar)) = (stage, &self.bar) {
            bar.set_position(completed as u64);
        }
    }

    fn on_stage_finish(&mut self, stage: SelectionStage) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        log::debug!("Finished {stage}");
    }
}

fn print_report(report: &RunReport) {
    println!("{}", report.labels);
    println!(
        "Labels: {}",
        report
            .labels
            .label_counts()
            .iter()
            .map(|(label, count)| format!("{label}={count}"))
            .join(", ")
    );
    println!(
        "Selected (in order): [{}]",
        report.outcome.selected.in_selection_order().iter().join(", ")
    );
    println!(
        "Selected (sorted):   [{}]",
        report.outcome.selected.sorted().iter().join(", ")
    );
    if let SelectionStatus::Stalled {
        round,
        requested,
        selected,
    } = report.outcome.status
    {
        println!("Stalled in round {round}: selected {selected} of {requested} requested features");
    }
    println!(
        "Result size: {} x {}",
        report.result_size.0, report.result_size.1
    );

    let timings = &report.timings;
    println!(
        "Timings: load {:.3?}, selection {:.3?}, projection {:.3?}, write {:.3?}, total {:.3?}",
        timings.load, timings.selection, timings.projection, timings.write, timings.total
    );
    println!("Projection written to: {}", report.output.display());
}

fn run_select(args: SelectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let base = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    let config = base.merge(args.overrides()).resolve()?;
    log::info!(
        "Selecting {} of {} features from '{}' with {} partitions",
        config.target,
        config.dimension,
        args.input.display(),
        config.partitions
    );

    let report = if args.quiet {
        pipeline::run(&args.input, &config, &mut NoopSelectionProgress)?
    } else {
        pipeline::run(&args.input, &config, &mut BarProgress::new())?
    };
    print_report(&report);
    Ok(())
}

fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{seconds} seconds ago")
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("STEPWISE_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("stepwise {version}");

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Select(args)) => run_select(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            let printed = Cli::command().print_help();
            println!();
            printed.map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

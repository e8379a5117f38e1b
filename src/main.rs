use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};

use yolo_dataset_balancer::core::operations::write_atomic;
use yolo_dataset_balancer::logging::setup_logging;
use yolo_dataset_balancer::{
    BalanceOutcome, BalanceProgressMessage, BalancerConfig, DatasetBalancer, EvictionPolicy,
    SelectionStrategy,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SelectionArg {
    Ordered,
    Random,
    FewestInstances,
    MostInstances,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum EvictionArg {
    Isolating,
    LinesOnly,
    WholeFile,
}

impl From<EvictionArg> for EvictionPolicy {
    fn from(arg: EvictionArg) -> Self {
        match arg {
            EvictionArg::Isolating => EvictionPolicy::Isolating,
            EvictionArg::LinesOnly => EvictionPolicy::LinesOnly,
            EvictionArg::WholeFile => EvictionPolicy::WholeFile,
        }
    }
}

/// Balance object classes of a YOLO dataset to a target count
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Primary dataset folder (read-only)
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Pool of extra files used to top up classes (read-only)
    #[arg(short, long)]
    secondary: Option<PathBuf>,
    /// Balanced dataset folder
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Overflow folder for evicted files and lines
    #[arg(short, long)]
    extra: Option<PathBuf>,
    /// Objects per class
    #[arg(short, long)]
    target: Option<usize>,
    /// JSON config file; command-line flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    max_iterations: Option<usize>,
    #[arg(long, value_enum)]
    selection: Option<SelectionArg>,
    /// Seed for random selection
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, value_enum)]
    eviction: Option<EvictionArg>,
    /// Empty output and extra folders and discard saved state first
    #[arg(long, default_value_t = false)]
    reset: bool,
    /// Save state every N transfers (0 saves only at phase ends)
    #[arg(long)]
    checkpoint_every: Option<usize>,
    /// Write the end-of-run report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<(BalancerConfig, Option<PathBuf>)> {
        let mut config = match &self.config {
            Some(path) => BalancerConfig::load(path)?,
            None => BalancerConfig::default(),
        };

        if let Some(input) = self.input {
            config.input_folder = input;
        }
        if let Some(secondary) = self.secondary {
            config.secondary_folder = secondary;
        }
        if let Some(output) = self.output {
            config.output_folder = output;
        }
        if let Some(extra) = self.extra {
            config.extra_folder = extra;
        }
        if let Some(target) = self.target {
            config.target_count = target;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        if let Some(selection) = self.selection {
            config.selection = match selection {
                SelectionArg::Ordered => SelectionStrategy::Ordered,
                SelectionArg::Random => SelectionStrategy::Random { seed: self.seed },
                SelectionArg::FewestInstances => SelectionStrategy::FewestInstances,
                SelectionArg::MostInstances => SelectionStrategy::MostInstances,
            };
        }
        if let Some(eviction) = self.eviction {
            config.eviction = eviction.into();
        }
        if let Some(checkpoint_every) = self.checkpoint_every {
            config.checkpoint_every = checkpoint_every;
        }
        config.reset |= self.reset;

        config.validate()?;
        Ok((config, self.report))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_path = setup_logging(cli.log_dir.as_deref()).context("Failed to set up logging")?;
    debug!("Logging to {:?}", log_path);

    let (config, report_path) = cli.into_config()?;
    info!(
        "Input: {:?}, secondary: {:?}, output: {:?}, extra: {:?}",
        config.input_folder, config.secondary_folder, config.output_folder, config.extra_folder
    );

    let cancel = Arc::new(AtomicBool::new(false));
    let c = cancel.clone();
    ctrlc::set_handler(move || {
        c.store(true, Ordering::SeqCst);
    })
    .context("Error registering Ctrl-C handler")?;

    let (tx, rx) = channel();
    let balancer = DatasetBalancer::new(config)?
        .with_progress(tx)
        .with_cancel_flag(cancel);

    let worker = thread::spawn(move || balancer.run());

    // Channel closes when the worker drops the balancer
    for message in rx {
        match message {
            BalanceProgressMessage::PhaseStarted { phase, iteration } => {
                debug!("Phase '{}' started (iteration {})", phase.as_str(), iteration)
            }
            BalanceProgressMessage::Transferred { file, mode } => {
                debug!("{} {}", mode.as_str(), file)
            }
            BalanceProgressMessage::Evicted {
                file,
                class_id,
                lines,
                whole_file,
            } => debug!(
                "Evicted {} instance(s) of class {} from {}{}",
                lines,
                class_id,
                file,
                if whole_file { " (whole file)" } else { "" }
            ),
            BalanceProgressMessage::IterationFinished { iteration, counts } => {
                debug!("Iteration {} finished with {} classes", iteration, counts.len())
            }
            BalanceProgressMessage::Finished(report) => {
                debug!("Run finished: {}", report.outcome.as_str())
            }
        }
    }

    let report = worker
        .join()
        .map_err(|_| anyhow::anyhow!("Balancing thread panicked"))??;

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        write_atomic(&path, json.as_bytes())
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        info!("Report written to {:?}", path);
    }

    if report.outcome == BalanceOutcome::Cancelled {
        warn!("Run cancelled; rerun with the same folders to resume");
    }

    Ok(())
}

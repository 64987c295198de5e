//! volume-reconciler: converge replicated volumes onto requested locations.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::prelude::*;

use volume_reconciler::executor::VosExecutor;
use volume_reconciler::models::normalize_partition;
use volume_reconciler::{
    BatchEntry, BatchRunner, CapacityThreshold, Config, DesiredLocation, DesiredPlacement, Location, Outcome,
    PlacementOptions, Reconciler,
};

/// Reconcile volume placement across file servers
#[derive(Parser)]
#[command(name = "volume-reconciler")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Release even if the volume has unreleased changes
    #[arg(long)]
    force: bool,

    /// Print the plan without executing it
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Capacity safety threshold, overriding the configuration
    #[arg(long)]
    threshold: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Place a volume: primary location first, then one location per replica
    Place {
        volume: String,

        /// Alternating server and partition spec (`.`, `a`, `/vicepab`, `ace-gm`)
        #[arg(required = true, num_args = 2.., value_names = ["SERVER", "SPEC"])]
        locations: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Move one site of a volume, leaving every other site alone
    Evacuate {
        volume: String,

        #[arg(long, num_args = 2, value_names = ["SERVER", "PARTITION"], required = true)]
        from: Vec<String>,

        #[arg(long, num_args = 2, value_names = ["SERVER", "SPEC"], required = true)]
        to: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Place every volume listed in a file, one per line
    Batch {
        file: PathBuf,

        /// Locations for lines that name only a volume
        #[arg(long, num_args = 2.., value_names = ["SERVER", "SPEC"])]
        shared: Vec<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Show partition space on a server
    Partinfo {
        server: String,

        #[arg(long)]
        threshold: Option<f64>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.verbose) {
        eprintln!("{:#}", err);
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "aborted");
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("error initializing logging/tracing system")
}

fn options(config: &Config, run: &RunArgs) -> Result<PlacementOptions> {
    let threshold = match run.threshold {
        Some(ratio) => CapacityThreshold::new(ratio)?,
        None => config.threshold,
    };
    Ok(PlacementOptions {
        dry_run: run.dry_run,
        ..PlacementOptions::default()
    }
    .with_force(run.force)
    .with_threshold(threshold))
}

/// Returns whether every volume converged
fn run(cli: Cli) -> Result<bool> {
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    let runner = config.runner();
    let flavor = config.flavor.resolve(&runner);
    tracing::debug!(?flavor, vos = %config.vos_path.display(), "backend selected");
    let inspector = flavor.inspector(runner);
    let executor = VosExecutor::new(config.runner());
    let reconciler = Reconciler::new(inspector.as_ref(), &executor);

    match cli.command {
        Commands::Place { volume, locations, run } => {
            let desired = DesiredLocation::parse_pairs(&locations).map_err(|e| e.for_volume(&volume))?;
            let outcome = reconciler
                .reconcile(&volume, &DesiredPlacement::Topology(desired), &options(&config, &run)?)
                .with_context(|| format!("cannot place {}", volume))?;
            Ok(report(&outcome))
        }

        Commands::Evacuate { volume, from, to, run } => {
            let [from_server, from_partition] = from.as_slice() else {
                bail!("--from takes a server and a partition");
            };
            let [to_server, to_spec] = to.as_slice() else {
                bail!("--to takes a server and a partition spec");
            };
            let desired = DesiredPlacement::SingleSite {
                from: Location::new(
                    from_server.as_str(),
                    normalize_partition(from_partition).map_err(|e| e.for_volume(&volume))?,
                ),
                to: DesiredLocation::parse(to_server, to_spec).map_err(|e| e.for_volume(&volume))?,
            };
            let outcome = reconciler
                .reconcile(&volume, &desired, &options(&config, &run)?)
                .with_context(|| format!("cannot evacuate {}", volume))?;
            Ok(report(&outcome))
        }

        Commands::Batch { file, shared, run } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read batch file {}", file.display()))?;
            let shared = DesiredLocation::parse_pairs(&shared)?;
            let entries = BatchEntry::parse_all(&text, Some(&shared))
                .with_context(|| format!("invalid batch file {}", file.display()))?;

            let summary = BatchRunner::new(&reconciler, options(&config, &run)?)
                .with_stop_file(config.stop_file.clone())
                .run(&entries);

            for outcome in &summary.succeeded {
                report(outcome);
            }
            for (volume, reason) in &summary.failed {
                eprintln!("{}: {}", volume, reason);
            }
            println!("{}", summary);
            Ok(summary.is_success())
        }

        Commands::Partinfo { server, threshold } => {
            let threshold = match threshold {
                Some(ratio) => CapacityThreshold::new(ratio)?,
                None => config.threshold,
            };
            let partitions = inspector
                .partitions(&server)
                .with_context(|| format!("cannot list partitions on {}", server))?;
            if partitions.is_empty() {
                println!("{}: no partitions reported", server);
                return Ok(false);
            }

            println!(
                "{:<10} {:>14} {:>14} {:>14} {:>6}",
                "partition", "free K", "total K", "usable K", "used"
            );
            for partition in partitions {
                println!(
                    "{:<10} {:>14} {:>14} {:>14} {:>5.1}%",
                    format!("/vicep{}", partition.id),
                    partition.free_kb,
                    partition.total_kb,
                    partition.available_kb(threshold.ratio()),
                    partition.utilization() * 100.0
                );
            }
            Ok(true)
        }
    }
}

/// Print what happened to one volume; returns whether it converged
fn report(outcome: &Outcome) -> bool {
    match &outcome.report {
        None => {
            print!("{}", outcome.plan.render());
            true
        }
        Some(report) => {
            println!("{}", report);
            report.is_success()
        }
    }
}

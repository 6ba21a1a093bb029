//! FateMap CLI
//!
//! In-silico fate mapping and divergence maps from track tables.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fatemap_core::{FateMapConfig, Weights};
use fatemap_sim::runner::{divergence_command, scenario_command, simulate_command};
use fatemap_sim::{DivergenceJob, RunSummary, ScenarioId, SimulateJob};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// FateMap in-silico fate mapping CLI
#[derive(Parser, Debug)]
#[command(name = "fatemap")]
#[command(about = "Simulate cell fates and divergence maps from tracking data", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON run summary on stdout for CI parsing
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the divergence of tracks from a time point
    Divergence {
        /// Track table (CSV with TrackID, t, [z,] y, x)
        tracks: PathBuf,

        /// Starting time point
        #[arg(short = 't', long, default_value = "0")]
        time_point: i64,

        /// Neighbourhood radius
        #[arg(short, long, default_value = "25")]
        radius: f64,

        /// Replicates per seed pixel
        #[arg(short, long, default_value = "20")]
        n_samples: usize,

        /// Dilation radius of the seed region
        #[arg(short, long, default_value = "0")]
        dilation: usize,

        /// Length (in time) after which the computation stops
        #[arg(long)]
        max_length: Option<usize>,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output raster (.json, or .png for 2-D)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Simulate trajectories (or a heatmap) from seed points
    Simulate {
        /// Track table (CSV with TrackID, t, [z,] y, x)
        tracks: PathBuf,

        /// Seed CSV with [z,] y, x columns (default: positions at the time point)
        #[arg(long)]
        seeds: Option<PathBuf>,

        /// Starting time point
        #[arg(short = 't', long, default_value = "0")]
        time_point: i64,

        /// Neighbourhood radius
        #[arg(short, long, default_value = "25")]
        radius: f64,

        /// Replicates per seed
        #[arg(short, long, default_value = "50")]
        n_samples: usize,

        /// Walk the time axis backwards
        #[arg(long)]
        reverse: bool,

        /// Do not snap replicates onto observed positions
        #[arg(long)]
        no_bind: bool,

        /// Produce an occupancy heatmap instead of trajectories
        #[arg(long)]
        heatmap: bool,

        /// Heatmap of final positions only
        #[arg(long, requires = "heatmap")]
        final_only: bool,

        #[command(flatten)]
        engine: EngineArgs,

        /// Output file (track CSV, or raster .json/.png with --heatmap)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a synthetic track table
    Scenario {
        /// Scenario name (line, divergence)
        name: String,

        /// Random seed for track generation
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Output track CSV
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Options shared by the engine-driven subcommands.
#[derive(Args, Debug)]
struct EngineArgs {
    /// Standard deviation of the per-step noise
    #[arg(long, default_value = "0.1")]
    sigma: f64,

    /// Neighbour weighting (uniform, distance)
    #[arg(long)]
    weights: Option<Weights>,

    /// Scale applied to the z axis
    #[arg(short, long, default_value = "1.0")]
    z_scale: f64,

    /// Master seed for the noise stream
    #[arg(short, long, default_value = "42")]
    seed: u64,
}

fn run(command: Command) -> Result<RunSummary> {
    match command {
        Command::Divergence {
            tracks,
            time_point,
            radius,
            n_samples,
            dilation,
            max_length,
            engine,
            output,
        } => {
            let defaults = FateMapConfig::divergence();
            let job = DivergenceJob {
                time_point,
                dilation,
                max_length,
                config: FateMapConfig {
                    radius,
                    n_samples,
                    sigma: engine.sigma,
                    weights: engine.weights.unwrap_or(defaults.weights),
                    rng_seed: engine.seed,
                    ..defaults
                },
            };
            divergence_command(&tracks, engine.z_scale, &job, output)
        }
        Command::Simulate {
            tracks,
            seeds,
            time_point,
            radius,
            n_samples,
            reverse,
            no_bind,
            heatmap,
            final_only,
            engine,
            output,
        } => {
            let defaults = FateMapConfig::default();
            let job = SimulateJob {
                time_point,
                final_only,
                config: FateMapConfig {
                    radius,
                    reverse,
                    sigma: engine.sigma,
                    weights: engine.weights.unwrap_or(defaults.weights),
                    n_samples,
                    bind_to_existing: !no_bind,
                    heatmap,
                    rng_seed: engine.seed,
                },
            };
            simulate_command(&tracks, seeds.as_deref(), engine.z_scale, &job, &output)
        }
        Command::Scenario { name, seed, output } => {
            let scenario = name
                .parse::<ScenarioId>()
                .map_err(anyhow::Error::msg)
                .with_context(|| {
                    let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                    format!("available scenarios: {}", names.join(", "))
                })?;
            scenario_command(scenario, seed, &output)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    if !cli.json {
        info!("FateMap v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    match run(cli.command) {
        Ok(summary) => {
            if cli.json {
                println!("{}", summary.to_json()?);
            } else {
                info!("✓ {} finished in {} ms", summary.command, summary.elapsed_ms);
            }
            Ok(())
        }
        Err(e) => {
            error!("✗ {:#}", e);
            Err(e)
        }
    }
}

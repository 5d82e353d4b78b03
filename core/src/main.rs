//! TRACKPF: run two-observer particle filter tracking scenarios from the command line.
//!
//! Scenarios can be loaded from a configuration file (TOML/JSON/YAML) or assembled from flags.
//! Each run records the true and estimated target track per step and can write it to CSV.
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use trackpf::ParticleAveragingStrategy;
use trackpf::fusion::WeightFusionStrategy;
use trackpf::resampling::ParticleResamplingStrategy;
use trackpf::sim::{SimulationConfig, TrackingResult, run_simulation};

/// Command line arguments
#[derive(Parser)]
#[command(
    author,
    version,
    about = "Track a moving target from two fixed bearing/range observers with a particle filter."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one or more simulated tracking scenarios
    Run(RunArgs),
    /// Write the default scenario configuration to a file (.toml/.json/.yaml)
    InitConfig {
        /// Destination path; the extension selects the format
        path: PathBuf,
    },
}

#[derive(Args, Clone, Debug)]
struct RunArgs {
    /// Scenario configuration file (TOML/JSON/YAML). Flags below override its values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of filter cycles
    #[arg(long)]
    steps: Option<usize>,

    /// Cycle length in seconds
    #[arg(long)]
    dt: Option<f64>,

    /// Number of particles
    #[arg(long)]
    particles: Option<usize>,

    /// Seed for the filter random number generator
    #[arg(long)]
    seed: Option<u64>,

    /// Resampling strategy
    #[arg(long, value_enum)]
    resampling: Option<ParticleResamplingStrategy>,

    /// Weight fusion strategy
    #[arg(long, value_enum)]
    fusion: Option<WeightFusionStrategy>,

    /// Point estimate strategy
    #[arg(long, value_enum)]
    averaging: Option<ParticleAveragingStrategy>,

    /// Probability that an observation is missing in a given step
    #[arg(long)]
    dropout: Option<f64>,

    /// Number of Monte Carlo trials (seeds are offset per trial)
    #[arg(long, default_value_t = 1)]
    trials: u64,

    /// Run trials in parallel
    #[arg(long)]
    parallel: bool,

    /// CSV output path. With several trials `_trialN` is appended to the file stem.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

/// Open `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file '{}'", path.display()))
}

/// Route `log` records to stderr, or to `log_file` when given, with millisecond timestamps.
///
/// An unrecognized level is an error rather than a silent fallback.
fn init_logger(log_level: &str, log_file: Option<&Path>) -> Result<()> {
    use std::io::Write;

    let level: log::LevelFilter = log_level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level '{log_level}'"))?;
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });
    if let Some(path) = log_file {
        builder.target(env_logger::Target::Pipe(Box::new(open_log_file(path)?)));
    }
    builder.try_init()?;
    Ok(())
}

/// Load the scenario file (or defaults) and apply flag overrides.
fn build_config(args: &RunArgs) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)
            .with_context(|| format!("failed to read configuration '{}'", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if let Some(dt) = args.dt {
        config.dt = dt;
    }
    if let Some(particles) = args.particles {
        config.filter.num_particles = particles;
    }
    if let Some(seed) = args.seed {
        config.filter.seed = seed;
    }
    if let Some(resampling) = args.resampling {
        config.filter.resampling = resampling;
    }
    if let Some(fusion) = args.fusion {
        config.filter.fusion = fusion;
    }
    if let Some(averaging) = args.averaging {
        config.filter.averaging = averaging;
    }
    if let Some(dropout) = args.dropout {
        config.dropout_probability = dropout;
    }
    config.validate()?;
    Ok(config)
}

/// Output path for one trial
fn trial_output(output: &Path, trial: u64, trials: u64) -> PathBuf {
    if trials <= 1 {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("tracking");
    output.with_file_name(format!("{stem}_trial{trial}.csv"))
}

fn run_trial(config: &SimulationConfig, args: &RunArgs, trial: u64) -> Result<TrackingResult> {
    let name = format!("trial {trial}");
    let result = run_simulation(&config.for_trial(trial), &name)?;
    if let Some(output) = &args.output {
        let path = trial_output(output, trial, args.trials);
        result
            .to_csv(&path)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        info!("{}: wrote {}", name, path.display());
    }
    Ok(result)
}

fn run(args: &RunArgs) -> Result<()> {
    let config = build_config(args)?;
    info!(
        "running {} trial(s) of {} steps with {} particles",
        args.trials, config.steps, config.filter.num_particles
    );
    let results: Vec<Result<TrackingResult>> = if args.parallel {
        (0..args.trials)
            .into_par_iter()
            .map(|trial| run_trial(&config, args, trial))
            .collect()
    } else {
        (0..args.trials)
            .map(|trial| run_trial(&config, args, trial))
            .collect()
    };

    let mut failures = 0;
    let tail = (config.steps / 5).max(1);
    for (trial, result) in results.iter().enumerate() {
        match result {
            Ok(result) => println!(
                "trial {:>3}: mean error {:>8.2} m, last {} steps {:>8.2} m, final {:>8.2} m",
                trial,
                result.mean_error().unwrap_or(f64::NAN),
                tail,
                result.mean_error_last(tail).unwrap_or(f64::NAN),
                result.final_error().unwrap_or(f64::NAN),
            ),
            Err(e) => {
                failures += 1;
                error!("trial {trial} failed: {e:#}");
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} trial(s) failed", args.trials);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_deref())?;
    match cli.command {
        Command::Run(args) => run(&args),
        Command::InitConfig { path } => {
            SimulationConfig::default()
                .to_file(&path)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            info!("wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

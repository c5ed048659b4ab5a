//! stripetrack CLI: offline angle tracking over recorded sensor readouts.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use stripetrack::{EstimatorConfig, FrameReport, PositionEstimator, TrackingResult};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "stripetrack")]
#[command(about = "Estimate encoder wheel angle from linear-sensor stripe readouts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a recorded frame sequence.
    Track(CliTrackArgs),

    /// Print the default estimator configuration (JSON).
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
struct CliTrackArgs {
    /// Input frames (JSON: {"frames": [[...], ...], "angles_arcsec": [...]}).
    #[arg(long)]
    frames: PathBuf,

    /// Estimator configuration (JSON). Missing fields take defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to write tracking results (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Keep crossing lists and density profiles in per-frame diagnostics.
    #[arg(long)]
    store_crossings: bool,

    /// Disable the absolute phase anchor.
    #[arg(long)]
    no_anchor: bool,

    /// Raw intensity mapped to 0 (overrides the configuration).
    #[arg(long)]
    amin: Option<f64>,

    /// Raw intensity mapped to 1 (overrides the configuration).
    #[arg(long)]
    amax: Option<f64>,
}

impl CliTrackArgs {
    fn to_config(&self) -> CliResult<EstimatorConfig> {
        let mut config = match &self.config {
            Some(path) => EstimatorConfig::from_json_file(path).map_err(|e| -> CliError {
                format!("Failed to load config {}: {}", path.display(), e).into()
            })?,
            None => EstimatorConfig::default(),
        };
        if self.store_crossings {
            config.store_crossings = true;
        }
        if self.no_anchor {
            config.anchor.enable = false;
        }
        if let Some(amin) = self.amin {
            config.calibration.amin = amin;
        }
        if let Some(amax) = self.amax {
            config.calibration.amax = amax;
        }
        Ok(config)
    }
}

#[derive(serde::Deserialize)]
struct FramesFile {
    frames: Vec<Vec<f64>>,
    #[serde(default)]
    angles_arcsec: Option<Vec<f64>>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track(args) => run_track(&args),
        Commands::DefaultConfig => run_default_config(),
    }
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config() -> CliResult<()> {
    let json = serde_json::to_string_pretty(&EstimatorConfig::default())?;
    println!("{}", json);
    Ok(())
}

// ── track ──────────────────────────────────────────────────────────────

fn run_track(args: &CliTrackArgs) -> CliResult<()> {
    tracing::info!("Loading frames: {}", args.frames.display());

    let data = std::fs::read_to_string(&args.frames).map_err(|e| -> CliError {
        format!("Failed to read frames {}: {}", args.frames.display(), e).into()
    })?;
    let input: FramesFile = serde_json::from_str(&data)?;
    tracing::info!("{} frames loaded", input.frames.len());

    if let Some(angles) = &input.angles_arcsec {
        if angles.len() != input.frames.len() {
            tracing::warn!(
                "angles_arcsec has {} entries for {} frames; comparing the common prefix",
                angles.len(),
                input.frames.len()
            );
        }
    }

    let config = args.to_config()?;
    let mut estimator = PositionEstimator::new(config)?;
    let mut reports: Vec<FrameReport> = Vec::with_capacity(input.frames.len());
    let mut source = input.frames.into_iter();
    let n = estimator.run(&mut source, &mut reports)?;

    let result = TrackingResult::from_reports(reports, input.angles_arcsec.as_deref());
    tracing::info!(
        "Tracked {} frames: final estimate {:.2} arcsec, {} anchor corrections, {} substituted deltas",
        n,
        result.final_estimate_arcsec,
        result.anchor_corrections,
        result.substituted_deltas,
    );
    if let Some(err) = &result.error {
        tracing::info!(
            "Error vs ground truth: mean |e|={:.2}, rms={:.2}, max |e|={:.2}, final={:.2} arcsec",
            err.mean_abs_arcsec,
            err.rms_arcsec,
            err.max_abs_arcsec,
            err.final_error_arcsec,
        );
    }

    let json = serde_json::to_string_pretty(&result)?;
    std::fs::write(&args.out, &json)?;
    tracing::info!("Results written to {}", args.out.display());

    Ok(())
}

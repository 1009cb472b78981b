//! eyegaze CLI: gaze estimation on still images.

use clap::{Args, Parser, Subcommand};
use eyegaze::{load_frame, GazeConfig, GazeTracker, Region};
use std::path::PathBuf;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "eyegaze")]
#[command(about = "Estimate on-screen gaze from the limbus ellipses in a webcam frame")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track gaze in a single image.
    Track(CliTrackArgs),

    /// Print the default configuration as JSON.
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
struct CliTrackArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Eye-pair rectangle from a face detector, as x,y,w,h in pixels.
    #[arg(long, value_parser = parse_region)]
    eye_pair: Region,

    /// Tracker configuration (JSON). Missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the RANSAC seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Path to write the tracking result (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn parse_region(s: &str) -> Result<Region, String> {
    Region::parse(s).ok_or_else(|| format!("expected x,y,w,h, got '{s}'"))
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track(args) => run_track(&args),
        Commands::DefaultConfig => run_default_config(),
    }
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config() -> CliResult<()> {
    println!("{}", GazeConfig::default().to_json_pretty()?);
    Ok(())
}

// ── track ──────────────────────────────────────────────────────────────

fn run_track(args: &CliTrackArgs) -> CliResult<()> {
    tracing::info!("Loading image: {}", args.image.display());
    let (frame, gray) = load_frame(&args.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", args.image.display(), e).into()
    })?;
    tracing::info!("Image size: {}x{}", frame.width(), frame.height());

    let mut config = match &args.config {
        Some(path) => GazeConfig::from_json_file(path)?,
        None => GazeConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.ransac.seed = seed;
    }

    let mut tracker = GazeTracker::new(config);
    let result = tracker.try_track(&frame, &gray, Some(args.eye_pair))?;

    match result.as_ref().and_then(|r| r.gaze) {
        Some(g) => tracing::info!(
            "Gaze: ({:.1}, {:.1}) mm, ({:.0}, {:.0}) px",
            g.mm[0],
            g.mm[1],
            g.px[0],
            g.px[1]
        ),
        None => tracing::warn!("No gaze point for this frame"),
    }

    let json = serde_json::to_string_pretty(&result)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Results written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

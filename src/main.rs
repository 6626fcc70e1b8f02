use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use qc_station::analyzer::{self, Thresholds};
use qc_station::capture::{CameraDevice, CaptureCoordinator, FolderCamera};
use qc_station::config::{CameraConfig, CameraSource, StationConfig};
use qc_station::hardware::{CommandChannel, SerialPortLink};
use qc_station::run::{Orchestrator, RunOutcome, RunSettings};
use qc_station::RunHistory;

#[derive(Parser)]
#[command(name = "qc-station", about = "Automated visual quality-control station")]
struct Cli {
    /// Path to the station config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute one full capture-analyze-report-reset pass.
    Run,
    /// Send RESET to the hardware and re-arm the station.
    Reset,
    /// List recorded runs.
    History {
        /// Emit one JSON object per run instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Analyze a single image file and write the annotated copy.
    Analyze {
        image: PathBuf,
        /// Where to write the annotated image (default: alongside the input).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = StationConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Analyze { image, output } => analyze_one(&config, &image, output),
        Command::History { json } => list_history(json),
        Command::Run => {
            let orchestrator = build_orchestrator(&config)?;
            match orchestrator.run_once().await {
                Some(RunOutcome::Completed { verdict, frames_analyzed }) => {
                    println!("Run completed: {} ({} frames analyzed)", verdict, frames_analyzed);
                    Ok(())
                }
                Some(RunOutcome::Failed { reason }) => bail!("run failed: {}", reason),
                None => bail!("a run is already active"),
            }
        }
        Command::Reset => {
            let orchestrator = build_orchestrator(&config)?;
            orchestrator.reset().await;
            println!("Station reset");
            Ok(())
        }
    }
}

fn thresholds(config: &StationConfig) -> Thresholds {
    Thresholds {
        min: config.analyzer.min_rectangularity,
        max: config.analyzer.max_rectangularity,
    }
}

fn build_camera(config: &CameraConfig) -> Result<Box<dyn CameraDevice>> {
    match config.source {
        CameraSource::Folder => Ok(Box::new(FolderCamera::open(&config.folder)?)),
        #[cfg(feature = "uvc")]
        CameraSource::Uvc => Ok(Box::new(qc_station::capture::UvcCamera::open(config.index)?)),
        #[cfg(not(feature = "uvc"))]
        CameraSource::Uvc => bail!(
            "built without the `uvc` feature; set [camera] source = \"folder\" \
             or rebuild with --features uvc"
        ),
    }
}

fn build_orchestrator(
    config: &StationConfig,
) -> Result<Orchestrator<Box<dyn CameraDevice>, SerialPortLink>> {
    let camera = build_camera(&config.camera)?;
    let coordinator = CaptureCoordinator::new(
        camera,
        config.capture.output_dir.clone(),
        config.inter_frame_delay(),
    );

    let link = SerialPortLink::open(
        &config.serial.port,
        config.serial.baud_rate,
        config.serial_timeout(),
    )?;
    let channel = CommandChannel::new(link, config.settle_delay());

    let history = Arc::new(RunHistory::new(&RunHistory::default_path())?);
    let settings = RunSettings {
        frames_per_run: config.capture.frames_per_run,
        cooldown: config.cooldown(),
        thresholds: thresholds(config),
    };

    Ok(Orchestrator::new(coordinator, channel, history, settings))
}

fn analyze_one(config: &StationConfig, image: &PathBuf, output: Option<PathBuf>) -> Result<()> {
    let analysis = analyzer::analyze_file(image, thresholds(config));

    match analysis.rectangularity {
        Some(r) => println!("Rectangularity: {:.4}", r),
        None => println!("Rectangularity: n/a (no contour found)"),
    }
    println!(
        "Verdict: {}",
        if analysis.is_defective { "DEFECT" } else { "NORMAL" }
    );

    if let Some(annotated) = &analysis.annotated {
        let path = output.unwrap_or_else(|| {
            let stem = image
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("image");
            image.with_file_name(format!("{}_annotated.png", stem))
        });
        annotated
            .save(&path)
            .with_context(|| format!("failed to write {:?}", path))?;
        println!("Annotated image written to {:?}", path);
    }
    Ok(())
}

fn list_history(json: bool) -> Result<()> {
    let history = RunHistory::new(&RunHistory::default_path())?;
    let runs = history.list()?;
    if runs.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }
    for run in runs {
        if json {
            println!("{}", serde_json::to_string(&run)?);
        } else {
            println!(
                "{} {}  {:<9}  {:>6.1}s  {} frames",
                run.date, run.time, run.verdict, run.duration_seconds, run.frames_captured
            );
        }
    }
    Ok(())
}

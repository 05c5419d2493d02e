use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use autotap::config as cfg;
use autotap::device::{DesktopExecutor, PathBitmapSupplier, RecordedFrame, ReplayDetector};
use autotap::engine::{DebugRecorder, ProcessOutcome, ScenarioProcessor};
use autotap::error::EngineError;
use autotap::sources::{self, FileSource, FrameSource, StdinSource};

/// Autotap CLI: replays recorded frames against a scenario.
#[derive(Debug, Parser)]
#[command(
    name = autotap::PKG_NAME,
    version = autotap::PKG_VERSION,
    about = "Frame-driven scenario engine for screen automation"
)]
struct Args {
    /// Path to the JSON scenario file
    #[arg(short = 's', long = "scenario", required_unless_present = "print_schema")]
    scenario: Option<PathBuf>,

    /// NDJSON file of recorded frames (reads stdin when absent)
    #[arg(short = 'f', long = "frames")]
    frames: Option<PathBuf>,

    /// Delay between two frames read from --frames, in milliseconds
    #[arg(long = "frame-interval-ms", default_value_t = 0)]
    frame_interval_ms: u64,

    /// Enable dry-run mode (log actions instead of simulating input)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Force the randomization of positions and durations
    #[arg(long = "randomize")]
    randomize: bool,

    /// Directory the reference images are resolved from
    #[arg(long = "images")]
    images: Option<PathBuf>,

    /// Write the debug report (JSON) to this path when the run ends
    #[arg(long = "report")]
    report: Option<PathBuf>,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for the scenario file and exit
    #[arg(long = "print-schema")]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Honor --log-level before RUST_LOG.
    match args.log_level.as_deref() {
        Some(level) => {
            autotap::init_tracing_with_level(
                autotap::parse_level(level).unwrap_or(tracing::Level::INFO),
            );
        }
        None => autotap::init_tracing(),
    }

    if args.print_schema {
        let schema = cfg::generate_schema();
        let json = serde_json::to_string_pretty(&schema)?;
        println!("{json}");
        return Ok(());
    }

    let scenario_path = args
        .scenario
        .as_ref()
        .context("--scenario is required")?;
    info!(
        version = autotap::PKG_VERSION,
        scenario = %scenario_path.display(),
        dry_run = args.dry_run,
        "Starting Autotap"
    );

    // Load scenario
    let mut scenario = cfg::load_from_path_async(scenario_path).await?;
    if args.randomize {
        scenario.settings.randomize = true;
    }
    debug!(target: "autotap", events = scenario.events.len(), "Scenario loaded successfully");

    let recorder = Arc::new(DebugRecorder::new());
    let mut processor = ScenarioProcessor::new(
        scenario,
        ReplayDetector::new(),
        PathBitmapSupplier::new(args.images.clone()),
        Arc::new(DesktopExecutor::new(args.dry_run)),
    )
    .with_listener(recorder.clone());

    processor.on_scenario_start();

    // Ctrl+C cancels the processing at its next yield point.
    let cancel = processor.cancellation_token();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down");
                cancel.cancel();
            }
        }
    });

    let source: Box<dyn FrameSource> = match &args.frames {
        Some(path) => Box::new(FileSource::new(path, args.frame_interval_ms)),
        None => Box::new(StdinSource::new()),
    };
    // Capacity 1: a frame is only read once the previous one was taken.
    let (tx, mut rx) = mpsc::channel::<RecordedFrame>(1);
    let _handle = sources::spawn_source(source.as_ref(), tx);

    let result = run(&mut processor, &mut rx, &cancel).await;
    processor.on_scenario_stop();

    if let Some(path) = &args.report {
        let report = recorder.report();
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Debug report written");
    }

    result?;
    info!("Autotap exited");
    Ok(())
}

/// Feed frames to the processor until the source ends, the scenario stops, or the run is
/// cancelled.
async fn run(
    processor: &mut ScenarioProcessor<ReplayDetector, PathBitmapSupplier>,
    frames: &mut mpsc::Receiver<RecordedFrame>,
    cancel: &tokio_util::sync::CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let frame = tokio::select! {
            frame = frames.recv() => frame,
            _ = cancel.cancelled() => return Ok(()),
        };
        let Some(frame) = frame else {
            info!("No more frames");
            return Ok(());
        };

        for action in &frame.broadcasts {
            processor.on_broadcast_received(action);
        }

        match processor.process(&frame).await {
            Ok(ProcessOutcome::Continue) => {}
            Ok(ProcessOutcome::StopRequested) => return Ok(()),
            Err(EngineError::Cancelled) => return Ok(()),
            Err(err) if err.is_configuration() => {
                return Err(err).context("Scenario is invalid");
            }
            Err(err) => {
                error!(error = %err, "Failed to process frame");
                warn!("Continuing with the next frame");
            }
        }
    }
}

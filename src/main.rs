use biometric_auth::{
    AuthOrchestrator, CameraOutcome, CeremonyOutcome, Config, DevMode, OnnxModelService,
    PreviewSink, SoftwareAuthenticator, StatusBoard, UnavailableAuthenticator, V4l2Camera,
};
use biometric_auth::common::paths::DEFAULT_MODELS_LOCATION;
use biometric_auth::platform::{CapabilityQuery, CredentialApi};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bioauth")]
#[command(about = "Biometric authentication: platform credential and camera face session")]
struct Cli {
    /// Enable development mode (software authenticator, local data tree)
    #[arg(long, global = true)]
    dev: bool,

    /// Path to a config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print status updates as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check platform credential support and load face models
    Probe,
    /// Run the platform credential ceremony
    Fingerprint,
    /// Start the camera face session
    Face {
        /// Frames to pull from the live stream before stopping
        #[arg(short, long, default_value = "5")]
        frames: u32,
    },
    /// Mount, then run both flows concurrently
    Run {
        #[arg(short, long, default_value = "5")]
        frames: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(dev_mode.is_enabled())?,
    };
    if let Some(models_dir) = dev_mode.models_dir() {
        if config.models.base_location == PathBuf::from(DEFAULT_MODELS_LOCATION) {
            config.models.base_location = models_dir;
        }
    }

    let sink = Arc::new(PreviewSink::mounted());
    let orchestrator = Arc::new(build_orchestrator(config, &dev_mode, sink.clone())?);
    let printer = tokio::spawn(print_status(orchestrator.status().subscribe(), cli.json));

    match cli.command {
        Commands::Probe => {
            let report = orchestrator.mount().await;
            println!(
                "Platform credentials: {}",
                if report.credential_supported { "available" } else { "unavailable" }
            );
            println!("Face models: {:?}", report.models);
        }
        Commands::Fingerprint => {
            orchestrator.mount().await;
            let report = orchestrator.authenticate_fingerprint().await?;
            println!("Ceremony: {}", describe_ceremony(&report.outcome));
        }
        Commands::Face { frames } => {
            orchestrator.mount().await;
            run_face(&orchestrator, &sink, frames).await?;
        }
        Commands::Run { frames } => {
            orchestrator.mount().await;
            let (ceremony, face) = tokio::join!(
                orchestrator.authenticate_fingerprint(),
                run_face(&orchestrator, &sink, frames),
            );
            println!("Ceremony: {}", describe_ceremony(&ceremony?.outcome));
            face?;
        }
    }

    println!("Status: {}", orchestrator.status().message());
    orchestrator.unmount();
    // Dropping the orchestrator closes the status channel; the printer
    // flushes whatever it has not shown yet and then returns.
    drop(orchestrator);
    printer.await?;
    Ok(())
}

fn build_orchestrator(config: Config, dev_mode: &DevMode, sink: Arc<PreviewSink>) -> Result<AuthOrchestrator> {
    let (capability, credentials): (Arc<dyn CapabilityQuery>, Arc<dyn CredentialApi>) = if dev_mode.is_enabled() {
        let authenticator = Arc::new(SoftwareAuthenticator::new(dev_mode.authenticator_secret()));
        (authenticator.clone(), authenticator)
    } else {
        let unavailable = Arc::new(UnavailableAuthenticator);
        (unavailable.clone(), unavailable)
    };

    let models = OnnxModelService::new(config.models.clone()).context("initialising model runtime")?;
    let camera = V4l2Camera::new(config.camera.clone());

    let orchestrator = AuthOrchestrator::builder(config)
        .capability(capability)
        .credentials(credentials)
        .camera(Arc::new(camera))
        .sink(sink)
        .models(Arc::new(models))
        .build()?;
    Ok(orchestrator)
}

async fn run_face(orchestrator: &AuthOrchestrator, sink: &Arc<PreviewSink>, frames: u32) -> Result<()> {
    match orchestrator.start_face_recognition().await? {
        CameraOutcome::Attached { stream_id } => {
            let sink = sink.clone();
            let levels = tokio::task::spawn_blocking(move || {
                (0..frames)
                    .filter_map(|_| sink.with_stream(|s| s.capture_frame()))
                    .collect::<Vec<_>>()
            })
            .await?;

            for (i, frame) in levels.into_iter().enumerate() {
                match frame {
                    Ok(frame) => println!(
                        "stream {} frame {}: {}x{} {} mean={:.1}",
                        stream_id, i + 1, frame.width, frame.height, frame.fourcc, frame.mean_level()
                    ),
                    Err(e) => eprintln!("stream {} frame {}: {}", stream_id, i + 1, e),
                }
            }
            orchestrator.stop_face_recognition();
        }
        CameraOutcome::SinkMissing => println!("No display sink, camera not started"),
        CameraOutcome::Stopped => println!("Face session stopped before the camera opened"),
        CameraOutcome::Failed(reason) => println!("Face session failed: {}", reason),
    }
    Ok(())
}

fn describe_ceremony(outcome: &CeremonyOutcome) -> String {
    match outcome {
        CeremonyOutcome::Succeeded => "SUCCESS".to_string(),
        CeremonyOutcome::Unsupported => "UNSUPPORTED".to_string(),
        CeremonyOutcome::NoCredential => "FAILED (no credential)".to_string(),
        CeremonyOutcome::Error(msg) => format!("ERROR ({})", msg),
    }
}

async fn print_status(rx: watch::Receiver<StatusBoard>, json: bool) {
    drain_status(rx, json, |line| println!("{}", line)).await;
}

/// Emits one line per observed update until the sender is dropped. An
/// update published just before the drop is still delivered.
async fn drain_status<F>(mut rx: watch::Receiver<StatusBoard>, json: bool, mut emit: F)
where
    F: FnMut(String),
{
    while rx.changed().await.is_ok() {
        let board = rx.borrow_and_update().clone();
        if let Some(line) = render_status(&board, json) {
            emit(line);
        }
    }
}

fn render_status(board: &StatusBoard, json: bool) -> Option<String> {
    if json {
        match serde_json::to_string(&board.latest) {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!("Failed to encode status: {}", e);
                None
            }
        }
    } else {
        let flow = board.latest.flow.map(|f| f.to_string()).unwrap_or_default();
        Some(format!("[{}] {}: {}", board.latest.at.format("%H:%M:%S"), flow, board.latest.status))
    }
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .init();
    }
}

use clap::Parser;
use mindfuse::config::DetectorConfig;
use mindfuse::dashboard::Dashboard;
use mindfuse::error::{DetectorError, Result};
use mindfuse::simulation::{RandomClassifier, SimulatedCamera};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Runs a headless detection session against the simulated camera and classifier
#[derive(Parser, Debug)]
#[command(name = "mindfuse", version, about)]
struct Args {
    /// How long to keep detecting
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// JSON detector configuration
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "emotion_detector.log")]
    log_file: PathBuf,

    /// Fraction of simulated frames with no face in them
    #[arg(long, default_value_t = 0.2)]
    no_face_ratio: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Initializes the logging system (file only, no console output)
fn init_logging(path: &Path) -> Result<()> {
    let log_file = std::fs::File::create(path)?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    let config = match &args.config {
        Some(path) => DetectorConfig::from_path(path)?,
        None => DetectorConfig::default(),
    };

    let dashboard = Dashboard::new(
        Arc::new(SimulatedCamera::default()),
        Arc::new(RandomClassifier::new(args.seed, args.no_face_ratio)),
        config,
    );

    dashboard.start_camera().await?;

    let state = dashboard.detector().wait_until_settled().await;
    if let Some(cause) = state.error {
        error!("Detection unavailable: {}", cause);
        return Err(DetectorError::ModelUnavailable(cause));
    }

    dashboard.start_detection()?;

    let mut report = tokio::time::interval(Duration::from_secs(1));
    report.tick().await;
    for _ in 0..args.duration_secs {
        report.tick().await;
        let view = dashboard.view();
        let current = view
            .state
            .current_emotion
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "none".to_string());
        info!(
            "Current: {} | {} data points | stats: {:?}",
            current,
            view.summary.data_points,
            dashboard.detector().stats()
        );
    }

    dashboard.stop_camera();

    let view = dashboard.view();
    println!("{}", serde_json::to_string_pretty(&view.summary)?);
    print!("{}", view.context);
    info!("Session finished");

    Ok(())
}

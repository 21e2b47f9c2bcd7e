pub mod error;
pub mod settings;
mod utils;

pub mod dataset;
pub mod telemetry;

pub use error::{TelemetryError, TelemetryResult};
pub use settings::{EngineSettings, SettingsStore};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use dataset::DatasetStore;
use telemetry::{
    dispatch,
    export::{CSV_FILE_NAME, REPORT_FILE_NAME},
    Intent, IntentReply, StreamController, StreamPhase,
};

const ENABLE_LOGS: bool = true;

const DEFAULT_SETTINGS_FILE: &str = "fluxpoint.settings.json";
const USAGE: &str = "usage: fluxpoint <dataset.json> [settings.json]";

/// Headless replay: streams the first trajectory of the dataset, applies JSON
/// intents read from stdin, and writes the CSV dump and mission report to the
/// working directory once the trajectory completes.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("FluxPoint telemetry engine starting up...");

    let mut args = std::env::args().skip(1);
    let dataset_path = args.next().map(PathBuf::from).context(USAGE)?;
    let settings_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

    let settings = SettingsStore::new(settings_path)?.engine();
    let dataset = DatasetStore::load_or_placeholder(&dataset_path);
    info!(
        "Loaded {} trajectories from {}",
        dataset.trajectories().len(),
        dataset_path.display()
    );

    let controller = StreamController::new(dataset, settings);
    let mut snapshots = controller.subscribe();

    if let Err(err) = controller.start().await {
        warn!("Initial stream did not start: {err}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_line(&controller, &line).await,
                Ok(None) => {
                    stdin_open = false;
                    if !controller.snapshot().await.session.phase.is_active() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("stdin closed: {err}");
                    stdin_open = false;
                }
            },
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let (phase, metrics) = {
                    let snapshot = snapshots.borrow_and_update();
                    (snapshot.session.phase, snapshot.metrics.clone())
                };
                debug!(
                    "drift={:.3} rmse={:.3} confidence={:.1}% level={:?}",
                    metrics.drift, metrics.rmse, metrics.confidence, metrics.level
                );
                if phase == StreamPhase::Completed {
                    write_artifacts(&controller, Path::new(".")).await?;
                    break;
                }
                if !stdin_open && !phase.is_active() {
                    break;
                }
            }
        }
    }

    info!("FluxPoint telemetry engine shutting down");
    Ok(())
}

async fn handle_line(controller: &StreamController, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let intent: Intent = match serde_json::from_str(line) {
        Ok(intent) => intent,
        Err(err) => {
            crate::log_warn!("Ignoring malformed intent {line:?}: {err}");
            return;
        }
    };

    match dispatch(controller, intent).await {
        Ok(IntentReply::Snapshot(snapshot)) => {
            crate::log_info!(
                "{} | buffer {} pts | drift {:.3} m | confidence {:.1}%",
                snapshot.session.phase.as_str(),
                snapshot.metrics.visible_len,
                snapshot.metrics.drift,
                snapshot.metrics.confidence
            );
        }
        Ok(IntentReply::Csv(csv)) => {
            if let Err(err) = write_file(Path::new(CSV_FILE_NAME), &csv) {
                crate::log_error!("{err:#}");
            }
        }
        Ok(IntentReply::Report(report)) => println!("{report}"),
        Err(err) => crate::log_warn!("Intent rejected: {err}"),
    }
}

async fn write_artifacts(controller: &StreamController, dir: &Path) -> Result<()> {
    write_file(&dir.join(CSV_FILE_NAME), &controller.export_csv().await)?;
    write_file(&dir.join(REPORT_FILE_NAME), &controller.report().await)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

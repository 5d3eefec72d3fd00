//! Background training worker.
//!
//! The worker owns everything it needs for one run and reports back only
//! through [`RunMessage`]s; it never touches panel state.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use super::timer::RunToken;
use crate::chart::{self, ChartError};
use crate::data::{DataError, DataLoader, ShapeError, ensure_channels};
use crate::ml::{
    HistoryError, ModelFactory, RunSummary, TrainError, TrainableModel, Trainer, TrainingData,
};

pub const LOADING_MESSAGE: &str = "Loading and preprocessing data...";
pub const TRAINING_MESSAGE: &str = "Data loaded. Training the model...";
pub const COMPLETE_MESSAGE: &str = "Model training complete. Weights saved.";
/// Completion line when no weights path is configured.
pub const COMPLETE_UNSAVED_MESSAGE: &str = "Model training complete.";

/// Everything that can end a run early.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Chart(#[from] ChartError),
    #[error("failed to serialize model weights: {0}")]
    SerializeWeights(#[from] serde_json::Error),
    #[error("failed to write model weights to {path}: {source}")]
    WriteWeights {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("training worker panicked: {0}")]
    Panicked(String),
    #[error("training worker exited without reporting a result")]
    Disconnected,
    #[error("failed to start training worker: {0}")]
    Spawn(std::io::Error),
}

/// Files read and written by a run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub train: PathBuf,
    pub test: PathBuf,
    pub chart: PathBuf,
    pub weights: Option<PathBuf>,
}

/// Inputs for one run.
#[derive(Clone)]
pub struct RunJob {
    pub token: RunToken,
    pub loader: Arc<dyn DataLoader>,
    pub trainer: Arc<dyn Trainer>,
    pub factory: ModelFactory,
    pub paths: RunPaths,
    pub chart_size: (u32, u32),
    pub display_size: [u32; 2],
}

/// Result payload of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub epochs: usize,
    pub chart_path: PathBuf,
    /// Chart decoded and scaled to the display size.
    pub chart_image: egui::ColorImage,
}

#[derive(Debug)]
pub enum RunEvent {
    Log(String),
    /// Training finished; chart rendering may still be in progress.
    TrainingEnded,
    Finished(Result<RunOutcome, RunError>),
}

#[derive(Debug)]
pub struct RunMessage {
    pub token: RunToken,
    pub event: RunEvent,
}

/// Start `job` on a named background thread.
///
/// Every event is sent on `tx`; the last one is always `Finished`. When a
/// context is supplied, each send also requests a repaint.
pub fn spawn_run(
    job: RunJob,
    tx: Sender<RunMessage>,
    repaint: Option<egui::Context>,
) -> Result<JoinHandle<()>, RunError> {
    thread::Builder::new()
        .name(format!("training-{}", job.token))
        .spawn(move || {
            let token = job.token;
            let send = |event: RunEvent| {
                // The panel may already be gone; nothing left to report to.
                let _ = tx.send(RunMessage { token, event });
                if let Some(ctx) = &repaint {
                    ctx.request_repaint();
                }
            };
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                execute_run(&job, &mut |event| send(event))
            }))
            .unwrap_or_else(|payload| Err(RunError::Panicked(panic_message(payload.as_ref()))));
            send(RunEvent::Finished(result));
        })
        .map_err(RunError::Spawn)
}

/// Run the full pipeline on the current thread, emitting progress events.
///
/// `Finished` is not emitted here; the caller reports the returned result.
pub fn execute_run(
    job: &RunJob,
    emit: &mut dyn FnMut(RunEvent),
) -> Result<RunOutcome, RunError> {
    let mut log = |line: String| emit(RunEvent::Log(line));
    log(LOADING_MESSAGE.to_string());
    let data = job.loader.load(&job.paths.train, &job.paths.test)?;
    let train_x = ensure_channels(data.train_x)?;
    let val_x = ensure_channels(data.val_x)?;

    log(TRAINING_MESSAGE.to_string());
    let mut model = (job.factory)();
    tracing::info!(
        token = %job.token,
        model = model.name(),
        train_shape = ?train_x.shape(),
        val_shape = ?val_x.shape(),
        "Training started"
    );
    let inputs = TrainingData {
        train_x: train_x.view(),
        train_y: data.train_y.view(),
        val_x: val_x.view(),
        val_y: data.val_y.view(),
    };
    let history = job
        .trainer
        .train(model.as_mut(), &inputs, &mut |report| log(report.log_line()))?;
    match &job.paths.weights {
        Some(path) => {
            save_weights(model.as_ref(), path)?;
            log(COMPLETE_MESSAGE.to_string());
        }
        None => log(COMPLETE_UNSAVED_MESSAGE.to_string()),
    }

    let summary = RunSummary::from_history(&history)?;
    for line in summary.log_lines() {
        log(line);
    }
    emit(RunEvent::TrainingEnded);

    chart::render_training_chart(&history, &job.paths.chart, job.chart_size)?;
    let chart_image = chart::load_chart_image(&job.paths.chart, job.display_size)?;
    tracing::info!(
        token = %job.token,
        epochs = history.epochs(),
        chart = %job.paths.chart.display(),
        "Training run finished"
    );
    Ok(RunOutcome {
        summary,
        epochs: history.epochs(),
        chart_path: job.paths.chart.clone(),
        chart_image,
    })
}

fn save_weights(model: &dyn TrainableModel, path: &Path) -> Result<(), RunError> {
    let json = model.to_json()?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| RunError::WriteWeights {
            path: path.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, json).map_err(|source| RunError::WriteWeights {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Weights written to {}", path.display());
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

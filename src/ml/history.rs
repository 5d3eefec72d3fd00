//! Per-epoch metric history and the run summary derived from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LOSS: &str = "loss";
pub const VAL_LOSS: &str = "val_loss";
pub const ACCURACY: &str = "accuracy";
pub const VAL_ACCURACY: &str = "val_accuracy";

#[derive(Debug, Error, PartialEq)]
pub enum HistoryError {
    #[error("history has no '{0}' metric")]
    MissingMetric(String),
    #[error("metric '{0}' has no recorded epochs")]
    EmptyMetric(String),
}

/// Metric sequences keyed by name, one value per epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    metrics: BTreeMap<String, Vec<f64>>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one epoch's value for `name`.
    pub fn record(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    /// Replace the whole sequence for `name`.
    pub fn insert(&mut self, name: &str, values: Vec<f64>) {
        self.metrics.insert(name.to_string(), values);
    }

    pub fn metric(&self, name: &str) -> Result<&[f64], HistoryError> {
        self.metrics
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| HistoryError::MissingMetric(name.to_string()))
    }

    /// Arithmetic mean of a metric across epochs.
    pub fn mean(&self, name: &str) -> Result<f64, HistoryError> {
        let values = self.metric(name)?;
        if values.is_empty() {
            return Err(HistoryError::EmptyMetric(name.to_string()));
        }
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Number of epochs recorded for the training loss.
    pub fn epochs(&self) -> usize {
        self.metrics.get(LOSS).map_or(0, Vec::len)
    }
}

/// Averages reported at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub train_loss: f64,
    pub val_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
}

impl RunSummary {
    pub fn from_history(history: &TrainingHistory) -> Result<Self, HistoryError> {
        Ok(Self {
            train_loss: history.mean(LOSS)?,
            val_loss: history.mean(VAL_LOSS)?,
            train_accuracy: history.mean(ACCURACY)?,
            val_accuracy: history.mean(VAL_ACCURACY)?,
        })
    }

    /// Log lines in display order, four decimal places.
    pub fn log_lines(&self) -> [String; 4] {
        [
            format!("Avg Training Loss: {:.4}", self.train_loss),
            format!("Avg Validation Loss: {:.4}", self.val_loss),
            format!("Avg Training Accuracy: {:.4}", self.train_accuracy),
            format!("Avg Validation Accuracy: {:.4}", self.val_accuracy),
        ]
    }
}

//! Epoch-based training loop that records a [`TrainingHistory`].

use ndarray::{Array1, Array2, ArrayView1, ArrayViewD, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

use super::history::{ACCURACY, LOSS, TrainingHistory, VAL_ACCURACY, VAL_LOSS};
use super::model::{TrainableModel, binary_accuracy, binary_cross_entropy};
use crate::config::TrainingSettings;

#[derive(Debug, Error, PartialEq)]
pub enum TrainError {
    #[error("{0} set is empty")]
    EmptySet(&'static str),
    #[error("{set} set has {rows} feature rows but {labels} labels")]
    LabelMismatch {
        set: &'static str,
        rows: usize,
        labels: usize,
    },
    #[error("validation rows have {val} features, training rows have {train}")]
    FeatureMismatch { train: usize, val: usize },
    #[error("loss became non-finite in epoch {epoch}")]
    Diverged { epoch: usize },
}

/// Feature/label arrays handed to a trainer. Features are `(N, ...)`.
#[derive(Debug, Clone)]
pub struct TrainingData<'a> {
    pub train_x: ArrayViewD<'a, f32>,
    pub train_y: ArrayView1<'a, f32>,
    pub val_x: ArrayViewD<'a, f32>,
    pub val_y: ArrayView1<'a, f32>,
}

/// Metrics for one completed epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub epochs: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

impl EpochReport {
    pub fn log_line(&self) -> String {
        format!(
            "Epoch {}/{} - loss: {:.4} - accuracy: {:.4} - val_loss: {:.4} - val_accuracy: {:.4}",
            self.epoch, self.epochs, self.loss, self.accuracy, self.val_loss, self.val_accuracy
        )
    }
}

/// A training routine that fits `model` and returns its per-epoch history.
pub trait Trainer: Send + Sync {
    fn train(
        &self,
        model: &mut dyn TrainableModel,
        data: &TrainingData<'_>,
        on_epoch: &mut dyn FnMut(&EpochReport),
    ) -> Result<TrainingHistory, TrainError>;
}

#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 32,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

impl From<&TrainingSettings> for TrainOptions {
    fn from(settings: &TrainingSettings) -> Self {
        Self {
            epochs: settings.epochs,
            batch_size: settings.batch_size,
            learning_rate: settings.learning_rate,
            seed: settings.seed,
        }
    }
}

/// Mini-batch trainer over flattened, standardized features.
///
/// Train and validation metrics are measured on the full sets after each
/// epoch, so the recorded history does not depend on batch order.
#[derive(Debug, Clone, Default)]
pub struct EpochTrainer {
    pub options: TrainOptions,
}

impl EpochTrainer {
    pub fn new(options: TrainOptions) -> Self {
        Self { options }
    }
}

impl Trainer for EpochTrainer {
    fn train(
        &self,
        model: &mut dyn TrainableModel,
        data: &TrainingData<'_>,
        on_epoch: &mut dyn FnMut(&EpochReport),
    ) -> Result<TrainingHistory, TrainError> {
        let train_x = flatten_rows("training", data.train_x.view(), data.train_y.len())?;
        let val_x = flatten_rows("validation", data.val_x.view(), data.val_y.len())?;
        if train_x.ncols() != val_x.ncols() {
            return Err(TrainError::FeatureMismatch {
                train: train_x.ncols(),
                val: val_x.ncols(),
            });
        }
        let (mean, std) = column_stats(&train_x);
        let train_x = standardize(train_x, &mean, &std);
        let val_x = standardize(val_x, &mean, &std);
        let train_y = data.train_y.to_owned();
        let val_y = data.val_y.to_owned();

        model.prepare(train_x.ncols());
        let epochs = self.options.epochs.max(1);
        let batch_size = self.options.batch_size.max(1);
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let mut indices: Vec<usize> = (0..train_x.nrows()).collect();
        let mut history = TrainingHistory::new();

        for epoch in 1..=epochs {
            indices.shuffle(&mut rng);
            for batch in indices.chunks(batch_size) {
                let x = train_x.select(Axis(0), batch);
                let y = train_y.select(Axis(0), batch);
                model.fit_batch(x.view(), y.view(), self.options.learning_rate);
            }
            let (loss, accuracy) = evaluate(model, &train_x, &train_y);
            let (val_loss, val_accuracy) = evaluate(model, &val_x, &val_y);
            if !loss.is_finite() || !val_loss.is_finite() {
                return Err(TrainError::Diverged { epoch });
            }
            let report = EpochReport {
                epoch,
                epochs,
                loss,
                accuracy,
                val_loss,
                val_accuracy,
            };
            tracing::debug!("{}", report.log_line());
            history.record(LOSS, loss);
            history.record(ACCURACY, accuracy);
            history.record(VAL_LOSS, val_loss);
            history.record(VAL_ACCURACY, val_accuracy);
            on_epoch(&report);
        }
        Ok(history)
    }
}

fn flatten_rows(
    set: &'static str,
    x: ArrayViewD<'_, f32>,
    labels: usize,
) -> Result<Array2<f32>, TrainError> {
    let rows = x.shape().first().copied().unwrap_or(0);
    if rows == 0 {
        return Err(TrainError::EmptySet(set));
    }
    if rows != labels {
        return Err(TrainError::LabelMismatch { set, rows, labels });
    }
    let cols = x.len() / rows;
    // `iter` walks in logical order, so this is row-major for any layout.
    let values: Vec<f32> = x.iter().copied().collect();
    Ok(Array2::from_shape_fn((rows, cols), |(r, c)| values[r * cols + c]))
}

fn column_stats(x: &Array2<f32>) -> (Array1<f32>, Array1<f32>) {
    let mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let std = x.std_axis(Axis(0), 0.0).mapv(|s| s.max(1e-6));
    (mean, std)
}

fn standardize(x: Array2<f32>, mean: &Array1<f32>, std: &Array1<f32>) -> Array2<f32> {
    (x - mean) / std
}

fn evaluate(model: &dyn TrainableModel, x: &Array2<f32>, y: &Array1<f32>) -> (f64, f64) {
    let probs = model.predict_proba(x.view());
    (
        binary_cross_entropy(probs.view(), y.view()) as f64,
        binary_accuracy(probs.view(), y.view()) as f64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::{MlpClassifier, MlpOptions};
    use ndarray::{Array1, ArrayD, IxDyn};

    fn blobs(n: usize, offset: f32) -> (ArrayD<f32>, Array1<f32>) {
        let mut values = Vec::with_capacity(n * 8);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let label = (i % 2) as f32;
            let center = if label > 0.5 { 1.0 } else { -1.0 };
            for j in 0..8 {
                values.push(center + offset * ((i * 8 + j) % 5) as f32 * 0.1);
            }
            labels.push(label);
        }
        (
            ArrayD::from_shape_vec(IxDyn(&[n, 2, 2, 2]), values).unwrap(),
            Array1::from(labels),
        )
    }

    fn model() -> MlpClassifier {
        MlpClassifier::new(MlpOptions {
            hidden_size: 8,
            l2_penalty: 0.0,
            seed: 1,
        })
    }

    #[test]
    fn records_all_metrics_per_epoch_and_reports_progress() {
        let (train_x, train_y) = blobs(40, 1.0);
        let (val_x, val_y) = blobs(10, 0.5);
        let data = TrainingData {
            train_x: train_x.view(),
            train_y: train_y.view(),
            val_x: val_x.view(),
            val_y: val_y.view(),
        };
        let trainer = EpochTrainer::new(TrainOptions {
            epochs: 5,
            batch_size: 8,
            learning_rate: 0.3,
            seed: 9,
        });
        let mut reports = Vec::new();
        let mut model = model();
        let history = trainer
            .train(&mut model, &data, &mut |report| reports.push(*report))
            .unwrap();
        for name in [LOSS, VAL_LOSS, ACCURACY, VAL_ACCURACY] {
            assert_eq!(history.metric(name).unwrap().len(), 5);
        }
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[4].epoch, 5);
        assert_eq!(reports[4].epochs, 5);
        assert!(history.metric(VAL_ACCURACY).unwrap()[4] > 0.9);
    }

    #[test]
    fn same_seed_gives_same_history() {
        let (train_x, train_y) = blobs(20, 1.0);
        let data = TrainingData {
            train_x: train_x.view(),
            train_y: train_y.view(),
            val_x: train_x.view(),
            val_y: train_y.view(),
        };
        let trainer = EpochTrainer::default();
        let a = trainer.train(&mut model(), &data, &mut |_| {}).unwrap();
        let b = trainer.train(&mut model(), &data, &mut |_| {}).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let (train_x, train_y) = blobs(6, 1.0);
        let short_y = train_y.slice(ndarray::s![..4]).to_owned();
        let data = TrainingData {
            train_x: train_x.view(),
            train_y: short_y.view(),
            val_x: train_x.view(),
            val_y: train_y.view(),
        };
        let err = EpochTrainer::default()
            .train(&mut model(), &data, &mut |_| {})
            .unwrap_err();
        assert_eq!(
            err,
            TrainError::LabelMismatch {
                set: "training",
                rows: 6,
                labels: 4
            }
        );

        let narrow = ArrayD::<f32>::zeros(IxDyn(&[6, 3]));
        let data = TrainingData {
            train_x: train_x.view(),
            train_y: train_y.view(),
            val_x: narrow.view(),
            val_y: train_y.view(),
        };
        let err = EpochTrainer::default()
            .train(&mut model(), &data, &mut |_| {})
            .unwrap_err();
        assert_eq!(err, TrainError::FeatureMismatch { train: 8, val: 3 });
    }

    #[test]
    fn empty_training_set_is_rejected() {
        let empty = ArrayD::<f32>::zeros(IxDyn(&[0, 2, 2, 2]));
        let labels = Array1::<f32>::zeros(0);
        let data = TrainingData {
            train_x: empty.view(),
            train_y: labels.view(),
            val_x: empty.view(),
            val_y: labels.view(),
        };
        let err = EpochTrainer::default()
            .train(&mut model(), &data, &mut |_| {})
            .unwrap_err();
        assert_eq!(err, TrainError::EmptySet("training"));
    }

    #[test]
    fn epoch_log_line_format() {
        let report = EpochReport {
            epoch: 2,
            epochs: 10,
            loss: 0.5,
            accuracy: 0.75,
            val_loss: 0.6,
            val_accuracy: 0.7,
        };
        assert_eq!(
            report.log_line(),
            "Epoch 2/10 - loss: 0.5000 - accuracy: 0.7500 - val_loss: 0.6000 - val_accuracy: 0.7000"
        );
    }
}

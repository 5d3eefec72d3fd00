//! Model, trainer and metric history used by a training run.
//!
//! The panel only depends on the [`TrainableModel`] and [`Trainer`] seams;
//! the MLP classifier and epoch trainer are the defaults wired up by the
//! binaries.

pub mod history;
pub mod model;
pub mod train;

pub use history::{HistoryError, RunSummary, TrainingHistory};
pub use model::{MlpClassifier, MlpOptions, ModelFactory, TrainableModel, mlp_factory};
pub use train::{EpochReport, EpochTrainer, TrainError, TrainOptions, Trainer, TrainingData};

//! Runner configuration stored as `config.toml` in the app directory.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//! Values are clamped after parsing.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::app_dirs;

/// Default filename used to store the runner configuration.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default training dataset location.
pub const DEFAULT_TRAIN_PATH: &str = "dataset/train.json/data/processed/train.json";
/// Default test dataset location.
pub const DEFAULT_TEST_PATH: &str = "dataset/test.json/data/processed/test.json";
/// Default chart output location, overwritten on every run.
pub const DEFAULT_CHART_PATH: &str = "training_results.png";
/// Default location of the trained weights, overwritten on every run.
pub const DEFAULT_WEIGHTS_PATH: &str = "model_weights.json";

/// Errors raised while locating or parsing the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not resolve config directory: {0}")]
    AppDir(#[from] app_dirs::AppDirError),
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Complete runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub training: TrainingSettings,
}

/// Dataset locations and the train/validation split.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataSettings {
    #[serde(default = "default_train_path")]
    pub train_path: PathBuf,
    #[serde(default = "default_test_path")]
    pub test_path: PathBuf,
    /// Share of the training file held out for validation.
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f32,
    #[serde(default = "default_seed")]
    pub split_seed: u64,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            train_path: default_train_path(),
            test_path: default_test_path(),
            validation_fraction: default_validation_fraction(),
            split_seed: default_seed(),
        }
    }
}

/// Chart and weight outputs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputSettings {
    #[serde(default = "default_chart_path")]
    pub chart_path: PathBuf,
    /// Rendered chart size in pixels.
    #[serde(default = "default_chart_size")]
    pub chart_size: [u32; 2],
    /// Size the chart is scaled to in the panel.
    #[serde(default = "default_display_size")]
    pub display_size: [u32; 2],
    /// Trained weights are written here as JSON when set.
    #[serde(default = "default_weights_path")]
    pub weights_path: Option<PathBuf>,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            chart_path: default_chart_path(),
            chart_size: default_chart_size(),
            display_size: default_display_size(),
            weights_path: default_weights_path(),
        }
    }
}

/// Hyperparameters for the built-in trainer and model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainingSettings {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_l2_penalty")]
    pub l2_penalty: f32,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            l2_penalty: default_l2_penalty(),
            hidden_size: default_hidden_size(),
            seed: default_seed(),
        }
    }
}

impl RunnerConfig {
    /// Clamp values into ranges the loader and trainer accept.
    pub fn normalized(mut self) -> Self {
        self.data.validation_fraction = self.data.validation_fraction.clamp(0.05, 0.5);
        self.output.chart_size = clamp_size(self.output.chart_size, 200, 4096);
        self.output.display_size = clamp_size(self.output.display_size, 64, 4096);
        self.training.epochs = self.training.epochs.clamp(1, 10_000);
        self.training.batch_size = self.training.batch_size.max(1);
        if !self.training.learning_rate.is_finite() || self.training.learning_rate <= 0.0 {
            self.training.learning_rate = default_learning_rate();
        }
        if !self.training.l2_penalty.is_finite() {
            self.training.l2_penalty = default_l2_penalty();
        }
        self.training.l2_penalty = self.training.l2_penalty.max(0.0);
        self.training.hidden_size = self.training.hidden_size.clamp(1, 4096);
        self
    }
}

/// Resolve the configuration file path inside the app root.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME))
}

/// Load configuration from the app root, returning defaults if missing.
pub fn load_or_default() -> Result<RunnerConfig, ConfigError> {
    load_from(&config_path()?)
}

/// Load configuration from a specific file; a missing file yields defaults.
pub fn load_from(path: &Path) -> Result<RunnerConfig, ConfigError> {
    if !path.exists() {
        return Ok(RunnerConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str::<RunnerConfig>(&text)
        .map(RunnerConfig::normalized)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
}

fn clamp_size(size: [u32; 2], min: u32, max: u32) -> [u32; 2] {
    [size[0].clamp(min, max), size[1].clamp(min, max)]
}

fn default_train_path() -> PathBuf {
    PathBuf::from(DEFAULT_TRAIN_PATH)
}

fn default_test_path() -> PathBuf {
    PathBuf::from(DEFAULT_TEST_PATH)
}

fn default_chart_path() -> PathBuf {
    PathBuf::from(DEFAULT_CHART_PATH)
}

fn default_weights_path() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_WEIGHTS_PATH))
}

fn default_validation_fraction() -> f32 {
    0.2
}

fn default_chart_size() -> [u32; 2] {
    [1200, 600]
}

fn default_display_size() -> [u32; 2] {
    [600, 300]
}

fn default_epochs() -> usize {
    20
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f32 {
    0.01
}

fn default_l2_penalty() -> f32 {
    1e-4
}

fn default_hidden_size() -> usize {
    64
}

fn default_seed() -> u64 {
    42
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let cfg = load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, RunnerConfig::default());
        assert_eq!(cfg.data.train_path, PathBuf::from(DEFAULT_TRAIN_PATH));
        assert_eq!(cfg.data.test_path, PathBuf::from(DEFAULT_TEST_PATH));
        assert_eq!(cfg.output.chart_path, PathBuf::from(DEFAULT_CHART_PATH));
        assert_eq!(cfg.output.display_size, [600, 300]);
        assert_eq!(
            cfg.output.weights_path,
            Some(PathBuf::from(DEFAULT_WEIGHTS_PATH))
        );
    }

    #[test]
    fn partial_file_keeps_defaults_and_clamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[data]\nvalidation_fraction = 0.9\n\n[training]\nepochs = 0\nlearning_rate = -1.0\n",
        )
        .unwrap();
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.data.validation_fraction, 0.5);
        assert_eq!(cfg.data.train_path, PathBuf::from(DEFAULT_TRAIN_PATH));
        assert_eq!(cfg.training.epochs, 1);
        assert_eq!(cfg.training.learning_rate, 0.01);
        assert_eq!(cfg.training.batch_size, 32);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[data\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn full_file_overrides_every_section() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[data]\ntrain_path = \"a.json\"\ntest_path = \"b.json\"\nsplit_seed = 7\n\n\
             [output]\nchart_path = \"out/c.png\"\nweights_path = \"out/w.json\"\n\
             chart_size = [800, 400]\n\n[training]\nhidden_size = 16\nbatch_size = 4\n",
        )
        .unwrap();
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.data.train_path, PathBuf::from("a.json"));
        assert_eq!(cfg.data.split_seed, 7);
        assert_eq!(cfg.output.chart_path, PathBuf::from("out/c.png"));
        assert_eq!(cfg.output.weights_path, Some(PathBuf::from("out/w.json")));
        assert_eq!(cfg.output.chart_size, [800, 400]);
        assert_eq!(cfg.training.hidden_size, 16);
        assert_eq!(cfg.training.batch_size, 4);
    }

    #[test]
    fn load_or_default_uses_app_root() {
        let _lock = app_dirs::OVERRIDE_LOCK
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let base = tempdir().unwrap();
        let _guard = app_dirs::OverrideGuard::set(base.path().to_path_buf());
        let path = config_path().unwrap();
        assert_eq!(
            path,
            base.path().join(app_dirs::APP_DIR_NAME).join(CONFIG_FILE_NAME)
        );
        std::fs::write(&path, "[training]\nepochs = 3\n").unwrap();
        assert_eq!(load_or_default().unwrap().training.epochs, 3);
    }
}

//! Dataset loading for training runs.
//!
//! The bundled loader reads the two-band radar exports: a JSON array of
//! records, each carrying one or two flattened square bands and, in the
//! training file, an `is_iceberg` label.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::{Array1, ArrayD, IxDyn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path} contains no samples")]
    Empty { path: PathBuf },
    #[error("need at least 2 labeled samples to split train/validation, got {0}")]
    TooFewSamples(usize),
    #[error("record {index} in {path}: band length {len} is not a square image")]
    NotSquare {
        path: PathBuf,
        index: usize,
        len: usize,
    },
    #[error("record {index} in {path}: band length {len} differs from expected {expected}")]
    BandLength {
        path: PathBuf,
        index: usize,
        len: usize,
        expected: usize,
    },
    #[error("record {index} in {path}: band_2 presence differs from the first record")]
    InconsistentBands { path: PathBuf, index: usize },
    #[error("record {index} in {path}: missing is_iceberg label")]
    MissingLabel { path: PathBuf, index: usize },
    #[error("record {index} in {path}: is_iceberg must be 0 or 1, got {value}")]
    InvalidLabel {
        path: PathBuf,
        index: usize,
        value: u8,
    },
    #[error("failed to shape features: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Arrays produced by a loader for one run.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub train_x: ArrayD<f32>,
    pub train_y: Array1<f32>,
    pub val_x: ArrayD<f32>,
    pub val_y: Array1<f32>,
    /// Unlabeled test features; loaded for completeness, unused by a run.
    pub test_x: ArrayD<f32>,
}

/// Source of training, validation and test arrays.
pub trait DataLoader: Send + Sync {
    fn load(&self, train_path: &Path, test_path: &Path) -> Result<LoadedData, DataError>;
}

/// Loader for `band_1` / `band_2` / `is_iceberg` JSON exports.
#[derive(Debug, Clone)]
pub struct JsonBandLoader {
    /// Share of the training file held out for validation.
    pub validation_fraction: f32,
    pub seed: u64,
}

impl Default for JsonBandLoader {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BandRecord {
    band_1: Vec<f32>,
    #[serde(default)]
    band_2: Option<Vec<f32>>,
    #[serde(default)]
    is_iceberg: Option<u8>,
}

/// Stacked features for one file plus optional labels.
struct BandSet {
    features: Vec<f32>,
    shape: Vec<usize>,
    labels: Vec<Option<f32>>,
}

impl DataLoader for JsonBandLoader {
    fn load(&self, train_path: &Path, test_path: &Path) -> Result<LoadedData, DataError> {
        let train = stack_records(train_path, read_records(train_path)?)?;
        let labels = train
            .labels
            .iter()
            .enumerate()
            .map(|(index, label)| {
                label.ok_or_else(|| DataError::MissingLabel {
                    path: train_path.to_path_buf(),
                    index,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let (train_idx, val_idx) =
            split_indices(labels.len(), self.validation_fraction, self.seed)?;
        let row_len: usize = train.shape[1..].iter().product();
        let train_x = gather_rows(&train, &train_idx, row_len)?;
        let val_x = gather_rows(&train, &val_idx, row_len)?;
        let train_y = train_idx.iter().map(|&i| labels[i]).collect::<Array1<f32>>();
        let val_y = val_idx.iter().map(|&i| labels[i]).collect::<Array1<f32>>();

        let test = stack_records(test_path, read_records(test_path)?)?;
        let test_x = ArrayD::from_shape_vec(IxDyn(&test.shape), test.features)?;
        tracing::debug!(
            train = train_idx.len(),
            val = val_idx.len(),
            test = test.shape[0],
            "Loaded band dataset"
        );
        Ok(LoadedData {
            train_x,
            train_y,
            val_x,
            val_y,
            test_x,
        })
    }
}

fn read_records(path: &Path) -> Result<Vec<BandRecord>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records: Vec<BandRecord> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| DataError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    if records.is_empty() {
        return Err(DataError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(records)
}

fn stack_records(path: &Path, records: Vec<BandRecord>) -> Result<BandSet, DataError> {
    let first_len = records[0].band_1.len();
    let side = square_side(first_len).ok_or_else(|| DataError::NotSquare {
        path: path.to_path_buf(),
        index: 0,
        len: first_len,
    })?;
    let two_bands = records[0].band_2.is_some();
    let channels = if two_bands { 2 } else { 1 };
    let mut features = Vec::with_capacity(records.len() * first_len * channels);
    let mut labels = Vec::with_capacity(records.len());
    let check_len = |index: usize, len: usize| {
        if len == first_len {
            Ok(())
        } else {
            Err(DataError::BandLength {
                path: path.to_path_buf(),
                index,
                len,
                expected: first_len,
            })
        }
    };

    for (index, record) in records.iter().enumerate() {
        check_len(index, record.band_1.len())?;
        match (&record.band_2, two_bands) {
            (Some(band_2), true) => {
                check_len(index, band_2.len())?;
                for (a, b) in record.band_1.iter().zip(band_2) {
                    features.push(*a);
                    features.push(*b);
                }
            }
            (None, false) => features.extend_from_slice(&record.band_1),
            _ => {
                return Err(DataError::InconsistentBands {
                    path: path.to_path_buf(),
                    index,
                });
            }
        }
        let label = match record.is_iceberg {
            None => None,
            Some(value @ (0 | 1)) => Some(f32::from(value)),
            Some(value) => {
                return Err(DataError::InvalidLabel {
                    path: path.to_path_buf(),
                    index,
                    value,
                });
            }
        };
        labels.push(label);
    }

    let mut shape = vec![records.len(), side, side];
    if two_bands {
        shape.push(2);
    }
    Ok(BandSet {
        features,
        shape,
        labels,
    })
}

fn square_side(len: usize) -> Option<usize> {
    let side = (len as f64).sqrt().round() as usize;
    (side > 0 && side * side == len).then_some(side)
}

fn split_indices(
    n: usize,
    validation_fraction: f32,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), DataError> {
    if n < 2 {
        return Err(DataError::TooFewSamples(n));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    let n_val = ((n as f32) * validation_fraction.clamp(0.0, 1.0)).round() as usize;
    let n_val = n_val.clamp(1, n - 1);
    let val = indices.split_off(n - n_val);
    Ok((indices, val))
}

fn gather_rows(set: &BandSet, rows: &[usize], row_len: usize) -> Result<ArrayD<f32>, DataError> {
    let mut data = Vec::with_capacity(rows.len() * row_len);
    for &row in rows {
        data.extend_from_slice(&set.features[row * row_len..(row + 1) * row_len]);
    }
    let mut shape = set.shape.clone();
    shape[0] = rows.len();
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
}

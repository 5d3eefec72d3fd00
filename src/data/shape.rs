//! Canonical feature layout: every feature tensor ends in a 2-channel axis.

use ndarray::{ArrayD, Axis};
use thiserror::Error;

/// Number of channels in the trailing axis after normalization.
pub const TARGET_CHANNELS: usize = 2;

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("cannot normalize a 0-dimensional array")]
    Scalar,
    #[error("failed to repeat channel axis: {0}")]
    Repeat(#[from] ndarray::ShapeError),
}

/// Normalize a feature array to a trailing [`TARGET_CHANNELS`]-channel axis.
///
/// `(N, H, W)` gains a singleton channel axis first; a trailing axis of
/// size 1 is then repeated. Any other shape is returned unchanged.
pub fn ensure_channels<A: Clone>(data: ArrayD<A>) -> Result<ArrayD<A>, ShapeError> {
    let data = if data.ndim() == 3 {
        data.insert_axis(Axis(3))
    } else {
        data
    };
    let last = data.ndim().checked_sub(1).ok_or(ShapeError::Scalar)?;
    if data.shape()[last] != 1 {
        return Ok(data);
    }
    let copies = vec![data.view(); TARGET_CHANNELS];
    Ok(ndarray::concatenate(Axis(last), &copies)?)
}

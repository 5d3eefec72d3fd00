//! Dataset loading and feature layout.

pub mod loader;
pub mod shape;

pub use loader::{DataError, DataLoader, JsonBandLoader, LoadedData};
pub use shape::{ShapeError, TARGET_CHANNELS, ensure_channels};

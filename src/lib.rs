//! Library exports for the model runner binaries, benchmarks and tests.
/// eframe application shell.
pub mod app;
/// Application directory resolution.
pub mod app_dirs;
/// Training chart rendering.
pub mod chart;
/// Persistent runner configuration.
pub mod config;
/// Dataset loading and input shape normalization.
pub mod data;
/// Logging setup.
pub mod logging;
/// Models, training loop and history.
pub mod ml;
/// Training panel UI and background worker.
pub mod panel;

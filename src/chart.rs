//! Accuracy/loss chart rendering and loading for display.
//!
//! Charts are drawn with plotters into a PNG. Text uses the proportional
//! font bundled with egui so rendering has no system font dependency.

use std::borrow::Cow;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};
use thiserror::Error;

use crate::ml::history::{ACCURACY, HistoryError, LOSS, TrainingHistory, VAL_ACCURACY, VAL_LOSS};

/// Font family name the chart text is registered under.
const CHART_FONT: &str = "sans-serif";

const TRAIN_COLOR: RGBColor = RGBColor(31, 119, 180);
const VAL_COLOR: RGBColor = RGBColor(255, 127, 14);

static FONT_READY: OnceLock<Result<(), String>> = OnceLock::new();

#[derive(Debug, Error)]
pub enum ChartError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("chart font unavailable: {0}")]
    Font(String),
    #[error("failed to create chart directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to draw chart: {0}")]
    Draw(String),
    #[error("failed to read chart image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// One panel of the chart: two curves sharing an epoch axis.
struct Panel<'a> {
    title: &'static str,
    y_desc: &'static str,
    curves: [(&'static str, &'a [f64], RGBColor); 2],
}

/// Render the two-panel training chart to `path`, overwriting any prior file.
///
/// The left panel plots train/validation accuracy, the right panel
/// train/validation loss, both against the epoch index.
pub fn render_training_chart(
    history: &TrainingHistory,
    path: &Path,
    size: (u32, u32),
) -> Result<(), ChartError> {
    let accuracy = Panel {
        title: "Model Accuracy",
        y_desc: "Accuracy",
        curves: [
            ("Train Accuracy", history.metric(ACCURACY)?, TRAIN_COLOR),
            ("Validation Accuracy", history.metric(VAL_ACCURACY)?, VAL_COLOR),
        ],
    };
    let loss = Panel {
        title: "Model Loss",
        y_desc: "Loss",
        curves: [
            ("Train Loss", history.metric(LOSS)?, TRAIN_COLOR),
            ("Validation Loss", history.metric(VAL_LOSS)?, VAL_COLOR),
        ],
    };
    ensure_font()?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| ChartError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(draw_error)?;
    let (left, right) = root.split_horizontally((size.0 / 2) as i32);
    draw_panel(&left, &accuracy).map_err(draw_error)?;
    draw_panel(&right, &loss).map_err(draw_error)?;
    root.present().map_err(draw_error)?;
    tracing::debug!("Chart written to {}", path.display());
    Ok(())
}

/// Decode a chart image and scale it to `size` for display.
pub fn load_chart_image(path: &Path, size: [u32; 2]) -> Result<egui::ColorImage, ChartError> {
    let image = image::open(path).map_err(|source| ChartError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let scaled = image
        .resize_exact(size[0], size[1], image::imageops::FilterType::Triangle)
        .to_rgba8();
    Ok(egui::ColorImage::from_rgba_unmultiplied(
        [size[0] as usize, size[1] as usize],
        scaled.as_raw(),
    ))
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel<'_>,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let epochs = panel
        .curves
        .iter()
        .map(|(_, values, _)| values.len())
        .max()
        .unwrap_or(0);
    let x_range = 0.0..(epochs.saturating_sub(1).max(1)) as f64;
    let y_range = value_bounds(panel.curves.iter().flat_map(|(_, values, _)| values.iter()));

    let mut chart = ChartBuilder::on(area)
        .caption(panel.title, (CHART_FONT, 22))
        .margin(12)
        .x_label_area_size(40)
        .y_label_area_size(56)
        .build_cartesian_2d(x_range, y_range)?;
    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc(panel.y_desc)
        .label_style((CHART_FONT, 14))
        .draw()?;

    for (label, values, color) in &panel.curves {
        let color = *color;
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, v)| (i as f64, *v)),
                color.stroke_width(2),
            ))?
            .label(*label)
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
    }
    chart
        .configure_series_labels()
        .label_font((CHART_FONT, 14))
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    Ok(())
}

/// Padded `[min, max]` of all finite values; a flat series gets a fixed margin.
fn value_bounds<'a>(values: impl Iterator<Item = &'a f64>) -> Range<f64> {
    let (min, max) = values
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if min > max {
        return 0.0..1.0;
    }
    let pad = ((max - min) * 0.05).max(0.05);
    (min - pad)..(max + pad)
}

fn draw_error<E: std::error::Error + Send + Sync>(err: DrawingAreaErrorKind<E>) -> ChartError {
    ChartError::Draw(err.to_string())
}

fn ensure_font() -> Result<(), ChartError> {
    FONT_READY
        .get_or_init(|| {
            let bytes = bundled_font_bytes().ok_or("egui ships no proportional font")?;
            register_font(CHART_FONT, FontStyle::Normal, bytes)
                .map_err(|_| "bundled font could not be parsed".to_string())
        })
        .clone()
        .map_err(ChartError::Font)
}

fn bundled_font_bytes() -> Option<&'static [u8]> {
    let mut fonts = egui::FontDefinitions::default();
    let name = fonts
        .families
        .get(&egui::FontFamily::Proportional)?
        .first()?
        .clone();
    let data = fonts.font_data.remove(&name)?;
    match &data.font {
        Cow::Borrowed(bytes) => Some(*bytes),
        Cow::Owned(bytes) => Some(Box::leak(bytes.clone().into_boxed_slice())),
    }
}

#![deny(missing_docs)]

//! Entry point for the egui model runner window.
use eframe::egui;
use model_runner::app::{MIN_VIEWPORT_SIZE, ModelRunnerApp};
use model_runner::config::{self, RunnerConfig};
use model_runner::logging;
use model_runner::ml::mlp_factory;
use model_runner::panel::TrainingPanel;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let (config, startup_error) = match config::load_or_default() {
        Ok(config) => (config, None),
        Err(err) => {
            tracing::warn!("Falling back to default configuration: {err}");
            (RunnerConfig::default(), Some(err.to_string()))
        }
    };
    tracing::info!(
        train = %config.data.train_path.display(),
        test = %config.data.test_path.display(),
        chart = %config.output.chart_path.display(),
        "Starting model runner"
    );

    let viewport = egui::ViewportBuilder::default()
        .with_min_inner_size(MIN_VIEWPORT_SIZE)
        .with_inner_size(MIN_VIEWPORT_SIZE);
    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    let factory = mlp_factory(&config.training);
    let mut panel = TrainingPanel::new(factory).with_config(config);
    if let Some(message) = startup_error {
        panel.log(format!("Using default configuration: {message}"));
    }

    eframe::run_native(
        "Model Runner",
        native_options,
        Box::new(move |cc| {
            panel.attach_repaint(cc.egui_ctx.clone());
            Ok(Box::new(ModelRunnerApp::new(panel)))
        }),
    )?;
    Ok(())
}

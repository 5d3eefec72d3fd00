//! Run one training job without a window, printing the progress log.
//!
//! Usage: `model-runner-headless [--config <path>]`. Without `--config` the
//! configuration in the app root is used.

use std::path::PathBuf;
use std::sync::Arc;

use model_runner::config::{self, RunnerConfig};
use model_runner::data::JsonBandLoader;
use model_runner::logging::{self, LogSinks};
use model_runner::ml::{EpochTrainer, TrainOptions, mlp_factory};
use model_runner::panel::timer::{RunToken, format_elapsed};
use model_runner::panel::worker::{RunEvent, RunJob, RunPaths, execute_run};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    if let Err(err) = logging::init_with(LogSinks::StdoutOnly) {
        eprintln!("Logging disabled: {err}");
    }
    let config = load_config(parse_args(std::env::args().skip(1).collect())?)?;
    let job = RunJob {
        token: RunToken(1),
        loader: Arc::new(JsonBandLoader {
            validation_fraction: config.data.validation_fraction,
            seed: config.data.split_seed,
        }),
        trainer: Arc::new(EpochTrainer::new(TrainOptions::from(&config.training))),
        factory: mlp_factory(&config.training),
        paths: RunPaths {
            train: config.data.train_path.clone(),
            test: config.data.test_path.clone(),
            chart: config.output.chart_path.clone(),
            weights: config.output.weights_path.clone(),
        },
        chart_size: (config.output.chart_size[0], config.output.chart_size[1]),
        display_size: config.output.display_size,
    };

    let started = std::time::Instant::now();
    let result = execute_run(&job, &mut |event| {
        if let RunEvent::Log(line) = event {
            println!("{line}");
        }
    });
    let elapsed = format_elapsed(started.elapsed().as_secs());
    match result {
        Ok(outcome) => {
            println!(
                "Trained {} epochs; average validation accuracy {:.4}",
                outcome.epochs, outcome.summary.val_accuracy
            );
            println!("Time Elapsed: {elapsed}");
            println!("Chart saved to {}", outcome.chart_path.display());
            Ok(())
        }
        Err(err) => Err(format!("Error during training: {err}")),
    }
}

fn parse_args(args: Vec<String>) -> Result<Option<PathBuf>, String> {
    let mut config_path = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().ok_or("--config requires a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "-h" | "--help" => {
                return Err("Usage: model-runner-headless [--config <path>]".to_string());
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }
    Ok(config_path)
}

fn load_config(path: Option<PathBuf>) -> Result<RunnerConfig, String> {
    match path {
        Some(path) => config::load_from(&path).map_err(|err| err.to_string()),
        None => config::load_or_default().map_err(|err| err.to_string()),
    }
}

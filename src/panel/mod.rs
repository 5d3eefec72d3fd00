//! The training panel: trigger button, progress log, elapsed-time label and
//! result chart.
//!
//! All panel state is owned and mutated on the UI thread. A run hands its
//! work to [`worker::spawn_run`] and learns about progress only through the
//! message channel drained by [`TrainingPanel::poll`].

pub mod timer;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Instant;

use egui::{Align, Color32, RichText, TextureHandle, TextureOptions};

use crate::config::RunnerConfig;
use crate::data::{DataLoader, JsonBandLoader};
use crate::ml::{EpochTrainer, ModelFactory, TrainOptions, Trainer};
use timer::{ElapsedTimer, RunToken};
use worker::{RunError, RunEvent, RunJob, RunMessage, RunOutcome, RunPaths};

/// Text of the trigger button.
pub const RUN_BUTTON_LABEL: &str = "Run Model";
/// First log line of a fresh panel.
pub const READY_MESSAGE: &str = "Ready to run model...";
const LOG_HEIGHT: f32 = 220.0;

/// Lines shown in the log view.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    lines: Vec<String>,
    scroll_to_end: bool,
}

impl RunLog {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
        self.scroll_to_end = true;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll_to_end = true;
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_to_end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running { token: RunToken, started: Instant },
}

struct ChartDisplay {
    image: egui::ColorImage,
    texture: Option<TextureHandle>,
}

/// Panel that runs one training job at a time and shows its progress.
pub struct TrainingPanel {
    factory: ModelFactory,
    loader: Arc<dyn DataLoader>,
    trainer: Arc<dyn Trainer>,
    config: RunnerConfig,
    state: RunState,
    next_token: u64,
    timer: ElapsedTimer,
    log: RunLog,
    trigger_enabled: bool,
    chart: Option<ChartDisplay>,
    plot_path: Option<PathBuf>,
    tx: Sender<RunMessage>,
    rx: Receiver<RunMessage>,
    worker: Option<JoinHandle<()>>,
    repaint: Option<egui::Context>,
}

impl TrainingPanel {
    /// Panel with default configuration, JSON band loader and epoch trainer.
    pub fn new(factory: ModelFactory) -> Self {
        let (tx, rx) = mpsc::channel();
        let mut log = RunLog::default();
        log.push(READY_MESSAGE);
        let mut panel = Self {
            factory,
            loader: Arc::new(JsonBandLoader::default()),
            trainer: Arc::new(EpochTrainer::default()),
            config: RunnerConfig::default(),
            state: RunState::Idle,
            next_token: 0,
            timer: ElapsedTimer::default(),
            log,
            trigger_enabled: true,
            chart: None,
            plot_path: None,
            tx,
            rx,
            worker: None,
            repaint: None,
        };
        panel.apply_config(RunnerConfig::default());
        panel
    }

    /// Use `config` for paths, sizes and the default loader/trainer settings.
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.apply_config(config);
        self
    }

    /// Replace the data loader. Call after [`Self::with_config`].
    pub fn with_loader(mut self, loader: Arc<dyn DataLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the training routine. Call after [`Self::with_config`].
    pub fn with_trainer(mut self, trainer: Arc<dyn Trainer>) -> Self {
        self.trainer = trainer;
        self
    }

    /// Context the worker pokes so finished work is drawn promptly.
    pub fn attach_repaint(&mut self, ctx: egui::Context) {
        self.repaint = Some(ctx);
    }

    fn apply_config(&mut self, config: RunnerConfig) {
        self.loader = Arc::new(JsonBandLoader {
            validation_fraction: config.data.validation_fraction,
            seed: config.data.split_seed,
        });
        self.trainer = Arc::new(EpochTrainer::new(TrainOptions::from(&config.training)));
        self.config = config;
    }

    /// Start a run: reset state, clear the log, disable the trigger, arm the
    /// timer and launch the worker. Ignored while a run is active.
    pub fn run(&mut self) {
        if let RunState::Running { token, .. } = self.state {
            tracing::debug!(%token, "Run requested while one is active; ignoring");
            return;
        }
        self.next_token += 1;
        let token = RunToken(self.next_token);
        let started = Instant::now();
        self.state = RunState::Running { token, started };
        self.log.clear();
        self.trigger_enabled = false;
        self.timer.start(token, started);
        tracing::info!(%token, "Training run requested");

        match worker::spawn_run(self.job(token), self.tx.clone(), self.repaint.clone()) {
            Ok(handle) => self.worker = Some(handle),
            Err(err) => self.fail(token, err),
        }
    }

    fn job(&self, token: RunToken) -> RunJob {
        let output = &self.config.output;
        RunJob {
            token,
            loader: Arc::clone(&self.loader),
            trainer: Arc::clone(&self.trainer),
            factory: Arc::clone(&self.factory),
            paths: RunPaths {
                train: self.config.data.train_path.clone(),
                test: self.config.data.test_path.clone(),
                chart: output.chart_path.clone(),
                weights: output.weights_path.clone(),
            },
            chart_size: (output.chart_size[0], output.chart_size[1]),
            display_size: output.display_size,
        }
    }

    /// Append a line to the log view and scroll to it.
    pub fn log(&mut self, message: impl Into<String>) {
        self.log.push(message);
    }

    /// Apply pending worker messages and advance the timer to `now`.
    /// Returns `true` if anything visible changed.
    pub fn poll_at(&mut self, now: Instant) -> bool {
        let mut changed = self.drain_messages();
        if let RunState::Running { token, .. } = self.state
            && self.worker.as_ref().is_some_and(JoinHandle::is_finished)
        {
            // The worker may have sent `Finished` right before exiting.
            changed |= self.drain_messages();
            if self.state != RunState::Idle {
                self.fail(token, RunError::Disconnected);
                changed = true;
            }
        }
        changed | self.timer.tick(now)
    }

    pub fn poll(&mut self) -> bool {
        self.poll_at(Instant::now())
    }

    fn drain_messages(&mut self) -> bool {
        let mut changed = false;
        while let Ok(message) = self.rx.try_recv() {
            changed |= self.handle_message(message);
        }
        changed
    }

    fn handle_message(&mut self, message: RunMessage) -> bool {
        let RunState::Running { token, .. } = self.state else {
            tracing::debug!(token = %message.token, "Dropping message for inactive run");
            return false;
        };
        if message.token != token {
            tracing::debug!(token = %message.token, "Dropping message for stale run");
            return false;
        }
        match message.event {
            RunEvent::Log(line) => self.log(line),
            RunEvent::TrainingEnded => {
                self.timer.stop(token);
            }
            RunEvent::Finished(Ok(outcome)) => self.complete(token, outcome),
            RunEvent::Finished(Err(err)) => self.fail(token, err),
        }
        true
    }

    fn complete(&mut self, token: RunToken, outcome: RunOutcome) {
        tracing::info!(
            %token,
            epochs = outcome.epochs,
            val_loss = outcome.summary.val_loss,
            val_accuracy = outcome.summary.val_accuracy,
            chart = %outcome.chart_path.display(),
            "Training run complete"
        );
        self.finish_run(token);
        self.plot_path = Some(outcome.chart_path);
        self.chart = Some(ChartDisplay {
            image: outcome.chart_image,
            texture: None,
        });
    }

    fn fail(&mut self, token: RunToken, err: RunError) {
        tracing::error!(%token, "Training run failed: {err}");
        self.log(format!("Error during training: {err}"));
        self.finish_run(token);
    }

    fn finish_run(&mut self, token: RunToken) {
        self.timer.stop(token);
        self.state = RunState::Idle;
        self.trigger_enabled = true;
        if let Some(handle) = self.worker.take()
            && handle.is_finished()
        {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running { .. })
    }

    pub fn trigger_enabled(&self) -> bool {
        self.trigger_enabled
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn log_lines(&self) -> &[String] {
        self.log.lines()
    }

    /// Current `Time Elapsed: MM:SS` label text.
    pub fn elapsed_label(&self) -> String {
        self.timer.label()
    }

    /// Start instant of the active run.
    pub fn started_at(&self) -> Option<Instant> {
        match self.state {
            RunState::Running { started, .. } => Some(started),
            RunState::Idle => None,
        }
    }

    /// Image currently shown in the chart pane.
    pub fn chart_image(&self) -> Option<&egui::ColorImage> {
        self.chart.as_ref().map(|chart| &chart.image)
    }

    /// Path of the last chart produced by a successful run.
    pub fn plot_path(&self) -> Option<&Path> {
        self.plot_path.as_deref()
    }

    /// Draw the panel, applying pending worker messages first.
    pub fn show(&mut self, ui: &mut egui::Ui) {
        if self.repaint.is_none() {
            self.repaint = Some(ui.ctx().clone());
        }
        let now = Instant::now();
        self.poll_at(now);
        if let Some(wait) = self.timer.until_next_tick(now) {
            ui.ctx().request_repaint_after(wait);
        }

        ui.vertical_centered(|ui| {
            ui.add_space(20.0);
            let button = egui::Button::new(RichText::new(RUN_BUTTON_LABEL).size(16.0));
            if ui.add_enabled(self.trigger_enabled, button).clicked() {
                self.run();
            }
            ui.add_space(20.0);
        });

        egui::Frame::group(ui.style()).show(ui, |ui| {
            self.render_log(ui);
            ui.add_space(10.0);
            ui.vertical_centered(|ui| {
                ui.label(RichText::new(self.timer.label()).size(14.0));
                ui.add_space(10.0);
                self.render_chart(ui);
            });
        });
    }

    fn render_log(&mut self, ui: &mut egui::Ui) {
        let scroll = self.log.take_scroll_request();
        egui::ScrollArea::vertical()
            .max_height(LOG_HEIGHT)
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in self.log.lines() {
                    ui.label(RichText::new(line).monospace().color(Color32::LIGHT_GRAY));
                }
                if scroll {
                    ui.scroll_to_cursor(Some(Align::BOTTOM));
                }
            });
    }

    fn render_chart(&mut self, ui: &mut egui::Ui) {
        let Some(chart) = self.chart.as_mut() else {
            return;
        };
        let texture = chart.texture.get_or_insert_with(|| {
            ui.ctx()
                .load_texture("training_chart", chart.image.clone(), TextureOptions::LINEAR)
        });
        let [w, h] = self.config.output.display_size;
        let sized = egui::load::SizedTexture::new(texture.id(), egui::vec2(w as f32, h as f32));
        ui.add(egui::Image::from_texture(sized));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataError, LoadedData};
    use crate::ml::history::{ACCURACY, LOSS, TrainingHistory, VAL_ACCURACY, VAL_LOSS};
    use crate::ml::{EpochReport, TrainError, TrainableModel, TrainingData, mlp_factory};
    use ndarray::{Array1, ArrayD, IxDyn};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    struct TinyLoader;

    impl DataLoader for TinyLoader {
        fn load(&self, _train: &Path, _test: &Path) -> Result<LoadedData, DataError> {
            Ok(LoadedData {
                train_x: ArrayD::zeros(IxDyn(&[4, 2, 2])),
                train_y: Array1::from(vec![0.0, 1.0, 0.0, 1.0]),
                val_x: ArrayD::zeros(IxDyn(&[2, 2, 2])),
                val_y: Array1::from(vec![0.0, 1.0]),
                test_x: ArrayD::zeros(IxDyn(&[1, 2, 2])),
            })
        }
    }

    /// Trainer that blocks until the test releases it, then returns a
    /// fixed history or an error.
    struct GatedTrainer {
        gate: Mutex<Receiver<()>>,
        fail: bool,
    }

    impl Trainer for GatedTrainer {
        fn train(
            &self,
            _model: &mut dyn TrainableModel,
            _data: &TrainingData<'_>,
            _on_epoch: &mut dyn FnMut(&EpochReport),
        ) -> Result<TrainingHistory, TrainError> {
            let _ = self.gate.lock().unwrap().recv();
            if self.fail {
                return Err(TrainError::EmptySet("training"));
            }
            let mut history = TrainingHistory::new();
            history.insert(LOSS, vec![0.5, 0.3]);
            history.insert(VAL_LOSS, vec![0.6, 0.4]);
            history.insert(ACCURACY, vec![0.7, 0.9]);
            history.insert(VAL_ACCURACY, vec![0.6, 0.8]);
            Ok(history)
        }
    }

    fn panel(fail: bool) -> (TrainingPanel, Sender<()>, TempDir) {
        panel_with_chart(fail, |dir| dir.join("training_results.png"))
    }

    fn panel_with_chart(
        fail: bool,
        chart_path: impl FnOnce(&Path) -> PathBuf,
    ) -> (TrainingPanel, Sender<()>, TempDir) {
        let dir = tempdir().unwrap();
        let mut config = RunnerConfig::default();
        config.output.chart_path = chart_path(dir.path());
        config.output.weights_path = Some(dir.path().join("weights.json"));
        config.output.chart_size = [400, 200];
        config.output.display_size = [200, 100];
        let (gate_tx, gate_rx) = mpsc::channel();
        let panel = TrainingPanel::new(mlp_factory(&config.training))
            .with_config(config)
            .with_loader(Arc::new(TinyLoader))
            .with_trainer(Arc::new(GatedTrainer {
                gate: Mutex::new(gate_rx),
                fail,
            }));
        (panel, gate_tx, dir)
    }

    fn wait_until_idle(panel: &mut TrainingPanel) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while panel.is_running() {
            assert!(Instant::now() < deadline, "run did not finish in time");
            panel.poll();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn fresh_panel_is_ready() {
        let (panel, _gate, _dir) = panel(false);
        assert_eq!(panel.log_lines(), &[READY_MESSAGE.to_string()]);
        assert_eq!(panel.elapsed_label(), "Time Elapsed: 00:00");
        assert!(panel.trigger_enabled());
        assert!(panel.chart_image().is_none());
    }

    #[test]
    fn run_disables_trigger_and_starts_timer_at_zero() {
        let (mut panel, gate, _dir) = panel(false);
        panel.run();
        assert!(panel.is_running());
        assert!(!panel.trigger_enabled());
        assert!(panel.timer_running());
        assert_eq!(panel.elapsed_label(), "Time Elapsed: 00:00");

        let started = panel.started_at().unwrap();
        panel.poll_at(started + Duration::from_secs(1));
        assert_eq!(panel.elapsed_label(), "Time Elapsed: 00:01");
        panel.poll_at(started + Duration::from_secs(2));
        assert_eq!(panel.elapsed_label(), "Time Elapsed: 00:02");

        gate.send(()).unwrap();
        wait_until_idle(&mut panel);
        assert!(!panel.timer_running());
    }

    #[test]
    fn second_run_request_is_ignored_while_running() {
        let (mut panel, gate, _dir) = panel(false);
        panel.run();
        let started = panel.started_at();
        panel.run();
        assert_eq!(panel.started_at(), started);
        gate.send(()).unwrap();
        wait_until_idle(&mut panel);
    }

    #[test]
    fn successful_run_shows_chart_and_reenables_trigger() {
        let (mut panel, gate, dir) = panel(false);
        panel.run();
        gate.send(()).unwrap();
        wait_until_idle(&mut panel);

        assert!(panel.trigger_enabled());
        let chart_path = dir.path().join("training_results.png");
        assert!(chart_path.is_file());
        assert_eq!(panel.plot_path(), Some(chart_path.as_path()));
        assert_eq!(panel.chart_image().unwrap().size, [200, 100]);
        let lines = panel.log_lines();
        assert_eq!(lines.first().map(String::as_str), Some(worker::LOADING_MESSAGE));
        assert!(lines.contains(&"Avg Training Loss: 0.4000".to_string()));
        assert!(lines.contains(&"Avg Validation Accuracy: 0.7000".to_string()));
        assert!(!lines.iter().any(|line| line.starts_with("Error during training")));
    }

    #[test]
    fn failed_run_logs_error_and_skips_chart() {
        let (mut panel, gate, dir) = panel(true);
        panel.run();
        gate.send(()).unwrap();
        wait_until_idle(&mut panel);

        assert!(panel.trigger_enabled());
        assert!(!panel.timer_running());
        assert!(panel.chart_image().is_none());
        assert!(panel.plot_path().is_none());
        assert!(!dir.path().join("training_results.png").exists());
        assert_eq!(
            panel.log_lines().last().map(String::as_str),
            Some("Error during training: training set is empty")
        );
    }

    /// Chart path whose parent is a regular file, so rendering fails after
    /// training has already ended.
    fn blocked_chart_path(dir: &Path) -> PathBuf {
        let blocker = dir.join("not_a_dir");
        std::fs::write(&blocker, b"file").unwrap();
        blocker.join("training_results.png")
    }

    #[test]
    fn chart_failure_after_training_reenables_trigger_without_chart() {
        let (mut panel, gate, _dir) = panel_with_chart(false, blocked_chart_path);
        panel.run();
        gate.send(()).unwrap();
        wait_until_idle(&mut panel);

        assert!(panel.trigger_enabled());
        assert!(!panel.timer_running());
        assert!(panel.chart_image().is_none());
        assert!(panel.plot_path().is_none());
        let lines = panel.log_lines();
        assert!(lines.contains(&"Avg Validation Accuracy: 0.7000".to_string()));
        let last = lines.last().cloned().unwrap_or_default();
        assert!(
            last.starts_with("Error during training: failed to create chart directory"),
            "{last}"
        );
    }

    #[test]
    fn chart_failure_keeps_previous_chart() {
        let (mut panel, gate, dir) = panel(false);
        panel.run();
        gate.send(()).unwrap();
        wait_until_idle(&mut panel);
        let first_chart = dir.path().join("training_results.png");
        assert_eq!(panel.plot_path(), Some(first_chart.as_path()));

        panel.config.output.chart_path = blocked_chart_path(dir.path());
        panel.run();
        gate.send(()).unwrap();
        wait_until_idle(&mut panel);

        assert!(panel.trigger_enabled());
        assert_eq!(panel.plot_path(), Some(first_chart.as_path()));
        assert_eq!(panel.chart_image().map(|image| image.size), Some([200, 100]));
        assert!(
            panel
                .log_lines()
                .last()
                .is_some_and(|line| line.starts_with("Error during training: "))
        );
    }

    #[test]
    fn timer_stops_after_run_and_keeps_last_value() {
        let (mut panel, gate, _dir) = panel(false);
        panel.run();
        let started = panel.started_at().unwrap();
        panel.poll_at(started + Duration::from_secs(3));
        gate.send(()).unwrap();
        wait_until_idle(&mut panel);
        let frozen = panel.elapsed_label();
        panel.poll_at(started + Duration::from_secs(120));
        assert_eq!(panel.elapsed_label(), frozen);
    }

    #[test]
    fn stale_messages_are_ignored() {
        let (mut panel, gate, _dir) = panel(false);
        panel.run();
        panel
            .tx
            .send(RunMessage {
                token: RunToken(99),
                event: RunEvent::Log("from another run".into()),
            })
            .unwrap();
        panel.poll();
        assert!(!panel.log_lines().iter().any(|l| l == "from another run"));
        gate.send(()).unwrap();
        wait_until_idle(&mut panel);
    }

    #[test]
    fn log_appends_and_requests_scroll() {
        let (mut panel, _gate, _dir) = panel(false);
        panel.log.take_scroll_request();
        panel.log("hello");
        assert_eq!(panel.log_lines().last().map(String::as_str), Some("hello"));
        assert!(panel.log.take_scroll_request());
        assert!(!panel.log.take_scroll_request());
    }
}

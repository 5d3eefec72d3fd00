//! eframe application shell around the training panel.

use crate::panel::TrainingPanel;

/// Minimum window size that fits the log, label and chart without clipping.
pub const MIN_VIEWPORT_SIZE: egui::Vec2 = egui::vec2(680.0, 640.0);

/// Top-level app: one window hosting a [`TrainingPanel`].
pub struct ModelRunnerApp {
    panel: TrainingPanel,
}

impl ModelRunnerApp {
    pub fn new(panel: TrainingPanel) -> Self {
        Self { panel }
    }
}

impl eframe::App for ModelRunnerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false, false])
                .show(ui, |ui| self.panel.show(ui));
        });
    }
}

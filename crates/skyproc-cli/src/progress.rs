use std::sync::Mutex;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use skyproc_core::pipeline::{ExposureId, Outcome, RunReporter, Stage};

/// Drives one progress bar per batch.
pub struct BarReporter {
    bar: Mutex<ProgressBar>,
    style: ProgressStyle,
}

impl BarReporter {
    pub fn new() -> anyhow::Result<Self> {
        let style = ProgressStyle::default_bar()
            .template("{msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> ");
        Ok(Self {
            bar: Mutex::new(ProgressBar::hidden()),
            style,
        })
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bar) = self.bar.lock() {
            f(&*bar);
        }
    }
}

impl RunReporter for BarReporter {
    fn begin_batch(&self, stage: Stage, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(self.style.clone());
        bar.set_message(stage.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = bar;
        }
    }

    fn exposure_finished(&self, _exposure: &ExposureId, _outcome: Outcome) {
        self.with_bar(|bar| bar.inc(1));
    }

    fn exposure_failed(&self, exposure: &ExposureId, cause: &str) {
        let red = Style::new().red();
        self.with_bar(|bar| {
            bar.println(format!("  {} {exposure}: {cause}", red.apply_to("failed")));
            bar.inc(1);
        });
    }

    fn finish_batch(&self, stage: Stage) {
        self.with_bar(|bar| bar.finish_with_message(format!("{stage} done")));
    }
}

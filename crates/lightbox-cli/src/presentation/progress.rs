//! Live progress bars fed by queue events.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use lightbox_upload::{UploadEvent, UploadId};

use super::tables::truncate_string;

const BAR_TEMPLATE: &str = "{msg:40} [{bar:30.cyan/blue}] {pos:>3}%";
const NAME_WIDTH: usize = 38;

struct Row {
    bar: ProgressBar,
    name: String,
}

/// One bar per upload, updated from `UploadEvent`s.
pub struct ProgressBoard {
    multi: MultiProgress,
    rows: HashMap<UploadId, Row>,
    style: ProgressStyle,
}

impl ProgressBoard {
    /// Board drawing to stderr.
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    /// Board that draws nothing, for tests and non-interactive output.
    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        Self {
            multi: MultiProgress::with_draw_target(target),
            rows: HashMap::new(),
            style,
        }
    }

    /// Add a bar for an upload.
    pub fn add(&mut self, id: UploadId, name: &str) {
        let bar = self.multi.add(ProgressBar::new(100));
        bar.set_style(self.style.clone());
        bar.set_message(truncate_string(name, NAME_WIDTH));
        self.rows.insert(
            id,
            Row {
                bar,
                name: name.to_string(),
            },
        );
    }

    /// Current percentage shown for `id`.
    pub fn position(&self, id: &UploadId) -> Option<u64> {
        self.rows.get(id).map(|row| row.bar.position())
    }

    /// Whether the bar for `id` has been finished or abandoned.
    pub fn is_finished(&self, id: &UploadId) -> Option<bool> {
        self.rows.get(id).map(|row| row.bar.is_finished())
    }

    /// Print a line above the bars.
    pub fn println(&self, line: &str) {
        let _ = self.multi.println(line);
    }

    /// Apply one event. Returns `true` once the queue has drained.
    pub fn apply(&self, event: &UploadEvent) -> bool {
        match event {
            UploadEvent::TaskStarted { id, attempt } => {
                if let Some(row) = self.rows.get(id) {
                    row.bar.set_position(0);
                    if *attempt > 0 {
                        row.bar.set_message(format!(
                            "{} (attempt {})",
                            truncate_string(&row.name, NAME_WIDTH - 12),
                            attempt + 1
                        ));
                    }
                }
            }
            UploadEvent::TaskProgress { id, progress } => {
                if let Some(row) = self.rows.get(id) {
                    row.bar.set_position(u64::from(*progress));
                }
            }
            UploadEvent::TaskRetrying { id, error, .. } => {
                if let Some(row) = self.rows.get(id) {
                    self.println(&format!("⚠ {}: {error}, retrying", row.name));
                }
            }
            UploadEvent::TaskCompleted { id, .. } => {
                if let Some(row) = self.rows.get(id) {
                    row.bar.set_position(100);
                    row.bar
                        .finish_with_message(format!("✓ {}", truncate_string(&row.name, NAME_WIDTH)));
                }
            }
            UploadEvent::TaskFailed { id, error, .. } => {
                if let Some(row) = self.rows.get(id) {
                    row.bar
                        .abandon_with_message(format!("✗ {}", truncate_string(&row.name, NAME_WIDTH)));
                    self.println(&format!("✗ {}: {error}", row.name));
                }
            }
            UploadEvent::TaskCancelled { id } => {
                if let Some(row) = self.rows.get(id) {
                    row.bar.abandon_with_message(format!("- {} (cancelled)", row.name));
                }
            }
            UploadEvent::QueuePaused { .. } => {
                for row in self.rows.values().filter(|row| !row.bar.is_finished()) {
                    row.bar.set_message(format!(
                        "{} (paused)",
                        truncate_string(&row.name, NAME_WIDTH - 9)
                    ));
                }
            }
            UploadEvent::AllComplete { .. } => return true,
            UploadEvent::TaskQueued { .. } | UploadEvent::QueueResumed { .. } => {}
        }
        false
    }

    /// Stop drawing, leaving finished bars on screen.
    pub fn finish(&self) {
        for row in self.rows.values().filter(|row| !row.bar.is_finished()) {
            row.bar.abandon();
        }
    }
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

//! Export progress reporting
//!
//! Progress is advisory: the packer emits one [`ExportProgress`] per block and
//! the container layout never depends on it. Terminal front-ends can pass an
//! indicatif [`ProgressBar`] directly.

use indicatif::{ProgressBar, ProgressStyle};

/// Progress of an export, one event per appended block
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    /// Zero-based index of the current block
    pub index: usize,
    /// Total number of blocks
    pub total: usize,
    /// Name of the current block
    pub name: String,
    /// Overall completion, 0.0 to 100.0
    pub percent: f64,
}

/// Receiver for export progress events
pub trait ProgressSink {
    fn report(&mut self, progress: &ExportProgress);
}

/// Discards all progress events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _progress: &ExportProgress) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(&ExportProgress),
{
    fn report(&mut self, progress: &ExportProgress) {
        self(progress)
    }
}

impl ProgressSink for ProgressBar {
    fn report(&mut self, progress: &ExportProgress) {
        if self.length() != Some(progress.total as u64) {
            self.set_length(progress.total as u64);
        }
        self.set_position(progress.index as u64 + 1);
        self.set_message(progress.name.clone());
    }
}

/// Style presets for progress indicators
pub struct ProgressStyles;

impl ProgressStyles {
    /// Style for block-by-block export (shows count)
    pub fn blocks() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
    }
}

/// Create a progress bar for an export of `total` blocks
pub fn export_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(ProgressStyles::blocks());
    pb
}

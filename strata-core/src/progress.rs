//! Progress reporting and batch-and-yield for large analysis results.
//!
//! Long stages hand control back to the host once per batch by calling
//! [`ProgressReporter::advance`]. Batch boundaries never affect output.
//! The CLI uses `IndicatifReporter` for user-visible progress bars.
//! Library callers can use `NoopReporter` or provide their own implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Trait for reporting progress of composer stages.
pub trait ProgressReporter: Send + Sync {
    /// Begin a new task with an optional total count.
    fn start(&self, task: &str, total: Option<u64>);

    /// Advance progress by the given amount. Called once per batch.
    fn advance(&self, amount: u64);

    /// Mark the current task as finished.
    fn finish(&self);

    /// Display an informational message.
    fn message(&self, msg: &str);
}

/// No-op reporter for library callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _task: &str, _total: Option<u64>) {}
    fn advance(&self, _amount: u64) {}
    fn finish(&self) {}
    fn message(&self, _msg: &str) {}
}

/// Reporter backed by `indicatif` progress bars for CLI use.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
    completed: AtomicU64,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    /// A reporter drawing to stderr.
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr()))
    }

    /// A reporter that tracks progress without drawing anything.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            completed: AtomicU64::new(0),
        }
    }

    /// Units advanced since the last `start`.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, task: &str, total: Option<u64>) {
        self.completed.store(0, Ordering::Relaxed);
        if let Some(total) = total {
            self.bar.set_length(total);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len} ({eta})",
            ) {
                self.bar.set_style(style.progress_chars("=> "));
            }
        } else {
            self.bar.set_length(0);
            if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} {pos} items") {
                self.bar.set_style(style);
            }
        }
        self.bar.set_message(task.to_string());
        self.bar.reset();
    }

    fn advance(&self, amount: u64) {
        self.completed.fetch_add(amount, Ordering::Relaxed);
        self.bar.inc(amount);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn message(&self, msg: &str) {
        self.bar.println(msg);
    }
}

/// Counts processed items and reports them to a [`ProgressReporter`] in
/// batches of `chunk_size`.
pub struct Batches<'a> {
    reporter: &'a dyn ProgressReporter,
    chunk_size: u64,
    pending: u64,
    batches: u64,
}

impl std::fmt::Debug for Batches<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batches")
            .field("chunk_size", &self.chunk_size)
            .field("pending", &self.pending)
            .field("batches", &self.batches)
            .finish_non_exhaustive()
    }
}

impl<'a> Batches<'a> {
    pub fn start(
        reporter: &'a dyn ProgressReporter,
        task: &str,
        total: usize,
        chunk_size: usize,
    ) -> Self {
        reporter.start(task, Some(total as u64));
        Self {
            reporter,
            chunk_size: chunk_size.max(1) as u64,
            pending: 0,
            batches: 0,
        }
    }

    /// Record one processed item; yields to the reporter at a batch boundary.
    pub fn tick(&mut self) {
        self.pending += 1;
        if self.pending == self.chunk_size {
            self.flush();
        }
    }

    /// Flush the final partial batch and finish the task.
    /// Returns the number of batches reported.
    pub fn finish(mut self) -> u64 {
        if self.pending > 0 {
            self.flush();
        }
        self.reporter.finish();
        self.batches
    }

    fn flush(&mut self) {
        self.reporter.advance(self.pending);
        self.pending = 0;
        self.batches += 1;
    }
}

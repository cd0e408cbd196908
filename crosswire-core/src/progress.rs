//! Progress reporting for long-running engine phases.
//!
//! The CLI uses `IndicatifReporter` for user-visible progress; library
//! callers can use `NoopReporter` or bring their own implementation.

use indicatif::{ProgressBar, ProgressStyle};

/// Trait for reporting progress of engine phases.
pub trait ProgressReporter: Send + Sync {
    /// Begin a new phase with an optional total count.
    fn start(&self, phase: &str, total: Option<u64>);

    /// Advance progress by the given amount.
    fn advance(&self, amount: u64);

    /// Mark the current phase as finished.
    fn finish(&self);

    /// Display an informational message.
    fn message(&self, msg: &str);
}

/// No-op reporter for callers that don't need progress output.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn start(&self, _phase: &str, _total: Option<u64>) {}
    fn advance(&self, _amount: u64) {}
    fn finish(&self) {}
    fn message(&self, _msg: &str) {}
}

/// Reporter backed by `indicatif` progress bars for CLI use.
#[derive(Debug)]
pub struct IndicatifReporter {
    bar: ProgressBar,
}

impl Default for IndicatifReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatifReporter {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn start(&self, phase: &str, total: Option<u64>) {
        if let Some(total) = total {
            self.bar.set_length(total);
            self.bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} {msg} [{bar:30.cyan/blue}] {pos}/{len}",
                )
                .unwrap()
                .progress_chars("=> "),
            );
        } else {
            self.bar.set_length(0);
            self.bar
                .set_style(ProgressStyle::with_template("{spinner:.green} {msg}").unwrap());
        }
        self.bar.set_message(phase.to_string());
        self.bar.reset();
    }

    fn advance(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }

    fn message(&self, msg: &str) {
        self.bar.println(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_reporter_is_silent() {
        let reporter = NoopReporter;
        reporter.start("diffing", Some(4));
        reporter.advance(4);
        reporter.message("done");
        reporter.finish();
    }

    #[test]
    fn indicatif_reporter_lifecycle() {
        let reporter = IndicatifReporter::new();
        reporter.start("splitting", None);
        reporter.advance(1);
        reporter.finish();
    }
}

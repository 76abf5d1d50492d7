//! Output formatting and progress reporting

use autotest::notify::TestSummary;
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::Cell;

/// Stage names of a full pipeline run, in order
pub const PIPELINE_STAGES: [&str; 7] = [
    "history", "metadata", "tests", "report", "upload", "summary", "email",
];

/// Progress reporter for pipeline stages
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    stage_running: Cell<bool>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            stage_running: Cell::new(false),
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` stages
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Mark the start of a stage
    pub fn stage(&self, name: &str) {
        if let Some(ref pb) = self.progress_bar {
            if self.stage_running.replace(true) {
                pb.inc(1);
            }
            pb.set_message(name.to_string());
        }
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message("done");
        }
    }

    fn line(&self, prefix: String, message: &str) {
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "OK".to_string()
        };
        self.line(prefix, message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        self.line(prefix, message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };
        self.line(prefix, message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };
        self.line(prefix, message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print the test summary
    pub fn summary(&self, summary: &TestSummary) {
        if self.quiet && summary.failed == 0 && summary.broken == 0 {
            return;
        }
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&format_summary(summary, self.use_color));
    }
}

/// One-line result summary
#[must_use]
pub fn format_summary(summary: &TestSummary, use_color: bool) -> String {
    let failing = summary.failed + summary.broken > 0;
    if use_color {
        let passed_style = Style::new().green().bold();
        let failed_style = Style::new().red().bold();
        let skipped_style = Style::new().yellow();
        let status = if failing {
            failed_style.apply_to("FAILED")
        } else {
            passed_style.apply_to("PASSED")
        };
        format!(
            "{} {} tests in {:.1}s ({} passed, {} failed, {} broken, {} skipped)",
            status,
            summary.total,
            summary.duration,
            passed_style.apply_to(summary.passed),
            if summary.failed > 0 {
                failed_style.apply_to(summary.failed).to_string()
            } else {
                summary.failed.to_string()
            },
            summary.broken,
            skipped_style.apply_to(summary.skipped)
        )
    } else {
        let status = if failing { "FAILED" } else { "PASSED" };
        format!(
            "{status} {} tests in {:.1}s ({} passed, {} failed, {} broken, {} skipped)",
            summary.total, summary.duration, summary.passed, summary.failed, summary.broken, summary.skipped
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod progress_reporter_tests {
        use super::*;

        #[test]
        fn test_new_reporter() {
            let reporter = ProgressReporter::new(true, false);
            assert!(reporter.use_color);
            assert!(!reporter.quiet);
        }

        #[test]
        fn test_quiet_reporter_has_no_bar() {
            let mut reporter = ProgressReporter::new(false, true);
            reporter.start_progress(7, "starting");
            assert!(reporter.progress_bar.is_none());
            reporter.stage("tests");
            reporter.finish();
        }

        #[test]
        fn test_stages_advance() {
            let mut reporter = ProgressReporter::new(false, false);
            reporter.start_progress(PIPELINE_STAGES.len() as u64, "starting");
            for stage in PIPELINE_STAGES {
                reporter.stage(stage);
            }
            let pb = reporter.progress_bar.as_ref().unwrap();
            assert_eq!(pb.position(), 6);
            assert_eq!(pb.message(), "email");
        }

        #[test]
        fn test_messages() {
            let reporter = ProgressReporter::new(false, false);
            reporter.header("pipeline");
            reporter.success("report generated");
            reporter.failure("pytest exited with code 1");
            reporter.warning("EMAIL_SENDER not set");
            reporter.info("no history");
            reporter.summary(&TestSummary::default());
        }
    }

    mod summary_tests {
        use super::*;

        #[test]
        fn test_plain_summary() {
            let summary = TestSummary {
                total: 10,
                passed: 8,
                failed: 1,
                broken: 1,
                skipped: 0,
                unknown: 0,
                duration: 12.34,
            };
            assert_eq!(
                format_summary(&summary, false),
                "FAILED 10 tests in 12.3s (8 passed, 1 failed, 1 broken, 0 skipped)"
            );
            assert!(format_summary(&TestSummary::default(), false).starts_with("PASSED 0 tests"));
        }
    }
}

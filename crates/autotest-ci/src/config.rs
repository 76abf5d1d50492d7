//! CLI configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Raw Allure results written by the test run
pub const DEFAULT_RESULTS_DIR: &str = "output/reports/allure-results";
/// Generated HTML report
pub const DEFAULT_REPORT_DIR: &str = "output/reports/allure-report";

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// From `-q` and the `-v` count
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Log level this verbosity seeds the filter with
    #[must_use]
    pub const fn log_level(self) -> &'static str {
        match self {
            Self::Quiet => "ERROR",
            Self::Normal => "INFO",
            Self::Verbose => "DEBUG",
            Self::Debug => "TRACE",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Allure results directory
    pub results_dir: PathBuf,
    /// Allure report directory
    pub report_dir: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
        }
    }
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set both report directories
    #[must_use]
    pub fn with_dirs(mut self, results_dir: impl Into<PathBuf>, report_dir: impl Into<PathBuf>) -> Self {
        self.results_dir = results_dir.into();
        self.report_dir = report_dir.into();
        self
    }

    /// Results directory
    #[must_use]
    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Report directory
    #[must_use]
    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }
}

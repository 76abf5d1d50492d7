//! Logging setup.
//!
//! Everything in the crate logs through `tracing`; this module installs the
//! subscriber. Console output can be text or JSON, and file output appends to
//! a dated file under the log directory.

use crate::config::ConfigManager;
use crate::result::{AutomationError, AutomationResult};
use chrono::{DateTime, Local, TimeZone};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Default log directory
pub const DEFAULT_LOG_DIR: &str = "output/logs";

/// Console line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(AutomationError::invalid_argument(format!(
                "unknown log format '{other}' (expected text or json)"
            ))),
        }
    }
}

/// Where and how much to log
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Level name, e.g. `INFO` or `warning`
    pub level: String,
    /// Directory for log files
    pub dir: PathBuf,
    /// Write to stderr
    pub console: bool,
    /// Write to `dir`
    pub file: bool,
    /// Console format
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            console: true,
            file: false,
            format: LogFormat::Text,
        }
    }
}

impl LogSettings {
    /// Read `log.level`, `log.dir`, `log.console.enabled`,
    /// `log.file.enabled` and `log.format`. An unknown format falls back to
    /// text.
    #[must_use]
    pub fn from_config(config: &ConfigManager) -> Self {
        let defaults = Self::default();
        let format = config.get_str("log.format", "text");
        Self {
            level: config.get_str("log.level", &defaults.level),
            dir: PathBuf::from(config.get_str("log.dir", DEFAULT_LOG_DIR)),
            console: config.get_bool("log.console.enabled", defaults.console),
            file: config.get_bool("log.file.enabled", defaults.file),
            format: format.parse().unwrap_or_default(),
        }
    }

    /// Override the level
    #[must_use]
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enable file output under `dir`
    #[must_use]
    pub fn file_in(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self.file = true;
        self
    }
}

/// Map a level name to an `EnvFilter` directive.
///
/// `WARNING` and `CRITICAL` are accepted alongside the tracing names; unknown
/// names mean `info`.
#[must_use]
pub fn level_directive(name: &str) -> &'static str {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" | "CRITICAL" | "FATAL" => "error",
        "OFF" => "off",
        _ => "info",
    }
}

/// `app_YYYYmmdd.log` for the given day
#[must_use]
pub fn log_file_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("app_{}.log", now.format("%Y%m%d"))
}

/// `test_<name>_<YYYYmmdd_HHMMSS>.log`, with every character of the test name
/// that is not alphanumeric replaced by `_`.
#[must_use]
pub fn test_log_file_name<Tz: TimeZone>(test_name: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let sanitized: String = test_name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("test_{sanitized}_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Path of a per-test log file under `dir`
#[must_use]
pub fn test_log_path(dir: &Path, test_name: &str) -> PathBuf {
    dir.join(test_log_file_name(test_name, &Local::now()))
}

fn build_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(&settings.level)))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `settings.level` when set. Returns `false` when a
/// subscriber was already installed, which is normal in test binaries.
///
/// # Errors
///
/// Returns `Io` if the log directory or file cannot be created.
pub fn init(settings: &LogSettings) -> AutomationResult<bool> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if settings.console {
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        match settings.format {
            LogFormat::Text => layers.push(layer.boxed()),
            LogFormat::Json => layers.push(layer.json().boxed()),
        }
    }

    if settings.file {
        std::fs::create_dir_all(&settings.dir)?;
        let path = settings.dir.join(log_file_name(&Local::now()));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        );
    }

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(build_filter(settings))
        .try_init()
        .is_ok();

    if installed {
        debug!(level = level_directive(&settings.level), "logging initialized");
    }
    Ok(installed)
}

/// Install the subscriber from `log.*` configuration.
///
/// # Errors
///
/// See [`init`].
pub fn init_from_config(config: &ConfigManager) -> AutomationResult<bool> {
    init(&LogSettings::from_config(config))
}

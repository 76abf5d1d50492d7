//! autotest-ci: CI orchestration for the automation suite.
//!
//! Runs pytest into Allure results, generates the report, uploads it to the
//! serving host and mails the summary.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod allure;
mod commands;
mod config;
pub mod env;
mod error;
mod output;
pub mod pipeline;
pub mod report_email;

pub use commands::{Cli, ColorArg, Commands, PathArgs, ReportArgs, RunArgs};
pub use config::{CliConfig, ColorChoice, Verbosity, DEFAULT_REPORT_DIR, DEFAULT_RESULTS_DIR};
pub use error::{CliError, CliResult};
pub use output::{format_summary, ProgressReporter, PIPELINE_STAGES};
pub use pipeline::{CommandRunner, Pipeline, PipelineOutcome, SystemRunner, UploadTarget};

//! CLI command definitions using clap

use crate::config::{DEFAULT_REPORT_DIR, DEFAULT_RESULTS_DIR};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// autotest-ci: run the test suite, build the Allure report, publish it and
/// mail the results
#[derive(Parser, Debug)]
#[command(name = "autotest-ci")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline: metadata, tests, report, upload and email
    Run(RunArgs),

    /// Write categories, environment and executor metadata
    Metadata(PathArgs),

    /// Run the pytest suite into the results directory
    Test(PathArgs),

    /// Generate the Allure report
    Report(ReportArgs),

    /// Upload the report to the ECS host
    Upload(PathArgs),

    /// Email the summary of an existing report
    Notify(PathArgs),

    /// List test cases referenced by the report but missing their data file
    CheckIntegrity(PathArgs),
}

/// Results and report locations
#[derive(Args, Debug, Clone)]
pub struct PathArgs {
    /// Allure results directory
    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    pub results_dir: PathBuf,

    /// Allure report directory
    #[arg(long, default_value = DEFAULT_REPORT_DIR)]
    pub report_dir: PathBuf,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Skip the results email
    #[arg(long)]
    pub no_email: bool,
}

/// Arguments for the report command
#[derive(Args, Debug)]
pub struct ReportArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Allure executable
    #[arg(long, env = "ALLURE_CMD", default_value = "allure")]
    pub allure_cmd: String,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

impl Commands {
    /// Path arguments of the subcommand
    #[must_use]
    pub const fn paths(&self) -> &PathArgs {
        match self {
            Self::Run(args) => &args.paths,
            Self::Report(args) => &args.paths,
            Self::Metadata(paths)
            | Self::Test(paths)
            | Self::Upload(paths)
            | Self::Notify(paths)
            | Self::CheckIntegrity(paths) => paths,
        }
    }
}

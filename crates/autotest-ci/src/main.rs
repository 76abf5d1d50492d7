//! autotest-ci: CI pipeline for the automation suite
//!
//! ## Usage
//!
//! ```bash
//! autotest-ci run                  # Full pipeline
//! autotest-ci run --no-email       # Without the results email
//! autotest-ci report               # Only regenerate the Allure report
//! autotest-ci check-integrity      # List cases missing their data file
//! ```

use autotest::logging::{self, LogSettings};
use autotest::AutomationError;
use autotest_ci::{
    allure,
    env::{prepare_env, process_env},
    pipeline::{self, write_metadata},
    report_email, Cli, CliConfig, CliError, CliResult, ColorChoice, Commands, Pipeline,
    ProgressReporter, ReportArgs, RunArgs, SystemRunner, UploadTarget, Verbosity,
    PIPELINE_STAGES,
};
use chrono::Local;
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);

    let _ = logging::init(&LogSettings::default().level(config.verbosity.log_level()))?;
    let defaulted = prepare_env();

    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    for name in defaulted {
        reporter.warning(&format!("{name} not set, using default"));
    }

    match cli.command {
        Commands::Run(args) => run_pipeline(&config, reporter, &args),
        Commands::Metadata(_) => {
            write_metadata(config.results_dir(), &process_env)?;
            reporter.success(&format!(
                "metadata written to {}",
                config.results_dir().display()
            ));
            Ok(())
        }
        Commands::Test(_) => run_tests(&config, &reporter),
        Commands::Report(args) => run_report(&config, &reporter, &args),
        Commands::Upload(_) => run_upload(&config, &reporter),
        Commands::Notify(_) => run_notify(&config, &reporter),
        Commands::CheckIntegrity(_) => run_check_integrity(&config, &reporter),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let color: ColorChoice = cli.color.into();
    let paths = cli.command.paths();

    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_dirs(&paths.results_dir, &paths.report_dir)
}

fn run_pipeline(config: &CliConfig, mut reporter: ProgressReporter, args: &RunArgs) -> CliResult<()> {
    reporter.header("autotest-ci pipeline");
    let total = if args.no_email {
        PIPELINE_STAGES.len() - 1
    } else {
        PIPELINE_STAGES.len()
    };
    reporter.start_progress(total as u64, "starting");

    let mut pipeline = Pipeline::new(config, SystemRunner, &process_env);
    if args.no_email {
        pipeline = pipeline.without_email();
    }
    let outcome = pipeline.run(|stage| reporter.stage(stage))?;
    reporter.finish();

    match outcome.test_exit_code {
        Some(0) => reporter.success("tests passed"),
        Some(code) => reporter.failure(&format!("pytest exited with code {code}")),
        None => reporter.failure("pytest could not be started"),
    }
    if outcome.report_generated {
        reporter.success(&format!("report at {}", config.report_dir().display()));
    } else {
        reporter.failure("report generation failed");
    }
    if outcome.uploaded {
        reporter.success("report uploaded");
    }
    if !args.no_email && !outcome.email_sent {
        reporter.warning("results email was not sent");
    }
    reporter.summary(&outcome.summary);
    Ok(())
}

fn run_tests(config: &CliConfig, reporter: &ProgressReporter) -> CliResult<()> {
    match pipeline::run_tests(&SystemRunner, config.results_dir())? {
        0 => {
            reporter.success("tests passed");
            Ok(())
        }
        code => Err(CliError::test_execution(format!(
            "pytest exited with code {code}"
        ))),
    }
}

fn run_report(config: &CliConfig, reporter: &ProgressReporter, args: &ReportArgs) -> CliResult<()> {
    let _ = allure::copy_history(config.report_dir(), config.results_dir())?;
    pipeline::generate_report(
        &SystemRunner,
        &args.allure_cmd,
        config.results_dir(),
        config.report_dir(),
    )
    .map_err(|e| CliError::report(e.to_string()))?;
    reporter.success(&format!("report at {}", config.report_dir().display()));
    if let Some(summary) = allure::read_summary(config.report_dir()) {
        reporter.summary(&summary);
    }
    Ok(())
}

fn run_upload(config: &CliConfig, reporter: &ProgressReporter) -> CliResult<()> {
    let target = UploadTarget::from_env(&process_env)
        .ok_or_else(|| CliError::config("ECS_HOST is not set"))?;
    if !config.report_dir().is_dir() {
        return Err(CliError::upload(format!(
            "report directory {} does not exist",
            config.report_dir().display()
        )));
    }
    pipeline::upload_report(&SystemRunner, &target, config.report_dir())?;
    pipeline::fix_permissions(&SystemRunner, &target, "nginx")?;
    reporter.success(&format!("report uploaded to {}", target.login()));
    Ok(())
}

fn run_notify(config: &CliConfig, reporter: &ProgressReporter) -> CliResult<()> {
    let summary = allure::read_summary(config.report_dir()).unwrap_or_else(|| {
        reporter.warning("no report summary found, sending empty results");
        Default::default()
    });
    if !report_email::send_report_email(&summary, &process_env, &Local::now()) {
        return Err(AutomationError::notification("results email was not sent").into());
    }
    reporter.success("results email sent");
    Ok(())
}

fn run_check_integrity(config: &CliConfig, reporter: &ProgressReporter) -> CliResult<()> {
    let missing = allure::check_integrity(config.report_dir());
    if missing.is_empty() {
        reporter.success("every referenced test case has its data file");
        return Ok(());
    }
    for uid in &missing {
        println!("{uid}");
    }
    Err(CliError::report(format!(
        "{} test case(s) missing their data file",
        missing.len()
    )))
}

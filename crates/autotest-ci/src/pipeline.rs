//! External commands and the full CI pipeline.
//!
//! ```text
//! prepare env ─► copy history ─► metadata ─► pytest ─► allure generate
//!                                                          │
//!                              email ◄─ summary ◄─ upload (ECS_HOST set)
//! ```

use crate::allure;
use crate::config::CliConfig;
use crate::env::Lookup;
use crate::error::{CliError, CliResult};
use crate::report_email;
use autotest::notify::TestSummary;
use chrono::Local;
use std::path::Path;
use std::process::Command;
use tracing::{error, info, warn};

/// Runs a program to completion and reports its exit code
pub trait CommandRunner {
    /// Run `program` with `args`.
    ///
    /// # Errors
    ///
    /// Returns `Command` when the program cannot be started.
    fn run(&self, program: &str, args: &[String]) -> CliResult<i32>;
}

/// Spawns real processes, inheriting stdio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> CliResult<i32> {
        let line = command_line(program, args);
        info!(command = %line, "running");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| CliError::command(line.clone(), e.to_string()))?;
        // Killed by a signal: no code
        Ok(status.code().unwrap_or(-1))
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run a command and require exit code 0
fn run_checked(runner: &dyn CommandRunner, program: &str, args: &[String]) -> CliResult<()> {
    match runner.run(program, args)? {
        0 => Ok(()),
        code => Err(CliError::command(
            command_line(program, args),
            format!("exit status {code}"),
        )),
    }
}

/// `pytest -n auto --reruns 2 --alluredir=<results>`; returns the exit code.
///
/// # Errors
///
/// Returns `Command` when pytest cannot be started.
pub fn run_tests(runner: &dyn CommandRunner, results_dir: &Path) -> CliResult<i32> {
    let args = vec![
        "-n".to_string(),
        "auto".to_string(),
        "--reruns".to_string(),
        "2".to_string(),
        format!("--alluredir={}", results_dir.display()),
    ];
    let code = runner.run("pytest", &args)?;
    if code == 0 {
        info!("tests passed");
    } else {
        warn!(exit_code = code, "tests finished with failures");
    }
    Ok(code)
}

/// `<allure> generate <results> --clean -o <report>`, then `.nojekyll`
/// markers.
///
/// # Errors
///
/// Returns `Command` when allure fails and `Io` when the markers cannot be
/// written.
pub fn generate_report(
    runner: &dyn CommandRunner,
    allure_cmd: &str,
    results_dir: &Path,
    report_dir: &Path,
) -> CliResult<()> {
    let args = vec![
        "generate".to_string(),
        results_dir.display().to_string(),
        "--clean".to_string(),
        "-o".to_string(),
        report_dir.display().to_string(),
    ];
    run_checked(runner, allure_cmd, &args)?;
    allure::create_nojekyll(report_dir)?;
    info!(dir = %report_dir.display(), "report generated");
    Ok(())
}

/// Remote host serving the report through nginx
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub user: String,
    pub host: String,
    pub dir: String,
}

impl UploadTarget {
    /// From `ECS_HOST`, `ECS_USER` and `ECS_TARGET_DIR`; `None` without a host
    #[must_use]
    pub fn from_env(lookup: Lookup<'_>) -> Option<Self> {
        let host = lookup("ECS_HOST").filter(|h| !h.is_empty())?;
        Some(Self {
            user: lookup("ECS_USER").unwrap_or_else(|| "root".to_string()),
            host,
            dir: lookup("ECS_TARGET_DIR").unwrap_or_else(|| "/usr/share/nginx/html/".to_string()),
        })
    }

    /// `user@host`
    #[must_use]
    pub fn login(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Remote report directory
    #[must_use]
    pub fn remote_report_dir(&self) -> String {
        format!("{}/allure-report", self.dir)
    }
}

/// Replace the remote report with the local one.
///
/// # Errors
///
/// Returns `Upload` when ssh or scp fails.
pub fn upload_report(
    runner: &dyn CommandRunner,
    target: &UploadTarget,
    report_dir: &Path,
) -> CliResult<()> {
    let remote = target.remote_report_dir();
    info!(remote = %remote, "clearing remote report");
    run_checked(runner, "ssh", &[target.login(), format!("rm -rf {remote}")])
        .map_err(|e| CliError::upload(e.to_string()))?;

    info!(from = %report_dir.display(), to = %target.dir, "uploading report");
    run_checked(
        runner,
        "scp",
        &[
            "-r".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            report_dir.display().to_string(),
            format!("{}:{}", target.login(), target.dir),
        ],
    )
    .map_err(|e| CliError::upload(e.to_string()))?;
    info!("report uploaded");
    Ok(())
}

/// Hand the remote report to the nginx user with 755 dirs and 644 files.
///
/// # Errors
///
/// Returns `Upload` when ssh fails.
pub fn fix_permissions(
    runner: &dyn CommandRunner,
    target: &UploadTarget,
    owner: &str,
) -> CliResult<()> {
    let remote = target.remote_report_dir();
    let script = format!(
        "sudo chown -R {owner}:{owner} {remote} && \
         sudo find {remote} -type d -exec chmod 755 {{}} \\; && \
         sudo find {remote} -type f -exec chmod 644 {{}} \\;"
    );
    run_checked(runner, "ssh", &[target.login(), script])
        .map_err(|e| CliError::upload(e.to_string()))?;
    info!(owner, "remote permissions fixed");
    Ok(())
}

/// What happened during a pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    /// pytest exit code, `None` if it could not be started
    pub test_exit_code: Option<i32>,
    pub report_generated: bool,
    pub uploaded: bool,
    pub summary: TestSummary,
    pub email_sent: bool,
}

/// Write categories, environment and executor metadata.
///
/// # Errors
///
/// Returns `Io` or `Json` on write failure.
pub fn write_metadata(results_dir: &Path, lookup: Lookup<'_>) -> CliResult<()> {
    allure::write_categories(results_dir)?;
    allure::write_environment(results_dir, &allure::EnvironmentInfo::collect(lookup))?;
    allure::write_executor(
        results_dir,
        &allure::ExecutorInfo::collect(lookup, &Local::now()),
    )?;
    Ok(())
}

/// Full CI run. Only metadata write failures abort; every later stage logs
/// and carries on.
pub struct Pipeline<'a, R: CommandRunner> {
    config: &'a CliConfig,
    runner: R,
    lookup: Lookup<'a>,
    send_email: bool,
}

impl<R: CommandRunner + std::fmt::Debug> std::fmt::Debug for Pipeline<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("runner", &self.runner)
            .field("send_email", &self.send_email)
            .finish_non_exhaustive()
    }
}

impl<'a, R: CommandRunner> Pipeline<'a, R> {
    /// Pipeline over `runner`, reading variables through `lookup`
    pub const fn new(config: &'a CliConfig, runner: R, lookup: Lookup<'a>) -> Self {
        Self {
            config,
            runner,
            lookup,
            send_email: true,
        }
    }

    /// Skip the email stage
    #[must_use]
    pub const fn without_email(mut self) -> Self {
        self.send_email = false;
        self
    }

    /// Run every stage after environment preparation.
    ///
    /// `on_stage` is called with each stage name before it starts.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` if the results metadata cannot be written.
    pub fn run(&self, mut on_stage: impl FnMut(&str)) -> CliResult<PipelineOutcome> {
        let results = self.config.results_dir();
        let report = self.config.report_dir();

        on_stage("history");
        let _ = allure::copy_history(report, results)?;

        on_stage("metadata");
        write_metadata(results, self.lookup)?;

        on_stage("tests");
        let test_exit_code = match run_tests(&self.runner, results) {
            Ok(code) => Some(code),
            Err(e) => {
                error!(error = %e, "could not run tests");
                None
            }
        };

        on_stage("report");
        let allure_cmd = (self.lookup)("ALLURE_CMD").unwrap_or_else(|| "allure".to_string());
        let report_generated = match generate_report(&self.runner, &allure_cmd, results, report) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "report generation failed");
                false
            }
        };

        on_stage("upload");
        let mut uploaded = false;
        if report_generated {
            if let Some(target) = UploadTarget::from_env(self.lookup) {
                uploaded = upload_report(&self.runner, &target, report)
                    .and_then(|()| fix_permissions(&self.runner, &target, "nginx"))
                    .map_err(|e| error!(error = %e, "upload failed"))
                    .is_ok();
            } else {
                info!("ECS_HOST not set, skipping upload");
            }
        }

        on_stage("summary");
        let summary = allure::read_summary(report).unwrap_or_default();

        let email_sent = if self.send_email {
            on_stage("email");
            report_email::send_report_email(&summary, self.lookup, &Local::now())
        } else {
            false
        };

        Ok(PipelineOutcome {
            test_exit_code,
            report_generated,
            uploaded,
            summary,
            email_sent,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Records commands; exit codes by program name, 0 otherwise
    #[derive(Default)]
    struct FakeRunner {
        calls: RefCell<Vec<String>>,
        codes: HashMap<String, i32>,
        on_allure: Option<Box<dyn Fn()>>,
    }

    impl FakeRunner {
        fn failing(program: &str, code: i32) -> Self {
            let mut runner = Self::default();
            runner.codes.insert(program.to_string(), code);
            runner
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[String]) -> CliResult<i32> {
            self.calls.borrow_mut().push(command_line(program, args));
            if program == "allure" {
                if let Some(hook) = &self.on_allure {
                    hook();
                }
            }
            Ok(self.codes.get(program).copied().unwrap_or(0))
        }
    }

    impl CommandRunner for &FakeRunner {
        fn run(&self, program: &str, args: &[String]) -> CliResult<i32> {
            (*self).run(program, args)
        }
    }

    fn target() -> UploadTarget {
        UploadTarget {
            user: "deploy".into(),
            host: "10.0.0.8".into(),
            dir: "/srv/www".into(),
        }
    }

    mod command_tests {
        use super::*;

        #[test]
        fn test_pytest_args() {
            let runner = FakeRunner::failing("pytest", 1);
            let code = run_tests(&runner, Path::new("out/results")).unwrap();
            assert_eq!(code, 1);
            assert_eq!(
                runner.calls(),
                vec!["pytest -n auto --reruns 2 --alluredir=out/results"]
            );
        }

        #[test]
        fn test_generate_report_creates_markers() {
            let dir = TempDir::new().unwrap();
            let runner = FakeRunner::default();
            generate_report(&runner, "allure", Path::new("res"), dir.path()).unwrap();
            assert_eq!(
                runner.calls()[0],
                format!("allure generate res --clean -o {}", dir.path().display())
            );
            assert!(dir.path().join(".nojekyll").is_file());
        }

        #[test]
        fn test_generate_report_failure() {
            let runner = FakeRunner::failing("allure", 2);
            let err = generate_report(&runner, "allure", Path::new("r"), Path::new("h")).unwrap_err();
            assert!(matches!(err, CliError::Command { .. }));
        }

        #[test]
        fn test_upload_commands() {
            let runner = FakeRunner::default();
            upload_report(&runner, &target(), Path::new("out/report")).unwrap();
            fix_permissions(&runner, &target(), "nginx").unwrap();

            let calls = runner.calls();
            assert_eq!(calls[0], "ssh deploy@10.0.0.8 rm -rf /srv/www/allure-report");
            assert_eq!(
                calls[1],
                "scp -r -o StrictHostKeyChecking=no out/report deploy@10.0.0.8:/srv/www"
            );
            assert!(calls[2].contains("sudo chown -R nginx:nginx /srv/www/allure-report"));
            assert!(calls[2].contains("-type d -exec chmod 755 {} \\;"));
            assert!(calls[2].contains("-type f -exec chmod 644 {} \\;"));
        }

        #[test]
        fn test_upload_failure_stops_before_scp() {
            let runner = FakeRunner::failing("ssh", 255);
            let err = upload_report(&runner, &target(), Path::new("r")).unwrap_err();
            assert!(matches!(err, CliError::Upload { .. }));
            assert_eq!(runner.calls().len(), 1);
        }

        #[test]
        fn test_upload_target_from_env() {
            assert!(UploadTarget::from_env(&|_| None).is_none());
            let target = UploadTarget::from_env(&|k| (k == "ECS_HOST").then(|| "web1".to_string()))
                .unwrap();
            assert_eq!(target.login(), "root@web1");
            assert_eq!(target.remote_report_dir(), "/usr/share/nginx/html//allure-report");
        }
    }

    mod pipeline_tests {
        use super::*;

        fn summary_writer(report: std::path::PathBuf) -> Box<dyn Fn()> {
            Box::new(move || {
                fs::create_dir_all(report.join("widgets")).unwrap();
                fs::write(
                    report.join("widgets/summary.json"),
                    r#"{"statistic": {"total": 4, "passed": 3, "failed": 1}, "time": {"duration": 2000}}"#,
                )
                .unwrap();
            })
        }

        #[test]
        fn test_full_run_without_upload() {
            let dir = TempDir::new().unwrap();
            let config = CliConfig::new().with_dirs(dir.path().join("results"), dir.path().join("report"));
            let runner = FakeRunner {
                on_allure: Some(summary_writer(dir.path().join("report"))),
                ..FakeRunner::failing("pytest", 1)
            };
            let lookup = |_: &str| -> Option<String> { None };

            let mut stages = Vec::new();
            let outcome = Pipeline::new(&config, &runner, &lookup)
                .without_email()
                .run(|s| stages.push(s.to_string()))
                .unwrap();

            assert_eq!(outcome.test_exit_code, Some(1));
            assert!(outcome.report_generated);
            assert!(!outcome.uploaded);
            assert_eq!(outcome.summary.failed, 1);
            assert!((outcome.summary.duration - 2.0).abs() < f64::EPSILON);
            assert_eq!(stages, ["history", "metadata", "tests", "report", "upload", "summary"]);
            assert!(dir.path().join("results/categories.json").is_file());
            assert!(dir.path().join("results/executor.json").is_file());
            assert_eq!(runner.calls().len(), 2);
        }

        #[test]
        fn test_failed_report_skips_upload() {
            let dir = TempDir::new().unwrap();
            let config = CliConfig::new().with_dirs(dir.path().join("results"), dir.path().join("report"));
            let runner = FakeRunner::failing("allure", 1);
            let lookup = |k: &str| (k == "ECS_HOST").then(|| "web1".to_string());

            let outcome = Pipeline::new(&config, &runner, &lookup)
                .without_email()
                .run(|_| {})
                .unwrap();

            assert!(!outcome.report_generated);
            assert!(!outcome.uploaded);
            assert_eq!(outcome.summary, TestSummary::default());
            assert!(runner.calls().iter().all(|c| !c.starts_with("ssh")));
        }

        #[test]
        fn test_upload_when_host_set() {
            let dir = TempDir::new().unwrap();
            let config = CliConfig::new().with_dirs(dir.path().join("results"), dir.path().join("report"));
            let runner = FakeRunner::default();
            let lookup = |k: &str| (k == "ECS_HOST").then(|| "web1".to_string());

            let outcome = Pipeline::new(&config, &runner, &lookup)
                .without_email()
                .run(|_| {})
                .unwrap();

            assert!(outcome.uploaded);
            let calls = runner.calls();
            assert_eq!(calls.len(), 5);
            assert!(calls[4].contains("chown -R nginx:nginx"));
        }
    }
}

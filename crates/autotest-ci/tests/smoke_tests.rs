//! Smoke tests for the autotest-ci binary

#![allow(deprecated)] // Command::cargo_bin
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn autotest_ci() -> Command {
    let mut cmd = Command::cargo_bin("autotest-ci").expect("autotest-ci binary should exist");
    cmd.env_remove("ECS_HOST").env_remove("ALLURE_CMD");
    cmd
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    autotest_ci()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    autotest_ci()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Allure"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check-integrity"));
}

#[test]
fn test_no_args_fails() {
    autotest_ci().assert().failure();
}

#[test]
fn test_run_subcommand_help() {
    autotest_ci()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--no-email"))
        .stdout(predicate::str::contains("--results-dir"));
}

#[test]
fn test_report_subcommand_help() {
    autotest_ci()
        .args(["report", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--allure-cmd"));
}

// ============================================================================
// Command Tests
// ============================================================================

#[test]
fn test_metadata_writes_files() {
    let dir = TempDir::new().unwrap();
    let results = dir.path().join("results");

    autotest_ci()
        .current_dir(dir.path())
        .env("APP_ENV", "staging")
        .env("CI_BUILD_NUMBER", "42")
        .args(["-q", "metadata", "--results-dir"])
        .arg(&results)
        .assert()
        .success();

    for name in [
        "categories.json",
        "environment.properties",
        "environment.xml",
        "environment.json",
        "executor.json",
    ] {
        assert!(results.join(name).is_file(), "{name} should exist");
    }
    let properties = fs::read_to_string(results.join("environment.properties")).unwrap();
    assert!(properties.contains("APP_ENV=staging"));
    let executor = fs::read_to_string(results.join("executor.json")).unwrap();
    assert!(executor.contains("\"buildName\": \"42\""));
}

#[test]
fn test_check_integrity_without_report() {
    let dir = TempDir::new().unwrap();
    autotest_ci()
        .current_dir(dir.path())
        .args(["check-integrity", "--report-dir"])
        .arg(dir.path().join("report"))
        .assert()
        .success();
}

#[test]
fn test_check_integrity_lists_missing() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("report/data");
    fs::create_dir_all(&data).unwrap();
    fs::write(
        data.join("suites.json"),
        r#"{"uid": "root", "children": [{"uid": "present"}, {"uid": "absent"}]}"#,
    )
    .unwrap();
    fs::write(data.join("root.json"), "{}").unwrap();
    fs::write(data.join("present.json"), "{}").unwrap();

    autotest_ci()
        .current_dir(dir.path())
        .args(["check-integrity", "--report-dir"])
        .arg(dir.path().join("report"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("absent"))
        .stdout(predicate::str::contains("present").not());
}

#[test]
fn test_upload_requires_host() {
    let dir = TempDir::new().unwrap();
    autotest_ci()
        .current_dir(dir.path())
        .arg("upload")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ECS_HOST"));
}

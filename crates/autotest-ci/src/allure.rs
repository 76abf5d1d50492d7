//! Allure results metadata and report inspection.

use crate::env::{os_info, runner_version, Lookup};
use crate::error::CliResult;
use autotest::notify::TestSummary;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// One entry of `categories.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    pub matched_statuses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_regex: Option<String>,
    pub flaky: bool,
}

impl Category {
    fn matching(name: &str, status: &str, any_text: bool) -> Self {
        let any = any_text.then(|| ".*".to_string());
        Self {
            name: name.to_string(),
            matched_statuses: vec![status.to_string()],
            message_regex: any.clone(),
            trace_regex: any,
            flaky: false,
        }
    }
}

/// Product defects, test defects and skipped tests
#[must_use]
pub fn default_categories() -> Vec<Category> {
    vec![
        Category::matching("产品缺陷", "failed", true),
        Category::matching("用例缺陷", "broken", true),
        Category::matching("跳过用例", "skipped", false),
    ]
}

/// Write `categories.json` into the results dir.
///
/// # Errors
///
/// Returns `Io` or `Json` on write failure.
pub fn write_categories(results_dir: &Path) -> CliResult<()> {
    fs::create_dir_all(results_dir)?;
    let path = results_dir.join("categories.json");
    fs::write(&path, serde_json::to_string_pretty(&default_categories())?)?;
    debug!(path = %path.display(), "wrote categories");
    Ok(())
}

/// Ordered key/value pairs shown on the report's environment widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInfo {
    entries: Vec<(String, String)>,
}

impl EnvironmentInfo {
    /// Build from the environment through `lookup`
    #[must_use]
    pub fn collect(lookup: Lookup<'_>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let entries = vec![
            ("APP_ENV", get("APP_ENV", "test")),
            ("OS", os_info()),
            ("TEST_FRAMEWORK", "pytest".to_string()),
            ("UI_AUTOMATION", "Playwright".to_string()),
            ("API_AUTOMATION", "httpx".to_string()),
            ("REPORT_TOOL", format!("Allure {}", get("ALLURE_VERSION", "2.x"))),
            ("RUNNER_VERSION", runner_version().to_string()),
        ];
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Entries in display order
    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `key=value` lines
    #[must_use]
    pub fn to_properties(&self) -> String {
        self.entries
            .iter()
            .fold(String::new(), |mut out, (k, v)| {
                let _ = writeln!(out, "{k}={v}");
                out
            })
    }

    /// `<environment>` document with one `<parameter>` per entry
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<environment>\n");
        for (k, v) in &self.entries {
            let _ = write!(
                xml,
                "    <parameter>\n        <key>{}</key>\n        <value>{}</value>\n    </parameter>\n",
                xml_escape(k),
                xml_escape(v)
            );
        }
        xml.push_str("</environment>");
        xml
    }

    /// `[{"name": .., "values": [..]}]`
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|(k, v)| serde_json::json!({ "name": k, "values": [v] }))
                .collect(),
        )
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Write `environment.properties`, `environment.xml` and `environment.json`.
///
/// # Errors
///
/// Returns `Io` or `Json` on write failure.
pub fn write_environment(results_dir: &Path, info: &EnvironmentInfo) -> CliResult<()> {
    fs::create_dir_all(results_dir)?;
    fs::write(results_dir.join("environment.properties"), info.to_properties())?;
    fs::write(results_dir.join("environment.xml"), info.to_xml())?;
    fs::write(
        results_dir.join("environment.json"),
        serde_json::to_string_pretty(&info.to_json())?,
    )?;
    debug!(dir = %results_dir.display(), "wrote environment");
    Ok(())
}

/// `executor.json` contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub build_name: String,
    pub build_order: u64,
    pub report_url: String,
    pub build_url: String,
}

impl ExecutorInfo {
    /// Build from `CI_*` and `ALLURE_PUBLIC_URL`, stamped at `now`.
    ///
    /// `buildName` is `CI_BUILD_NUMBER` when it is all digits, else a
    /// timestamp.
    #[must_use]
    pub fn collect<Tz: TimeZone>(lookup: Lookup<'_>, now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let build_name = lookup("CI_BUILD_NUMBER")
            .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or_else(|| now.format("%Y%m%d-%H:%M:%S").to_string());
        let build_order = now.format("%m%d%H%M").to_string().parse().unwrap_or(0);

        Self {
            name: lookup("CI_NAME").unwrap_or_else(|| "本地执行".to_string()),
            kind: "jenkins".to_string(),
            build_name,
            build_order,
            report_url: lookup("ALLURE_PUBLIC_URL").unwrap_or_default(),
            build_url: lookup("CI_BUILD_URL").unwrap_or_default(),
        }
    }
}

/// Write `executor.json`.
///
/// # Errors
///
/// Returns `Io` or `Json` on write failure.
pub fn write_executor(results_dir: &Path, executor: &ExecutorInfo) -> CliResult<()> {
    fs::create_dir_all(results_dir)?;
    fs::write(
        results_dir.join("executor.json"),
        serde_json::to_string_pretty(executor)?,
    )?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_recursive(&entry.path(), &target)?;
        } else {
            let _ = fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Copy `report/history` into `results/history` so trends carry over.
///
/// Returns the number of files copied. A missing history is not an error;
/// a copy failure is logged and the run continues.
///
/// # Errors
///
/// Returns `Io` when the results directory cannot be created.
pub fn copy_history(report_dir: &Path, results_dir: &Path) -> CliResult<u64> {
    let src = report_dir.join("history");
    let dst = results_dir.join("history");
    fs::create_dir_all(&dst)?;

    if !src.is_dir() {
        info!(path = %src.display(), "no report history yet");
        return Ok(0);
    }
    info!(from = %src.display(), to = %dst.display(), "copying report history");
    match copy_dir_recursive(&src, &dst) {
        Ok(n) => Ok(n),
        Err(e) => {
            warn!(error = %e, "failed to copy report history");
            Ok(0)
        }
    }
}

/// Create an empty `.nojekyll` in the report dir and its `data` and `history`
/// dirs, where they exist.
///
/// # Errors
///
/// Returns `Io` on write failure.
pub fn create_nojekyll(report_dir: &Path) -> CliResult<()> {
    for dir in [
        report_dir.to_path_buf(),
        report_dir.join("data"),
        report_dir.join("history"),
    ] {
        let marker = dir.join(".nojekyll");
        if dir.is_dir() && !marker.exists() {
            fs::write(&marker, "")?;
        }
    }
    Ok(())
}

/// Parse a `widgets/summary.json` document
#[must_use]
pub fn parse_summary(data: &Value) -> TestSummary {
    let stat = |key: &str| {
        data.pointer(&format!("/statistic/{key}"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let duration_ms = data
        .pointer("/time/duration")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    TestSummary {
        total: stat("total"),
        passed: stat("passed"),
        failed: stat("failed"),
        broken: stat("broken"),
        skipped: stat("skipped"),
        unknown: stat("unknown"),
        duration: duration_ms / 1000.0,
    }
}

/// Read the report's summary widget; `None` when missing or unparseable
#[must_use]
pub fn read_summary(report_dir: &Path) -> Option<TestSummary> {
    let path = report_dir.join("widgets").join("summary.json");
    debug!(path = %path.display(), "reading summary");
    if !path.is_file() {
        warn!(path = %path.display(), "summary file not found");
        return None;
    }
    let parsed = fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(data) => Some(parse_summary(&data)),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read summary");
            None
        }
    }
}

fn collect_uids(value: &Value, uids: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(uid) = map.get("uid").and_then(Value::as_str) {
                let _ = uids.insert(uid.to_string());
            }
            for child in map.values() {
                collect_uids(child, uids);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_uids(item, uids);
            }
        }
        _ => {}
    }
}

/// Every `uid` referenced in `data/suites.json` that has no
/// `data/{uid}.json`, sorted.
///
/// A missing or unreadable `suites.json` yields an empty list.
#[must_use]
pub fn check_integrity(report_dir: &Path) -> Vec<String> {
    let data_dir = report_dir.join("data");
    let suites = data_dir.join("suites.json");
    if !suites.is_file() {
        warn!(path = %suites.display(), "suites.json not found, skipping integrity check");
        return Vec::new();
    }
    let parsed = fs::read_to_string(&suites)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
    let data = match parsed {
        Ok(data) => data,
        Err(e) => {
            error!(error = %e, "failed to read suites.json");
            return Vec::new();
        }
    };

    let mut uids = BTreeSet::new();
    collect_uids(&data, &mut uids);
    info!(count = uids.len(), "uids referenced by suites.json");

    uids.into_iter()
        .filter(|uid| {
            let present = data_dir.join(format!("{uid}.json")).is_file();
            if !present {
                warn!(uid = %uid, "missing uid file");
            }
            !present
        })
        .collect()
}

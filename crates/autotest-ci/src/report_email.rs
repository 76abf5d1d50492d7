//! The CI results email.

use crate::env::{os_info, runner_version, Lookup};
use autotest::notify::{escape_html, EmailNotifier, EmailSettings, TestSummary};
use chrono::{DateTime, TimeZone};
use tracing::{error, info, warn};

const GREY: &str = "#888";

/// Pass rate to one decimal, `N/A` for an empty run
#[must_use]
pub fn pass_rate(summary: &TestSummary) -> String {
    if summary.total == 0 {
        return "N/A".to_string();
    }
    #[allow(clippy::cast_precision_loss)]
    let rate = summary.passed as f64 / summary.total as f64 * 100.0;
    format!("{rate:.1}%")
}

/// `colour` when `count` is non-zero, grey otherwise
#[must_use]
pub const fn count_color(count: u64, colour: &'static str) -> &'static str {
    if count > 0 {
        colour
    } else {
        GREY
    }
}

/// `【自动化测试】测试报告 [<time>] - 通过率: <passed>/<total>`
#[must_use]
pub fn render_subject(summary: &TestSummary, generated_at: &str) -> String {
    format!(
        "【自动化测试】测试报告 [{generated_at}] - 通过率: {}/{}",
        summary.passed, summary.total
    )
}

/// Values shown in the email besides the counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContext {
    pub generated_at: String,
    /// Public report link, empty when not uploaded
    pub public_url: String,
    pub app_env: String,
    pub os: String,
    pub runner_version: String,
}

impl EmailContext {
    /// From `ALLURE_PUBLIC_URL` and `APP_ENV`, stamped at `now`
    #[must_use]
    pub fn collect<Tz: TimeZone>(lookup: Lookup<'_>, now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            generated_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            public_url: lookup("ALLURE_PUBLIC_URL").unwrap_or_default(),
            app_env: lookup("APP_ENV").unwrap_or_else(|| "test".to_string()),
            os: os_info(),
            runner_version: runner_version().to_string(),
        }
    }
}

const STYLE: &str = "body { font-family: sans-serif; line-height: 1.6; color: #333; }
.container { max-width: 700px; margin: 20px auto; padding: 20px; border: 1px solid #eee; border-radius: 8px; background-color: #f9f9f9; }
.header { text-align: center; margin-bottom: 20px; }
.header h1 { margin: 0; color: #333; }
.header p { color: #888; font-size: 0.9em; }
.summary-block { display: flex; justify-content: space-around; text-align: center; margin-bottom: 20px; padding: 15px; background-color: #fff; border-radius: 5px; }
.summary-item { flex: 1; }
.summary-item h3 { margin: 0 0 5px 0; font-size: 1.8em; }
.summary-item span { font-size: 0.9em; color: #888; }
.details { margin-bottom: 20px; padding: 15px; background-color: #fff; border-radius: 5px; }
.environment { font-size: 0.9em; color: #555; border-top: 1px solid #eee; padding-top: 15px; margin-top: 20px; }";

fn summary_item(count: u64, label: &str, colour: Option<&str>) -> String {
    let style = colour.map(|c| format!(" style=\"color: {c};\"")).unwrap_or_default();
    format!("<div class=\"summary-item\"{style}><h3>{count}</h3><span>{label}</span></div>")
}

/// HTML body: counts, pass rate, duration, report link and environment
#[must_use]
pub fn render_body(summary: &TestSummary, ctx: &EmailContext) -> String {
    let button = if ctx.public_url.is_empty() {
        "<span style=\"color: #888;\">（报告未上传或链接无效）</span>".to_string()
    } else {
        format!(
            "<a href=\"{}\" target=\"_blank\" style=\"display: inline-block; padding: 10px 20px; \
             font-size: 16px; color: #ffffff; background-color: #007bff; border-radius: 5px; \
             text-decoration: none;\">查看完整报告</a>",
            escape_html(&ctx.public_url)
        )
    };

    let items = [
        summary_item(summary.total, "总用例数", None),
        summary_item(summary.passed, "通过", Some(count_color(summary.passed, "#28a745"))),
        summary_item(summary.failed, "失败", Some(count_color(summary.failed, "#dc3545"))),
        summary_item(summary.broken, "异常", Some(count_color(summary.broken, "#ffc107"))),
        summary_item(summary.skipped, "跳过", Some(count_color(summary.skipped, "#6c757d"))),
    ]
    .concat();

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n\
         <div class=\"container\">\n\
         <div class=\"header\"><h1>自动化测试报告</h1><p>生成时间: {generated}</p></div>\n\
         <div class=\"summary-block\">{items}</div>\n\
         <div class=\"details\"><h4>测试结果详情</h4>\
         <p><strong>通过率:</strong> {rate}</p>\
         <p><strong>执行时间:</strong> {duration:.1}秒</p>\
         <div style=\"margin-top: 15px; text-align: center;\">{button}</div></div>\n\
         <div class=\"environment\"><h4>执行环境信息</h4>\
         <p><strong>测试环境:</strong> {env}</p>\
         <p><strong>操作系统:</strong> {os}</p>\
         <p><strong>运行器版本:</strong> {version}</p></div>\n\
         </div>\n</body>\n</html>\n",
        generated = ctx.generated_at,
        rate = pass_rate(summary),
        duration = summary.duration,
        env = escape_html(&ctx.app_env),
        os = escape_html(&ctx.os),
        version = ctx.runner_version,
    )
}

/// SMTP settings from `EMAIL_*`: SSL when `EMAIL_USE_SSL` is `true`, never
/// STARTTLS, recipients defaulting to the sender
#[must_use]
pub fn smtp_settings(lookup: Lookup<'_>) -> EmailSettings {
    let port = lookup("EMAIL_SMTP_PORT").map_or(465, |raw| {
        raw.trim().parse::<u16>().unwrap_or_else(|_| {
            warn!(value = %raw, "invalid EMAIL_SMTP_PORT, using 465");
            465
        })
    });
    let sender = lookup("EMAIL_SENDER").unwrap_or_else(|| "your-email@qq.com".to_string());
    let recipients = lookup("EMAIL_RECIPIENTS")
        .unwrap_or_else(|| sender.clone())
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();

    EmailSettings {
        enabled: true,
        smtp_server: lookup("EMAIL_SMTP_SERVER").unwrap_or_else(|| "smtp.qq.com".to_string()),
        smtp_port: port,
        sender_email: sender,
        recipients,
        use_ssl: lookup("EMAIL_USE_SSL").map_or(true, |v| v.eq_ignore_ascii_case("true")),
        use_tls: false,
        password: lookup("EMAIL_PASSWORD").filter(|p| !p.is_empty()),
        ..EmailSettings::default()
    }
}

/// Build and send the results email. Failures are logged, never raised;
/// returns whether the mail went out.
pub fn send_report_email<Tz: TimeZone>(
    summary: &TestSummary,
    lookup: Lookup<'_>,
    now: &DateTime<Tz>,
) -> bool
where
    Tz::Offset: std::fmt::Display,
{
    let ctx = EmailContext::collect(lookup, now);
    let subject = render_subject(summary, &ctx.generated_at);
    let html = render_body(summary, &ctx);
    let settings = smtp_settings(lookup);

    info!(
        server = %settings.smtp_server,
        port = settings.smtp_port,
        ssl = settings.use_ssl,
        sender = %settings.sender_email,
        recipients = %settings.recipients.join(", "),
        "sending report email"
    );

    let recipients = settings.recipients.clone();
    let result = EmailNotifier::new(settings)
        .and_then(|notifier| notifier.send_html(&subject, &html, &recipients));
    match result {
        Ok(()) => {
            info!("report email sent");
            true
        }
        Err(e) => {
            error!(error = %e, "report email failed");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn summary() -> TestSummary {
        TestSummary {
            total: 8,
            passed: 6,
            failed: 2,
            broken: 0,
            skipped: 0,
            unknown: 0,
            duration: 93.25,
        }
    }

    fn ctx(url: &str) -> EmailContext {
        EmailContext {
            generated_at: "2024-05-01 08:30:00".into(),
            public_url: url.into(),
            app_env: "test".into(),
            os: "linux x86_64".into(),
            runner_version: "0.4.0".into(),
        }
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_subject() {
            assert_eq!(
                render_subject(&summary(), "2024-05-01 08:30:00"),
                "【自动化测试】测试报告 [2024-05-01 08:30:00] - 通过率: 6/8"
            );
        }

        #[test]
        fn test_pass_rate() {
            assert_eq!(pass_rate(&summary()), "75.0%");
            assert_eq!(pass_rate(&TestSummary::default()), "N/A");
        }

        #[test]
        fn test_colours() {
            assert_eq!(count_color(2, "#dc3545"), "#dc3545");
            assert_eq!(count_color(0, "#dc3545"), "#888");
        }

        #[test]
        fn test_body_with_link() {
            let html = render_body(&summary(), &ctx("https://reports.test/allure-report/"));
            assert!(html.contains("93.2秒") || html.contains("93.3秒"));
            assert!(html.contains("75.0%"));
            assert!(html.contains("href=\"https://reports.test/allure-report/\""));
            assert!(html.contains("color: #dc3545;\"><h3>2</h3><span>失败"));
            assert!(html.contains("color: #888;\"><h3>0</h3><span>异常"));
            assert!(html.contains("linux x86_64"));
        }

        #[test]
        fn test_body_without_link() {
            let html = render_body(&summary(), &ctx(""));
            assert!(html.contains("报告未上传"));
            assert!(!html.contains("<a href"));
        }
    }

    mod settings_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let s = smtp_settings(&|_| None);
            assert_eq!(s.smtp_server, "smtp.qq.com");
            assert_eq!(s.smtp_port, 465);
            assert!(s.use_ssl && !s.use_tls && s.enabled);
            assert_eq!(s.recipients, vec!["your-email@qq.com"]);
            assert!(s.password.is_none());
        }

        #[test]
        fn test_from_env() {
            let env: HashMap<&str, &str> = [
                ("EMAIL_SMTP_PORT", "abc"),
                ("EMAIL_SENDER", "ci@corp.test"),
                ("EMAIL_RECIPIENTS", "a@corp.test, ,b@corp.test"),
                ("EMAIL_USE_SSL", "no"),
                ("EMAIL_PASSWORD", "pw"),
            ]
            .into_iter()
            .collect();
            let s = smtp_settings(&|k| env.get(k).map(|v| (*v).to_string()));
            assert_eq!(s.smtp_port, 465);
            assert!(!s.use_ssl);
            assert_eq!(s.recipients, vec!["a@corp.test", "b@corp.test"]);
            assert_eq!(s.password.as_deref(), Some("pw"));
        }

        #[test]
        fn test_recipients_default_to_sender() {
            let s = smtp_settings(&|k| (k == "EMAIL_SENDER").then(|| "qa@corp.test".to_string()));
            assert_eq!(s.recipients, vec!["qa@corp.test"]);
        }
    }
}

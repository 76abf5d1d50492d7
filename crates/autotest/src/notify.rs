//! Email notification of test results.
//!
//! Settings come from `notification.email.*` with `EMAIL_*` environment
//! overrides. The SMTP password is only ever read from `EMAIL_PASSWORD`.

use crate::config::ConfigManager;
use crate::result::{AutomationError, AutomationResult};
use chrono::Local;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Write as _};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Default subject; see [`render_subject`] for placeholders
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "测试报告: {status}";
/// Default body heading
pub const DEFAULT_BODY_TEMPLATE: &str = "测试执行结果";
/// Display name on outgoing mail
pub const SENDER_NAME: &str = "自动化测试框架";

/// SMTP and message settings
#[derive(Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub recipients: Vec<String>,
    /// Implicit TLS (usually port 465)
    pub use_ssl: bool,
    /// STARTTLS (usually port 587)
    pub use_tls: bool,
    pub subject_template: String,
    pub body_template: String,
    pub attach_report: bool,
    pub notify_on_failure: bool,
    /// From `EMAIL_PASSWORD` only
    pub password: Option<String>,
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("enabled", &self.enabled)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .field("sender_email", &self.sender_email)
            .field("recipients", &self.recipients)
            .field("use_ssl", &self.use_ssl)
            .field("use_tls", &self.use_tls)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: 0,
            sender_email: String::new(),
            recipients: Vec::new(),
            use_ssl: false,
            use_tls: false,
            subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
            body_template: DEFAULT_BODY_TEMPLATE.to_string(),
            attach_report: true,
            notify_on_failure: false,
            password: None,
        }
    }
}

fn truthy(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

impl EmailSettings {
    /// Read `notification.email.*` only
    #[must_use]
    pub fn from_config(config: &ConfigManager) -> Self {
        let d = Self::default();
        let key = |name: &str| format!("notification.email.{name}");

        let recipients = config
            .get_list(&key("recipients"), Vec::new())
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        let port = config.get_int(&key("smtp_port"), 0);

        Self {
            enabled: config.get_bool(&key("enabled"), d.enabled),
            smtp_server: config.get_str(&key("smtp_server"), ""),
            smtp_port: u16::try_from(port).unwrap_or_else(|_| {
                warn!(port, "smtp_port out of range");
                0
            }),
            sender_email: config.get_str(&key("sender_email"), ""),
            recipients,
            use_ssl: config.get_bool(&key("use_ssl"), d.use_ssl),
            use_tls: config.get_bool(&key("use_tls"), d.use_tls),
            subject_template: config.get_str(&key("subject_template"), &d.subject_template),
            body_template: config.get_str(&key("body_template"), &d.body_template),
            attach_report: config.get_bool(&key("attach_report"), d.attach_report),
            notify_on_failure: config.get_bool(&key("notify_on_failure"), d.notify_on_failure),
            password: None,
        }
    }

    /// Configuration plus process environment overrides, validated.
    ///
    /// # Errors
    ///
    /// See [`EmailSettings::validate`].
    pub fn load(config: &ConfigManager) -> AutomationResult<Self> {
        let mut settings = Self::from_config(config);
        settings.apply_env(&|name| std::env::var(name).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `EMAIL_*` overrides looked up through `lookup`
    pub fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("EMAIL_ENABLED") {
            self.enabled = truthy(&v);
        }
        if let Some(v) = lookup("EMAIL_SMTP_SERVER") {
            self.smtp_server = v;
        }
        if let Some(v) = lookup("EMAIL_SMTP_PORT").filter(|v| !v.is_empty()) {
            match v.trim().parse::<u16>() {
                Ok(port) => self.smtp_port = port,
                Err(_) => warn!(value = %v, "invalid EMAIL_SMTP_PORT, keeping configured port"),
            }
        }
        if let Some(v) = lookup("EMAIL_SENDER") {
            self.sender_email = v;
        }
        if let Some(v) = lookup("EMAIL_RECIPIENTS").filter(|v| !v.is_empty()) {
            self.recipients = v
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("EMAIL_USE_SSL") {
            self.use_ssl = truthy(&v);
        }
        if let Some(v) = lookup("EMAIL_USE_TLS") {
            self.use_tls = truthy(&v);
        }
        self.password = lookup("EMAIL_PASSWORD").filter(|p| !p.is_empty());
    }

    /// When enabled, server, port, sender and recipients must all be set.
    ///
    /// # Errors
    ///
    /// Returns `Notification` naming the first missing setting.
    pub fn validate(&self) -> AutomationResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let missing = if self.smtp_server.is_empty() {
            Some("SMTP server")
        } else if self.smtp_port == 0 {
            Some("SMTP port")
        } else if self.sender_email.is_empty() {
            Some("sender address")
        } else if self.recipients.is_empty() {
            Some("recipients")
        } else {
            None
        };
        match missing {
            Some(what) => Err(AutomationError::notification(format!(
                "email is enabled but {what} is not configured"
            ))),
            None => Ok(()),
        }
    }
}

/// Counts for one test run
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub broken: u64,
    pub skipped: u64,
    pub unknown: u64,
    /// Seconds
    pub duration: f64,
}

impl TestSummary {
    /// `通过` when nothing failed, else `失败`
    #[must_use]
    pub const fn status(&self) -> &'static str {
        if self.failed == 0 {
            "通过"
        } else {
            "失败"
        }
    }
}

/// A failing test for the email table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailedTest {
    pub name: String,
    pub error_message: String,
    pub error_trace: String,
}

/// Fill `{status}`, `{datetime}`, `{passed}`, `{failed}`, `{skipped}` and
/// `{total}` in `template`
#[must_use]
pub fn render_subject(template: &str, summary: &TestSummary, datetime: &str) -> String {
    template
        .replace("{status}", summary.status())
        .replace("{datetime}", datetime)
        .replace("{passed}", &summary.passed.to_string())
        .replace("{failed}", &summary.failed.to_string())
        .replace("{skipped}", &summary.skipped.to_string())
        .replace("{total}", &summary.total.to_string())
}

/// Minimal HTML escaping for text nodes
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const BODY_STYLE: &str = "body { font-family: Arial, sans-serif; margin: 20px; }
h2 { color: #333; }
.summary { background-color: #f5f5f5; padding: 15px; border-radius: 5px; margin-bottom: 20px; }
.passed { color: green; } .failed { color: red; } .skipped { color: orange; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #f2f2f2; }
.error-details { background-color: #fff8f8; border-left: 3px solid #d9534f; padding: 10px; margin-top: 5px; }";

/// Results email body: summary, failures (if any), environment
#[must_use]
pub fn render_results_body(
    heading: &str,
    summary: &TestSummary,
    failed_tests: &[FailedTest],
    datetime: &str,
) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<html><head><meta charset=\"utf-8\"><style>{BODY_STYLE}</style></head><body>\
         <h2>{}</h2>\
         <div class=\"summary\"><p>\
         <span class=\"passed\">通过: {}</span> | \
         <span class=\"failed\">失败: {}</span> | \
         <span class=\"skipped\">跳过: {}</span> | 总计: {}</p>\
         <p>执行时间: {}</p></div>",
        escape_html(heading),
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.total,
        datetime
    );

    if summary.failed > 0 && !failed_tests.is_empty() {
        html.push_str("<h3>失败测试用例详情</h3><table><tr><th>测试名称</th><th>失败原因</th></tr>");
        for test in failed_tests {
            let _ = write!(
                html,
                "<tr><td>{}</td><td>{}<div class=\"error-details\"><pre>{}</pre></div></td></tr>",
                escape_html(&test.name),
                escape_html(&test.error_message),
                escape_html(&test.error_trace)
            );
        }
        html.push_str("</table>");
    }

    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());
    let _ = write!(
        html,
        "<h3>环境信息</h3><ul><li>测试环境: {}</li><li>运行器版本: {}</li><li>平台: {}</li></ul>\
         </body></html>",
        escape_html(&env),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    );
    html
}

fn build_smtp(settings: &EmailSettings) -> AutomationResult<SmtpTransport> {
    let smtp_err = |e: lettre::transport::smtp::Error| {
        AutomationError::notification(format!("SMTP setup for {} failed: {e}", settings.smtp_server))
    };

    let builder = if settings.use_ssl {
        debug!(server = %settings.smtp_server, port = settings.smtp_port, "SMTP over implicit TLS");
        SmtpTransport::relay(&settings.smtp_server).map_err(smtp_err)?
    } else if settings.use_tls {
        debug!(server = %settings.smtp_server, port = settings.smtp_port, "SMTP with STARTTLS");
        SmtpTransport::starttls_relay(&settings.smtp_server).map_err(smtp_err)?
    } else {
        debug!(server = %settings.smtp_server, port = settings.smtp_port, "plain SMTP");
        SmtpTransport::builder_dangerous(&settings.smtp_server)
    }
    .port(settings.smtp_port);

    let builder = match &settings.password {
        Some(password) => {
            debug!(user = %settings.sender_email, "SMTP login");
            builder.credentials(Credentials::new(
                settings.sender_email.clone(),
                password.clone(),
            ))
        }
        None => {
            warn!("no SMTP password provided, sending without login");
            builder
        }
    };
    Ok(builder.build())
}

/// Sends mail through any `lettre` transport (SMTP by default)
pub struct EmailNotifier<T = SmtpTransport> {
    settings: EmailSettings,
    transport: T,
}

impl<T> fmt::Debug for EmailNotifier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailNotifier")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl EmailNotifier<SmtpTransport> {
    /// SMTP notifier for `settings`.
    ///
    /// # Errors
    ///
    /// Returns `Notification` for invalid settings or an unusable server name.
    pub fn new(settings: EmailSettings) -> AutomationResult<Self> {
        settings.validate()?;
        let transport = build_smtp(&settings)?;
        Ok(Self::with_transport(settings, transport))
    }

    /// Notifier from configuration and environment.
    ///
    /// # Errors
    ///
    /// See [`EmailNotifier::new`].
    pub fn from_config(config: &ConfigManager) -> AutomationResult<Self> {
        Self::new(EmailSettings::load(config).inspect_err(|e| {
            error!(error = %e, "failed to load email settings");
        })?)
    }
}

impl<T> EmailNotifier<T>
where
    T: Transport,
    T::Error: Display,
{
    /// Notifier over an explicit transport
    pub const fn with_transport(settings: EmailSettings, transport: T) -> Self {
        Self {
            settings,
            transport,
        }
    }

    /// Active settings
    pub const fn settings(&self) -> &EmailSettings {
        &self.settings
    }

    /// The transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    fn sender(&self) -> AutomationResult<Mailbox> {
        let address = self.settings.sender_email.parse().map_err(|e| {
            AutomationError::notification(format!(
                "invalid sender address '{}': {e}",
                self.settings.sender_email
            ))
        })?;
        Ok(Mailbox::new(Some(SENDER_NAME.to_string()), address))
    }

    fn message(
        &self,
        subject: &str,
        recipients: &[String],
        body: MultiPart,
    ) -> AutomationResult<Message> {
        if recipients.is_empty() {
            return Err(AutomationError::notification("no recipients"));
        }
        let mut builder = Message::builder().from(self.sender()?).subject(subject);
        for recipient in recipients {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                AutomationError::notification(format!("invalid recipient '{recipient}': {e}"))
            })?;
            builder = builder.to(mailbox);
        }
        builder
            .multipart(body)
            .map_err(|e| AutomationError::notification(format!("cannot build message: {e}")))
    }

    fn deliver(&self, message: &Message, recipients: &[String]) -> AutomationResult<()> {
        info!(recipients = %recipients.join(", "), "sending email");
        self.transport.send(message).map_err(|e| {
            error!(error = %e, "email delivery failed");
            AutomationError::notification(format!("email delivery failed: {e}"))
        })?;
        info!("email sent");
        Ok(())
    }

    /// Send one HTML message.
    ///
    /// # Errors
    ///
    /// Returns `Notification` for bad addresses or a delivery failure.
    pub fn send_html(&self, subject: &str, html: &str, recipients: &[String]) -> AutomationResult<()> {
        let body = MultiPart::alternative().singlepart(SinglePart::html(html.to_string()));
        let message = self.message(subject, recipients, body)?;
        self.deliver(&message, recipients)
    }

    /// Send the results email to the configured recipients. Returns `false`
    /// without sending when notification is disabled.
    ///
    /// # Errors
    ///
    /// Returns `Notification` for bad addresses, an unreadable report, or a
    /// delivery failure.
    pub fn send_test_results(
        &self,
        summary: &TestSummary,
        report_path: Option<&Path>,
        failed_tests: &[FailedTest],
    ) -> AutomationResult<bool> {
        if !self.settings.enabled {
            info!("email notification disabled");
            return Ok(false);
        }

        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let subject = render_subject(&self.settings.subject_template, summary, &now);
        let html = render_results_body(&self.settings.body_template, summary, failed_tests, &now);

        let mut body = MultiPart::mixed().singlepart(SinglePart::html(html));
        if let Some(path) = report_path.filter(|p| self.settings.attach_report && p.is_file()) {
            debug!(path = %path.display(), "attaching report");
            let content = std::fs::read(path).map_err(|e| {
                AutomationError::notification(format!("cannot read report {}: {e}", path.display()))
            })?;
            let name = path
                .file_name()
                .map_or_else(|| "report".to_string(), |n| n.to_string_lossy().into_owned());
            let content_type = ContentType::parse("application/octet-stream")
                .map_err(|e| AutomationError::notification(e.to_string()))?;
            body = body.singlepart(Attachment::new(name).body(content, content_type));
        }

        let recipients = self.settings.recipients.clone();
        let message = self.message(&subject, &recipients, body)?;
        self.deliver(&message, &recipients)?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lettre::transport::stub::StubTransport;
    use std::collections::HashMap;

    fn enabled() -> EmailSettings {
        EmailSettings {
            enabled: true,
            smtp_server: "smtp.qq.test".into(),
            smtp_port: 465,
            sender_email: "qa@qq.test".into(),
            recipients: vec!["dev1@corp.test".into(), "dev2@corp.test".into()],
            use_ssl: true,
            ..EmailSettings::default()
        }
    }

    fn summary(failed: u64) -> TestSummary {
        TestSummary {
            total: 10,
            passed: 10 - failed,
            failed,
            ..TestSummary::default()
        }
    }

    mod settings_tests {
        use super::*;

        #[test]
        fn test_from_config() {
            let mut config = ConfigManager::empty();
            config.set("notification.email.enabled", true);
            config.set("notification.email.smtp_server", "smtp.corp.test");
            config.set("notification.email.smtp_port", 587);
            config.set("notification.email.sender_email", "qa@corp.test");
            config.set("notification.email.recipients", serde_json::json!(["a@corp.test"]));
            config.set("notification.email.use_tls", true);

            let s = EmailSettings::from_config(&config);
            assert!(s.enabled && s.use_tls && !s.use_ssl);
            assert_eq!(s.smtp_port, 587);
            assert_eq!(s.recipients, vec!["a@corp.test".to_string()]);
            assert_eq!(s.subject_template, DEFAULT_SUBJECT_TEMPLATE);
            assert!(s.attach_report);
            s.validate().unwrap();
        }

        #[test]
        fn test_env_overrides() {
            let env: HashMap<&str, &str> = [
                ("EMAIL_ENABLED", "yes"),
                ("EMAIL_SMTP_SERVER", "smtp.env.test"),
                ("EMAIL_SMTP_PORT", "not-a-port"),
                ("EMAIL_SENDER", "env@corp.test"),
                ("EMAIL_RECIPIENTS", " a@corp.test, b@corp.test ,"),
                ("EMAIL_USE_SSL", "0"),
                ("EMAIL_PASSWORD", "auth-code"),
            ]
            .into_iter()
            .collect();

            let mut s = EmailSettings {
                smtp_port: 25,
                use_ssl: true,
                ..EmailSettings::default()
            };
            s.apply_env(&|k| env.get(k).map(|v| (*v).to_string()));

            assert!(s.enabled);
            assert_eq!(s.smtp_server, "smtp.env.test");
            assert_eq!(s.smtp_port, 25);
            assert_eq!(s.sender_email, "env@corp.test");
            assert_eq!(s.recipients, vec!["a@corp.test", "b@corp.test"]);
            assert!(!s.use_ssl);
            assert_eq!(s.password.as_deref(), Some("auth-code"));
            assert!(!format!("{s:?}").contains("auth-code"));
        }

        #[test]
        fn test_validate_only_when_enabled() {
            EmailSettings::default().validate().unwrap();
            let mut s = enabled();
            s.recipients.clear();
            let err = s.validate().unwrap_err();
            assert!(err.to_string().contains("recipients"));
            s = enabled();
            s.smtp_port = 0;
            assert!(s.validate().unwrap_err().to_string().contains("SMTP port"));
        }
    }

    mod render_tests {
        use super::*;

        #[test]
        fn test_subject_placeholders() {
            let subject = render_subject(
                "[{status}] {passed}/{total} passed, {failed} failed, {skipped} skipped @ {datetime}",
                &summary(2),
                "2024-05-01 10:00:00",
            );
            assert_eq!(
                subject,
                "[失败] 8/10 passed, 2 failed, 0 skipped @ 2024-05-01 10:00:00"
            );
            assert_eq!(render_subject(DEFAULT_SUBJECT_TEMPLATE, &summary(0), ""), "测试报告: 通过");
        }

        #[test]
        fn test_body_lists_failures_escaped() {
            let failures = [FailedTest {
                name: "test_login[<admin>]".into(),
                error_message: "expected 'ok'".into(),
                error_trace: "AssertionError".into(),
            }];
            let html = render_results_body("结果", &summary(1), &failures, "now");
            assert!(html.contains("失败测试用例详情"));
            assert!(html.contains("test_login[&lt;admin&gt;]"));
            assert!(html.contains("expected &#39;ok&#39;"));
            assert!(html.contains("环境信息"));

            let clean = render_results_body("结果", &summary(0), &failures, "now");
            assert!(!clean.contains("失败测试用例详情"));
        }
    }

    mod send_tests {
        use super::*;

        #[test]
        fn test_disabled_sends_nothing() {
            let notifier = EmailNotifier::with_transport(EmailSettings::default(), StubTransport::new_ok());
            assert!(!notifier.send_test_results(&summary(0), None, &[]).unwrap());
            assert!(notifier.transport().messages().is_empty());
        }

        #[test]
        fn test_results_with_attachment() {
            let dir = tempfile::tempdir().unwrap();
            let report = dir.path().join("report.html");
            std::fs::write(&report, "<html>report</html>").unwrap();

            let notifier = EmailNotifier::with_transport(enabled(), StubTransport::new_ok());
            assert!(notifier
                .send_test_results(&summary(0), Some(&report), &[])
                .unwrap());

            let messages = notifier.transport().messages();
            assert_eq!(messages.len(), 1);
            let (envelope, raw) = &messages[0];
            assert_eq!(envelope.to().len(), 2);
            assert!(raw.contains("report.html"));
        }

        #[test]
        fn test_missing_report_is_skipped() {
            let notifier = EmailNotifier::with_transport(enabled(), StubTransport::new_ok());
            let missing = Path::new("/nonexistent/report.html");
            assert!(notifier
                .send_test_results(&summary(1), Some(missing), &[])
                .unwrap());
            let (_, raw) = &notifier.transport().messages()[0];
            assert!(!raw.contains("report.html"));
        }

        #[test]
        fn test_send_html_errors() {
            let notifier = EmailNotifier::with_transport(enabled(), StubTransport::new_error());
            let err = notifier
                .send_html("s", "<p>x</p>", &["ops@corp.test".to_string()])
                .unwrap_err();
            assert!(matches!(err, AutomationError::Notification { .. }));

            let ok = EmailNotifier::with_transport(enabled(), StubTransport::new_ok());
            assert!(ok.send_html("s", "<p>x</p>", &[]).is_err());
            assert!(ok.send_html("s", "<p>x</p>", &["not an address".to_string()]).is_err());
        }

        #[test]
        fn test_smtp_notifier_builds() {
            let notifier = EmailNotifier::new(enabled()).unwrap();
            assert_eq!(notifier.settings().smtp_port, 465);
            let mut bad = enabled();
            bad.sender_email.clear();
            assert!(EmailNotifier::new(bad).is_err());
        }
    }
}

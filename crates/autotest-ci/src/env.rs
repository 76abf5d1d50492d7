//! Environment preparation.
//!
//! Loads `.env` and makes sure the email variables the notifier needs are
//! present.

use tracing::{debug, warn};

/// Defaults filled in for unset email variables
pub const EMAIL_DEFAULTS: [(&str, &str); 6] = [
    ("EMAIL_SMTP_SERVER", "smtp.qq.com"),
    ("EMAIL_SMTP_PORT", "465"),
    ("EMAIL_SENDER", "your-email@qq.com"),
    ("EMAIL_PASSWORD", "your-password-or-auth-code"),
    ("EMAIL_RECIPIENTS", "your-email@qq.com"),
    ("EMAIL_USE_SSL", "true"),
];

/// Variable lookup, so callers can substitute the process environment
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Process environment lookup
#[must_use]
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Email defaults whose variable is unset
#[must_use]
pub fn missing_email_defaults(lookup: Lookup<'_>) -> Vec<(&'static str, &'static str)> {
    EMAIL_DEFAULTS
        .iter()
        .copied()
        .filter(|(key, _)| lookup(key).is_none())
        .collect()
}

/// Load `.env` (if any), then fill in unset email variables.
///
/// Returns the names that were defaulted.
pub fn prepare_env() -> Vec<&'static str> {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => debug!("no .env file"),
        Err(e) => warn!(error = %e, "failed to load .env"),
    }

    let missing = missing_email_defaults(&process_env);
    for (key, value) in &missing {
        warn!(variable = key, default = value, "environment variable not set, using default");
        std::env::set_var(key, value);
    }
    missing.into_iter().map(|(key, _)| key).collect()
}

/// `{OS} {ARCH}` of the running machine
#[must_use]
pub fn os_info() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Version of this binary
#[must_use]
pub const fn runner_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

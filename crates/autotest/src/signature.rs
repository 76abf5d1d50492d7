//! MD5 request signing for the payment gateway.
//!
//! ```text
//! stringA        = k1=v1&k2=v2...        (sorted by key, empty values dropped)
//! stringSignTemp = stringA&key=SECRET
//! sign           = UPPER(HEX(MD5(stringSignTemp)))
//! ```

use crate::result::{AutomationError, AutomationResult};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Keys that never take part in the signature
pub const EXCLUDED_KEYS: [&str; 3] = ["sign", "key", "appKey"];

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// The string that gets hashed, before the secret is appended
#[must_use]
pub fn signing_string(params: &BTreeMap<String, Value>) -> String {
    params
        .iter()
        .filter(|(k, _)| !EXCLUDED_KEYS.contains(&k.as_str()))
        .filter_map(|(k, v)| render(v).map(|v| format!("{k}={v}")))
        .collect::<Vec<_>>()
        .join("&")
}

/// Uppercase hex MD5 signature of `params` under `secret`.
///
/// Null and empty-string values are skipped, as are `sign`, `key` and
/// `appKey`. Strings are used as-is; other values as JSON text.
///
/// # Errors
///
/// Returns `InvalidArgument` if `secret` is empty.
pub fn md5_sign(params: &BTreeMap<String, Value>, secret: &str) -> AutomationResult<String> {
    if secret.is_empty() {
        return Err(AutomationError::invalid_argument("signing secret must not be empty"));
    }
    let string_a = signing_string(params);
    debug!(string_a = %string_a, "signing parameters");

    let digest = md5::compute(format!("{string_a}&key={secret}").as_bytes());
    Ok(format!("{digest:X}"))
}

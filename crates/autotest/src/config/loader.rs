//! Configuration sources: YAML/JSON files and prefixed environment variables.

use super::insert_path;
use crate::result::{AutomationError, AutomationResult};
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::path::Path;
use std::sync::OnceLock;
use tracing::warn;

/// Prefix of environment variables read into configuration
pub const DEFAULT_ENV_PREFIX: &str = "APP_";

/// A file format the manager can read
pub trait ConfigLoader: Debug + Send + Sync {
    /// Whether this loader handles `path` (by extension)
    fn supports(&self, path: &Path) -> bool;

    /// Parse `path` into an object. An empty file yields an empty object.
    ///
    /// # Errors
    ///
    /// Returns `ConfigFile` if the file cannot be read, does not parse, or
    /// its top level is not a mapping.
    fn load(&self, path: &Path) -> AutomationResult<Value>;
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn file_error(path: &Path, message: impl Into<String>) -> AutomationError {
    AutomationError::ConfigFile {
        path: path.display().to_string(),
        message: message.into(),
    }
}

fn read_source(path: &Path) -> AutomationResult<String> {
    std::fs::read_to_string(path).map_err(|e| file_error(path, e.to_string()))
}

fn into_mapping(path: &Path, value: Value) -> AutomationResult<Value> {
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(_) => Ok(value),
        other => Err(file_error(
            path,
            format!("top level must be a mapping, found {}", type_name(&other)),
        )),
    }
}

pub(super) const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// `.yaml` / `.yml`
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlLoader;

impl ConfigLoader for YamlLoader {
    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["yaml", "yml"])
    }

    fn load(&self, path: &Path) -> AutomationResult<Value> {
        let source = read_source(path)?;
        if source.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        let value: Value =
            serde_yaml_ng::from_str(&source).map_err(|e| file_error(path, e.to_string()))?;
        into_mapping(path, value)
    }
}

/// `.json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLoader;

impl ConfigLoader for JsonLoader {
    fn supports(&self, path: &Path) -> bool {
        has_extension(path, &["json"])
    }

    fn load(&self, path: &Path) -> AutomationResult<Value> {
        let source = read_source(path)?;
        if source.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        let value: Value =
            serde_json::from_str(&source).map_err(|e| file_error(path, e.to_string()))?;
        into_mapping(path, value)
    }
}

/// Reads `PREFIX_*` environment variables.
///
/// `APP_LOG__LEVEL=DEBUG` becomes `{"log": {"level": "DEBUG"}}`: the prefix
/// is stripped, the rest lowercased, and `__` separates nesting levels.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_ENV_PREFIX)
    }
}

impl EnvLoader {
    /// Loader for variables starting with `prefix`
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The variable prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Read the process environment
    #[must_use]
    pub fn load(&self) -> Value {
        self.load_from(std::env::vars())
    }

    /// Read from an explicit set of variables
    pub fn load_from<I, K, V>(&self, vars: I) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut root = Value::Object(Map::new());
        for (key, value) in vars {
            let Some(rest) = key.as_ref().strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            let rest = rest.to_lowercase();
            let segments: Vec<&str> = rest.split("__").filter(|s| !s.is_empty()).collect();
            if segments.is_empty() {
                continue;
            }
            insert_path(&mut root, &segments, convert_env_value(value.as_ref()));
        }
        root
    }
}

/// Convert an environment string to the most specific JSON value:
/// bool words, then integer, float, bracketed JSON, and finally the raw string.
#[must_use]
pub fn convert_env_value(raw: &str) -> Value {
    match raw.to_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => return Value::Bool(true),
        "false" | "no" | "0" | "off" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    let bracketed = (raw.starts_with('{') && raw.ends_with('}'))
        || (raw.starts_with('[') && raw.ends_with(']'));
    if bracketed {
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            return parsed;
        }
    }
    Value::String(raw.to_string())
}

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)(?::([^}]*))?\}").unwrap()
    })
}

/// Resolve `${env:VAR}` and `${env:VAR:default}` in every string of `value`
/// against the process environment.
pub fn interpolate(value: &mut Value) {
    interpolate_with(value, &|name| std::env::var(name).ok());
}

/// Resolve placeholders using `lookup`. A variable that is unset and has no
/// default becomes the empty string.
pub fn interpolate_with(value: &mut Value, lookup: &dyn Fn(&str) -> Option<String>) {
    match value {
        Value::String(s) if s.contains("${env:") => {
            let replaced = placeholder().replace_all(s, |caps: &Captures<'_>| {
                let name = &caps[1];
                lookup(name)
                    .or_else(|| caps.get(2).map(|d| d.as_str().to_string()))
                    .unwrap_or_else(|| {
                        warn!(variable = name, "environment variable not set");
                        String::new()
                    })
            });
            *s = replaced.into_owned();
        }
        Value::Array(items) => {
            for item in items {
                interpolate_with(item, lookup);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                interpolate_with(item, lookup);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    mod file_loader_tests {
        use super::*;

        #[test]
        fn test_yaml_loads_mapping() {
            let dir = tempfile::tempdir().unwrap();
            let path = write(
                dir.path(),
                "settings.yaml",
                "web:\n  browser:\n    type: chromium\n    headless: true\n  base_url: https://omp.test\n",
            );
            let value = YamlLoader.load(&path).unwrap();
            assert_eq!(value["web"]["browser"]["headless"], json!(true));
            assert_eq!(value["web"]["base_url"], json!("https://omp.test"));
        }

        #[test]
        fn test_empty_files_are_empty_mappings() {
            let dir = tempfile::tempdir().unwrap();
            let yaml = write(dir.path(), "empty.yml", "  \n");
            let json = write(dir.path(), "empty.json", "");
            assert_eq!(YamlLoader.load(&yaml).unwrap(), json!({}));
            assert_eq!(JsonLoader.load(&json).unwrap(), json!({}));
        }

        #[test]
        fn test_non_mapping_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let path = write(dir.path(), "list.yaml", "- a\n- b\n");
            let err = YamlLoader.load(&path).unwrap_err();
            assert!(err.to_string().contains("mapping"));
        }

        #[test]
        fn test_parse_error_is_config_file_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = write(dir.path(), "broken.json", "{\"a\": ");
            let err = JsonLoader.load(&path).unwrap_err();
            assert!(matches!(err, AutomationError::ConfigFile { .. }));
        }

        #[test]
        fn test_supports_by_extension() {
            assert!(YamlLoader.supports(Path::new("a/settings.YAML")));
            assert!(YamlLoader.supports(Path::new("local.yml")));
            assert!(!YamlLoader.supports(Path::new("settings.toml")));
            assert!(JsonLoader.supports(Path::new("x.json")));
            assert!(!JsonLoader.supports(Path::new("json")));
        }
    }

    mod env_loader_tests {
        use super::*;

        #[test]
        fn test_prefix_nesting_and_conversion() {
            let vars = [
                ("APP_LOG__LEVEL", "DEBUG"),
                ("APP_WEB__BROWSER__HEADLESS", "off"),
                ("APP_WAIT__TIMEOUT", "2.5"),
                ("APP_RETRIES", "3"),
                ("APP_HOSTS", r#"["a","b"]"#),
                ("OTHER_VALUE", "ignored"),
            ];
            let value = EnvLoader::default().load_from(vars);
            assert_eq!(
                value,
                json!({
                    "log": {"level": "DEBUG"},
                    "web": {"browser": {"headless": false}},
                    "wait": {"timeout": 2.5},
                    "retries": 3,
                    "hosts": ["a", "b"]
                })
            );
        }

        #[test]
        fn test_custom_prefix() {
            let loader = EnvLoader::new("QA_");
            assert_eq!(loader.prefix(), "QA_");
            let value = loader.load_from([("QA_ENV", "staging"), ("APP_ENV", "dev")]);
            assert_eq!(value, json!({"env": "staging"}));
        }

        #[test]
        fn test_convert_env_value_order() {
            assert_eq!(convert_env_value("Yes"), json!(true));
            assert_eq!(convert_env_value("1"), json!(true));
            assert_eq!(convert_env_value("0"), json!(false));
            assert_eq!(convert_env_value("42"), json!(42));
            assert_eq!(convert_env_value("-7"), json!(-7));
            assert_eq!(convert_env_value("0.5"), json!(0.5));
            assert_eq!(convert_env_value(r#"{"a": 1}"#), json!({"a": 1}));
            assert_eq!(convert_env_value("[broken"), json!("[broken"));
            assert_eq!(convert_env_value("{not json}"), json!("{not json}"));
            assert_eq!(convert_env_value("hello"), json!("hello"));
        }
    }

    mod interpolation_tests {
        use super::*;

        fn lookup(name: &str) -> Option<String> {
            match name {
                "DB_HOST" => Some("db.internal".to_string()),
                "DB_PORT" => Some("5432".to_string()),
                _ => None,
            }
        }

        #[test]
        fn test_resolves_nested_strings() {
            let mut value = json!({
                "db": {"url": "postgres://${env:DB_HOST}:${env:DB_PORT}/qa"},
                "hosts": ["${env:DB_HOST}", 1]
            });
            interpolate_with(&mut value, &lookup);
            assert_eq!(value["db"]["url"], json!("postgres://db.internal:5432/qa"));
            assert_eq!(value["hosts"], json!(["db.internal", 1]));
        }

        #[test]
        fn test_default_and_missing() {
            let mut value = json!({
                "a": "${env:MISSING_VAR:fallback}",
                "b": "x-${env:MISSING_VAR}-y",
                "c": "${env:DB_HOST:unused}"
            });
            interpolate_with(&mut value, &lookup);
            assert_eq!(value, json!({"a": "fallback", "b": "x--y", "c": "db.internal"}));
        }

        #[test]
        fn test_plain_strings_untouched() {
            let mut value = json!({"a": "$HOME", "b": "${other:X}"});
            interpolate_with(&mut value, &lookup);
            assert_eq!(value, json!({"a": "$HOME", "b": "${other:X}"}));
        }
    }
}

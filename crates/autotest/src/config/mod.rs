//! Layered Configuration
//!
//! Settings come from several sources merged in a fixed order, each one
//! overriding the previous:
//!
//! 1. `Default`: `config/settings.yaml`
//! 2. `Environment`: `config/env/{APP_ENV}.yaml`
//! 3. `Test`: values set programmatically with [`ConfigManager::set`]
//! 4. `Local`: `config/local.yaml` (developer overrides, usually untracked)
//! 5. `EnvVar`: `APP_*` environment variables
//!
//! Values are held as [`serde_json::Value`] and read back with dot paths such
//! as `web.browser.headless` or `api.hosts.0`.

mod loader;
mod manager;

pub mod global;

pub use loader::{
    convert_env_value, interpolate, interpolate_with, ConfigLoader, EnvLoader, JsonLoader,
    YamlLoader, DEFAULT_ENV_PREFIX,
};
pub use manager::{
    ConfigManager, ConfigOptions, DEFAULT_CONFIG_FILE, DEFAULT_ENV, ENV_CONFIG_DIR,
    LOCAL_CONFIG_FILE,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Configuration source, in merge order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigLevel {
    /// Shipped defaults
    Default,
    /// Per-environment file
    Environment,
    /// Values set by test code
    Test,
    /// Developer-local overrides
    Local,
    /// Process environment
    EnvVar,
}

impl ConfigLevel {
    /// All levels, lowest priority first
    pub const ALL: [Self; 5] = [
        Self::Default,
        Self::Environment,
        Self::Test,
        Self::Local,
        Self::EnvVar,
    ];

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Environment => "environment",
            Self::Test => "test",
            Self::Local => "local",
            Self::EnvVar => "env_var",
        }
    }
}

impl fmt::Display for ConfigLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merge `source` into `destination`.
///
/// Objects merge key by key, recursively. Anything else in `source`
/// (arrays, scalars, null) replaces what `destination` held.
pub fn deep_merge(source: &Value, destination: &mut Value) {
    match (source, destination) {
        (Value::Object(src), Value::Object(dst)) => {
            for (key, value) in src {
                match dst.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(value, existing);
                    }
                    Some(existing) => *existing = value.clone(),
                    None => {
                        let _ = dst.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (src, dst) => *dst = src.clone(),
    }
}

/// Write `value` at `segments` below `root`, creating objects on the way.
/// Non-object intermediates are replaced.
pub(crate) fn insert_path(root: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let _ = map.insert((*last).to_string(), value);
    }
}

/// Look up a dot path. Numeric segments index into arrays.
pub(crate) fn lookup_path<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

//! The layered configuration manager.

use super::loader::{interpolate, type_name, ConfigLoader, EnvLoader, JsonLoader, YamlLoader};
use super::{deep_merge, insert_path, lookup_path, ConfigLevel, DEFAULT_ENV_PREFIX};
use crate::result::{AutomationError, AutomationResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Base settings file, relative to the config dir
pub const DEFAULT_CONFIG_FILE: &str = "settings.yaml";
/// Directory of per-environment files
pub const ENV_CONFIG_DIR: &str = "env";
/// Local override file
pub const LOCAL_CONFIG_FILE: &str = "local.yaml";
/// Environment used when `APP_ENV` is unset
pub const DEFAULT_ENV: &str = "dev";

/// How a [`ConfigManager`] finds its sources
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    /// Config directory; falls back to `CONFIG_DIR`, then `./config`
    pub config_dir: Option<PathBuf>,
    /// Environment name; falls back to `APP_ENV`, then `dev`
    pub env: Option<String>,
    /// Prefix of environment variables read into the `EnvVar` layer
    pub env_prefix: String,
    /// Read `PREFIX_*` variables at all
    pub load_env_vars: bool,
    /// Fail instead of warning when the environment file is missing
    pub raise_on_missing_env: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_dir: None,
            env: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            load_env_vars: true,
            raise_on_missing_env: false,
        }
    }
}

impl ConfigOptions {
    /// Defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read files from `dir`
    #[must_use]
    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    /// Load `env/{name}.yaml`
    #[must_use]
    pub fn env(mut self, name: impl Into<String>) -> Self {
        self.env = Some(name.into());
        self
    }

    /// Variable prefix for the `EnvVar` layer
    #[must_use]
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip the `EnvVar` layer
    #[must_use]
    pub const fn without_env_vars(mut self) -> Self {
        self.load_env_vars = false;
        self
    }

    /// Make a missing environment file an error
    #[must_use]
    pub const fn raise_on_missing_env(mut self, raise: bool) -> Self {
        self.raise_on_missing_env = raise;
        self
    }

    fn resolve_dir(&self) -> PathBuf {
        self.config_dir
            .clone()
            .or_else(|| std::env::var_os("CONFIG_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config"))
    }

    fn resolve_env(&self) -> String {
        self.env
            .clone()
            .or_else(|| std::env::var("APP_ENV").ok())
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENV.to_string())
            .to_lowercase()
    }
}

/// Layered configuration.
///
/// Each [`ConfigLevel`] holds its own object; lookups read the merged view,
/// rebuilt whenever a layer changes.
pub struct ConfigManager {
    options: ConfigOptions,
    config_dir: PathBuf,
    loaders: Vec<Box<dyn ConfigLoader>>,
    layers: BTreeMap<ConfigLevel, Value>,
    merged: Value,
}

impl fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigManager")
            .field("config_dir", &self.config_dir)
            .field("env", &self.options.env)
            .field("levels", &self.layers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::empty()
    }
}

impl ConfigManager {
    /// A manager with no layers loaded
    #[must_use]
    pub fn empty() -> Self {
        Self::unloaded(ConfigOptions::default().without_env_vars())
    }

    fn unloaded(options: ConfigOptions) -> Self {
        Self {
            config_dir: options.resolve_dir(),
            options,
            loaders: vec![Box::new(YamlLoader), Box::new(JsonLoader)],
            layers: BTreeMap::new(),
            merged: Value::Object(Map::new()),
        }
    }

    /// Create a manager and load every source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigFile` only when `raise_on_missing_env` is set and the
    /// environment file does not exist. Other unreadable files are logged and
    /// skipped.
    pub fn new(options: ConfigOptions) -> AutomationResult<Self> {
        let mut manager = Self::unloaded(options);
        manager.load()?;
        Ok(manager)
    }

    /// Add a loader for another file format
    pub fn register_loader(&mut self, loader: Box<dyn ConfigLoader>) {
        self.loaders.push(loader);
    }

    /// Directory files are read from
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Active environment name
    #[must_use]
    pub fn env_name(&self) -> String {
        self.options.resolve_env()
    }

    /// Load settings, environment and local files plus environment variables.
    ///
    /// # Errors
    ///
    /// See [`ConfigManager::new`].
    pub fn load(&mut self) -> AutomationResult<()> {
        let env = self.env_name();
        info!(dir = %self.config_dir.display(), env = %env, "loading configuration");

        let sources = [
            (self.config_dir.join(DEFAULT_CONFIG_FILE), ConfigLevel::Default),
            (
                self.config_dir.join(ENV_CONFIG_DIR).join(format!("{env}.yaml")),
                ConfigLevel::Environment,
            ),
            (self.config_dir.join(LOCAL_CONFIG_FILE), ConfigLevel::Local),
        ];
        for (path, level) in &sources {
            let _ = self.load_file(path, *level)?;
        }

        if self.options.load_env_vars {
            let vars = EnvLoader::new(self.options.env_prefix.clone()).load();
            if vars.as_object().is_some_and(|m| !m.is_empty()) {
                let _ = self.layers.insert(ConfigLevel::EnvVar, vars);
            }
        }

        self.merge();
        Ok(())
    }

    /// Drop every layer and load again
    ///
    /// # Errors
    ///
    /// See [`ConfigManager::new`].
    pub fn reload(&mut self) -> AutomationResult<()> {
        self.layers.clear();
        self.load()
    }

    /// Merge one file into `level`. Returns whether anything was loaded.
    ///
    /// # Errors
    ///
    /// Returns `ConfigFile` for a missing environment file when
    /// `raise_on_missing_env` is set. Other problems are logged.
    pub fn load_file(&mut self, path: &Path, level: ConfigLevel) -> AutomationResult<bool> {
        if !path.exists() {
            match level {
                ConfigLevel::Local => debug!(path = %path.display(), "no local config file"),
                ConfigLevel::Environment if self.options.raise_on_missing_env => {
                    return Err(AutomationError::ConfigFile {
                        path: path.display().to_string(),
                        message: "environment config file not found".to_string(),
                    });
                }
                _ => warn!(path = %path.display(), %level, "config file not found"),
            }
            return Ok(false);
        }

        let Some(loader) = self.loaders.iter().find(|l| l.supports(path)) else {
            warn!(path = %path.display(), "unsupported config file type");
            return Ok(false);
        };

        let value = match loader.load(path) {
            Ok(value) => value,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load config file");
                return Ok(false);
            }
        };

        if value.as_object().is_some_and(Map::is_empty) {
            debug!(path = %path.display(), "config file is empty");
            return Ok(false);
        }

        let layer = self
            .layers
            .entry(level)
            .or_insert_with(|| Value::Object(Map::new()));
        deep_merge(&value, layer);
        debug!(path = %path.display(), %level, "loaded config file");
        self.merge();
        Ok(true)
    }

    fn merge(&mut self) {
        let mut merged = Value::Object(Map::new());
        for layer in self.layers.values() {
            deep_merge(layer, &mut merged);
        }
        interpolate(&mut merged);
        self.merged = merged;
    }

    /// Raw contents of one layer
    #[must_use]
    pub fn level(&self, level: ConfigLevel) -> Option<&Value> {
        self.layers.get(&level)
    }

    /// Empty one layer
    pub fn clear_level(&mut self, level: ConfigLevel) {
        if self.layers.remove(&level).is_some() {
            debug!(%level, "cleared config level");
        }
        self.merge();
    }

    /// Set `path` in the `Test` layer
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        let segments: Vec<&str> = path.split('.').collect();
        let layer = self
            .layers
            .entry(ConfigLevel::Test)
            .or_insert_with(|| Value::Object(Map::new()));
        insert_path(layer, &segments, value.into());
        self.merge();
    }

    /// Value at a dot path
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.merged, path)
    }

    /// Whether `path` resolves to a value
    #[must_use]
    pub fn is_set(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// The merged configuration
    #[must_use]
    pub const fn get_all(&self) -> &Value {
        &self.merged
    }

    fn mismatch(path: &str, expected: &str, found: &Value) {
        warn!(
            key = path,
            expected,
            found = type_name(found),
            "config value has wrong type, using default"
        );
    }

    /// String at `path`; non-strings are rendered as text
    #[must_use]
    pub fn get_str(&self, path: &str, default: &str) -> String {
        match self.get(path) {
            None | Some(Value::Null) => default.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Integer at `path`; digit strings are parsed
    #[must_use]
    pub fn get_int(&self, path: &str, default: i64) -> i64 {
        match self.get(path) {
            None | Some(Value::Null) => default,
            Some(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap_or(default),
            Some(Value::String(s)) if s.trim().parse::<i64>().is_ok() => {
                s.trim().parse().unwrap_or(default)
            }
            Some(other) => {
                Self::mismatch(path, "int", other);
                default
            }
        }
    }

    /// Float at `path`; integers and numeric strings are accepted
    #[must_use]
    pub fn get_float(&self, path: &str, default: f64) -> f64 {
        match self.get(path) {
            None | Some(Value::Null) => default,
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                Self::mismatch(path, "float", &Value::String(s.clone()));
                default
            }),
            Some(other) => {
                Self::mismatch(path, "float", other);
                default
            }
        }
    }

    /// Bool at `path`; `true/yes/1`, `false/no/0` and the integers 0/1 are
    /// accepted
    #[must_use]
    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        match self.get(path) {
            None | Some(Value::Null) => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => {
                    Self::mismatch(path, "bool", &Value::String(s.clone()));
                    default
                }
            },
            Some(Value::Number(n)) if n.as_i64() == Some(1) => true,
            Some(Value::Number(n)) if n.as_i64() == Some(0) => false,
            Some(other) => {
                Self::mismatch(path, "bool", other);
                default
            }
        }
    }

    /// List at `path`
    #[must_use]
    pub fn get_list(&self, path: &str, default: Vec<Value>) -> Vec<Value> {
        match self.get(path) {
            None | Some(Value::Null) => default,
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                Self::mismatch(path, "list", other);
                default
            }
        }
    }

    /// Mapping at `path`; empty when missing or not a mapping
    #[must_use]
    pub fn get_dict(&self, path: &str) -> Map<String, Value> {
        match self.get(path) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                Self::mismatch(path, "mapping", other);
                Map::new()
            }
        }
    }

    /// Required string at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigKey` when missing or empty and `ConfigType` when the
    /// value is not a string.
    pub fn require_str(&self, path: &str) -> AutomationResult<String> {
        match self.get(path) {
            None | Some(Value::Null) => Err(AutomationError::ConfigKey {
                key: path.to_string(),
            }),
            Some(Value::String(s)) if s.is_empty() => Err(AutomationError::ConfigKey {
                key: path.to_string(),
            }),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(AutomationError::ConfigType {
                key: path.to_string(),
                expected: "string".to_string(),
            }),
        }
    }
}

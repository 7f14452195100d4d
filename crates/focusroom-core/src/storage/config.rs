//! TOML-based application configuration.
//!
//! Stores:
//! - Engine tunables (grace window, tick interval, reward sizing)
//! - Session defaults (discipline mode, template)
//! - Named work/break templates
//!
//! Configuration is stored at `~/.config/focusroom/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::data_dir;
use crate::error::{ConfigError, ValidationError};
use crate::timer::{DisciplineMode, EngineSettings, SessionTemplate};

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Real milliseconds per engine tick. Lower values fast-forward sessions.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "default_credit_unit_secs")]
    pub credit_unit_secs: u64,
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty: u64,
}

/// Defaults used when the CLI is not told otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default)]
    pub default_mode: DisciplineMode,
    #[serde(default = "default_template_name")]
    pub default_template: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/focusroom/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub session: SessionDefaults,
    #[serde(default = "default_templates")]
    pub templates: Vec<SessionTemplate>,
}

// Default functions
fn default_grace_period_secs() -> u64 {
    9
}
fn default_tick_millis() -> u64 {
    1000
}
fn default_credit_unit_secs() -> u64 {
    60
}
fn default_failure_penalty() -> u64 {
    15
}
fn default_template_name() -> String {
    "classic".into()
}
fn default_templates() -> Vec<SessionTemplate> {
    vec![
        SessionTemplate::classic(),
        SessionTemplate::new("short", 15 * 60, 3 * 60, 10 * 60, 2),
        SessionTemplate::new("deep", 50 * 60, 10 * 60, 0, 2),
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            tick_millis: default_tick_millis(),
            credit_unit_secs: default_credit_unit_secs(),
            failure_penalty: default_failure_penalty(),
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            default_mode: DisciplineMode::Casual,
            default_template: default_template_name(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            session: SessionDefaults::default(),
            templates: default_templates(),
        }
    }
}

/// Step into an object field or, for numeric segments, an array element.
fn child<'a>(value: &'a serde_json::Value, part: &str) -> Option<&'a serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.get(part.parse::<usize>().ok()?),
        other => other.get(part),
    }
}

fn child_mut<'a>(
    value: &'a mut serde_json::Value,
    part: &str,
) -> Option<&'a mut serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.get_mut(part.parse::<usize>().ok()?),
        other => other.get_mut(part),
    }
}

fn collect_leaves(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    let join = |segment: &str| {
        if prefix.is_empty() {
            segment.to_string()
        } else {
            format!("{prefix}.{segment}")
        }
    };
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                collect_leaves(&join(key), child, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_leaves(&join(&index.to_string()), child, out);
            }
        }
        serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = child(current, part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        if key.is_empty() {
            return Err(unknown());
        }

        let mut slot = root;
        for part in key.split('.') {
            slot = child_mut(slot, part).ok_or_else(unknown)?;
        }

        let new_value = match &*slot {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => {
                let n = value
                    .parse::<u64>()
                    .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                serde_json::Value::Number(n.into())
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            _ => serde_json::Value::String(value.into()),
        };
        *slot = new_value;
        Ok(())
    }

    /// Every leaf value as a `(dot.path, value)` pair, in the form
    /// [`Config::get`] and [`Config::set`] accept. Array elements are
    /// addressed by index, e.g. `templates.0.work_secs`.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            collect_leaves("", &json, &mut out);
        }
        out
    }

    /// Default config file location.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there when the file is missing.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or defaults
    /// cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Update a value in memory by dot-separated key.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value does not fit
    /// the field's type.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self)
            .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        let updated: Config = serde_json::from_value(json).map_err(|e| invalid(e.to_string()))?;
        updated.validate().map_err(|e| invalid(e.to_string()))?;
        *self = updated;
        Ok(())
    }

    /// Every template must be runnable and the default template must exist.
    ///
    /// # Errors
    /// Returns the first template or default-template problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for template in &self.templates {
            template.validate()?;
        }
        self.template(&self.session.default_template)?;
        Ok(())
    }

    /// Set a value by key and persist. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Look up a template by name.
    ///
    /// # Errors
    /// Returns an error if no template has that name.
    pub fn template(&self, name: &str) -> Result<SessionTemplate, ValidationError> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| ValidationError::NotFound {
                kind: "template".into(),
                name: name.into(),
            })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            grace_period: Duration::from_secs(self.engine.grace_period_secs),
            tick_interval: Duration::from_millis(self.engine.tick_millis.max(1)),
            credit_unit_secs: self.engine.credit_unit_secs.max(1),
            failure_penalty: self.engine.failure_penalty,
        }
    }
}

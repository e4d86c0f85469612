//! Configuration management for `ledger_sync`.
//!
//! Configuration sources and precedence (highest wins):
//! 1. CLI overrides
//! 2. Environment variables
//! 3. Project config (.beads/config.yaml)
//! 4. User config (~/.config/ledger-sync/config.yaml)
//! 5. Defaults
//!
//! Keys are normalized (lowercase, `_` and `.` become `-`), so
//! `remote.repo-owner` in YAML and `LEDGER_SYNC_REMOTE_REPO_OWNER` in the
//! environment name the same setting.

use crate::error::{LedgerError, Result};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default ledger filename inside the `.beads` directory.
const DEFAULT_JSONL_FILENAME: &str = "issues.jsonl";
const BEADS_DIR_NAME: &str = ".beads";
const ENV_PREFIX: &str = "LEDGER_SYNC_";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const KEY_URL: &str = "remote.url";
pub const KEY_KEY: &str = "remote.key";
pub const KEY_REPO_OWNER: &str = "remote.repo-owner";
pub const KEY_REPO_NAME: &str = "remote.repo-name";
pub const KEY_TIMEOUT_SECS: &str = "remote.timeout-secs";

/// Well-known environment variables and the keys they set. Later entries win.
const ENV_ALIASES: &[(&str, &str)] = &[
    ("SUPABASE_URL", KEY_URL),
    ("SUPABASE_KEY", KEY_KEY),
    ("SUPABASE_SERVICE_ROLE_KEY", KEY_KEY),
    ("GITHUB_REPO_OWNER", KEY_REPO_OWNER),
    ("GITHUB_REPO_NAME", KEY_REPO_NAME),
    ("LEDGER_SYNC_TIMEOUT_SECS", KEY_TIMEOUT_SECS),
];

/// Discover the active `.beads` directory by walking up from `start` (or the
/// CWD). Falls back to `<start>/.beads` when none exists yet.
///
/// # Errors
///
/// Returns an error if the CWD cannot be read.
pub fn discover_beads_dir(start: Option<&Path>) -> Result<PathBuf> {
    let start = match start {
        Some(path) => path.to_path_buf(),
        None => env::current_dir()?,
    };

    let mut current = start.clone();
    loop {
        let candidate = current.join(BEADS_DIR_NAME);
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if !current.pop() {
            break;
        }
    }

    Ok(start.join(BEADS_DIR_NAME))
}

/// Ledger file location: explicit override (flag or `BEADS_JSONL`), else
/// `issues.jsonl` inside the beads directory.
#[must_use]
pub fn resolve_ledger_path(beads_dir: &Path, override_path: Option<&Path>) -> PathBuf {
    match override_path {
        Some(path) if !path.as_os_str().is_empty() => path.to_path_buf(),
        _ => beads_dir.join(DEFAULT_JSONL_FILENAME),
    }
}

/// A flat configuration layer keyed by normalized names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigLayer {
    pub values: HashMap<String, String>,
}

impl ConfigLayer {
    /// Set `key` (normalized). Blank values are ignored.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.values.insert(normalize_key(key), value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&normalize_key(key)).map(String::as_str)
    }

    /// Merge another layer on top of this one (higher precedence wins).
    pub fn merge_from(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    /// Merge multiple layers in precedence order (lowest to highest).
    #[must_use]
    pub fn merge_layers(layers: &[Self]) -> Self {
        let mut merged = Self::default();
        for layer in layers {
            merged.merge_from(layer);
        }
        merged
    }

    /// Build a layer from a YAML file path. Missing files return empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
        Ok(layer_from_yaml_value(&value))
    }

    /// Build a layer from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Build a layer from `(name, value)` pairs shaped like environment
    /// variables. `LEDGER_SYNC_*` names map to keys generically; the
    /// well-known remote variables override them.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.as_ref().to_string(), value.into()))
            .collect();

        let mut layer = Self::default();
        for (key, value) in &vars {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layer.insert(stripped, value.clone());
            }
        }
        for (name, key) in ENV_ALIASES {
            if let Some(value) = vars.get(*name) {
                layer.insert(key, value.clone());
            }
        }
        layer
    }
}

/// CLI overrides for config loading (optional).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub url: Option<String>,
    pub key: Option<String>,
    pub repo_owner: Option<String>,
    pub repo_name: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl CliOverrides {
    #[must_use]
    pub fn as_layer(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();
        if let Some(url) = &self.url {
            layer.insert(KEY_URL, url.clone());
        }
        if let Some(key) = &self.key {
            layer.insert(KEY_KEY, key.clone());
        }
        if let Some(owner) = &self.repo_owner {
            layer.insert(KEY_REPO_OWNER, owner.clone());
        }
        if let Some(name) = &self.repo_name {
            layer.insert(KEY_REPO_NAME, name.clone());
        }
        if let Some(timeout) = self.timeout_secs {
            layer.insert(KEY_TIMEOUT_SECS, timeout.to_string());
        }
        layer
    }
}

/// Load project config (.beads/config.yaml).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(beads_dir: &Path) -> Result<ConfigLayer> {
    ConfigLayer::from_yaml(&beads_dir.join("config.yaml"))
}

/// Load user config (~/.config/ledger-sync/config.yaml). Without `HOME`
/// there is no user layer.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<ConfigLayer> {
    let Ok(home) = env::var("HOME") else {
        return Ok(ConfigLayer::default());
    };
    let path = Path::new(&home)
        .join(".config")
        .join("ledger-sync")
        .join("config.yaml");
    ConfigLayer::from_yaml(&path)
}

/// Default config layer (lowest precedence).
#[must_use]
pub fn default_config_layer() -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    layer.insert(KEY_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS.to_string());
    layer
}

/// Load configuration with the full precedence order.
///
/// # Errors
///
/// Returns an error if any config file cannot be read or parsed.
pub fn load_config(beads_dir: &Path, cli: &CliOverrides) -> Result<ConfigLayer> {
    Ok(ConfigLayer::merge_layers(&[
        default_config_layer(),
        load_user_config()?,
        load_project_config(beads_dir)?,
        ConfigLayer::from_env(),
        cli.as_layer(),
    ]))
}

/// Connection settings for the remote store.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub url: String,
    pub key: String,
    pub timeout: Duration,
}

impl fmt::Debug for RemoteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSettings")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RemoteSettings {
    /// Extract remote settings from a merged layer.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the URL or key is missing, or the
    /// timeout is not a positive integer.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        let url = required(
            layer,
            KEY_URL,
            "Remote URL is not configured (set SUPABASE_URL or --remote-url)",
        )?;
        let key = required(
            layer,
            KEY_KEY,
            "Remote key is not configured (set SUPABASE_SERVICE_ROLE_KEY or --remote-key)",
        )?;
        Ok(Self {
            url,
            key,
            timeout: timeout_from_layer(layer)?,
        })
    }
}

/// Per-request timeout from a merged layer.
///
/// # Errors
///
/// Returns [`LedgerError::Config`] if the value is not a positive integer.
pub fn timeout_from_layer(layer: &ConfigLayer) -> Result<Duration> {
    let secs = match layer.get(KEY_TIMEOUT_SECS) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                LedgerError::Config(format!(
                    "Invalid {KEY_TIMEOUT_SECS}: {raw:?} (expected a positive number of seconds)"
                ))
            })?,
        None => DEFAULT_TIMEOUT_SECS,
    };
    Ok(Duration::from_secs(secs))
}

/// Repository coordinates identifying the remote project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] if the owner or name is missing.
    pub fn from_layer(layer: &ConfigLayer) -> Result<Self> {
        Ok(Self {
            owner: required(
                layer,
                KEY_REPO_OWNER,
                "Repository owner is not configured (set GITHUB_REPO_OWNER or --repo-owner)",
            )?,
            name: required(
                layer,
                KEY_REPO_NAME,
                "Repository name is not configured (set GITHUB_REPO_NAME or --repo-name)",
            )?,
        })
    }
}

fn required(layer: &ConfigLayer, key: &str, message: &str) -> Result<String> {
    layer
        .get(key)
        .map(|value| value.trim().to_string())
        .ok_or_else(|| LedgerError::Config(message.to_string()))
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(['_', '.'], "-")
}

fn layer_from_yaml_value(value: &serde_yaml::Value) -> ConfigLayer {
    let mut layer = ConfigLayer::default();
    insert_yaml(&mut layer, None, value);
    layer
}

/// Insert every scalar leaf of `value` under its dotted path. Sequences and
/// nulls carry no setting and are skipped.
fn insert_yaml(layer: &mut ConfigLayer, path: Option<&str>, value: &serde_yaml::Value) {
    use serde_yaml::Value;

    let scalar = match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                if let Some(key) = key.as_str() {
                    let child_path = path.map_or_else(|| key.to_string(), |p| format!("{p}.{key}"));
                    insert_yaml(layer, Some(&child_path), child);
                }
            }
            return;
        }
        Value::Tagged(tagged) => return insert_yaml(layer, path, &tagged.value),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Sequence(_) => return,
    };
    if let Some(path) = path {
        layer.insert(path, scalar);
    }
}

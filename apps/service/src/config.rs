use std::{env, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil::AssertionRule;
use vigil::aggregate::DEFAULT_BUCKET_INTERVAL_SECONDS;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config: {0}")]
    Read(std::io::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    PathUnavailable,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: Engine,

    #[serde(default, rename = "check")]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Engine {
    /// Width of aggregate buckets
    #[serde(default = "default_bucket_interval_seconds")]
    pub bucket_interval_seconds: u32,

    /// Successful runs slower than this are marked degraded
    #[serde(default = "default_degraded_threshold_ms")]
    pub degraded_threshold_ms: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            bucket_interval_seconds: default_bucket_interval_seconds(),
            degraded_threshold_ms: default_degraded_threshold_ms(),
        }
    }
}

/// One `[[check]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckConfig {
    pub name: String,

    /// Qualified strategy id, e.g. `vigil.http`
    pub strategy: String,

    /// System/target the check belongs to
    pub system_id: String,

    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Strategy-specific configuration, validated at load time
    pub config: serde_json::Value,

    #[serde(default)]
    pub assertions: Vec<AssertionRule>,
}

fn default_bucket_interval_seconds() -> u32 {
    DEFAULT_BUCKET_INTERVAL_SECONDS
}

fn default_degraded_threshold_ms() -> u64 {
    1000
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::PathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml or the
    /// specified path, with the name config.toml, if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw = fs::read_to_string(&config_path).map_err(Error::Read)?;
            Self::from_toml_str(&raw)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::Write)?;
        }

        fs::write(path, config_str).map_err(Error::Write)
    }
}

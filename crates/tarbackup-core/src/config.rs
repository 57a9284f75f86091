//! User configuration and data directory layout
//!
//! Everything tarbackup persists lives under one data directory:
//!
//! ```text
//! <home>/config.json
//! <home>/catalog.db
//! <home>/archives/<set>/<set>-<timestamp>-<kind>-<id>.tar.gz
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "TARBACKUP_HOME";

const CONFIG_FILE: &str = "config.json";
const CATALOG_FILE: &str = "catalog.db";
const ARCHIVE_DIR: &str = "archives";

/// Errors loading or changing configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Home directory not found")]
    HomeNotFound,

    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Tunables stored in `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// gzip level, 0-9
    pub compression_level: u32,
    /// Incrementals allowed on top of a full snapshot before the next
    /// backup is forced to be full
    pub max_incrementals: u32,
    /// Exclusion patterns applied to every set
    pub default_excludes: Vec<String>,
    /// Where archives are written (defaults to `<home>/archives`)
    pub archive_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compression_level: 6,
            max_incrementals: 6,
            default_excludes: Vec::new(),
            archive_dir: None,
        }
    }
}

impl Config {
    /// Keys accepted by [`Config::set`]
    pub const KEYS: [&'static str; 4] = [
        "compression_level",
        "max_incrementals",
        "default_excludes",
        "archive_dir",
    ];

    /// Load config from a data directory, falling back to defaults when no
    /// file exists
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write config to a data directory
    pub fn save(&self, home: &Path) -> Result<(), ConfigError> {
        fs::create_dir_all(home)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(home.join(CONFIG_FILE), json)?;
        Ok(())
    }

    /// Update a single key from its string form.
    ///
    /// `default_excludes` takes a comma-separated list; an empty value
    /// clears it. `archive_dir` accepts an empty value to reset it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = self.clone();
        match key {
            "compression_level" => next.compression_level = parse_u32(key, value)?,
            "max_incrementals" => next.max_incrementals = parse_u32(key, value)?,
            "default_excludes" => {
                next.default_excludes = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect();
            }
            "archive_dir" => {
                next.archive_dir = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.compression_level > 9 {
            return Err(ConfigError::InvalidValue {
                key: "compression_level".to_string(),
                reason: format!("{} is not in 0..=9", self.compression_level),
            });
        }
        if let Some(dir) = &self.archive_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: "archive_dir".to_string(),
                    reason: "must be an absolute path".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the archive root for a data directory
    #[must_use]
    pub fn archive_root(&self, home: &Path) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| home.join(ARCHIVE_DIR))
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("{e}"),
    })
}

/// Resolve the data directory: explicit override, then `TARBACKUP_HOME`,
/// then `~/.tarbackup`
pub fn resolve_home(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".tarbackup"))
        .ok_or(ConfigError::HomeNotFound)
}

/// Path to the config file in a data directory
#[must_use]
pub fn config_path(home: &Path) -> PathBuf {
    home.join(CONFIG_FILE)
}

/// Path to the catalog database in a data directory
#[must_use]
pub fn catalog_path(home: &Path) -> PathBuf {
    home.join(CATALOG_FILE)
}

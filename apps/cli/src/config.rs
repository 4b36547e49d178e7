//! CLI configuration: the AnkiConnect endpoint plus sync settings, stored as
//! one JSON file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use ankimark_core::SyncSettings;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8765";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: String,
    pub settings: SyncSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            settings: SyncSettings::default(),
        }
    }
}

/// Default location: `<config dir>/ankimark/config.json`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ankimark").join("config.json"))
}

/// Load the config from `path`, from the default location, or fall back to
/// defaults. An explicitly given path must exist.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let explicit = path.is_some();
    let Some(path) = path.map(Path::to_path_buf).or_else(default_path) else {
        return Ok(Config::default());
    };
    if !path.exists() {
        if explicit {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

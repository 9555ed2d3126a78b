//! Console settings

use std::path::{Path, PathBuf};

use anyhow::Context;
use hmi_link::LinkConfig;
use serde::{Deserialize, Serialize};

/// Console settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleSettings {
    /// Serial port path
    #[serde(default)]
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    /// Talk to a simulated display instead of a serial port
    #[serde(default)]
    pub simulate: bool,
    /// Link engine settings
    #[serde(default)]
    pub link: LinkConfig,
}

fn default_baud() -> u32 {
    9600
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud(),
            simulate: false,
            link: LinkConfig::default(),
        }
    }
}

impl ConsoleSettings {
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("panelink"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("panelink"))
    }

    /// Default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings, falling back to defaults if the file is missing or
    /// unreadable
    pub fn load(path: Option<&Path>) -> Self {
        path.map(Path::to_path_buf)
            .or_else(Self::default_path)
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to disk
    pub fn save(&self, path: Option<&Path>) -> anyhow::Result<PathBuf> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(Self::default_path)
            .context("Could not determine settings path")?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }
}

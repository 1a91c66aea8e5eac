/*!
Configuration management for the message logger
*/

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{LoggerError, Result};

/// Directory name under the storage base where per-conversation logs live.
pub const LOG_DIR_NAME: &str = "deleted_messages";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggerConfig {
    /// Log storage settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Proxy-deletion confirmation settings
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage root for logs; defaults to the platform data directory
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Whether to confirm proxied messages with the external service
    pub enabled: bool,
    /// Base URL of the proxy API
    pub base_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.pluralkit.me/v2".to_string(),
        }
    }
}

impl LoggerConfig {
    /// Load a config from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LoggerError::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        toml::from_str(&content).map_err(|e| LoggerError::Config(e.to_string()))
    }

    /// Directory deletion logs are written to.
    pub fn log_directory(&self) -> Result<PathBuf> {
        let base = match &self.storage.base_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_local_dir()
                .ok_or_else(|| LoggerError::Config("no platform data directory".to_string()))?,
        };
        Ok(base.join(LOG_DIR_NAME))
    }
}

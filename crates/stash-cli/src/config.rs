//! CLI configuration management.

use serde::{Deserialize, Serialize};
use stash_cache::{InterceptorConfig, StorageConfig};
use stash_trace::TracingConfig;
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "STASH_CONFIG";

/// Everything the `stash` binary needs to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashConfig {
    /// Proxy listen address.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Origin base URL that intercepted paths resolve against.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default)]
    pub cache: InterceptorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_origin() -> String {
    "http://localhost:5000".to_string()
}

impl Default for StashConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            origin: default_origin(),
            cache: InterceptorConfig::default(),
            storage: StorageConfig::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl StashConfig {
    /// Pick the config file: explicit path, then `STASH_CONFIG`, then the
    /// platform config directory.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, Box<dyn std::error::Error>> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        Self::config_path()
    }

    /// Load configuration from `path`, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "stash", "stash")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    pub fn origin_url(&self) -> Result<url::Url, stash_core::Error> {
        Ok(url::Url::parse(&self.origin)?)
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "listen" => {
                value
                    .parse::<std::net::SocketAddr>()
                    .map_err(|e| format!("Invalid listen address {}: {}", value, e))?;
                self.listen = value.to_string();
            }
            "origin" => {
                url::Url::parse(value).map_err(|e| format!("Invalid origin {}: {}", value, e))?;
                self.origin = value.to_string();
            }
            "cache.version" => {
                let previous = std::mem::replace(&mut self.cache.version, value.to_string());
                if let Err(e) = self.cache.validate() {
                    self.cache.version = previous;
                    return Err(e.to_string());
                }
            }
            "storage.root" => match &mut self.storage {
                StorageConfig::Filesystem { root, .. } => *root = PathBuf::from(value),
                StorageConfig::Memory => {
                    return Err("storage.root requires filesystem storage".to_string());
                }
            },
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }
}

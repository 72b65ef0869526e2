//! Interceptor configuration.

use crate::keys::{partition_name, validate_partition_name};
use crate::types::{CompressionType, PartitionNames};
use serde::{Deserialize, Serialize};
use stash_core::{Error, Result};
use std::path::PathBuf;

/// Cache behaviour: versioning, routing and install manifests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterceptorConfig {
    /// Version token embedded in both partition names. Bump it whenever the
    /// manifests change.
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_static_prefix")]
    pub static_partition_prefix: String,
    #[serde(default = "default_dynamic_prefix")]
    pub dynamic_partition_prefix: String,
    #[serde(default)]
    pub routing: RoutingRules,
    /// Pre-cached into the static partition at install.
    #[serde(default = "default_static_manifest")]
    pub static_manifest: Vec<String>,
    /// Third-party scripts pre-cached into the dynamic partition at install.
    #[serde(default)]
    pub dynamic_manifest: Vec<String>,
    /// Document served when a non-API request fails with nothing cached.
    #[serde(default = "default_offline_document")]
    pub offline_document: String,
}

fn default_version() -> String {
    "v1".to_string()
}

fn default_static_prefix() -> String {
    "stash-static".to_string()
}

fn default_dynamic_prefix() -> String {
    "stash-dynamic".to_string()
}

fn default_static_manifest() -> Vec<String> {
    vec![default_offline_document()]
}

fn default_offline_document() -> String {
    "/".to_string()
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            static_partition_prefix: default_static_prefix(),
            dynamic_partition_prefix: default_dynamic_prefix(),
            routing: RoutingRules::default(),
            static_manifest: default_static_manifest(),
            dynamic_manifest: vec![],
            offline_document: default_offline_document(),
        }
    }
}

impl InterceptorConfig {
    /// Partition names for the configured version.
    pub fn partitions(&self) -> PartitionNames {
        PartitionNames::new(
            partition_name(&self.static_partition_prefix, &self.version),
            partition_name(&self.dynamic_partition_prefix, &self.version),
        )
    }

    pub fn validate(&self) -> Result<()> {
        let names = self.partitions();
        validate_partition_name(&names.static_name)?;
        validate_partition_name(&names.dynamic_name)?;
        if names.static_name == names.dynamic_name {
            return Err(Error::InvalidConfig(
                "static and dynamic partitions must have different names".to_string(),
            ));
        }
        for (field, prefix) in [
            ("routing.api_prefix", &self.routing.api_prefix),
            ("routing.static_prefix", &self.routing.static_prefix),
        ] {
            if !prefix.starts_with('/') {
                return Err(Error::InvalidConfig(format!(
                    "{} must start with '/': {:?}",
                    field, prefix
                )));
            }
        }
        Ok(())
    }
}

/// URL-shape rules used to pick a strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRules {
    /// Paths under this prefix are network-first.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Paths under this prefix are cache-first.
    #[serde(default = "default_static_prefix_path")]
    pub static_prefix: String,
    /// File extensions (without the dot) that are also cache-first.
    #[serde(default)]
    pub static_extensions: Vec<String>,
    /// URLs containing any of these substrings are never written to a
    /// partition. Meant for high-churn paginated data.
    #[serde(default = "default_never_cache")]
    pub never_cache: Vec<String>,
}

fn default_api_prefix() -> String {
    "/api/".to_string()
}

fn default_static_prefix_path() -> String {
    "/static/".to_string()
}

fn default_never_cache() -> Vec<String> {
    vec!["/api/v1/table/data?".to_string()]
}

impl Default for RoutingRules {
    fn default() -> Self {
        Self {
            api_prefix: default_api_prefix(),
            static_prefix: default_static_prefix_path(),
            static_extensions: vec![],
            never_cache: default_never_cache(),
        }
    }
}

/// Where partitions are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local; lost on restart.
    Memory,
    /// One directory per partition under `root`.
    Filesystem {
        #[serde(default = "default_storage_root")]
        root: PathBuf,
        #[serde(default)]
        compression: CompressionType,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Filesystem {
            root: default_storage_root(),
            compression: CompressionType::default(),
        }
    }
}

/// Platform cache directory, or `/var/stash/cache` when none can be found.
pub fn default_storage_root() -> PathBuf {
    directories::ProjectDirs::from("dev", "stash", "stash")
        .map(|dirs| dirs.cache_dir().join("partitions"))
        .unwrap_or_else(|| PathBuf::from("/var/stash/cache"))
}

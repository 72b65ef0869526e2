//! Offline fetch-interception cache.
//!
//! Chooses a caching strategy per intercepted request (network-first for API
//! calls, cache-first for static assets, stale-while-revalidate for the rest)
//! over two versioned partitions, and drives the install/activate lifecycle
//! that populates and sweeps them.

pub mod classify;
pub mod compression;
pub mod config;
pub mod keys;
pub mod lifecycle;
pub mod network;
pub mod provider;
pub mod strategy;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::{CacheExclusion, Classifier, RequestClass, SubstringExclusion};
pub use compression::{compress, decompress};
pub use config::{default_storage_root, InterceptorConfig, RoutingRules, StorageConfig};
pub use keys::{entry_digest, partition_name, resolve_url, validate_partition_name};
pub use lifecycle::{sweep_partitions, ActivationReport, InstallReport, Phase, Worker};
pub use network::{is_hop_by_hop, ReqwestFetcher};
pub use provider::{open_storage, FilesystemProvider, MemoryProvider};
pub use strategy::{offline_api_response, Strategies, OFFLINE_API_MESSAGE};
pub use types::{
    CacheStats, CompressionType, PartitionNames, ResponseSource, Served, StatsSnapshot,
    StoredEntry, StrategyKind,
};

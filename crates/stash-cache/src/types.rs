//! Cache types and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_core::ResponseSnapshot;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// The two partition names that make up one cache generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionNames {
    /// Scripts, styles, icons, fonts.
    pub static_name: String,
    /// Everything else, including API responses.
    pub dynamic_name: String,
}

impl PartitionNames {
    pub fn new(static_name: impl Into<String>, dynamic_name: impl Into<String>) -> Self {
        Self {
            static_name: static_name.into(),
            dynamic_name: dynamic_name.into(),
        }
    }

    /// Whether `name` belongs to the current generation.
    pub fn contains(&self, name: &str) -> bool {
        name == self.static_name || name == self.dynamic_name
    }

    /// Lookup order: static first, then dynamic.
    pub fn all(&self) -> [&str; 2] {
        [&self.static_name, &self.dynamic_name]
    }
}

/// Caching strategy chosen for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrategyKind::NetworkFirst => "network_first",
            StrategyKind::CacheFirst => "cache_first",
            StrategyKind::StaleWhileRevalidate => "stale_while_revalidate",
        })
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// The cached root document, served when nothing better is available.
    Fallback,
    /// The 503 JSON body for API requests with no network and no cache.
    Synthesized,
    /// Not intercepted: non-GET, or the worker is not serving yet.
    Bypass,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Fallback => "fallback",
            ResponseSource::Synthesized => "synthesized",
            ResponseSource::Bypass => "bypass",
        }
    }
}

/// A response together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: ResponseSnapshot,
    pub source: ResponseSource,
}

impl Served {
    pub fn new(response: ResponseSnapshot, source: ResponseSource) -> Self {
        Self { response, source }
    }
}

/// Compression algorithm for stored bodies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    #[default]
    Zstd,
    Gzip,
    Lz4,
}

/// On-disk metadata for one filesystem entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Full request URL.
    pub key: String,
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub captured_at: DateTime<Utc>,
    pub compression: CompressionType,
    /// Uncompressed body size in bytes.
    pub size_bytes: u64,
    /// Hex SHA-256 of the uncompressed body.
    pub checksum: String,
}

/// Live counters for the interceptor.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    network_fetches: AtomicU64,
    network_failures: AtomicU64,
    stores: AtomicU64,
    skipped_stores: AtomicU64,
    fallbacks: AtomicU64,
    synthesized: AtomicU64,
    background_refreshes: AtomicU64,
    background_failures: AtomicU64,
}

macro_rules! counter {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl CacheStats {
    counter! {
        record_hit => hits,
        record_miss => misses,
        record_fetch => network_fetches,
        record_fetch_failure => network_failures,
        record_store => stores,
        record_skipped_store => skipped_stores,
        record_fallback => fallbacks,
        record_synthesized => synthesized,
        record_background_refresh => background_refreshes,
        record_background_failure => background_failures,
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            skipped_stores: self.skipped_stores.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            background_refreshes: self.background_refreshes.load(Ordering::Relaxed),
            background_failures: self.background_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub network_fetches: u64,
    pub network_failures: u64,
    pub stores: u64,
    pub skipped_stores: u64,
    pub fallbacks: u64,
    pub synthesized: u64,
    pub background_refreshes: u64,
    pub background_failures: u64,
}

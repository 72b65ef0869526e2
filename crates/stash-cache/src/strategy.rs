//! Caching strategies.
//!
//! Each strategy resolves one GET request to exactly one [`Served`] outcome.
//! Network failures are never fatal here: they fall back to a cached copy, the
//! cached offline document, or (API only) a synthesized 503. Background
//! refreshes run on a [`JoinSet`] owned by [`Strategies`]; the caller never
//! waits for them and their failures only show up in logs and stats.

use crate::classify::CacheExclusion;
use crate::types::{
    CacheStats, PartitionNames, ResponseSource, Served, StatsSnapshot, StrategyKind,
};
use stash_core::{CacheStorage, Error, FetchRequest, Fetcher, ResponseSnapshot, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};

/// Body of the synthesized response for API requests that cannot be served.
pub const OFFLINE_API_MESSAGE: &str = "Network request failed and no cache available";

/// Build the 503 returned by network-first when both network and cache miss.
pub fn offline_api_response() -> Result<ResponseSnapshot> {
    ResponseSnapshot::json(503, &serde_json::json!({ "error": OFFLINE_API_MESSAGE }))
}

/// State shared with detached refresh tasks.
struct Shared {
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    partitions: PartitionNames,
    exclusion: Arc<dyn CacheExclusion>,
    stats: CacheStats,
}

impl Shared {
    /// Find a cached copy, static partition first. Storage errors count as a
    /// miss so a broken store degrades to network behaviour.
    async fn lookup(&self, key: &str) -> Option<(String, ResponseSnapshot)> {
        for partition in self.partitions.all() {
            match self.storage.get(partition, key).await {
                Ok(Some(response)) => return Some((partition.to_string(), response)),
                Ok(None) => {}
                Err(e) => warn!(partition, key = %key, error = %e, "Cache lookup failed"),
            }
        }
        None
    }

    /// The single write path. Returns whether the entry was written.
    async fn store(&self, partition: &str, key: &str, response: &ResponseSnapshot) -> bool {
        if !response.is_success() {
            return false;
        }
        if self.exclusion.excludes(key) {
            debug!(partition, key = %key, "URL excluded from caching");
            self.stats.record_skipped_store();
            return false;
        }
        match self.storage.put(partition, key, response).await {
            Ok(()) => {
                self.stats.record_store();
                true
            }
            Err(e) => {
                warn!(partition, key = %key, error = %e, "Cache write failed");
                false
            }
        }
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        self.stats.record_fetch();
        let result = self.fetcher.fetch(request).await;
        if result.is_err() {
            self.stats.record_fetch_failure();
        }
        result
    }

    /// Body of a background refresh. Never returns an error.
    async fn refresh(&self, partition: &str, request: &FetchRequest) {
        self.stats.record_background_refresh();
        let key = request.cache_key();
        match self.fetch(request).await {
            Ok(response) if response.is_success() => {
                if self.store(partition, &key, &response).await {
                    debug!(partition, key = %key, "Background refresh updated entry");
                }
            }
            Ok(response) => {
                debug!(
                    partition,
                    key = %key,
                    status = response.status,
                    "Background refresh kept cached copy"
                );
            }
            Err(e) => {
                self.stats.record_background_failure();
                debug!(partition, key = %key, error = %e, "Background refresh failed");
            }
        }
    }
}

/// Strategy implementations over an injected store and network.
pub struct Strategies {
    shared: Arc<Shared>,
    offline_key: String,
    background: Mutex<JoinSet<()>>,
}

impl Strategies {
    /// `offline_key` is the full URL of the document served as a last resort
    /// for non-API requests.
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        partitions: PartitionNames,
        exclusion: Arc<dyn CacheExclusion>,
        offline_key: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                storage,
                fetcher,
                partitions,
                exclusion,
                stats: CacheStats::default(),
            }),
            offline_key: offline_key.into(),
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn partitions(&self) -> &PartitionNames {
        &self.shared.partitions
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Cached copy for `key` in any current partition.
    pub async fn lookup(&self, key: &str) -> Option<ResponseSnapshot> {
        self.shared.lookup(key).await.map(|(_, response)| response)
    }

    pub async fn run(&self, kind: StrategyKind, request: &FetchRequest) -> Result<Served> {
        match kind {
            StrategyKind::NetworkFirst => self.network_first(request).await,
            StrategyKind::CacheFirst => self.cache_first(request).await,
            StrategyKind::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Prefer the network; store successes in the dynamic partition.
    pub async fn network_first(&self, request: &FetchRequest) -> Result<Served> {
        let shared = &self.shared;
        let key = request.cache_key();

        let error = match shared.fetch(request).await {
            Ok(response) => {
                shared
                    .store(&shared.partitions.dynamic_name, &key, &response)
                    .await;
                return Ok(Served::new(response, ResponseSource::Network));
            }
            Err(e) => e,
        };

        debug!(key = %key, error = %error, "Network failed, falling back to cache");
        if let Some((_, cached)) = shared.lookup(&key).await {
            shared.stats.record_hit();
            return Ok(Served::new(cached, ResponseSource::Cache));
        }

        shared.stats.record_miss();
        shared.stats.record_synthesized();
        warn!(key = %key, "No network and no cached copy, answering 503");
        Ok(Served::new(offline_api_response()?, ResponseSource::Synthesized))
    }

    /// Serve a cached copy when present and refresh it in the background;
    /// otherwise fetch and store in the static partition.
    pub async fn cache_first(&self, request: &FetchRequest) -> Result<Served> {
        let shared = &self.shared;
        let key = request.cache_key();

        if let Some((partition, cached)) = shared.lookup(&key).await {
            shared.stats.record_hit();
            self.spawn_refresh(&partition, request);
            return Ok(Served::new(cached, ResponseSource::Cache));
        }

        shared.stats.record_miss();
        match shared.fetch(request).await {
            Ok(response) => {
                shared
                    .store(&shared.partitions.static_name, &key, &response)
                    .await;
                Ok(Served::new(response, ResponseSource::Network))
            }
            Err(e) => self.offline_fallback(&key, e).await,
        }
    }

    /// Serve a cached copy at once while revalidating it for next time. With
    /// nothing cached the network answer is the result.
    pub async fn stale_while_revalidate(&self, request: &FetchRequest) -> Result<Served> {
        let shared = &self.shared;
        let key = request.cache_key();

        if let Some((partition, cached)) = shared.lookup(&key).await {
            shared.stats.record_hit();
            self.spawn_refresh(&partition, request);
            return Ok(Served::new(cached, ResponseSource::Cache));
        }

        shared.stats.record_miss();
        match shared.fetch(request).await {
            Ok(response) => {
                shared
                    .store(&shared.partitions.dynamic_name, &key, &response)
                    .await;
                Ok(Served::new(response, ResponseSource::Network))
            }
            Err(e) => self.offline_fallback(&key, e).await,
        }
    }

    async fn offline_fallback(&self, key: &str, cause: Error) -> Result<Served> {
        debug!(
            key = %key,
            error = %cause,
            "Network failed with nothing cached, trying offline document"
        );
        if let Some((_, document)) = self.shared.lookup(&self.offline_key).await {
            self.shared.stats.record_fallback();
            return Ok(Served::new(document, ResponseSource::Fallback));
        }
        warn!(
            key = %key,
            offline_document = %self.offline_key,
            "Offline document not cached"
        );
        Err(Error::Offline(key.to_string()))
    }

    /// Fire-and-forget refresh of `request` into `partition`.
    fn spawn_refresh(&self, partition: &str, request: &FetchRequest) {
        let shared = Arc::clone(&self.shared);
        let partition = partition.to_string();
        let request = request.clone();
        let span = stash_trace::refresh_span(&partition, request.url.as_str());

        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move { shared.refresh(&partition, &request).await }.instrument(span));
    }

    /// Number of background refreshes still running.
    pub fn pending_background(&self) -> usize {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Wait for every outstanding background refresh, including ones spawned
    /// while draining.
    pub async fn drain_background(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks());
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Background refresh task aborted");
                }
            }
        }
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

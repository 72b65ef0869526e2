//! Install / activate / serve lifecycle.
//!
//! The host environment drives a [`Worker`] through three phases by calling
//! [`Worker::on_install`], [`Worker::on_activate`] and then
//! [`Worker::handle_fetch`] for every request. Strategy selection and cache
//! I/O live in [`Strategies`] and know nothing about phases.

use crate::classify::{CacheExclusion, Classifier, SubstringExclusion};
use crate::config::InterceptorConfig;
use crate::keys::resolve_url;
use crate::strategy::Strategies;
use crate::types::{PartitionNames, ResponseSource, Served, StatsSnapshot};
use futures::future::try_join_all;
use serde::Serialize;
use stash_core::{CacheStorage, Error, FetchRequest, Fetcher, ResponseSnapshot, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, Instrument};
use url::Url;

/// Lifecycle phase of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Installing,
    Activating,
    Serving,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Installing => "installing",
            Phase::Activating => "activating",
            Phase::Serving => "serving",
        })
    }
}

/// Outcome of a successful install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub static_partition: String,
    pub static_entries: usize,
    pub dynamic_partition: String,
    pub dynamic_entries: usize,
    /// The new version takes over without waiting for old clients to close.
    pub skip_waiting: bool,
}

/// Outcome of the activation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Current-generation partitions that already existed.
    pub kept: Vec<String>,
    /// Current-generation partitions that had to be created.
    pub created: Vec<String>,
    /// Partitions from other generations that were removed.
    pub deleted: Vec<String>,
    /// Open clients are controlled immediately, no reload needed.
    pub clients_claimed: bool,
}

/// Delete every partition not in `current`, then make sure both current
/// partitions exist.
pub async fn sweep_partitions(
    storage: &dyn CacheStorage,
    current: &PartitionNames,
) -> Result<ActivationReport> {
    let existing = storage.partitions().await?;
    let mut report = ActivationReport::default();

    for name in &existing {
        if current.contains(name) {
            report.kept.push(name.clone());
        } else if storage.delete_partition(name).await? {
            info!(partition = %name, "Deleted stale partition");
            report.deleted.push(name.clone());
        }
    }

    for name in current.all() {
        if !existing.iter().any(|e| e == name) {
            storage.open(name).await?;
            report.created.push(name.to_string());
        }
    }

    Ok(report)
}

#[derive(Debug)]
struct LifecycleState {
    phase: Phase,
    skip_waiting: bool,
    clients_claimed: bool,
}

/// The interception cache as seen by its host.
pub struct Worker {
    version: String,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    classifier: Classifier,
    exclusion: Arc<dyn CacheExclusion>,
    strategies: Strategies,
    static_manifest: Vec<Url>,
    dynamic_manifest: Vec<Url>,
    state: RwLock<LifecycleState>,
}

impl Worker {
    /// Build a worker whose exclusion rules come from `config.routing`.
    pub fn new(
        config: &InterceptorConfig,
        origin: &Url,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        let exclusion = Arc::new(SubstringExclusion::new(config.routing.never_cache.clone()));
        Self::with_exclusion(config, origin, storage, fetcher, exclusion)
    }

    /// Build a worker with a host-supplied exclusion predicate.
    pub fn with_exclusion(
        config: &InterceptorConfig,
        origin: &Url,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        exclusion: Arc<dyn CacheExclusion>,
    ) -> Result<Self> {
        config.validate()?;

        let resolve_all = |entries: &[String]| -> Result<Vec<Url>> {
            entries.iter().map(|e| resolve_url(origin, e)).collect()
        };
        let static_manifest = resolve_all(&config.static_manifest)?;
        let dynamic_manifest = resolve_all(&config.dynamic_manifest)?;
        let offline_document = resolve_url(origin, &config.offline_document)?;

        let classifier = Classifier::new(
            &config.routing,
            static_manifest
                .iter()
                .chain(dynamic_manifest.iter())
                .map(|u| u.to_string()),
        );
        let strategies = Strategies::new(
            Arc::clone(&storage),
            Arc::clone(&fetcher),
            config.partitions(),
            Arc::clone(&exclusion),
            offline_document.to_string(),
        );

        Ok(Self {
            version: config.version.clone(),
            storage,
            fetcher,
            classifier,
            exclusion,
            strategies,
            static_manifest,
            dynamic_manifest,
            state: RwLock::new(LifecycleState {
                phase: Phase::Installing,
                skip_waiting: false,
                clients_claimed: false,
            }),
        })
    }

    pub fn phase(&self) -> Phase {
        self.state.read().unwrap_or_else(PoisonError::into_inner).phase
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn partitions(&self) -> &PartitionNames {
        self.strategies.partitions()
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.strategies.stats()
    }

    /// Pre-populate both partitions from their manifests.
    ///
    /// Each partition is all-or-nothing: every URL is fetched before anything
    /// is written, and a transport error or non-2xx status aborts the install.
    /// A failed install leaves the worker in [`Phase::Installing`].
    pub async fn on_install(&self) -> Result<InstallReport> {
        self.expect_phase(Phase::Installing)?;
        let span = stash_trace::lifecycle_span("install", &self.version);

        async {
            let names = self.partitions().clone();
            let static_entries = self
                .precache(&names.static_name, &self.static_manifest)
                .await?;
            let dynamic_entries = self
                .precache(&names.dynamic_name, &self.dynamic_manifest)
                .await?;

            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.skip_waiting = true;
            state.phase = Phase::Activating;
            drop(state);

            info!(static_entries, dynamic_entries, "Install complete");
            Ok(InstallReport {
                static_partition: names.static_name,
                static_entries,
                dynamic_partition: names.dynamic_name,
                dynamic_entries,
                skip_waiting: true,
            })
        }
        .instrument(span)
        .await
    }

    async fn precache(&self, partition: &str, manifest: &[Url]) -> Result<usize> {
        let included = manifest.iter().filter(|url| {
            // Manifest URLs are already fragment-free, so they are their keys.
            let excluded = self.exclusion.excludes(url.as_str());
            if excluded {
                debug!(partition, url = %url, "Skipping excluded manifest entry");
            }
            !excluded
        });
        let fetches = included.map(|url| async move {
            let request = FetchRequest::get(url.clone());
            let install_error = |reason: String| Error::InstallFailed {
                partition: partition.to_string(),
                url: url.to_string(),
                reason,
            };
            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| install_error(e.to_string()))?;
            if !response.is_success() {
                return Err(install_error(format!("status {}", response.status)));
            }
            debug!(partition, url = %url, "Fetched manifest entry");
            Ok::<(String, ResponseSnapshot), Error>((request.cache_key(), response))
        });

        let entries = try_join_all(fetches).await?;
        self.storage.put_all(partition, &entries).await?;
        Ok(entries.len())
    }

    /// Sweep partitions from other versions and start serving.
    pub async fn on_activate(&self) -> Result<ActivationReport> {
        self.expect_phase(Phase::Activating)?;
        let span = stash_trace::lifecycle_span("activate", &self.version);

        async {
            let mut report = sweep_partitions(self.storage.as_ref(), self.partitions()).await?;

            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.clients_claimed = true;
            state.phase = Phase::Serving;
            report.clients_claimed = state.clients_claimed;
            drop(state);

            info!(
                kept = report.kept.len(),
                deleted = report.deleted.len(),
                created = report.created.len(),
                "Activation complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Answer one intercepted request.
    ///
    /// Non-GET requests, and any request arriving before the worker is
    /// serving, go straight to the network untouched by the cache.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<Served> {
        if !request.method.is_cacheable() || self.phase() != Phase::Serving {
            let response = self.fetcher.fetch(request).await?;
            return Ok(Served::new(response, ResponseSource::Bypass));
        }

        let strategy = self.classifier.classify(&request.url).strategy();
        let span = stash_trace::fetch_span(&strategy.to_string(), request.url.as_str());
        let served = self.strategies.run(strategy, request).instrument(span).await?;
        debug!(
            url = %request.url,
            %strategy,
            source = served.source.as_str(),
            status = served.response.status,
            "Served request"
        );
        Ok(served)
    }

    /// Wait for outstanding background refreshes.
    pub async fn drain_background(&self) {
        self.strategies.drain_background().await
    }

    pub fn pending_background(&self) -> usize {
        self.strategies.pending_background()
    }

    fn expect_phase(&self, expected: Phase) -> Result<()> {
        let actual = self.phase();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::InvalidPhase {
                expected: expected.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;
    use crate::testing::MockFetcher;
    use pretty_assertions::assert_eq;

    const ORIGIN: &str = "http://grid.local";

    fn origin() -> Url {
        Url::parse(ORIGIN).unwrap()
    }

    fn url(path: &str) -> String {
        format!("{}{}", ORIGIN, path)
    }

    fn grid_config() -> InterceptorConfig {
        InterceptorConfig {
            static_manifest: vec![
                "/".to_string(),
                "/static/css/style.css".to_string(),
                "/static/js/app.js".to_string(),
            ],
            dynamic_manifest: vec!["https://cdn.example.com/jquery.min.js".to_string()],
            ..Default::default()
        }
    }

    fn online_fetcher() -> Arc<MockFetcher> {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.route(&url("/"), 200, "<html>grid</html>");
        fetcher.route(&url("/static/css/style.css"), 200, "body{}");
        fetcher.route(&url("/static/js/app.js"), 200, "init()");
        fetcher.route("https://cdn.example.com/jquery.min.js", 200, "jquery");
        fetcher
    }

    async fn serving_worker(
        config: &InterceptorConfig,
    ) -> (Arc<MemoryProvider>, Arc<MockFetcher>, Worker) {
        let storage = Arc::new(MemoryProvider::new());
        let fetcher = online_fetcher();
        let worker = Worker::new(config, &origin(), storage.clone(), fetcher.clone()).unwrap();
        worker.on_install().await.unwrap();
        worker.on_activate().await.unwrap();
        (storage, fetcher, worker)
    }

    #[tokio::test]
    async fn test_install_populates_both_partitions() {
        let storage = Arc::new(MemoryProvider::new());
        let worker =
            Worker::new(&grid_config(), &origin(), storage.clone(), online_fetcher()).unwrap();
        assert_eq!(worker.phase(), Phase::Installing);

        let report = worker.on_install().await.unwrap();
        assert_eq!(report.static_entries, 3);
        assert_eq!(report.dynamic_entries, 1);
        assert!(report.skip_waiting);
        assert_eq!(worker.phase(), Phase::Activating);

        assert_eq!(
            storage.keys("stash-static-v1").await.unwrap(),
            vec![url("/"), url("/static/css/style.css"), url("/static/js/app.js")]
        );
        assert_eq!(
            storage.keys("stash-dynamic-v1").await.unwrap(),
            vec!["https://cdn.example.com/jquery.min.js".to_string()]
        );
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let storage = Arc::new(MemoryProvider::new());
        let fetcher = online_fetcher();
        fetcher.fail(&url("/static/js/app.js"));
        let worker = Worker::new(&grid_config(), &origin(), storage.clone(), fetcher).unwrap();

        let err = worker.on_install().await.unwrap_err();
        match err {
            Error::InstallFailed { partition, url: failed, .. } => {
                assert_eq!(partition, "stash-static-v1");
                assert_eq!(failed, url("/static/js/app.js"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(storage.partitions().await.unwrap().is_empty());
        assert_eq!(worker.phase(), Phase::Installing);
        assert!(matches!(
            worker.on_activate().await,
            Err(Error::InvalidPhase { .. })
        ));
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let storage = Arc::new(MemoryProvider::new());
        let fetcher = online_fetcher();
        fetcher.route(&url("/static/css/style.css"), 404, "missing");
        let worker = Worker::new(&grid_config(), &origin(), storage, fetcher).unwrap();

        let err = worker.on_install().await.unwrap_err();
        assert!(err.to_string().contains("status 404"), "{}", err);
    }

    #[tokio::test]
    async fn test_install_skips_excluded_manifest_entries() {
        let config = InterceptorConfig {
            static_manifest: vec!["/".to_string(), "/api/v1/table/data?page=1".to_string()],
            ..Default::default()
        };
        let storage = Arc::new(MemoryProvider::new());
        let fetcher = online_fetcher();
        fetcher.route(&url("/api/v1/table/data?page=1"), 200, "[]");
        let worker = Worker::new(&config, &origin(), storage.clone(), fetcher.clone()).unwrap();

        let report = worker.on_install().await.unwrap();
        assert_eq!(report.static_entries, 1);
        assert_eq!(
            storage.keys("stash-static-v1").await.unwrap(),
            vec![url("/")]
        );
        assert_eq!(fetcher.calls_to(&url("/api/v1/table/data?page=1")), 0);
    }

    #[tokio::test]
    async fn test_activation_sweep() {
        let storage = MemoryProvider::new();
        for name in ["A_v1", "B_v1", "A_v2"] {
            storage.open(name).await.unwrap();
        }
        let current = PartitionNames::new("A_v2", "B_v2");

        let report = sweep_partitions(&storage, &current).await.unwrap();
        assert_eq!(report.kept, vec!["A_v2".to_string()]);
        assert_eq!(report.created, vec!["B_v2".to_string()]);
        assert_eq!(report.deleted, vec!["A_v1".to_string(), "B_v1".to_string()]);
        assert_eq!(
            storage.partitions().await.unwrap(),
            vec!["A_v2".to_string(), "B_v2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_version_bump_orphans_old_partitions() {
        let (storage, fetcher, _old) = serving_worker(&grid_config()).await;

        let next = InterceptorConfig {
            version: "v2".to_string(),
            ..grid_config()
        };
        let worker = Worker::new(&next, &origin(), storage.clone(), fetcher).unwrap();
        worker.on_install().await.unwrap();
        // Old generation is still there until activation.
        assert_eq!(storage.partitions().await.unwrap().len(), 4);

        let report = worker.on_activate().await.unwrap();
        assert!(report.clients_claimed);
        assert_eq!(
            report.deleted,
            vec!["stash-dynamic-v1".to_string(), "stash-static-v1".to_string()]
        );
        assert_eq!(
            storage.partitions().await.unwrap(),
            vec!["stash-dynamic-v2".to_string(), "stash-static-v2".to_string()]
        );
        assert_eq!(worker.phase(), Phase::Serving);
    }

    #[tokio::test]
    async fn test_requests_bypass_until_serving() {
        let storage = Arc::new(MemoryProvider::new());
        let fetcher = online_fetcher();
        fetcher.route(&url("/api/v1/users"), 200, "[]");
        let worker = Worker::new(&grid_config(), &origin(), storage.clone(), fetcher).unwrap();

        let request = FetchRequest::parse_get(&url("/api/v1/users")).unwrap();
        let served = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(served.source, ResponseSource::Bypass);
        assert!(storage.partitions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_get_bypasses_cache() {
        let (storage, fetcher, worker) = serving_worker(&grid_config()).await;
        fetcher.route(&url("/api/v1/filters"), 201, "created");

        let request = FetchRequest::new(
            stash_core::Method::Post,
            Url::parse(&url("/api/v1/filters")).unwrap(),
        )
        .with_body(br#"{"name":"mine"}"#.to_vec());
        let served = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(served.source, ResponseSource::Bypass);
        assert_eq!(served.response.status, 201);
        assert!(storage
            .get("stash-dynamic-v1", &url("/api/v1/filters"))
            .await
            .unwrap()
            .is_none());

        fetcher.go_offline();
        assert!(matches!(
            worker.handle_fetch(&request).await,
            Err(Error::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_serving_dispatches_by_url_shape() {
        let (storage, fetcher, worker) = serving_worker(&grid_config()).await;
        fetcher.route(&url("/api/v1/users"), 200, "[]");
        fetcher.route(&url("/reports"), 200, "report");

        let api = FetchRequest::parse_get(&url("/api/v1/users")).unwrap();
        assert_eq!(
            worker.handle_fetch(&api).await.unwrap().source,
            ResponseSource::Network
        );
        assert!(storage
            .get("stash-dynamic-v1", &url("/api/v1/users"))
            .await
            .unwrap()
            .is_some());

        let asset = FetchRequest::parse_get(&url("/static/js/app.js")).unwrap();
        assert_eq!(
            worker.handle_fetch(&asset).await.unwrap().source,
            ResponseSource::Cache
        );

        let page = FetchRequest::parse_get(&url("/reports")).unwrap();
        assert_eq!(
            worker.handle_fetch(&page).await.unwrap().source,
            ResponseSource::Network
        );
        worker.drain_background().await;
        assert_eq!(worker.pending_background(), 0);
    }

    #[tokio::test]
    async fn test_offline_api_request_gets_503() {
        let (_storage, fetcher, worker) = serving_worker(&grid_config()).await;
        fetcher.go_offline();

        let request = FetchRequest::parse_get(&url("/api/v1/users")).unwrap();
        let served = worker.handle_fetch(&request).await.unwrap();
        assert_eq!(served.source, ResponseSource::Synthesized);
        assert_eq!(served.response.status, 503);
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&served.response.body).unwrap(),
            serde_json::json!({"error": "Network request failed and no cache available"})
        );
    }

    #[tokio::test]
    async fn test_custom_exclusion_predicate() {
        let storage = Arc::new(MemoryProvider::new());
        let fetcher = online_fetcher();
        fetcher.route(&url("/api/v1/feed?live=1"), 200, "tick");
        let exclusion: Arc<dyn CacheExclusion> = Arc::new(|u: &str| u.contains("live=1"));
        let worker = Worker::with_exclusion(
            &grid_config(),
            &origin(),
            storage.clone(),
            fetcher,
            exclusion,
        )
        .unwrap();
        worker.on_install().await.unwrap();
        worker.on_activate().await.unwrap();

        let request = FetchRequest::parse_get(&url("/api/v1/feed?live=1")).unwrap();
        worker.handle_fetch(&request).await.unwrap();
        assert!(storage
            .get("stash-dynamic-v1", &url("/api/v1/feed?live=1"))
            .await
            .unwrap()
            .is_none());
    }
}

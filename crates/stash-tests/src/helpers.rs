//! Test helper functions and utilities.

use async_trait::async_trait;
use reqwest::{Client, Response};
use stash_cache::{InterceptorConfig, MemoryProvider, ReqwestFetcher, Worker};
use stash_core::{CacheStorage, Error, FetchRequest, Fetcher, ResponseSnapshot};
use stash_proxy::{AppState, build_app, bootstrap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use url::Url;

/// Real network fetcher with an offline switch.
pub struct SwitchableFetcher {
    inner: ReqwestFetcher,
    offline: AtomicBool,
}

impl SwitchableFetcher {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            inner: ReqwestFetcher::new()?,
            offline: AtomicBool::new(false),
        })
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for SwitchableFetcher {
    async fn fetch(&self, request: &FetchRequest) -> stash_core::Result<ResponseSnapshot> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }
        self.inner.fetch(request).await
    }
}

/// A running proxy plus handles into its worker.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub worker: Arc<Worker>,
    pub storage: Arc<dyn CacheStorage>,
    fetcher: Arc<SwitchableFetcher>,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Response> {
        Ok(self.client.get(self.url(path)).send().await?)
    }

    pub async fn post(&self, path: &str, body: &serde_json::Value) -> anyhow::Result<Response> {
        Ok(self.client.post(self.url(path)).json(body).send().await?)
    }

    /// Make every outbound fetch fail as if the network were down.
    pub fn go_offline(&self) {
        self.fetcher.set_offline(true);
    }

    pub fn go_online(&self) {
        self.fetcher.set_offline(false);
    }

    /// Wait for detached refreshes so their writes are visible.
    pub async fn settle(&self) {
        self.worker.drain_background().await;
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Install, activate and serve a proxy in front of `origin` on an
/// ephemeral port, backed by in-memory partitions.
pub async fn start_test_proxy(
    origin: &str,
    config: InterceptorConfig,
) -> anyhow::Result<TestProxy> {
    start_test_proxy_with_storage(origin, config, Arc::new(MemoryProvider::new())).await
}

/// Same as [`start_test_proxy`] over a caller-supplied store, so partitions
/// can be seeded or shared across versions.
pub async fn start_test_proxy_with_storage(
    origin: &str,
    config: InterceptorConfig,
    storage: Arc<dyn CacheStorage>,
) -> anyhow::Result<TestProxy> {
    let origin = Url::parse(origin)?;
    let fetcher = Arc::new(SwitchableFetcher::new()?);
    let worker = Arc::new(Worker::new(
        &config,
        &origin,
        Arc::clone(&storage),
        fetcher.clone(),
    )?);
    bootstrap(&worker).await?;

    let app = build_app(Arc::new(AppState::new(Arc::clone(&worker), origin)));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Test proxy stopped");
        }
    });

    // Give server time to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    Ok(TestProxy {
        addr,
        worker,
        storage,
        fetcher,
        client: test_client(),
        handle,
    })
}

/// Create an HTTP client for testing.
pub fn test_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to create test client")
}

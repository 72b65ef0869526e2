//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use stash_core::{Error, FetchRequest, Fetcher, ResponseSnapshot, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Scripted network. Unknown URLs answer 404; `go_offline` makes every
/// fetch fail with a transport error.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, ResponseSnapshot>>,
    failing: Mutex<Vec<String>>,
    offline: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, status: u16, body: &str) {
        let response = ResponseSnapshot::new(status).with_body(body.as_bytes().to_vec());
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().push(url.to_string());
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&url) {
            return Err(Error::Network(format!("connection refused: {}", url)));
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| ResponseSnapshot::new(404)))
    }
}

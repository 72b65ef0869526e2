//! Application state shared across handlers.

use chrono::{DateTime, Utc};
use stash_cache::Worker;
use std::sync::Arc;
use url::Url;

/// Application state shared across all handlers.
pub struct AppState {
    pub worker: Arc<Worker>,
    /// Upstream the intercepted paths are resolved against.
    pub origin: Url,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(worker: Arc<Worker>, origin: Url) -> Self {
        Self {
            worker,
            origin,
            started_at: Utc::now(),
        }
    }
}

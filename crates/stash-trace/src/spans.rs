//! Span creation for cache operations.

use tracing::{Level, Span, span};

/// Span around one intercepted request.
pub fn fetch_span(strategy: &str, url: &str) -> Span {
    span!(
        Level::INFO,
        "stash.fetch",
        stash.strategy = strategy,
        url.full = url,
    )
}

/// Span around a detached background refresh.
pub fn refresh_span(partition: &str, url: &str) -> Span {
    span!(
        Level::DEBUG,
        "stash.refresh",
        stash.partition = partition,
        url.full = url,
    )
}

/// Span around an install or activate transition.
pub fn lifecycle_span(phase: &str, version: &str) -> Span {
    span!(
        Level::INFO,
        "stash.lifecycle",
        stash.phase = phase,
        stash.version = version,
    )
}

/// Span for direct partition maintenance (listing, clearing).
pub fn storage_span(operation: &str, partition: &str) -> Span {
    span!(
        Level::DEBUG,
        "stash.storage",
        operation = operation,
        stash.partition = partition,
    )
}

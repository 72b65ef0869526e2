//! Reverse-proxy host for the Stash interception cache.
//!
//! Every request that is not a management route under `/_stash` is handed to
//! the [`Worker`](stash_cache::Worker), which answers it from the network, a
//! cache partition, or a fallback.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::ProxyError;
pub use routes::build_app;
pub use state::AppState;

use stash_cache::{ActivationReport, InstallReport, Worker};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Run install then activate, the way a host brings up a new version.
pub async fn bootstrap(
    worker: &Worker,
) -> stash_core::Result<(InstallReport, ActivationReport)> {
    let installed = worker.on_install().await?;
    info!(
        static_partition = %installed.static_partition,
        static_entries = installed.static_entries,
        dynamic_partition = %installed.dynamic_partition,
        dynamic_entries = installed.dynamic_entries,
        "Installed"
    );
    let activated = worker.on_activate().await?;
    info!(deleted = ?activated.deleted, created = ?activated.created, "Activated");
    Ok((installed, activated))
}

/// Serve until `shutdown` resolves, then wait for background refreshes.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let worker = Arc::clone(&state.worker);
    let app = build_app(state);

    info!(addr = %listener.local_addr()?, "Proxy listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let pending = worker.pending_background();
    if pending > 0 {
        info!(pending, "Waiting for background refreshes");
    }
    worker.drain_background().await;
    Ok(())
}

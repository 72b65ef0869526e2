//! Integration test infrastructure for Stash.
//!
//! Tests run the real proxy on an ephemeral port in front of a `wiremock`
//! origin and talk to it with `reqwest`.
//!
//! # Usage
//!
//! ```ignore
//! use stash_tests::{GridApp, start_test_proxy};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let origin = GridApp::start().await;
//!     let proxy = start_test_proxy(&origin.uri(), GridApp::config()).await.unwrap();
//!     // proxy.get("/api/v1/grid"), proxy.go_offline(), ...
//! }
//! ```

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,stash_cache=debug")),
        )
        .with_test_writer()
        .try_init();
}

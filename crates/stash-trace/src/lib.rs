//! Tracing for Stash.
//!
//! Sets up the `tracing` subscriber (pretty or JSON output, optional OTLP
//! export) and provides the spans used around intercepted requests and
//! lifecycle transitions.

pub mod spans;
pub mod tracer;

pub use spans::{fetch_span, lifecycle_span, refresh_span, storage_span};
pub use tracer::{
    LogFormat, OtlpConfig, TracerError, TracingConfig, init_tracer, shutdown_tracer,
};

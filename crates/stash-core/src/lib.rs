//! Stash Core
//!
//! Shared vocabulary for the Stash interception cache: the error type,
//! request/response snapshots, and the port traits that the cache
//! strategies depend on. Storage and network live behind these ports so
//! strategy code can run against in-memory fakes.

pub mod error;
pub mod http;
pub mod ports;

pub use error::{Error, Result};
pub use http::{FetchRequest, Method, ResponseSnapshot};
pub use ports::{CacheStorage, Fetcher};

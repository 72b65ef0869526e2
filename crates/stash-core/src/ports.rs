//! Port traits (hexagonal architecture).
//!
//! The cache strategies only ever talk to storage and the network through
//! these traits.

use crate::http::{FetchRequest, ResponseSnapshot};
use crate::Result;
use async_trait::async_trait;

/// Named, URL-keyed response partitions.
///
/// Implementations must make `put` atomic per key: a concurrent `get` sees
/// either the old or the new snapshot, never a mix. Concurrent writers to the
/// same key resolve as last-write-wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// List the names of all existing partitions.
    async fn partitions(&self) -> Result<Vec<String>>;

    /// Create a partition if it does not exist yet.
    async fn open(&self, partition: &str) -> Result<()>;

    /// Delete a partition and every entry in it. Returns whether it existed.
    async fn delete_partition(&self, partition: &str) -> Result<bool>;

    /// Read an entry.
    async fn get(&self, partition: &str, key: &str) -> Result<Option<ResponseSnapshot>>;

    /// Insert or overwrite an entry, creating the partition if needed.
    async fn put(&self, partition: &str, key: &str, response: &ResponseSnapshot) -> Result<()>;

    /// Insert a batch of entries. Either all of them land or none do.
    async fn put_all(&self, partition: &str, entries: &[(String, ResponseSnapshot)])
    -> Result<()>;

    /// Remove a single entry. Returns whether it existed.
    async fn delete(&self, partition: &str, key: &str) -> Result<bool>;

    /// List the keys stored in a partition.
    async fn keys(&self, partition: &str) -> Result<Vec<String>>;

    /// Delete every partition whose name starts with `prefix`.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut deleted = vec![];
        for name in self.partitions().await? {
            if name.starts_with(prefix) && self.delete_partition(&name).await? {
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Outbound network access.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Perform the request. Transport failures are reported as
    /// [`crate::Error::Network`]; any HTTP status counts as a completed fetch.
    async fn fetch(&self, request: &FetchRequest) -> Result<ResponseSnapshot>;
}

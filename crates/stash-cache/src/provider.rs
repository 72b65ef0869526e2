//! Partition storage providers.

use crate::compression::{compress, decompress};
use crate::config::{default_storage_root, StorageConfig};
use crate::keys::{body_checksum, entry_digest, validate_partition_name};
use crate::types::{CompressionType, StoredEntry};
use async_trait::async_trait;
use stash_core::{CacheStorage, Error, ResponseSnapshot, Result};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Build the provider described by `config`.
pub fn open_storage(config: &StorageConfig) -> Arc<dyn CacheStorage> {
    match config {
        StorageConfig::Memory => Arc::new(MemoryProvider::new()),
        StorageConfig::Filesystem { root, compression } => {
            Arc::new(FilesystemProvider::new(root.clone()).with_compression(*compression))
        }
    }
}

type Partition = HashMap<String, ResponseSnapshot>;

/// In-process provider. Every operation takes the lock once, so puts are
/// atomic per key and batches are atomic as a whole.
#[derive(Default)]
pub struct MemoryProvider {
    partitions: RwLock<HashMap<String, Partition>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryProvider {
    async fn partitions(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.partitions.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn open(&self, partition: &str) -> Result<()> {
        self.partitions
            .write()
            .await
            .entry(partition.to_string())
            .or_default();
        Ok(())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        Ok(self.partitions.write().await.remove(partition).is_some())
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<ResponseSnapshot>> {
        Ok(self
            .partitions
            .read()
            .await
            .get(partition)
            .and_then(|p| p.get(key))
            .cloned())
    }

    async fn put(&self, partition: &str, key: &str, response: &ResponseSnapshot) -> Result<()> {
        self.partitions
            .write()
            .await
            .entry(partition.to_string())
            .or_default()
            .insert(key.to_string(), response.clone());
        Ok(())
    }

    async fn put_all(
        &self,
        partition: &str,
        entries: &[(String, ResponseSnapshot)],
    ) -> Result<()> {
        let mut partitions = self.partitions.write().await;
        let target = partitions.entry(partition.to_string()).or_default();
        for (key, response) in entries {
            target.insert(key.clone(), response.clone());
        }
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool> {
        Ok(self
            .partitions
            .write()
            .await
            .get_mut(partition)
            .and_then(|p| p.remove(key))
            .is_some())
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .partitions
            .read()
            .await
            .get(partition)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem provider: `<root>/<partition>/<sha256(key)>.entry`.
///
/// An entry file is one line of JSON metadata followed by the compressed
/// body. It is written under a temporary name and renamed into place, so the
/// rename is the only commit point and concurrent writers to one key resolve
/// as last-write-wins.
pub struct FilesystemProvider {
    root_dir: PathBuf,
    compression: CompressionType,
}

impl FilesystemProvider {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            compression: CompressionType::default(),
        }
    }

    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn partition_dir(&self, partition: &str) -> Result<PathBuf> {
        validate_partition_name(partition).map_err(|e| Error::Storage(e.to_string()))?;
        Ok(self.root_dir.join(partition))
    }

    fn entry_path(&self, partition: &str, key: &str) -> Result<PathBuf> {
        let dir = self.partition_dir(partition)?;
        Ok(dir.join(format!("{}.{}", entry_digest(key), ENTRY_EXTENSION)))
    }

    async fn write_entry(
        &self,
        partition: &str,
        key: &str,
        response: &ResponseSnapshot,
    ) -> Result<()> {
        let path = self.entry_path(partition, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error("create partition dir", e))?;
        }

        let stored = StoredEntry {
            key: key.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            captured_at: response.captured_at,
            compression: self.compression,
            size_bytes: response.body.len() as u64,
            checksum: body_checksum(&response.body),
        };
        // Compact JSON never contains a raw newline, so it ends the header.
        let mut contents = serde_json::to_vec(&stored)?;
        contents.push(b'\n');
        contents.extend(compress(&response.body, self.compression)?);

        write_atomic(&path, &contents).await
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<(StoredEntry, Vec<u8>)>> {
        let mut contents = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error("read entry", e)),
        };
        let Some(split) = contents.iter().position(|b| *b == b'\n') else {
            warn!(path = %path.display(), "Entry has no metadata header");
            return Ok(None);
        };
        let raw = contents.split_off(split + 1);
        let stored = serde_json::from_slice(&contents[..split])?;
        Ok(Some((stored, raw)))
    }
}

const ENTRY_EXTENSION: &str = "entry";

impl Default for FilesystemProvider {
    fn default() -> Self {
        Self::new(default_storage_root())
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("tmp{}-{}", std::process::id(), n));
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| storage_error("write entry", e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(storage_error("commit entry", e));
    }
    Ok(())
}

fn storage_error(action: &str, err: std::io::Error) -> Error {
    Error::Storage(format!("Failed to {}: {}", action, err))
}

#[async_trait]
impl CacheStorage for FilesystemProvider {
    async fn partitions(&self) -> Result<Vec<String>> {
        let mut read_dir = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(storage_error("read cache root", e)),
        };

        let mut names = vec![];
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| storage_error("read cache root", e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            let name = entry.file_name().to_string_lossy().to_string();
            if is_dir && validate_partition_name(&name).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    async fn open(&self, partition: &str) -> Result<()> {
        let dir = self.partition_dir(partition)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error("create partition dir", e))
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool> {
        let dir = self.partition_dir(partition)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(partition, "Deleted partition directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error("delete partition", e)),
        }
    }

    async fn get(&self, partition: &str, key: &str) -> Result<Option<ResponseSnapshot>> {
        let path = self.entry_path(partition, key)?;
        let Some((stored, raw)) = self.read_entry(&path).await? else {
            return Ok(None);
        };
        if stored.key != key {
            warn!(partition, key, stored = %stored.key, "Entry digest collision");
            return Ok(None);
        }

        let body = decompress(&raw, stored.compression)?;
        if body_checksum(&body) != stored.checksum {
            warn!(partition, key, "Checksum mismatch, treating entry as missing");
            return Ok(None);
        }

        Ok(Some(ResponseSnapshot {
            status: stored.status,
            headers: stored.headers,
            body,
            captured_at: stored.captured_at,
        }))
    }

    async fn put(&self, partition: &str, key: &str, response: &ResponseSnapshot) -> Result<()> {
        self.write_entry(partition, key, response).await
    }

    async fn put_all(
        &self,
        partition: &str,
        entries: &[(String, ResponseSnapshot)],
    ) -> Result<()> {
        // Remember what each key held before so a failed batch can be undone.
        let mut previous = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            previous.push((key.as_str(), self.get(partition, key).await?));
        }

        for (written, (key, response)) in entries.iter().enumerate() {
            if let Err(e) = self.write_entry(partition, key, response).await {
                warn!(partition, key = %key, error = %e, "Batch write failed, rolling back");
                for (key, old) in previous.iter().take(written + 1) {
                    let restored = match old {
                        Some(snapshot) => self.write_entry(partition, key, snapshot).await,
                        None => self.delete(partition, key).await.map(|_| ()),
                    };
                    if let Err(e) = restored {
                        warn!(partition, key = %key, error = %e, "Rollback failed");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &str) -> Result<bool> {
        let path = self.entry_path(partition, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_error("delete entry", e)),
        }
    }

    async fn keys(&self, partition: &str) -> Result<Vec<String>> {
        let dir = self.partition_dir(partition)?;
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(storage_error("read partition dir", e)),
        };

        let mut keys = vec![];
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| storage_error("read partition dir", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some((stored, _)) = self.read_entry(&path).await? {
                keys.push(stored.key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn snapshot(body: &str) -> ResponseSnapshot {
        ResponseSnapshot::new(200)
            .with_header("content-type", "text/css")
            .with_body(body.as_bytes().to_vec())
    }

    const KEY: &str = "http://grid.local/static/css/style.css";

    #[tokio::test]
    async fn test_memory_put_overwrites() {
        let storage = MemoryProvider::new();
        storage.put("p1", KEY, &snapshot("a")).await.unwrap();
        storage.put("p1", KEY, &snapshot("b")).await.unwrap();

        let got = storage.get("p1", KEY).await.unwrap().unwrap();
        assert_eq!(got.body_text(), "b");
        assert_eq!(storage.keys("p1").await.unwrap(), vec![KEY.to_string()]);
        assert!(storage.get("p2", KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_delete_by_prefix() {
        let storage = MemoryProvider::new();
        for name in ["stash-static-v1", "stash-dynamic-v1", "other"] {
            storage.open(name).await.unwrap();
        }
        let deleted = storage.delete_by_prefix("stash-").await.unwrap();
        assert_eq!(deleted.len(), 2);
        assert_eq!(storage.partitions().await.unwrap(), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_filesystem_entry_survives_new_provider() {
        let dir = tempfile::tempdir().unwrap();
        let response = snapshot("body { color: red; }");

        {
            let storage = FilesystemProvider::new(dir.path().to_path_buf())
                .with_compression(CompressionType::Gzip);
            storage.put("stash-static-v1", KEY, &response).await.unwrap();
        }

        let storage = FilesystemProvider::new(dir.path().to_path_buf());
        let got = storage.get("stash-static-v1", KEY).await.unwrap().unwrap();
        assert_eq!(got, response);
        assert_eq!(
            storage.partitions().await.unwrap(),
            vec!["stash-static-v1".to_string()]
        );
        assert_eq!(
            storage.keys("stash-static-v1").await.unwrap(),
            vec![KEY.to_string()]
        );
    }

    #[tokio::test]
    async fn test_filesystem_checksum_mismatch_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemProvider::new(dir.path().to_path_buf())
            .with_compression(CompressionType::None);
        storage.put("p", KEY, &snapshot("original")).await.unwrap();

        let path = storage.entry_path("p", KEY).unwrap();
        let mut contents = std::fs::read(&path).unwrap();
        let len = contents.len();
        contents[len - 1] ^= 0xff;
        std::fs::write(&path, contents).unwrap();

        assert!(storage.get("p", KEY).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_filesystem_concurrent_puts_keep_one_writer() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FilesystemProvider::new(dir.path().to_path_buf()));

        for round in 0..25 {
            let mut writers = tokio::task::JoinSet::new();
            for writer in 0..8 {
                let storage = Arc::clone(&storage);
                writers.spawn(async move {
                    let body = format!("round {} writer {}", round, writer).repeat(64);
                    storage.put("p", KEY, &snapshot(&body)).await.unwrap();
                });
            }
            while let Some(joined) = writers.join_next().await {
                joined.unwrap();
            }

            let got = storage.get("p", KEY).await.unwrap();
            let got = got.unwrap_or_else(|| panic!("entry vanished in round {}", round));
            assert!(got.body_text().starts_with(&format!("round {} writer ", round)));
        }
        assert_eq!(storage.keys("p").await.unwrap(), vec![KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_filesystem_delete_and_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemProvider::new(dir.path().to_path_buf());
        storage.put("old-v1", KEY, &snapshot("x")).await.unwrap();
        storage.open("new-v2").await.unwrap();

        assert!(storage.delete("old-v1", KEY).await.unwrap());
        assert!(!storage.delete("old-v1", KEY).await.unwrap());
        assert!(storage.delete_partition("old-v1").await.unwrap());
        assert!(!storage.delete_partition("old-v1").await.unwrap());
        assert_eq!(storage.partitions().await.unwrap(), vec!["new-v2".to_string()]);
    }

    #[tokio::test]
    async fn test_filesystem_rejects_unsafe_partition() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemProvider::new(dir.path().to_path_buf());
        let err = storage.put("../escape", KEY, &snapshot("x")).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_filesystem_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemProvider::new(dir.path().join("never-created"));
        assert!(storage.partitions().await.unwrap().is_empty());
        assert!(storage.keys("stash-static-v1").await.unwrap().is_empty());
    }
}

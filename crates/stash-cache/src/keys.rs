//! Partition naming and entry key utilities.

use sha2::{Digest, Sha256};
use stash_core::{Error, Result};
use url::Url;

/// Build a versioned partition name, e.g. `stash-static-v3`.
pub fn partition_name(prefix: &str, version: &str) -> String {
    format!("{}-{}", prefix, version)
}

/// Stable file-system-safe digest of an entry key.
pub fn entry_digest(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hex SHA-256 of a body, used as the stored checksum.
pub fn body_checksum(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Partition names double as directory names, so keep them to a safe alphabet.
pub fn validate_partition_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("Invalid partition name: {:?}", name)))
    }
}

/// Resolve a manifest entry against the origin. Absolute URLs pass through.
pub fn resolve_url(origin: &Url, entry: &str) -> Result<Url> {
    let mut url = origin
        .join(entry)
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", entry, e)))?;
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_name() {
        assert_eq!(partition_name("stash-static", "v1"), "stash-static-v1");
    }

    #[test]
    fn test_entry_digest_is_stable() {
        let a = entry_digest("https://grid.local/static/app.js");
        let b = entry_digest("https://grid.local/static/app.js");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, entry_digest("https://grid.local/static/app.css"));
    }

    #[test]
    fn test_validate_partition_name() {
        assert!(validate_partition_name("stash-dynamic-v1").is_ok());
        assert!(validate_partition_name("cache_v1.2").is_ok());
        assert!(validate_partition_name("").is_err());
        assert!(validate_partition_name("../etc").is_err());
        assert!(validate_partition_name("a/b").is_err());
    }

    #[test]
    fn test_resolve_url() {
        let origin = Url::parse("http://localhost:5000").unwrap();
        assert_eq!(
            resolve_url(&origin, "/static/css/style.css").unwrap().as_str(),
            "http://localhost:5000/static/css/style.css"
        );
        assert_eq!(
            resolve_url(&origin, "https://cdn.example.com/lib.js").unwrap().as_str(),
            "https://cdn.example.com/lib.js"
        );
        assert_eq!(
            resolve_url(&origin, "/").unwrap().as_str(),
            "http://localhost:5000/"
        );
    }
}

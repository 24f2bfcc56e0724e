//! Cold store for large article bodies.
//!
//! Backed by an embedded sled database that takes an exclusive lock on its
//! directory, so only one process (the server) opens it. Bodies are gzip
//! compressed before being written. Each write is flushed before returning:
//! callers rely on content being durable before they publish metadata that
//! points at it.

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

/// Key of a content record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKey {
    /// Body of a queued article, joined to its metadata record by id.
    Article(Uuid),
    /// Content-addressed body: hex sha256 of the source URL.
    Source(String),
}

impl ContentKey {
    /// Content-addressed key for a source URL.
    pub fn for_source(url: &str) -> Self {
        Self::Source(hex::encode(Sha256::digest(url.as_bytes())))
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Article(id) => write!(f, "{}", id),
            Self::Source(hash) => write!(f, "src:{}", hash),
        }
    }
}

/// sled-backed content store. Cheap to clone.
#[derive(Clone)]
pub struct ContentStore {
    db: sled::Db,
}

impl ContentStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// Fails if another process holds the directory lock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Opened content store");
        Ok(Self { db })
    }

    /// Opens a throwaway store that is deleted on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Writes `content` under `key` and flushes it to disk.
    pub async fn put(&self, key: &ContentKey, content: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let key = key.to_bytes();
        let content = content.to_owned();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let compressed = compress(&content)?;
            db.insert(key, compressed)?;
            db.flush()?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::BackendUnavailable(format!("content write task failed: {}", e)))?
    }

    pub async fn get(&self, key: &ContentKey) -> Result<Option<String>, StoreError> {
        let db = self.db.clone();
        let display_key = key.to_string();
        let key = key.to_bytes();

        tokio::task::spawn_blocking(move || -> Result<Option<String>, StoreError> {
            match db.get(key)? {
                Some(bytes) => decompress(&bytes)
                    .map(Some)
                    .map_err(|e| StoreError::CorruptRecord {
                        key: display_key,
                        reason: e.to_string(),
                    }),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::BackendUnavailable(format!("content read task failed: {}", e)))?
    }

    pub async fn contains(&self, key: &ContentKey) -> Result<bool, StoreError> {
        let db = self.db.clone();
        let key = key.to_bytes();

        tokio::task::spawn_blocking(move || -> Result<bool, StoreError> {
            Ok(db.contains_key(key)?)
        })
        .await
        .map_err(|e| StoreError::BackendUnavailable(format!("content read task failed: {}", e)))?
    }

    /// Flushes buffered writes.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

fn compress(content: &str) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes())?;
    encoder.finish()
}

fn decompress(bytes: &[u8]) -> Result<String, std::io::Error> {
    let mut content = String::new();
    GzDecoder::new(bytes).read_to_string(&mut content)?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_display() {
        let id = Uuid::new_v4();
        assert_eq!(ContentKey::Article(id).to_string(), id.to_string());

        let source = ContentKey::for_source("http://example.com");
        let rendered = source.to_string();
        assert!(rendered.starts_with("src:"));
        assert_eq!(rendered.len(), "src:".len() + 64);
        assert_eq!(source, ContentKey::for_source("http://example.com"));
        assert_ne!(source, ContentKey::for_source("http://example.org"));
    }

    #[test]
    fn test_compression_shrinks_repetitive_html() {
        let html = "<p>lorem ipsum</p>".repeat(200);
        let compressed = compress(&html).expect("compress");
        assert!(compressed.len() < html.len());
        assert_eq!(decompress(&compressed).expect("decompress"), html);
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = ContentStore::temporary().expect("temporary store");
        let key = ContentKey::Article(Uuid::new_v4());

        assert_eq!(store.get(&key).await.expect("get"), None);
        assert!(!store.contains(&key).await.expect("contains"));

        store.put(&key, "<h1>Big Content</h1>").await.expect("put");

        assert!(store.contains(&key).await.expect("contains"));
        assert_eq!(
            store.get(&key).await.expect("get").as_deref(),
            Some("<h1>Big Content</h1>")
        );
    }

    #[tokio::test]
    async fn test_keyspaces_do_not_collide() {
        let store = ContentStore::temporary().expect("temporary store");
        let article = ContentKey::Article(Uuid::new_v4());
        let source = ContentKey::for_source("http://example.com");

        store.put(&article, "by id").await.expect("put");
        store.put(&source, "by url").await.expect("put");

        assert_eq!(store.get(&article).await.expect("get").as_deref(), Some("by id"));
        assert_eq!(store.get(&source).await.expect("get").as_deref(), Some("by url"));
    }

    #[tokio::test]
    async fn test_reopen_persists_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let key = ContentKey::Article(Uuid::new_v4());

        {
            let store = ContentStore::open(dir.path()).expect("open");
            store.put(&key, "durable").await.expect("put");
        }

        let store = ContentStore::open(dir.path()).expect("reopen");
        assert_eq!(store.get(&key).await.expect("get").as_deref(), Some("durable"));
    }
}

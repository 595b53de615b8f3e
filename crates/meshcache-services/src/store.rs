//! Cache store — URL → content-type index with flat per-entry body files.
//!
//! The index is in-memory only and lives for the process; bodies are
//! persisted one file per URL under a single directory. No TTLs, no
//! eviction, no re-validation. Two workers racing to cache the same URL
//! both write; last write wins, which is fine because both fetched the
//! same content.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use dashmap::DashMap;

/// Index metadata for one cached URL.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// File name (within the store root) holding the body.
    pub storage_key: String,
    /// Content type reported when the body was fetched.
    pub content_type: String,
}

/// Derive the body file name for a URL: whitespace and slashes become `-`.
///
/// Known limitation carried from the source design: two URLs differing
/// only in the substituted characters collide on the same file.
pub fn storage_key_for(url: &str) -> String {
    url.replace([' ', '\t', '\n', '\r', '/'], "-")
}

/// The cache store — shared across all connection handlers.
#[derive(Clone)]
pub struct CacheStore {
    root: PathBuf,
    index: Arc<DashMap<String, CacheEntry>>,
}

impl CacheStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create cache root: {}", root.display()))?;
        Ok(Self {
            root,
            index: Arc::new(DashMap::new()),
        })
    }

    /// Look up the index entry for a URL.
    pub fn lookup(&self, url: &str) -> Option<CacheEntry> {
        self.index.get(url).map(|e| e.value().clone())
    }

    /// Persist a body and index it under `url`. Last write wins.
    pub fn insert(&self, url: &str, content_type: &str, body: &[u8]) -> Result<()> {
        let entry = CacheEntry {
            storage_key: storage_key_for(url),
            content_type: content_type.to_string(),
        };
        self.write_body(&entry, body)?;
        tracing::debug!(
            url,
            file = %entry.storage_key,
            content_type,
            bytes = body.len(),
            "cached"
        );
        self.index.insert(url.to_string(), entry);
        Ok(())
    }

    /// Read a cached body back from disk.
    pub fn read_body(&self, entry: &CacheEntry) -> Result<Bytes> {
        let path = self.body_path(entry);
        let data = fs::read(&path)
            .with_context(|| format!("failed to read cached body: {}", path.display()))?;
        Ok(Bytes::from(data))
    }

    /// Number of indexed URLs.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&self) {
        self.index.clear();
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let _ = fs::remove_file(entry.path());
            }
        }
    }

    fn body_path(&self, entry: &CacheEntry) -> PathBuf {
        self.root.join(&entry.storage_key)
    }

    // Atomic write: tmp file → rename, so a reader never sees a torn body.
    fn write_body(&self, entry: &CacheEntry, body: &[u8]) -> Result<()> {
        let path = self.body_path(entry);
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)
                .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;
            file.write_all(body).context("failed to write body")?;
            file.sync_all().context("failed to sync body to disk")?;
        }
        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

//! Cache storage backends
//!
//! Key-value blob storage with prefix lookup. Puts never overwrite: a key
//! that already exists is left untouched, so repeated saves of the same
//! content do not grow the store.

use crate::cache::key::validate_key;
use crate::error::{ShipwrightError, ShipwrightResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Metadata for one stored cache entry
#[derive(Debug, Clone, Serialize)]
pub struct StoredEntry {
    pub key: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

/// Abstract cache storage interface
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the blob stored under exactly `key`
    async fn get(&self, key: &str) -> ShipwrightResult<Option<Vec<u8>>>;

    /// Fetch the most recently stored blob whose key starts with `prefix`
    async fn get_prefix(&self, prefix: &str) -> ShipwrightResult<Option<(String, Vec<u8>)>>;

    /// Store a blob; returns `false` without writing if the key already exists
    async fn put(&self, key: &str, blob: Vec<u8>) -> ShipwrightResult<bool>;

    /// Whether `key` exists
    async fn contains(&self, key: &str) -> ShipwrightResult<bool>;

    /// All entries, oldest first
    async fn list(&self) -> ShipwrightResult<Vec<StoredEntry>>;

    /// Remove an entry; returns whether it existed
    async fn remove(&self, key: &str) -> ShipwrightResult<bool>;

    /// Human-readable location of `key` for logs and reports
    fn location(&self, key: &str) -> String;
}

const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Cache store backed by a directory, one `<key>.tar.gz` per entry
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    /// Create a store rooted at `root` (created lazily on first put)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> ShipwrightResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{}{}", key, ARCHIVE_SUFFIX)))
    }

    async fn read_optional(path: &Path) -> ShipwrightResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShipwrightError::io(
                format!("reading cache entry {}", path.display()),
                e,
            )),
        }
    }

    /// Stored entries as (key, mtime, size); a missing root is an empty store
    async fn scan(&self) -> ShipwrightResult<Vec<(String, DateTime<Utc>, u64)>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(ShipwrightError::io(
                    format!("reading cache directory {}", self.root.display()),
                    e,
                ))
            }
        };

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ShipwrightError::io("reading cache directory entry", e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(key) = name.strip_suffix(ARCHIVE_SUFFIX) else {
                continue;
            };
            if key.starts_with('.') {
                continue;
            }

            let metadata = entry
                .metadata()
                .await
                .map_err(|e| ShipwrightError::io(format!("stat cache entry {}", name), e))?;
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            found.push((key.to_string(), modified, metadata.len()));
        }

        found.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(found)
    }
}

#[async_trait]
impl CacheStore for FsCacheStore {
    async fn get(&self, key: &str) -> ShipwrightResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        Self::read_optional(&path).await
    }

    async fn get_prefix(&self, prefix: &str) -> ShipwrightResult<Option<(String, Vec<u8>)>> {
        let newest = self
            .scan()
            .await?
            .into_iter()
            .filter(|(key, _, _)| key.starts_with(prefix))
            .next_back();

        match newest {
            Some((key, _, _)) => {
                let path = self.path_for(&key)?;
                Ok(Self::read_optional(&path).await?.map(|blob| (key, blob)))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> ShipwrightResult<bool> {
        let path = self.path_for(key)?;
        if self.contains(key).await? {
            debug!("Cache entry {} already exists, not overwriting", key);
            return Ok(false);
        }

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            ShipwrightError::io(format!("creating cache directory {}", self.root.display()), e)
        })?;

        // Write under a hidden temp name, then rename into place
        let tmp = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp, &blob)
            .await
            .map_err(|e| ShipwrightError::io(format!("writing cache entry {}", key), e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ShipwrightError::io(format!("finalizing cache entry {}", key), e))?;

        Ok(true)
    }

    async fn contains(&self, key: &str) -> ShipwrightResult<bool> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| ShipwrightError::io(format!("checking cache entry {}", key), e))
    }

    async fn list(&self) -> ShipwrightResult<Vec<StoredEntry>> {
        Ok(self
            .scan()
            .await?
            .into_iter()
            .map(|(key, stored_at, size_bytes)| StoredEntry {
                key,
                size_bytes,
                stored_at,
            })
            .collect())
    }

    async fn remove(&self, key: &str) -> ShipwrightResult<bool> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ShipwrightError::io(
                format!("removing cache entry {}", path.display()),
                e,
            )),
        }
    }

    fn location(&self, key: &str) -> String {
        self.root
            .join(format!("{}{}", key, ARCHIVE_SUFFIX))
            .display()
            .to_string()
    }
}

/// In-process cache store; entries are kept in insertion order
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<Vec<(String, Vec<u8>, DateTime<Utc>)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> ShipwrightResult<std::sync::MutexGuard<'_, Vec<(String, Vec<u8>, DateTime<Utc>)>>> {
        self.entries
            .lock()
            .map_err(|_| ShipwrightError::CacheStore("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> ShipwrightResult<Option<Vec<u8>>> {
        Ok(self
            .lock()?
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, blob, _)| blob.clone()))
    }

    async fn get_prefix(&self, prefix: &str) -> ShipwrightResult<Option<(String, Vec<u8>)>> {
        Ok(self
            .lock()?
            .iter()
            .rev()
            .find(|(k, _, _)| k.starts_with(prefix))
            .map(|(k, blob, _)| (k.clone(), blob.clone())))
    }

    async fn put(&self, key: &str, blob: Vec<u8>) -> ShipwrightResult<bool> {
        let mut entries = self.lock()?;
        if entries.iter().any(|(k, _, _)| k == key) {
            return Ok(false);
        }
        entries.push((key.to_string(), blob, Utc::now()));
        Ok(true)
    }

    async fn contains(&self, key: &str) -> ShipwrightResult<bool> {
        Ok(self.lock()?.iter().any(|(k, _, _)| k == key))
    }

    async fn list(&self) -> ShipwrightResult<Vec<StoredEntry>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(key, blob, stored_at)| StoredEntry {
                key: key.clone(),
                size_bytes: blob.len() as u64,
                stored_at: *stored_at,
            })
            .collect())
    }

    async fn remove(&self, key: &str) -> ShipwrightResult<bool> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|(k, _, _)| k != key);
        Ok(entries.len() != before)
    }

    fn location(&self, key: &str) -> String {
        format!("memory://{}", key)
    }
}

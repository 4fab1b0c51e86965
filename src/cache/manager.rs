//! Cache restore and save
//!
//! Restores run before the build, saves after a successful build. Any error
//! in here is a cache transfer failure: the caller logs it and carries on
//! without the cache.

use crate::cache::archive;
use crate::cache::key::{derive_hash, exact_key, prefix_key};
use crate::cache::store::CacheStore;
use crate::cache::CacheClass;
use crate::error::ShipwrightResult;
use crate::platform::PlatformSpec;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// How a cache restore resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestoreOutcome {
    HitExact,
    HitPrefix,
    Miss,
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HitExact => write!(f, "hit-exact"),
            Self::HitPrefix => write!(f, "hit-prefix"),
            Self::Miss => write!(f, "miss"),
        }
    }
}

/// Result of restoring one cache class on one platform
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    /// Cache class name
    pub class: String,
    /// Exact key derived at restore time
    pub key: String,
    /// Storage location of the exact key
    pub location: String,
    pub outcome: RestoreOutcome,
    /// Key actually restored (differs from `key` on a prefix hit)
    pub restored_key: Option<String>,
}

/// How a cache save resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveOutcome {
    /// New entry written
    Saved,
    /// Exact key already stored; nothing written
    AlreadyExists,
    /// None of the class paths exist
    NothingToSave,
}

impl fmt::Display for SaveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Saved => write!(f, "saved"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::NothingToSave => write!(f, "nothing to save"),
        }
    }
}

/// Restores and saves cache classes against a [`CacheStore`]
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Derive the exact key for `class` on `platform` from current inputs
    pub async fn derive_key(
        &self,
        platform: &PlatformSpec,
        class: &CacheClass,
    ) -> ShipwrightResult<String> {
        let hash = derive_hash(&platform.workspace, &class.key_files).await?;
        exact_key(&platform.name, &class.name, &hash)
    }

    /// Restore `class` into the platform workspace
    ///
    /// Exact key first; otherwise the longest fallback prefix with a stored
    /// entry wins, ties going to the prefix declared first.
    pub async fn restore(
        &self,
        platform: &PlatformSpec,
        class: &CacheClass,
    ) -> ShipwrightResult<CacheEntry> {
        let key = self.derive_key(platform, class).await?;
        let location = self.store.location(&key);

        if let Some(blob) = self.store.get(&key).await? {
            archive::unpack(&platform.workspace, blob).await?;
            info!("Cache {} restored from exact key {}", class.name, key);
            return Ok(CacheEntry {
                class: class.name.clone(),
                restored_key: Some(key.clone()),
                key,
                location,
                outcome: RestoreOutcome::HitExact,
            });
        }

        for prefix in self.fallback_prefixes(platform, class)? {
            if let Some((matched, blob)) = self.store.get_prefix(&prefix).await? {
                archive::unpack(&platform.workspace, blob).await?;
                info!(
                    "Cache {} restored from {} (prefix {})",
                    class.name, matched, prefix
                );
                return Ok(CacheEntry {
                    class: class.name.clone(),
                    key,
                    location,
                    outcome: RestoreOutcome::HitPrefix,
                    restored_key: Some(matched),
                });
            }
            debug!("No cache entry for prefix {}", prefix);
        }

        info!("Cache {} miss for key {}", class.name, key);
        Ok(CacheEntry {
            class: class.name.clone(),
            key,
            location,
            outcome: RestoreOutcome::Miss,
            restored_key: None,
        })
    }

    /// Save `class` from the platform workspace
    ///
    /// Uses the key from restore time unless the key inputs changed since.
    pub async fn save(
        &self,
        platform: &PlatformSpec,
        class: &CacheClass,
        entry: &CacheEntry,
    ) -> ShipwrightResult<SaveOutcome> {
        let key = self.derive_key(platform, class).await?;
        if key != entry.key {
            debug!(
                "Cache {} inputs changed during the run ({} -> {})",
                class.name, entry.key, key
            );
        }

        if self.store.contains(&key).await? {
            debug!("Cache {} already stored under {}", class.name, key);
            return Ok(SaveOutcome::AlreadyExists);
        }

        let Some(blob) = archive::pack(&platform.workspace, &class.paths).await? else {
            return Ok(SaveOutcome::NothingToSave);
        };

        let size = blob.len();
        if !self.store.put(&key, blob).await? {
            return Ok(SaveOutcome::AlreadyExists);
        }

        info!(
            "Cache {} saved under {} ({})",
            class.name,
            key,
            crate::cache::format_bytes(size as u64)
        );
        Ok(SaveOutcome::Saved)
    }

    /// Qualified fallback prefixes, most specific first
    fn fallback_prefixes(
        &self,
        platform: &PlatformSpec,
        class: &CacheClass,
    ) -> ShipwrightResult<Vec<String>> {
        let mut prefixes = class
            .restore_prefixes
            .iter()
            .map(|p| prefix_key(&platform.name, &class.name, p))
            .collect::<ShipwrightResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        prefixes.retain(|p| seen.insert(p.clone()));
        // Stable sort keeps declaration order among equal lengths
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()));
        Ok(prefixes)
    }
}

//! Build and dependency caches
//!
//! Provides content-addressed caching keyed by hashes of declared input
//! files (lockfiles, build manifests). One [`CacheClass`] per kind of cached
//! state; the [`CacheManager`] restores before the build and saves after it.
//!
//! # Keys
//!
//! | Key | Format |
//! |-----|--------|
//! | Exact | `{platform}~{class}~{hash}` |
//! | Fallback | `{platform}~{class}~{prefix}` |
//!
//! Keys are scoped by platform and class, so two platform workers never
//! write the same key. Segments may not contain the `~` separator.
//!
//! # Restore outcomes
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | hit-exact | Entry stored under the derived key |
//! | hit-prefix | Most specific fallback prefix matched an older entry |
//! | miss | Nothing restored; the build starts cold |

pub mod archive;
pub mod key;
pub mod manager;
pub mod store;

pub use key::{derive_hash, exact_key, prefix_key, validate_key, validate_segment, KEY_SEPARATOR};
pub use manager::{CacheEntry, CacheManager, RestoreOutcome, SaveOutcome};
pub use store::{format_bytes, CacheStore, FsCacheStore, MemoryCacheStore, StoredEntry};

use crate::platform::PlatformPredicate;
use serde::Serialize;
use std::path::PathBuf;

/// A named category of cached state with its own key-derivation rule
#[derive(Debug, Clone, Serialize)]
pub struct CacheClass {
    /// Class name, part of every key (e.g. `dependencies`)
    pub name: String,
    /// Platforms this class applies to
    pub when: PlatformPredicate,
    /// Files whose concatenated contents derive the key, in order
    pub key_files: Vec<PathBuf>,
    /// Paths persisted in the cache, relative to the workspace
    pub paths: Vec<PathBuf>,
    /// Fallback key prefixes for partial restore
    pub restore_prefixes: Vec<String>,
}

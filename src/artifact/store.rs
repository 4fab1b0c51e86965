//! Artifact upload backends

use crate::cache::validate_segment;
use crate::error::{ShipwrightError, ShipwrightResult};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One uploaded deliverable
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactHandle {
    /// Path relative to the output root
    pub path: PathBuf,
    pub url: String,
    pub size_bytes: u64,
}

/// Destination for collected deliverables
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `files` (relative to `root`) into `bucket`
    async fn upload(
        &self,
        bucket: &str,
        root: &Path,
        files: &[PathBuf],
    ) -> ShipwrightResult<Vec<ArtifactHandle>>;
}

/// Directory-backed artifact store: `<dir>/<bucket>/<relative path>`
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn upload(
        &self,
        bucket: &str,
        root: &Path,
        files: &[PathBuf],
    ) -> ShipwrightResult<Vec<ArtifactHandle>> {
        validate_segment(bucket, false).map_err(|e| ShipwrightError::ArtifactUpload {
            bucket: bucket.to_string(),
            reason: e.to_string(),
        })?;

        let bucket_dir = self.root.join(bucket);
        let mut handles = Vec::with_capacity(files.len());

        for rel in files {
            let source = root.join(rel);
            let dest = bucket_dir.join(rel);
            let upload_err = |reason: String| ShipwrightError::ArtifactUpload {
                bucket: bucket.to_string(),
                reason,
            };

            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| upload_err(format!("{}: {}", parent.display(), e)))?;
            }
            let size_bytes = tokio::fs::copy(&source, &dest)
                .await
                .map_err(|e| upload_err(format!("{}: {}", source.display(), e)))?;

            debug!("Uploaded {} -> {}", source.display(), dest.display());
            handles.push(ArtifactHandle {
                path: rel.clone(),
                url: format!("file://{}", dest.display()),
                size_bytes,
            });
        }

        Ok(handles)
    }
}

//! Packing cache paths into blobs
//!
//! A cache blob is a gzip-compressed tarball of the class paths, stored with
//! workspace-relative names so it unpacks back into place.

use crate::error::{ShipwrightError, ShipwrightResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Pack `paths` (relative to `workspace`) into a blob
///
/// Returns `None` when none of the paths exist.
pub async fn pack(workspace: &Path, paths: &[PathBuf]) -> ShipwrightResult<Option<Vec<u8>>> {
    let workspace = workspace.to_path_buf();
    let paths = paths.to_vec();

    tokio::task::spawn_blocking(move || pack_blocking(&workspace, &paths))
        .await
        .map_err(|e| ShipwrightError::Internal(format!("cache pack task failed: {}", e)))?
}

/// Unpack a blob produced by [`pack`] into `workspace`
pub async fn unpack(workspace: &Path, blob: Vec<u8>) -> ShipwrightResult<()> {
    let workspace = workspace.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut archive = tar::Archive::new(GzDecoder::new(blob.as_slice()));
        archive.set_preserve_mtime(true);
        archive.set_overwrite(true);
        archive.unpack(&workspace).map_err(|e| ShipwrightError::CacheArchive {
            key: workspace.display().to_string(),
            reason: format!("unpacking: {}", e),
        })
    })
    .await
    .map_err(|e| ShipwrightError::Internal(format!("cache unpack task failed: {}", e)))?
}

fn pack_blocking(workspace: &Path, paths: &[PathBuf]) -> ShipwrightResult<Option<Vec<u8>>> {
    let archive_err = |reason: String| ShipwrightError::CacheArchive {
        key: workspace.display().to_string(),
        reason,
    };

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    builder.follow_symlinks(false);

    let mut packed = 0usize;
    for rel in paths {
        let abs = workspace.join(rel);
        if abs.is_dir() {
            builder
                .append_dir_all(rel, &abs)
                .map_err(|e| archive_err(format!("adding {}: {}", rel.display(), e)))?;
        } else if abs.is_file() {
            builder
                .append_path_with_name(&abs, rel)
                .map_err(|e| archive_err(format!("adding {}: {}", rel.display(), e)))?;
        } else {
            debug!("Cache path {} does not exist, skipping", abs.display());
            continue;
        }
        packed += 1;
    }

    if packed == 0 {
        return Ok(None);
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| archive_err(format!("finishing tarball: {}", e)))?;
    let blob = encoder
        .finish()
        .map_err(|e| archive_err(format!("compressing: {}", e)))?;
    Ok(Some(blob))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn pack_and_unpack_directory() {
        let src = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("target/release")).unwrap();
        fs::write(src.path().join("target/release/app"), b"binary").unwrap();

        let blob = pack(src.path(), &[PathBuf::from("target")])
            .await
            .unwrap()
            .expect("target exists");

        let dst = TempDir::new().unwrap();
        unpack(dst.path(), blob).await.unwrap();

        assert_eq!(
            fs::read(dst.path().join("target/release/app")).unwrap(),
            b"binary"
        );
    }

    #[tokio::test]
    async fn pack_nothing_when_paths_missing() {
        let src = TempDir::new().unwrap();
        let blob = pack(src.path(), &[PathBuf::from("node_modules")]).await.unwrap();
        assert!(blob.is_none());
    }

    #[tokio::test]
    async fn unpack_rejects_garbage() {
        let dst = TempDir::new().unwrap();
        assert!(unpack(dst.path(), b"not a tarball".to_vec()).await.is_err());
    }
}

//! Cache key derivation
//!
//! Hashes the declared input files of a cache class. Same inputs = same key;
//! any changed byte = different key.

use crate::error::{ShipwrightError, ShipwrightResult};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Number of digest bytes kept in a key (hex-encoded to twice as many chars)
const KEY_HASH_BYTES: usize = 16;

/// Joins key segments. Segments may not contain it, so a key splits back
/// into exactly one (platform, class, hash) triple.
pub const KEY_SEPARATOR: char = '~';

/// Hash the concatenated contents of `inputs`, resolved against `workspace`
///
/// A missing input hashes as empty content.
pub async fn derive_hash(workspace: &Path, inputs: &[PathBuf]) -> ShipwrightResult<String> {
    let mut hasher = Sha256::new();

    for input in inputs {
        let path = workspace.join(input);
        match tokio::fs::read(&path).await {
            Ok(contents) => hasher.update(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Cache key input {} missing, hashing as empty", path.display());
            }
            Err(e) => {
                return Err(ShipwrightError::io(
                    format!("reading cache key input {}", path.display()),
                    e,
                ))
            }
        }
    }

    let result = hasher.finalize();
    Ok(hex::encode(&result[..KEY_HASH_BYTES]))
}

/// Exact key for a platform, class and derived hash
pub fn exact_key(platform: &str, class: &str, hash: &str) -> ShipwrightResult<String> {
    validate_segment(platform, false)?;
    validate_segment(class, false)?;
    validate_segment(hash, false)?;
    Ok(format!("{platform}{KEY_SEPARATOR}{class}{KEY_SEPARATOR}{hash}"))
}

/// Fallback prefix for a platform and class; `fallback` may be empty
pub fn prefix_key(platform: &str, class: &str, fallback: &str) -> ShipwrightResult<String> {
    validate_segment(platform, false)?;
    validate_segment(class, false)?;
    validate_segment(fallback, true)?;
    Ok(format!("{platform}{KEY_SEPARATOR}{class}{KEY_SEPARATOR}{fallback}"))
}

/// Key segments end up in file names; keep them to a safe alphabet
pub fn validate_segment(segment: &str, allow_empty: bool) -> ShipwrightResult<()> {
    check_alphabet(segment, allow_empty, false)
}

/// A whole stored key: the segment alphabet plus the separator
pub fn validate_key(key: &str) -> ShipwrightResult<()> {
    check_alphabet(key, false, true)
}

fn check_alphabet(segment: &str, allow_empty: bool, allow_separator: bool) -> ShipwrightResult<()> {
    let invalid = |reason: &str| ShipwrightError::CacheKeyInvalid {
        segment: segment.to_string(),
        reason: reason.to_string(),
    };

    if segment.is_empty() {
        return if allow_empty {
            Ok(())
        } else {
            Err(invalid("empty"))
        };
    }
    if segment.starts_with('.') {
        return Err(invalid("may not start with '.'"));
    }
    if let Some(c) = segment
        .chars()
        .find(|&c| {
            !(c.is_ascii_alphanumeric()
                || matches!(c, '-' | '_' | '.')
                || (allow_separator && c == KEY_SEPARATOR))
        })
    {
        return Err(invalid(&format!("character {:?} not allowed", c)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn hash_deterministic() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Cargo.lock"), b"test content").unwrap();
        let inputs = vec![PathBuf::from("Cargo.lock")];

        let hash1 = derive_hash(dir.path(), &inputs).await.unwrap();
        let hash2 = derive_hash(dir.path(), &inputs).await.unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), KEY_HASH_BYTES * 2);
    }

    #[tokio::test]
    async fn single_byte_change_changes_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pnpm-lock.yaml");
        let inputs = vec![PathBuf::from("pnpm-lock.yaml")];

        fs::write(&path, b"lockfileVersion: 6.0\n").unwrap();
        let before = derive_hash(dir.path(), &inputs).await.unwrap();

        fs::write(&path, b"lockfileVersion: 6.1\n").unwrap();
        let after = derive_hash(dir.path(), &inputs).await.unwrap();

        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn missing_input_hashes_as_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.lock"), b"abc").unwrap();

        let with_missing = derive_hash(
            dir.path(),
            &[PathBuf::from("a.lock"), PathBuf::from("missing.lock")],
        )
        .await
        .unwrap();
        let without = derive_hash(dir.path(), &[PathBuf::from("a.lock")]).await.unwrap();

        assert_eq!(with_missing, without);
    }

    #[tokio::test]
    async fn second_input_participates() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.lock"), b"abc").unwrap();
        fs::write(dir.path().join("b.lock"), b"one").unwrap();
        let inputs = vec![PathBuf::from("a.lock"), PathBuf::from("b.lock")];

        let before = derive_hash(dir.path(), &inputs).await.unwrap();
        fs::write(dir.path().join("b.lock"), b"two").unwrap();
        let after = derive_hash(dir.path(), &inputs).await.unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn key_formats() {
        assert_eq!(
            exact_key("ubuntu-22.04", "cargo", "a1b2c3").unwrap(),
            "ubuntu-22.04~cargo~a1b2c3"
        );
        assert_eq!(prefix_key("macos-latest", "cargo", "").unwrap(), "macos-latest~cargo~");
    }

    #[test]
    fn dashed_names_do_not_collide() {
        assert_ne!(
            exact_key("linux", "arm-cargo", "abc").unwrap(),
            exact_key("linux-arm", "cargo", "abc").unwrap()
        );

        let prefix = prefix_key("linux", "cargo", "").unwrap();
        let other_class = exact_key("linux", "cargo-registry", "abc").unwrap();
        assert!(!other_class.starts_with(&prefix));
    }

    #[test]
    fn separator_is_reserved_for_keys() {
        assert!(exact_key("linux~arm", "cargo", "abc").is_err());
        assert!(prefix_key("linux", "cargo", "v1~").is_err());
        assert!(validate_key("linux~cargo~abc").is_ok());
        assert!(validate_key("../linux~cargo").is_err());
        assert!(validate_key("").is_err());
    }

    #[test]
    fn rejects_unsafe_segments() {
        assert!(exact_key("../etc", "cargo", "abc").is_err());
        assert!(exact_key("linux", "my cache", "abc").is_err());
        assert!(exact_key("linux", "", "abc").is_err());
        assert!(prefix_key("linux", "cargo", "v1/").is_err());
    }
}

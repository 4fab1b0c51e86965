//! Error types for Shipwright
//!
//! All modules use `ShipwrightResult<T>` as their return type. Failures of a
//! single platform run are not errors of this kind: they are recorded as
//! [`StepFailure`](crate::pipeline::StepFailure) data on the platform's
//! `BuildRun` and never cross worker boundaries.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Shipwright operations
pub type ShipwrightResult<T> = Result<T, ShipwrightError>;

/// All errors that can occur in Shipwright
#[derive(Error, Debug)]
pub enum ShipwrightError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pipeline definition: {0}")]
    PipelineInvalid(String),

    // Platform errors
    #[error("Unknown OS family: {0}. Expected one of: linux, macos, windows")]
    UnknownOsFamily(String),

    #[error("Unknown package manager: {0}")]
    UnknownPackageManager(String),

    #[error("Platform {platform} is misconfigured: {reason}")]
    PlatformInvalid { platform: String, reason: String },

    #[error("No platform named {0} in the pipeline matrix")]
    PlatformNotFound(String),

    #[error("Required secret {0} is not set in the environment")]
    MissingSecret(String),

    // Cache errors
    #[error("Invalid cache key segment {segment:?}: {reason}")]
    CacheKeyInvalid { segment: String, reason: String },

    #[error("Cache archive error for {key}: {reason}")]
    CacheArchive { key: String, reason: String },

    #[error("Cache store error: {0}")]
    CacheStore(String),

    // Artifact errors
    #[error("Invalid glob pattern {pattern}: {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("Artifact upload to bucket {bucket} failed: {reason}")]
    ArtifactUpload { bucket: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ShipwrightError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a platform misconfiguration error
    pub fn platform_invalid(platform: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PlatformInvalid {
            platform: platform.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownOsFamily(_) => Some("Set `os` to linux, macos or windows"),
            Self::UnknownPackageManager(_) => {
                Some("Supported package managers: apt, dnf, pacman, brew, choco, winget")
            }
            Self::MissingSecret(_) => Some("Export the secret before running the pipeline"),
            Self::PlatformNotFound(_) => Some("Run: shipwright plan"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ShipwrightError::UnknownOsFamily("beos".to_string());
        assert!(err.to_string().contains("Unknown OS family: beos"));
    }

    #[test]
    fn error_hint() {
        let err = ShipwrightError::MissingSecret("GITHUB_TOKEN".to_string());
        assert_eq!(
            err.hint(),
            Some("Export the secret before running the pipeline")
        );
        assert!(ShipwrightError::Internal("x".into()).hint().is_none());
    }
}

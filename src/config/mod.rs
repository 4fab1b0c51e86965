//! Pipeline definition loading and state directories

pub mod schema;

pub use schema::Config;

use crate::error::{ShipwrightError, ShipwrightResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name looked up when no pipeline path is given
pub const PIPELINE_FILE: &str = "shipwright.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Use `shipwright.toml` found from the current directory upwards, or
    /// `./shipwright.toml` when there is none
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let config_path =
            Self::find_local_config(&cwd).unwrap_or_else(|| cwd.join(PIPELINE_FILE));
        Self { config_path }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Walk up from `start` looking for a pipeline file
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(PIPELINE_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shipwright")
    }

    /// Per-run log and report directories live here
    pub fn runs_dir() -> PathBuf {
        Self::state_dir().join("runs")
    }

    /// Default file-backed cache store
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(Self::state_dir)
            .join("shipwright")
            .join("cache")
    }

    /// Default file-backed artifact store
    pub fn default_artifact_dir() -> PathBuf {
        Self::state_dir().join("artifacts")
    }

    /// Cache store directory for `config`
    pub fn cache_dir(&self, config: &Config) -> PathBuf {
        config
            .storage
            .cache_dir
            .as_ref()
            .map(|dir| self.resolve(dir))
            .unwrap_or_else(Self::default_cache_dir)
    }

    /// Artifact store directory for `config`
    pub fn artifact_dir(&self, config: &Config) -> PathBuf {
        config
            .storage
            .artifact_dir
            .as_ref()
            .map(|dir| self.resolve(dir))
            .unwrap_or_else(Self::default_artifact_dir)
    }

    /// Directory relative paths in the pipeline file are resolved against
    pub fn base_dir(&self) -> PathBuf {
        match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir().join(path)
        }
    }

    /// Load the pipeline definition, falling back to defaults
    pub async fn load(&self) -> ShipwrightResult<Config> {
        if !self.config_path.exists() {
            debug!(
                "No pipeline file at {}, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ShipwrightResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ShipwrightError::io(format!("reading pipeline from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| ShipwrightError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> ShipwrightResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            ShipwrightError::io(
                format!("writing pipeline to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Pipeline saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> ShipwrightResult<()> {
        if let Some(parent) = self.config_path.parent() {
            if parent.as_os_str().is_empty() {
                return Ok(());
            }
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ShipwrightError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.pipeline.name, "release");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shipwright.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.pipeline.name = "nightly".to_string();

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.pipeline.name, "nightly");
    }

    #[tokio::test]
    async fn invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shipwright.toml");
        std::fs::write(&path, "[matrix]\nfail_fast = \"sometimes\"\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, ShipwrightError::ConfigInvalid { .. }));
    }

    #[test]
    fn finds_config_in_parent() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(PIPELINE_FILE), "").unwrap();
        let nested = temp.path().join("src-tauri/src");
        std::fs::create_dir_all(&nested).unwrap();

        let found = ConfigManager::find_local_config(&nested).unwrap();
        assert_eq!(found, temp.path().join(PIPELINE_FILE));
    }

    #[test]
    fn storage_paths_resolve_against_pipeline_file() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join(PIPELINE_FILE));
        let mut config = Config::default();
        config.storage.cache_dir = Some(PathBuf::from(".cache"));

        assert_eq!(manager.cache_dir(&config), temp.path().join(".cache"));
        assert_eq!(manager.base_dir(), temp.path());
    }
}

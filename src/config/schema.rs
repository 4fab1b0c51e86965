//! Pipeline definition schema
//!
//! Pipelines are declared in `shipwright.toml`. Every section is optional;
//! missing sections fall back to a three-platform desktop release pipeline.

use crate::platform::{OsFamily, PlatformDescriptor, PlatformPredicate};
use crate::trigger::Trigger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Pipeline identity
    pub pipeline: PipelineConfig,

    /// Matrix execution settings
    pub matrix: MatrixConfig,

    /// When runs start
    pub trigger: Trigger,

    /// Cache and artifact storage locations
    pub storage: StorageConfig,

    /// Target platforms
    pub platform: Vec<PlatformDescriptor>,

    /// Provisioning steps, in execution order
    pub provision: Vec<ProvisionStepConfig>,

    /// Cache classes
    pub cache: Vec<CacheClassConfig>,

    /// Packaging tool invocation
    pub build: BuildConfig,

    /// Deliverable families
    pub artifacts: Vec<DeliverableFamilyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            pipeline: PipelineConfig::default(),
            matrix: MatrixConfig::default(),
            trigger: Trigger::default(),
            storage: StorageConfig::default(),
            platform: default_platforms(),
            provision: default_provision_steps(),
            cache: default_cache_classes(),
            build: BuildConfig::default(),
            artifacts: default_artifacts(),
        }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Write per-platform JSON line run logs
    pub run_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            run_log: true,
        }
    }
}

/// Pipeline identity and workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Display name
    pub name: String,

    /// Workspace, relative to the pipeline file
    pub workspace: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "release".to_string(),
            workspace: PathBuf::from("."),
        }
    }
}

/// Matrix execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Stop starting new steps on every platform after the first failure
    pub fail_fast: bool,

    /// Max platforms running at once (unbounded if unset)
    pub max_parallel: Option<usize>,

    /// Default timeout for each external step
    pub step_timeout_secs: u64,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_parallel: None,
            step_timeout_secs: 3600,
        }
    }
}

/// Storage locations; state directory defaults when unset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File-backed cache store directory
    pub cache_dir: Option<PathBuf>,

    /// File-backed artifact store directory
    pub artifact_dir: Option<PathBuf>,
}

/// Provisioning step as declared
///
/// Exactly one of `packages` or `program` must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionStepConfig {
    pub name: String,
    pub when: PlatformPredicate,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Cache class as declared
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheClassConfig {
    pub name: String,
    pub when: PlatformPredicate,
    /// Files whose contents make up the cache key
    pub key_files: Vec<PathBuf>,
    /// Cached paths, relative to the workspace
    pub paths: Vec<PathBuf>,
    /// Fallback prefixes tried after the exact key
    pub restore_prefixes: Vec<String>,
}

impl Default for CacheClassConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            when: PlatformPredicate::Always,
            key_files: Vec::new(),
            paths: Vec::new(),
            restore_prefixes: vec![String::new()],
        }
    }
}

/// Packaging tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Flag introducing the release profile
    pub profile_arg: String,
    /// Release configuration profile
    pub profile: String,
    pub env: BTreeMap<String, String>,
    /// Names of secrets read from the host environment
    pub secret_env: Vec<String>,
    /// Output tree, relative to the workspace
    pub output_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: "pnpm".to_string(),
            args: vec!["tauri".to_string(), "build".to_string()],
            profile_arg: "--config".to_string(),
            profile: "tauri-release.conf.json".to_string(),
            env: BTreeMap::new(),
            secret_env: vec!["GITHUB_TOKEN".to_string()],
            output_dir: PathBuf::from("src-tauri/target/release/bundle"),
            timeout_secs: None,
        }
    }
}

/// Deliverable family as declared
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverableFamilyConfig {
    pub name: String,
    pub when: PlatformPredicate,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

fn default_platforms() -> Vec<PlatformDescriptor> {
    vec![
        PlatformDescriptor::new("macos-latest", "macos").with_package_manager("brew"),
        PlatformDescriptor::new("ubuntu-22.04", "linux").with_package_manager("apt"),
        PlatformDescriptor::new("windows-latest", "windows"),
    ]
}

fn default_provision_steps() -> Vec<ProvisionStepConfig> {
    vec![
        ProvisionStepConfig {
            name: "system-libraries".to_string(),
            when: PlatformPredicate::Platform(vec!["ubuntu-22.04".to_string()]),
            packages: [
                "libgtk-3-dev",
                "libwebkit2gtk-4.0-dev",
                "libappindicator3-dev",
                "librsvg2-dev",
                "patchelf",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            ..ProvisionStepConfig::default()
        },
        ProvisionStepConfig {
            name: "frontend-dependencies".to_string(),
            when: PlatformPredicate::Always,
            program: Some("pnpm".to_string()),
            args: vec!["install".to_string(), "--frozen-lockfile".to_string()],
            ..ProvisionStepConfig::default()
        },
    ]
}

fn default_cache_classes() -> Vec<CacheClassConfig> {
    vec![
        CacheClassConfig {
            name: "dependencies".to_string(),
            key_files: vec![PathBuf::from("pnpm-lock.yaml")],
            paths: vec![PathBuf::from("node_modules")],
            ..CacheClassConfig::default()
        },
        CacheClassConfig {
            name: "build-output".to_string(),
            key_files: vec![PathBuf::from("src-tauri/Cargo.lock")],
            paths: vec![PathBuf::from("src-tauri/target")],
            ..CacheClassConfig::default()
        },
    ]
}

fn default_artifacts() -> Vec<DeliverableFamilyConfig> {
    let family = |name: &str, os: OsFamily, include: &[&str], exclude: &[&str]| {
        DeliverableFamilyConfig {
            name: name.to_string(),
            when: PlatformPredicate::Os(vec![os]),
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    };
    vec![
        family("windows-installers", OsFamily::Windows, &["*.msi*"], &["*.msi.zip.sig"]),
        family("macos-bundles", OsFamily::Macos, &["*.dmg", "*.app.tar.gz*"], &["*.app.tar.gz.sig"]),
        family(
            "linux-packages",
            OsFamily::Linux,
            &["*.deb", "*.AppImage*"],
            &["*.AppImage.tar.gz.sig"],
        ),
    ]
}

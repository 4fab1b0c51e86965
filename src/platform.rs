//! Platform descriptors and platform-conditional step selection
//!
//! A [`PlatformDescriptor`] is what the pipeline definition declares; a
//! [`PlatformSpec`] is the resolved, immutable view a platform worker runs
//! with. Resolution happens per worker so a bad descriptor only fails its
//! own platform.

use crate::cache::CacheClass;
use crate::error::{ShipwrightError, ShipwrightResult};
use crate::pipeline::Pipeline;
use crate::provision::{ProvisionAction, ProvisioningStep};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Operating system family of a target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Macos,
    Windows,
}

impl OsFamily {
    /// Whether this family is Unix-like
    pub fn is_unix(&self) -> bool {
        matches!(self, Self::Linux | Self::Macos)
    }

    /// Get a human-readable family name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Macos => "macOS",
            Self::Windows => "Windows",
        }
    }
}

impl FromStr for OsFamily {
    type Err = ShipwrightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linux" | "ubuntu" => Ok(Self::Linux),
            "macos" | "darwin" | "osx" => Ok(Self::Macos),
            "windows" | "win" => Ok(Self::Windows),
            other => Err(ShipwrightError::UnknownOsFamily(other.to_string())),
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Linux => "linux",
            Self::Macos => "macos",
            Self::Windows => "windows",
        };
        write!(f, "{}", name)
    }
}

/// System package manager used for package provisioning steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
    Brew,
    Choco,
    Winget,
}

impl PackageManager {
    /// Build the non-interactive install command for a package list
    pub fn install_command(&self, packages: &[String]) -> (String, Vec<String>) {
        let (program, prefix): (&str, &[&str]) = match self {
            Self::Apt => ("sudo", &["apt-get", "install", "-y", "--no-install-recommends"]),
            Self::Dnf => ("sudo", &["dnf", "install", "-y"]),
            Self::Pacman => ("sudo", &["pacman", "-S", "--noconfirm", "--needed"]),
            Self::Brew => ("brew", &["install"]),
            Self::Choco => ("choco", &["install", "-y", "--no-progress"]),
            Self::Winget => (
                "winget",
                &[
                    "install",
                    "--silent",
                    "--accept-package-agreements",
                    "--accept-source-agreements",
                ],
            ),
        };

        let args = prefix
            .iter()
            .map(|s| s.to_string())
            .chain(packages.iter().cloned())
            .collect();
        (program.to_string(), args)
    }

    /// OS families this package manager can run on
    pub fn supports(&self, os: OsFamily) -> bool {
        match self {
            Self::Apt | Self::Dnf | Self::Pacman => os == OsFamily::Linux,
            Self::Brew => os.is_unix(),
            Self::Choco | Self::Winget => os == OsFamily::Windows,
        }
    }
}

impl FromStr for PackageManager {
    type Err = ShipwrightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apt" | "apt-get" => Ok(Self::Apt),
            "dnf" => Ok(Self::Dnf),
            "pacman" => Ok(Self::Pacman),
            "brew" | "homebrew" => Ok(Self::Brew),
            "choco" | "chocolatey" => Ok(Self::Choco),
            "winget" => Ok(Self::Winget),
            other => Err(ShipwrightError::UnknownPackageManager(other.to_string())),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Pacman => "pacman",
            Self::Brew => "brew",
            Self::Choco => "choco",
            Self::Winget => "winget",
        };
        write!(f, "{}", name)
    }
}

/// Platform entry as declared in the pipeline definition
///
/// `os` and `package_manager` stay strings here so that an unknown value is
/// reported against this platform when its worker starts, instead of
/// rejecting the whole pipeline file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDescriptor {
    /// Matrix identifier (e.g. `ubuntu-22.04`)
    pub name: String,

    /// OS family: linux, macos or windows
    pub os: String,

    /// System package manager flavor, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,

    /// Workspace override for this platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
}

impl PlatformDescriptor {
    pub fn new(name: impl Into<String>, os: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            os: os.into(),
            package_manager: None,
            workspace: None,
        }
    }

    pub fn with_package_manager(mut self, manager: impl Into<String>) -> Self {
        self.package_manager = Some(manager.into());
        self
    }
}

/// Platform condition attached to provisioning steps, cache classes and
/// deliverable families
///
/// In TOML: `when = "always"`, `when = "unix"`, `when = { os = ["linux"] }`
/// or `when = { platform = ["ubuntu-22.04"] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformPredicate {
    #[default]
    Always,
    Unix,
    Os(Vec<OsFamily>),
    Platform(Vec<String>),
}

impl fmt::Display for PlatformPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Unix => write!(f, "unix"),
            Self::Os(families) => {
                let names: Vec<String> = families.iter().map(|o| o.to_string()).collect();
                write!(f, "os in [{}]", names.join(", "))
            }
            Self::Platform(names) => write!(f, "platform in [{}]", names.join(", ")),
        }
    }
}

/// Whether something guarded by `predicate` runs on `platform`
pub fn applies(predicate: &PlatformPredicate, platform: &PlatformSpec) -> bool {
    match predicate {
        PlatformPredicate::Always => true,
        PlatformPredicate::Unix => platform.os.is_unix(),
        PlatformPredicate::Os(families) => families.contains(&platform.os),
        PlatformPredicate::Platform(names) => names.iter().any(|n| n == &platform.name),
    }
}

/// Resolved, immutable platform used by a platform worker
#[derive(Debug, Clone)]
pub struct PlatformSpec {
    /// Matrix identifier
    pub name: String,
    /// OS family
    pub os: OsFamily,
    /// Package manager, if the platform has one
    pub package_manager: Option<PackageManager>,
    /// Workspace the pipeline runs in
    pub workspace: PathBuf,
    /// Provisioning steps applicable to this platform, in declared order
    pub steps: Vec<ProvisioningStep>,
    /// Cache classes applicable to this platform
    pub cache_classes: Vec<CacheClass>,
}

impl PlatformSpec {
    /// Minimal spec without steps or caches
    pub fn bare(name: impl Into<String>, os: OsFamily) -> Self {
        Self {
            name: name.into(),
            os,
            package_manager: None,
            workspace: PathBuf::from("."),
            steps: Vec::new(),
            cache_classes: Vec::new(),
        }
    }

    /// Resolve a descriptor against the pipeline definition
    pub fn resolve(descriptor: &PlatformDescriptor, pipeline: &Pipeline) -> ShipwrightResult<Self> {
        let name = descriptor.name.trim();
        if name.is_empty() {
            return Err(ShipwrightError::platform_invalid("<unnamed>", "empty platform name"));
        }
        if name.contains(['/', '\\']) || name.chars().any(char::is_whitespace) {
            return Err(ShipwrightError::platform_invalid(
                name,
                "platform names may not contain whitespace or path separators",
            ));
        }

        let os = descriptor
            .os
            .parse::<OsFamily>()
            .map_err(|e| ShipwrightError::platform_invalid(name, e.to_string()))?;

        let package_manager = descriptor
            .package_manager
            .as_deref()
            .map(str::parse::<PackageManager>)
            .transpose()
            .map_err(|e| ShipwrightError::platform_invalid(name, e.to_string()))?;

        if let Some(pm) = package_manager {
            if !pm.supports(os) {
                return Err(ShipwrightError::platform_invalid(
                    name,
                    format!("package manager {} does not run on {}", pm, os.name()),
                ));
            }
        }

        let workspace = match &descriptor.workspace {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => pipeline.workspace.join(dir),
            None => pipeline.workspace.clone(),
        };

        let mut spec = Self {
            name: name.to_string(),
            os,
            package_manager,
            workspace,
            steps: Vec::new(),
            cache_classes: Vec::new(),
        };

        spec.steps = crate::provision::select_steps(&pipeline.steps, &spec)
            .into_iter()
            .cloned()
            .collect();
        spec.cache_classes = pipeline
            .caches
            .iter()
            .filter(|class| applies(&class.when, &spec))
            .cloned()
            .collect();

        if spec.package_manager.is_none() {
            if let Some(step) = spec
                .steps
                .iter()
                .find(|s| matches!(s.action, ProvisionAction::PackageInstall { .. }))
            {
                return Err(ShipwrightError::platform_invalid(
                    name,
                    format!(
                        "step {} installs packages but the platform declares no package_manager",
                        step.name
                    ),
                ));
            }
        }

        Ok(spec)
    }
}

//! Pipeline definition, run model and matrix execution
//!
//! A [`Pipeline`] is the validated form of the TOML definition. The
//! [`MatrixRunner`] fans it out into one [`PlatformWorker`] per platform;
//! each worker produces a [`BuildRun`] that never affects its siblings
//! except through fail-fast cancellation.

pub mod matrix;
pub mod run;
pub mod worker;

pub use matrix::{CancelSignal, MatrixReport, MatrixRunner};
pub use run::{BuildRun, FailureKind, RunStatus, StepFailure, StepId, StepRecord, StepStatus};
pub use worker::{PlatformOutcome, PlatformWorker, Services};

use crate::artifact::DeliverableFamily;
use crate::build::BuildSpec;
use crate::cache::{validate_segment, CacheClass};
use crate::config::schema::{CacheClassConfig, Config, ProvisionStepConfig};
use crate::error::{ShipwrightError, ShipwrightResult};
use crate::platform::PlatformDescriptor;
use crate::provision::{ProvisionAction, ProvisioningStep};
use crate::trigger::Trigger;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Validated pipeline definition
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    /// Workspace all platforms run in unless overridden
    pub workspace: PathBuf,
    pub fail_fast: bool,
    pub max_parallel: Option<usize>,
    /// Default timeout for each external step
    pub step_timeout: Duration,
    pub platforms: Vec<PlatformDescriptor>,
    pub steps: Vec<ProvisioningStep>,
    pub caches: Vec<CacheClass>,
    pub build: BuildSpec,
    pub families: Vec<DeliverableFamily>,
    pub trigger: Trigger,
}

impl Pipeline {
    /// Validate `config`; relative paths resolve against `base_dir`
    ///
    /// Platform OS and package manager values are checked later, per worker.
    pub fn from_config(config: &Config, base_dir: &Path) -> ShipwrightResult<Self> {
        let invalid = |msg: String| ShipwrightError::PipelineInvalid(msg);

        if config.matrix.step_timeout_secs == 0 {
            return Err(invalid("matrix.step_timeout_secs must be positive".to_string()));
        }
        if config.matrix.max_parallel == Some(0) {
            return Err(invalid("matrix.max_parallel must be at least 1".to_string()));
        }
        if config.platform.is_empty() {
            return Err(invalid("no platforms declared".to_string()));
        }

        unique_names("platform", config.platform.iter().map(|p| p.name.as_str()))?;
        unique_names("provision", config.provision.iter().map(|s| s.name.as_str()))?;
        unique_names("cache", config.cache.iter().map(|c| c.name.as_str()))?;
        unique_names("artifacts", config.artifacts.iter().map(|f| f.name.as_str()))?;

        let steps = config
            .provision
            .iter()
            .map(provisioning_step)
            .collect::<ShipwrightResult<Vec<_>>>()?;

        let caches = config
            .cache
            .iter()
            .map(cache_class)
            .collect::<ShipwrightResult<Vec<_>>>()?;

        let build_cfg = &config.build;
        if build_cfg.program.trim().is_empty() {
            return Err(invalid("build.program is empty".to_string()));
        }
        if build_cfg.profile.trim().is_empty() {
            return Err(invalid("build.profile is empty".to_string()));
        }
        check_relative("build.output_dir", &build_cfg.output_dir)?;

        let build = BuildSpec {
            program: build_cfg.program.clone(),
            args: build_cfg.args.clone(),
            profile_arg: build_cfg.profile_arg.clone(),
            profile: build_cfg.profile.clone(),
            env: build_cfg.env.clone(),
            secret_env: build_cfg.secret_env.clone(),
            output_dir: build_cfg.output_dir.clone(),
            timeout: build_cfg.timeout_secs.map(Duration::from_secs),
        };

        let families = config
            .artifacts
            .iter()
            .map(|f| DeliverableFamily::new(&f.name, f.when.clone(), &f.include, &f.exclude))
            .collect::<ShipwrightResult<Vec<_>>>()?;

        let workspace = if config.pipeline.workspace.is_absolute() {
            config.pipeline.workspace.clone()
        } else {
            base_dir.join(&config.pipeline.workspace)
        };

        Ok(Self {
            name: config.pipeline.name.clone(),
            workspace,
            fail_fast: config.matrix.fail_fast,
            max_parallel: config.matrix.max_parallel,
            step_timeout: Duration::from_secs(config.matrix.step_timeout_secs),
            platforms: config.platform.clone(),
            steps,
            caches,
            build,
            families,
            trigger: config.trigger.clone(),
        })
    }

    /// Descriptor for `name`
    pub fn platform(&self, name: &str) -> ShipwrightResult<&PlatformDescriptor> {
        self.platforms
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ShipwrightError::PlatformNotFound(name.to_string()))
    }

    /// Keep only the named platforms, in declared order
    pub fn select_platforms(&mut self, names: &[String]) -> ShipwrightResult<()> {
        for name in names {
            self.platform(name)?;
        }
        if !names.is_empty() {
            self.platforms.retain(|p| names.contains(&p.name));
        }
        Ok(())
    }
}

fn unique_names<'a>(section: &str, names: impl Iterator<Item = &'a str>) -> ShipwrightResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(ShipwrightError::PipelineInvalid(format!(
                "[[{}]] entry without a name",
                section
            )));
        }
        if !seen.insert(name) {
            return Err(ShipwrightError::PipelineInvalid(format!(
                "duplicate [[{}]] name {}",
                section, name
            )));
        }
    }
    Ok(())
}

/// Paths that stay inside the workspace
fn check_relative(what: &str, path: &Path) -> ShipwrightResult<()> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.as_os_str().is_empty() {
        return Err(ShipwrightError::PipelineInvalid(format!(
            "{} must be a relative path inside the workspace: {}",
            what,
            path.display()
        )));
    }
    Ok(())
}

fn provisioning_step(cfg: &ProvisionStepConfig) -> ShipwrightResult<ProvisioningStep> {
    let action = match (&cfg.program, cfg.packages.is_empty()) {
        (None, false) => ProvisionAction::PackageInstall {
            packages: cfg.packages.clone(),
        },
        (Some(program), true) if !program.trim().is_empty() => ProvisionAction::Command {
            program: program.clone(),
            args: cfg.args.clone(),
        },
        _ => {
            return Err(ShipwrightError::PipelineInvalid(format!(
                "provision step {} needs exactly one of `packages` or `program`",
                cfg.name
            )))
        }
    };

    Ok(ProvisioningStep {
        name: cfg.name.clone(),
        when: cfg.when.clone(),
        action,
        timeout: cfg.timeout_secs.map(Duration::from_secs),
    })
}

fn cache_class(cfg: &CacheClassConfig) -> ShipwrightResult<CacheClass> {
    validate_segment(&cfg.name, false)?;
    for prefix in &cfg.restore_prefixes {
        validate_segment(prefix, true)?;
    }
    if cfg.paths.is_empty() {
        return Err(ShipwrightError::PipelineInvalid(format!(
            "cache {} declares no paths",
            cfg.name
        )));
    }
    for path in cfg.paths.iter().chain(&cfg.key_files) {
        check_relative(&format!("cache {}", cfg.name), path)?;
    }

    Ok(CacheClass {
        name: cfg.name.clone(),
        when: cfg.when.clone(),
        key_files: cfg.key_files.clone(),
        paths: cfg.paths.clone(),
        restore_prefixes: cfg.restore_prefixes.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> ShipwrightResult<Pipeline> {
        let config: Config = toml::from_str(toml_text).unwrap();
        Pipeline::from_config(&config, Path::new("/work"))
    }

    #[test]
    fn default_pipeline_is_valid() {
        let pipeline = Pipeline::from_config(&Config::default(), Path::new("/work")).unwrap();
        assert_eq!(pipeline.platforms.len(), 3);
        assert_eq!(pipeline.workspace, PathBuf::from("/work/."));
        assert_eq!(pipeline.families.len(), 3);
        assert!(matches!(
            pipeline.steps[0].action,
            ProvisionAction::PackageInstall { .. }
        ));
    }

    #[test]
    fn rejects_step_with_both_actions() {
        let err = parse(
            r#"
            [[provision]]
            name = "confused"
            packages = ["git"]
            program = "git"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn rejects_duplicate_platforms() {
        let err = parse(
            r#"
            [[platform]]
            name = "a"
            os = "linux"
            [[platform]]
            name = "a"
            os = "macos"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_empty_profile() {
        let err = parse("[build]\nprofile = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("profile"));
    }

    #[test]
    fn rejects_bad_glob() {
        let err = parse(
            r#"
            [[artifacts]]
            name = "broken"
            include = ["[abc"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ShipwrightError::InvalidGlob { .. }));
    }

    #[test]
    fn rejects_cache_path_outside_workspace() {
        let err = parse(
            r#"
            [[cache]]
            name = "escape"
            paths = ["../elsewhere"]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("inside the workspace"));
    }

    #[test]
    fn unknown_os_is_not_rejected_here() {
        let pipeline = parse(
            r#"
            [[platform]]
            name = "haiku"
            os = "beos"
            "#,
        )
        .unwrap();
        assert_eq!(pipeline.platforms[0].os, "beos");
    }

    #[test]
    fn select_platforms_filters() {
        let mut pipeline = Pipeline::from_config(&Config::default(), Path::new("/work")).unwrap();
        pipeline
            .select_platforms(&["windows-latest".to_string()])
            .unwrap();
        assert_eq!(pipeline.platforms.len(), 1);
        assert!(pipeline.select_platforms(&["nope".to_string()]).is_err());
    }
}

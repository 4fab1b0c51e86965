//! Packaging tool invocation
//!
//! Runs the bundler once per platform with the release configuration
//! profile. Secrets named in the build spec are read from the host
//! environment and handed to the child without ever being logged.

use crate::error::ShipwrightError;
use crate::exec::{EnvValue, Secret, ToolInvocation, ToolRunner, FAILURE_TAIL_LINES};
use crate::pipeline::{FailureKind, StepFailure};
use crate::platform::PlatformSpec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Name of the build step in run records
pub const BUILD_STEP: &str = "build";

/// How to invoke the packaging tool
#[derive(Debug, Clone, Serialize)]
pub struct BuildSpec {
    /// Packaging tool executable
    pub program: String,
    /// Arguments before the profile
    pub args: Vec<String>,
    /// Flag that introduces the profile (e.g. `--config`)
    pub profile_arg: String,
    /// Release configuration profile
    pub profile: String,
    /// Plain environment for the tool
    pub env: BTreeMap<String, String>,
    /// Environment variable names whose values are secrets
    pub secret_env: Vec<String>,
    /// Output tree, relative to the workspace
    pub output_dir: PathBuf,
    /// Overrides the pipeline step timeout
    pub timeout: Option<Duration>,
}

impl BuildSpec {
    /// Full argument list: configured args, then the profile
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if !self.profile_arg.is_empty() {
            args.push(self.profile_arg.clone());
        }
        args.push(self.profile.clone());
        args
    }
}

/// Output of a successful build
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Root of the produced output tree
    pub output_root: PathBuf,
    pub duration: Duration,
}

/// Runs the packaging tool for a platform
pub struct BuildInvoker<'a> {
    runner: &'a dyn ToolRunner,
    spec: &'a BuildSpec,
}

impl<'a> BuildInvoker<'a> {
    pub fn new(runner: &'a dyn ToolRunner, spec: &'a BuildSpec) -> Self {
        Self { runner, spec }
    }

    /// Assemble the invocation, resolving secrets through `lookup`
    pub fn invocation_with<F>(
        &self,
        platform: &PlatformSpec,
        default_timeout: Duration,
        lookup: F,
    ) -> Result<ToolInvocation, StepFailure>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout = self.spec.timeout.unwrap_or(default_timeout);
        let mut invocation = ToolInvocation::new(&self.spec.program, &platform.workspace, timeout)
            .args(self.spec.command_args());

        for (key, value) in &self.spec.env {
            invocation = invocation.env(key, EnvValue::Plain(value.clone()));
        }

        for name in &self.spec.secret_env {
            let value = lookup(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                StepFailure::new(
                    FailureKind::Misconfiguration,
                    BUILD_STEP,
                    ShipwrightError::MissingSecret(name.clone()).to_string(),
                )
            })?;
            invocation = invocation.env(name, EnvValue::Secret(Secret::new(value)));
        }

        Ok(invocation)
    }

    /// Run the packaging tool for `platform`
    pub async fn invoke(
        &self,
        platform: &PlatformSpec,
        default_timeout: Duration,
    ) -> Result<BuildOutput, StepFailure> {
        let invocation =
            self.invocation_with(platform, default_timeout, |name| std::env::var(name).ok())?;

        info!(
            "Building {} with profile {}: {}",
            platform.name,
            self.spec.profile,
            invocation.display_command()
        );

        let output = self.runner.run(&invocation).await.map_err(|e| {
            StepFailure::new(FailureKind::BuildToolFailure, BUILD_STEP, e.to_string())
        })?;

        if !output.success() {
            return Err(StepFailure::new(
                FailureKind::BuildToolFailure,
                BUILD_STEP,
                format!("{} failed: {}", self.spec.program, output.exit),
            )
            .with_exit(output.exit)
            .with_output(output.tail(FAILURE_TAIL_LINES)));
        }

        let output_root = platform.workspace.join(&self.spec.output_dir);
        debug!("Build output root: {}", output_root.display());

        Ok(BuildOutput {
            output_root,
            duration: output.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::OsFamily;

    fn spec() -> BuildSpec {
        BuildSpec {
            program: "pnpm".to_string(),
            args: vec!["tauri".to_string(), "build".to_string()],
            profile_arg: "--config".to_string(),
            profile: "tauri-release.conf.json".to_string(),
            env: BTreeMap::from([("CI".to_string(), "true".to_string())]),
            secret_env: vec!["GITHUB_TOKEN".to_string()],
            output_dir: PathBuf::from("target/release/bundle"),
            timeout: None,
        }
    }

    #[test]
    fn command_args_end_with_profile() {
        assert_eq!(
            spec().command_args(),
            vec!["tauri", "build", "--config", "tauri-release.conf.json"]
        );
    }

    #[test]
    fn secrets_are_resolved_and_redacted() {
        let runner = crate::exec::ProcessRunner::new();
        let spec = spec();
        let invoker = BuildInvoker::new(&runner, &spec);
        let platform = PlatformSpec::bare("ubuntu-22.04", OsFamily::Linux);

        let inv = invoker
            .invocation_with(&platform, Duration::from_secs(10), |name| {
                (name == "GITHUB_TOKEN").then(|| "ghp_secret_value".to_string())
            })
            .unwrap();

        assert_eq!(inv.env["GITHUB_TOKEN"].as_str(), "ghp_secret_value");
        assert_eq!(inv.env["CI"].as_str(), "true");
        assert!(!format!("{:?}", inv).contains("ghp_secret_value"));
        assert!(!inv.display_command().contains("ghp_secret_value"));
    }

    #[test]
    fn missing_secret_is_misconfiguration() {
        let runner = crate::exec::ProcessRunner::new();
        let spec = spec();
        let invoker = BuildInvoker::new(&runner, &spec);
        let platform = PlatformSpec::bare("ubuntu-22.04", OsFamily::Linux);

        let failure = invoker
            .invocation_with(&platform, Duration::from_secs(10), |_| None)
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Misconfiguration);
        assert_eq!(failure.step, BUILD_STEP);
    }
}

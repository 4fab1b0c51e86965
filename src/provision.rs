//! Provisioning step selection and execution
//!
//! Each step carries a [`PlatformPredicate`]. Selection is a hard filter: a
//! step whose predicate is false for a platform is never handed to that
//! platform's worker.

use crate::error::{ShipwrightError, ShipwrightResult};
use crate::exec::{ToolInvocation, ToolRunner, FAILURE_TAIL_LINES};
use crate::pipeline::{FailureKind, StepFailure};
use crate::platform::{applies, PlatformPredicate, PlatformSpec};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// What a provisioning step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisionAction {
    /// Install packages with the platform's package manager
    PackageInstall { packages: Vec<String> },
    /// Run an arbitrary setup command
    Command { program: String, args: Vec<String> },
}

/// A system-level setup step
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningStep {
    pub name: String,
    pub when: PlatformPredicate,
    pub action: ProvisionAction,
    /// Overrides the pipeline step timeout
    pub timeout: Option<Duration>,
}

impl ProvisioningStep {
    /// Build the tool invocation for this step on `platform`
    pub fn invocation(
        &self,
        platform: &PlatformSpec,
        default_timeout: Duration,
    ) -> ShipwrightResult<ToolInvocation> {
        let timeout = self.timeout.unwrap_or(default_timeout);

        let (program, args) = match &self.action {
            ProvisionAction::PackageInstall { packages } => {
                let manager = platform.package_manager.ok_or_else(|| {
                    ShipwrightError::platform_invalid(
                        &platform.name,
                        format!("step {} needs a package manager", self.name),
                    )
                })?;
                manager.install_command(packages)
            }
            ProvisionAction::Command { program, args } => (program.clone(), args.clone()),
        };

        Ok(ToolInvocation::new(program, &platform.workspace, timeout).args(args))
    }

    /// Short description for plans and logs
    pub fn describe(&self) -> String {
        match &self.action {
            ProvisionAction::PackageInstall { packages } => {
                format!("install {}", packages.join(" "))
            }
            ProvisionAction::Command { program, args } => {
                if args.is_empty() {
                    program.clone()
                } else {
                    format!("{} {}", program, args.join(" "))
                }
            }
        }
    }
}

/// Steps applicable to `platform`, in declared order
pub fn select_steps<'a>(
    steps: &'a [ProvisioningStep],
    platform: &PlatformSpec,
) -> Vec<&'a ProvisioningStep> {
    steps
        .iter()
        .filter(|step| applies(&step.when, platform))
        .collect()
}

/// Run one provisioning step
///
/// Spawn failures, non-zero exits and timeouts all become a
/// `ProvisioningFailure`.
pub async fn run_step(
    runner: &dyn ToolRunner,
    step: &ProvisioningStep,
    platform: &PlatformSpec,
    default_timeout: Duration,
) -> Result<(), StepFailure> {
    let step_name = format!("provision:{}", step.name);

    // The selector already filtered, but never run a step whose predicate is false
    if !applies(&step.when, platform) {
        return Err(StepFailure::new(
            FailureKind::Misconfiguration,
            &step_name,
            format!("step {} does not apply to {}", step.name, platform.name),
        ));
    }

    let invocation = step
        .invocation(platform, default_timeout)
        .map_err(|e| StepFailure::new(FailureKind::Misconfiguration, &step_name, e.to_string()))?;

    info!("Provisioning {}: {}", step.name, invocation.display_command());

    let output = runner.run(&invocation).await.map_err(|e| {
        StepFailure::new(FailureKind::ProvisioningFailure, &step_name, e.to_string())
    })?;

    if output.success() {
        Ok(())
    } else {
        Err(StepFailure::new(
            FailureKind::ProvisioningFailure,
            &step_name,
            format!("{} failed: {}", invocation.display_command(), output.exit),
        )
        .with_exit(output.exit)
        .with_output(output.tail(FAILURE_TAIL_LINES)))
    }
}

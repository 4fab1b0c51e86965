//! Per-platform run records

use crate::exec::ExitState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Why a step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ProvisioningFailure,
    BuildToolFailure,
    /// Cache restore/save problem; never fails a run on its own
    CacheTransferFailure,
    UploadFailure,
    /// Invalid platform or pipeline data for this platform
    Misconfiguration,
    /// Worker task ended abnormally
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ProvisioningFailure => "provisioning failure",
            Self::BuildToolFailure => "build tool failure",
            Self::CacheTransferFailure => "cache transfer failure",
            Self::UploadFailure => "upload failure",
            Self::Misconfiguration => "misconfiguration",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// A failed step with diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub kind: FailureKind,
    /// Step name as it appears in the run record
    pub step: String,
    pub message: String,
    /// How the external tool ended, when one ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitState>,
    /// Last lines of tool output
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output_tail: String,
}

impl StepFailure {
    pub fn new(kind: FailureKind, step: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            step: step.to_string(),
            message: message.into(),
            exit: None,
            output_tail: String::new(),
        }
    }

    pub fn with_exit(mut self, exit: ExitState) -> Self {
        self.exit = Some(exit);
        self
    }

    pub fn with_output(mut self, tail: String) -> Self {
        self.output_tail = tail;
        self
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.kind, self.step, self.message)
    }
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// One step of a platform run
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    /// Whether a failure of this step fails the run
    pub required: bool,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Handle to a step inside a [`BuildRun`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepId(usize);

/// Record of one platform's pass through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct BuildRun {
    pub id: Uuid,
    pub platform: String,
    pub steps: Vec<StepRecord>,
    pub status: RunStatus,
    /// First required step failure
    pub failure: Option<StepFailure>,
    pub output_root: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cancelled: bool,
}

impl BuildRun {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform: platform.into(),
            steps: Vec::new(),
            status: RunStatus::Running,
            failure: None,
            output_root: None,
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
        }
    }

    /// Record a step as running
    pub fn start_step(&mut self, name: impl Into<String>, required: bool) -> StepId {
        self.steps.push(StepRecord {
            name: name.into(),
            required,
            status: StepStatus::Running,
            started_at: Some(Utc::now()),
            finished_at: None,
            note: None,
        });
        StepId(self.steps.len() - 1)
    }

    pub fn succeed(&mut self, id: StepId, note: Option<String>) {
        if let Some(step) = self.steps.get_mut(id.0) {
            step.status = StepStatus::Success;
            step.finished_at = Some(Utc::now());
            step.note = note;
        }
    }

    /// Record a failure; the first required failure becomes the run's failure
    pub fn fail(&mut self, id: StepId, failure: StepFailure) {
        let Some(step) = self.steps.get_mut(id.0) else {
            return;
        };
        step.status = StepStatus::Failed;
        step.finished_at = Some(Utc::now());
        step.note = Some(failure.message.clone());
        if step.required && self.failure.is_none() {
            self.failure = Some(failure);
        }
    }

    /// Record a step that never ran
    pub fn skip(&mut self, name: impl Into<String>, required: bool, note: impl Into<String>) {
        self.steps.push(StepRecord {
            name: name.into(),
            required,
            status: StepStatus::Skipped,
            started_at: None,
            finished_at: None,
            note: Some(note.into()),
        });
    }

    /// Record a step skipped because the matrix was cancelled
    pub fn skip_cancelled(&mut self, name: impl Into<String>, required: bool) {
        self.cancelled = true;
        self.skip(name, required, "cancelled");
    }

    /// Whether a required step has failed so far
    pub fn has_failed(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.required && s.status == StepStatus::Failed)
    }

    /// Compute the final status
    ///
    /// Failed iff a required step failed; cancelled if steps were skipped by
    /// cancellation; success otherwise.
    pub fn finish(&mut self) -> RunStatus {
        self.status = if self.has_failed() {
            RunStatus::Failed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Success
        };
        self.finished_at = Some(Utc::now());
        self.status
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

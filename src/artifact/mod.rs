//! Deliverable collection and upload
//!
//! After a successful build the output tree is scanned with include and
//! exclude glob rules. Excludes are applied after includes and only ever
//! narrow the included set. Collection never moves or deletes anything in
//! the output tree; upload copies into a per-platform bucket.

pub mod rules;
pub mod store;

pub use rules::{collect, ArtifactRule, DeliverableFamily, RuleKind};
pub use store::{ArtifactHandle, ArtifactStore, FsArtifactStore};

use serde::Serialize;
use std::path::PathBuf;

/// Whether any file matched the platform's rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactResolution {
    Matched,
    /// No rules applied or nothing matched; not an error
    Empty,
}

/// Final deliverables of one platform
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactBundle {
    pub platform: String,
    /// Output root the files are relative to
    pub root: PathBuf,
    /// Relative file paths, sorted
    pub files: Vec<PathBuf>,
    /// Upload bucket label
    pub destination: String,
    /// Deliverable families whose rules applied
    pub families: Vec<String>,
    pub resolution: ArtifactResolution,
}

impl ArtifactBundle {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

//! Glob rules for selecting deliverables from an output tree

use crate::artifact::{ArtifactBundle, ArtifactResolution};
use crate::error::{ShipwrightError, ShipwrightResult};
use crate::platform::{applies, PlatformPredicate, PlatformSpec};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Include or exclude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Include,
    Exclude,
}

/// A compiled glob rule
///
/// A pattern without `/` matches the file name at any depth; a pattern
/// with `/` matches the path relative to the output root.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRule {
    pub pattern: String,
    pub kind: RuleKind,
    #[serde(skip)]
    compiled: Pattern,
}

impl ArtifactRule {
    pub fn new(pattern: impl Into<String>, kind: RuleKind) -> ShipwrightResult<Self> {
        let pattern = pattern.into();
        let compiled = Pattern::new(&pattern).map_err(|e| ShipwrightError::InvalidGlob {
            pattern: pattern.clone(),
            reason: e.msg.to_string(),
        })?;
        Ok(Self {
            pattern,
            kind,
            compiled,
        })
    }

    pub fn include(pattern: impl Into<String>) -> ShipwrightResult<Self> {
        Self::new(pattern, RuleKind::Include)
    }

    pub fn exclude(pattern: impl Into<String>) -> ShipwrightResult<Self> {
        Self::new(pattern, RuleKind::Exclude)
    }

    /// Whether the rule matches a file at `relative` (forward slashes)
    pub fn matches(&self, relative: &str) -> bool {
        if self.pattern.contains('/') {
            self.compiled.matches_with(relative, MATCH_OPTIONS)
        } else {
            let file_name = relative.rsplit('/').next().unwrap_or(relative);
            self.compiled.matches_with(file_name, MATCH_OPTIONS)
        }
    }
}

/// Installer/package formats relevant to a set of platforms
#[derive(Debug, Clone, Serialize)]
pub struct DeliverableFamily {
    pub name: String,
    pub when: PlatformPredicate,
    pub rules: Vec<ArtifactRule>,
}

impl DeliverableFamily {
    /// Compile a family from include and exclude pattern lists
    pub fn new(
        name: impl Into<String>,
        when: PlatformPredicate,
        include: &[String],
        exclude: &[String],
    ) -> ShipwrightResult<Self> {
        let rules = include
            .iter()
            .map(|p| ArtifactRule::include(p.as_str()))
            .chain(exclude.iter().map(|p| ArtifactRule::exclude(p.as_str())))
            .collect::<ShipwrightResult<Vec<_>>>()?;
        Ok(Self {
            name: name.into(),
            when,
            rules,
        })
    }
}

/// Relative path with `/` separators, regardless of host OS
fn relative_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// All regular files under `root`, relative to it
fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable output entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    files
}

/// Resolve the deliverables for `platform` from the output tree at `root`
///
/// Each applicable family selects the files matching its includes minus
/// its own excludes; the bundle is the union of those selections. A family's
/// excludes never remove files another family selected. Read-only with
/// respect to `root`.
pub fn collect(root: &Path, families: &[DeliverableFamily], platform: &PlatformSpec) -> ArtifactBundle {
    let applicable: Vec<&DeliverableFamily> = families
        .iter()
        .filter(|f| applies(&f.when, platform))
        .collect();

    let files: Vec<(String, PathBuf)> = if root.is_dir() {
        walk_files(root)
            .into_iter()
            .map(|rel| (relative_key(&rel), rel))
            .collect()
    } else {
        debug!("Output root {} does not exist", root.display());
        Vec::new()
    };

    let mut selected = BTreeSet::new();
    for family in &applicable {
        let (includes, excludes): (Vec<&ArtifactRule>, Vec<&ArtifactRule>) = family
            .rules
            .iter()
            .partition(|r| r.kind == RuleKind::Include);

        let mut taken = 0;
        for (key, rel) in &files {
            if includes.iter().any(|r| r.matches(key)) && !excludes.iter().any(|r| r.matches(key)) {
                selected.insert((key.clone(), rel.clone()));
                taken += 1;
            }
        }
        debug!("{}: family {} selected {} file(s)", platform.name, family.name, taken);
    }

    let files: Vec<PathBuf> = selected.into_iter().map(|(_, rel)| rel).collect();
    let resolution = if files.is_empty() {
        ArtifactResolution::Empty
    } else {
        ArtifactResolution::Matched
    };

    ArtifactBundle {
        platform: platform.name.clone(),
        root: root.to_path_buf(),
        files,
        destination: platform.name.clone(),
        families: applicable.iter().map(|f| f.name.clone()).collect(),
        resolution,
    }
}

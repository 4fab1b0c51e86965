//! When a pipeline run is allowed to start

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Pipeline trigger conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trigger {
    /// Branch that push events must target
    pub branch: String,
    /// Path prefixes; a push touching none of them is ignored. Empty = any path
    pub paths: Vec<String>,
    /// Whether manual dispatch is allowed
    pub manual: bool,
}

impl Default for Trigger {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            paths: Vec::new(),
            manual: true,
        }
    }
}

/// What asked for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Manual,
    Push { branch: String, changed: Vec<String> },
}

impl Trigger {
    /// Whether `event` starts a run
    pub fn accepts(&self, event: &TriggerEvent) -> bool {
        match event {
            TriggerEvent::Manual => self.manual,
            TriggerEvent::Push { branch, changed } => {
                if branch != &self.branch {
                    return false;
                }
                if self.paths.is_empty() {
                    return true;
                }
                changed
                    .iter()
                    .any(|path| self.paths.iter().any(|prefix| path_has_prefix(path, prefix)))
            }
        }
    }
}

/// Component-wise prefix match, so `src` matches `src/main.rs` but not `srcx`
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    let normal = |p: &str| -> Vec<String> {
        Path::new(p)
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect()
    };
    let path = normal(path);
    let prefix = normal(prefix);
    path.len() >= prefix.len() && path[..prefix.len()] == prefix[..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(branch: &str, changed: &[&str]) -> TriggerEvent {
        TriggerEvent::Push {
            branch: branch.to_string(),
            changed: changed.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn manual_dispatch() {
        let mut trigger = Trigger::default();
        assert!(trigger.accepts(&TriggerEvent::Manual));
        trigger.manual = false;
        assert!(!trigger.accepts(&TriggerEvent::Manual));
    }

    #[test]
    fn push_requires_branch() {
        let trigger = Trigger::default();
        assert!(trigger.accepts(&push("main", &["README.md"])));
        assert!(!trigger.accepts(&push("feature", &["README.md"])));
    }

    #[test]
    fn push_filters_on_paths() {
        let trigger = Trigger {
            paths: vec!["src-tauri".to_string(), "package.json".to_string()],
            ..Trigger::default()
        };
        assert!(trigger.accepts(&push("main", &["docs/a.md", "src-tauri/src/main.rs"])));
        assert!(trigger.accepts(&push("main", &["package.json"])));
        assert!(!trigger.accepts(&push("main", &["docs/a.md"])));
        assert!(!trigger.accepts(&push("main", &["src-tauri-old/x"])));
    }
}

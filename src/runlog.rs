//! Structured run logs
//!
//! Writes JSON lines to `<state_dir>/runs/<run-id>/<platform>.jsonl`, one
//! line per step transition. Write failures are logged and dropped; a run
//! log never fails a build.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// Per-run log directory shared by all platform workers
#[derive(Debug, Clone)]
pub struct RunLog {
    enabled: bool,
    dir: PathBuf,
}

impl RunLog {
    /// Log under `runs_dir/<run_id>`
    pub fn new(runs_dir: &Path, run_id: Uuid, enabled: bool) -> Self {
        Self {
            enabled,
            dir: runs_dir.join(run_id.to_string()),
        }
    }

    /// A log that writes nothing
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Path of the log file for `platform`
    pub fn platform_path(&self, platform: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", platform))
    }

    /// Append an event for `platform`
    pub async fn log(&self, platform: &str, event: &str, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "platform": platform,
            "event": event,
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize run log event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&self.platform_path(platform), &line).await {
            warn!("Failed to write run log for {}: {}", platform, e);
        }
    }

    /// Write a pretty JSON document next to the platform logs
    pub async fn write_document(&self, name: &str, value: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let content = match serde_json::to_string_pretty(value) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize {}: {}", name, e);
                return;
            }
        };

        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(self.dir.join(name), content).await
        }
        .await;
        if let Err(e) = result {
            warn!("Failed to write {}: {}", name, e);
        }
    }

    async fn append(&self, path: &Path, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

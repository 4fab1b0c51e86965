//! Child process tool runner
//!
//! Implements the ToolRunner trait with tokio child processes. Output is
//! streamed line by line into the trace log and kept for diagnostics.

use crate::error::{ShipwrightError, ShipwrightResult};
use crate::exec::runner::ToolRunner;
use crate::exec::{stream_child_output, ExitState, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Tool runner using real child processes
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a new process runner
    pub fn new() -> Self {
        Self
    }

    fn command(invocation: &ToolInvocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &invocation.env {
            cmd.env(key, value.as_str());
        }
        cmd
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> ShipwrightResult<ToolOutput> {
        let command_line = invocation.display_command();
        debug!("Executing: {} (in {})", command_line, invocation.cwd.display());

        let start = Instant::now();
        let mut child = Self::command(invocation)
            .spawn()
            .map_err(|e| ShipwrightError::command_failed(command_line.clone(), e))?;

        let on_output = |line: &str| trace!("{}", line);

        let mut lines = Vec::new();
        let result = tokio::time::timeout(invocation.timeout, async {
            stream_child_output(&mut child, &on_output, &mut lines).await;
            child.wait().await
        })
        .await;

        match result {
            Ok(status) => {
                let status = status
                    .map_err(|e| ShipwrightError::command_failed(command_line.clone(), e))?;
                let exit = match status.code() {
                    Some(code) => ExitState::Exited { code },
                    None => ExitState::Signaled,
                };
                debug!("{} finished: {}", command_line, exit);
                Ok(ToolOutput {
                    exit,
                    lines,
                    duration: start.elapsed(),
                })
            }
            Err(_) => {
                let exit = ExitState::TimedOut {
                    millis: u64::try_from(invocation.timeout.as_millis()).unwrap_or(u64::MAX),
                };
                warn!("{} {}, killing", command_line, exit);
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill timed out process {}: {}", command_line, e);
                }
                // Output read before the deadline is kept for diagnostics
                Ok(ToolOutput {
                    exit,
                    lines,
                    duration: start.elapsed(),
                })
            }
        }
    }

    fn runner_name(&self) -> &'static str {
        "process"
    }
}

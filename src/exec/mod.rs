//! External tool invocation
//!
//! Every pipeline step that leaves the process (package installs, the
//! bundler, provisioning commands) goes through a [`ToolRunner`]:
//! - [`ProcessRunner`]: real child processes via tokio
//! - test doubles implementing the trait directly

mod process;
mod runner;

pub use process::ProcessRunner;
pub use runner::ToolRunner;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// Max number of output lines carried in step failure diagnostics.
pub const FAILURE_TAIL_LINES: usize = 50;

/// Opaque secret value; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw value (only for handing to a child process)
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

/// Environment variable value for a child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Plain(String),
    Secret(Secret),
}

impl EnvValue {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(v) => v,
            Self::Secret(s) => s.expose(),
        }
    }
}

/// A single external tool invocation
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment for the child
    pub env: BTreeMap<String, EnvValue>,
    /// Working directory
    pub cwd: PathBuf,
    /// Upper bound on wall-clock time
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: cwd.into(),
            timeout,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: EnvValue) -> Self {
        self.env.insert(key.into(), value);
        self
    }

    /// Command line for logs; environment is never included
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// How an external invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExitState {
    /// Process exited with a code
    Exited { code: i32 },
    /// Process was terminated by a signal
    Signaled,
    /// Timeout elapsed; the process was killed
    TimedOut { millis: u64 },
}

impl ExitState {
    pub fn success(&self) -> bool {
        matches!(self, Self::Exited { code: 0 })
    }

    /// Exit code, if the process exited normally
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited { code } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code } => write!(f, "exit code {}", code),
            Self::Signaled => write!(f, "terminated by signal"),
            Self::TimedOut { millis } if millis % 1000 == 0 => {
                write!(f, "timed out after {}s", millis / 1000)
            }
            Self::TimedOut { millis } => write!(f, "timed out after {}ms", millis),
        }
    }
}

/// Result of running an external tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit: ExitState,
    /// Combined stdout+stderr lines, in arrival order
    pub lines: Vec<String>,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit.success()
    }

    /// Last `n` captured lines joined with newlines
    pub fn tail(&self, n: usize) -> String {
        tail_lines(&self.lines, n)
    }
}

/// Return the last `n` lines joined with newlines.
pub fn tail_lines(lines: &[String], n: usize) -> String {
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Lines are pushed into `all_output` as they arrive, so a caller that
/// abandons this future (on timeout) keeps what was read so far. Streams
/// that were not piped are treated as already closed.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(&str) + Send + Sync),
    all_output: &mut Vec<String>,
) {
    let mut stderr_reader = child.stderr.take().map(|s| BufReader::new(s).lines());
    let mut stdout_reader = child.stdout.take().map(|s| BufReader::new(s).lines());

    let mut stderr_done = stderr_reader.is_none();
    let mut stdout_done = stdout_reader.is_none();

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = next_line(&mut stderr_reader), if !stderr_done => {
                match line {
                    Some(line) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    None => stderr_done = true,
                }
            }
            line = next_line(&mut stdout_reader), if !stdout_done => {
                match line {
                    Some(line) => {
                        on_output(&line);
                        all_output.push(line);
                    }
                    None => stdout_done = true,
                }
            }
        }
    }
}

async fn next_line<R>(reader: &mut Option<Lines<R>>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_redacted() {
        let secret = Secret::new("ghp_topsecret");
        assert_eq!(format!("{}", secret), "***");
        assert!(!format!("{:?}", secret).contains("topsecret"));

        let inv = ToolInvocation::new("pnpm", ".", Duration::from_secs(1))
            .args(["tauri", "build"])
            .env("GITHUB_TOKEN", EnvValue::Secret(secret));
        assert!(!format!("{:?}", inv).contains("topsecret"));
        assert_eq!(inv.display_command(), "pnpm tauri build");
    }

    #[test]
    fn tail_keeps_last_lines() {
        let lines: Vec<String> = (0..80).map(|i| format!("line {}", i)).collect();
        let tail = tail_lines(&lines, FAILURE_TAIL_LINES);
        assert_eq!(tail.lines().count(), 50);
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 79"));

        assert_eq!(tail_lines(&lines[..2], 50), "line 0\nline 1");
    }

    #[test]
    fn exit_state_success() {
        assert!(ExitState::Exited { code: 0 }.success());
        assert!(!ExitState::Exited { code: 2 }.success());
        assert!(!ExitState::TimedOut { millis: 5000 }.success());
        assert_eq!(ExitState::Signaled.code(), None);
        assert_eq!(
            ExitState::TimedOut { millis: 5000 }.to_string(),
            "timed out after 5s"
        );
        assert_eq!(
            ExitState::TimedOut { millis: 500 }.to_string(),
            "timed out after 500ms"
        );
    }
}

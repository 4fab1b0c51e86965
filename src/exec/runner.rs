//! Tool runner abstraction
//!
//! Provides a trait for running external tools that can be implemented
//! by different backends (real child processes, scripted fakes in tests).

use crate::error::ShipwrightResult;
use crate::exec::{ToolInvocation, ToolOutput};
use async_trait::async_trait;

/// Abstract external tool interface
///
/// `Err` is reserved for invocations that could not be started at all.
/// A non-zero exit, a signal or a timeout is a normal `Ok(ToolOutput)`.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the invocation to completion (or until its timeout)
    async fn run(&self, invocation: &ToolInvocation) -> ShipwrightResult<ToolOutput>;

    /// Get the human-readable runner name for display
    fn runner_name(&self) -> &'static str;
}

//! Concurrent execution of all platforms in the matrix
//!
//! One tokio task per platform. Under fail-fast the first failed platform
//! raises a shared [`CancelSignal`]: platforms waiting for a slot never
//! start, and running platforms start no further steps. A step already in
//! progress is allowed to finish.

use crate::pipeline::run::RunStatus;
use crate::pipeline::worker::{PlatformOutcome, PlatformWorker, Services};
use crate::pipeline::Pipeline;
use crate::platform::PlatformDescriptor;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared cancellation flag; once raised it stays raised
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is raised
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so wait_for cannot observe a closed channel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate result of one matrix run
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub run_id: Uuid,
    pub pipeline: String,
    pub fail_fast: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub outcomes: BTreeMap<String, PlatformOutcome>,
}

impl MatrixReport {
    /// Failed if any platform failed, cancelled if any was cancelled
    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Platforms whose run failed
    pub fn failed(&self) -> Vec<&PlatformOutcome> {
        self.outcomes
            .values()
            .filter(|o| o.status() == RunStatus::Failed)
            .collect()
    }

    fn overall(outcomes: &BTreeMap<String, PlatformOutcome>) -> RunStatus {
        let statuses: Vec<RunStatus> = outcomes.values().map(PlatformOutcome::status).collect();
        if statuses.contains(&RunStatus::Failed) {
            RunStatus::Failed
        } else if statuses.contains(&RunStatus::Cancelled) {
            RunStatus::Cancelled
        } else {
            RunStatus::Success
        }
    }
}

/// Fans a pipeline out over its platforms
pub struct MatrixRunner {
    pipeline: Arc<Pipeline>,
    services: Services,
    run_id: Uuid,
}

impl MatrixRunner {
    pub fn new(pipeline: Arc<Pipeline>, services: Services, run_id: Uuid) -> Self {
        Self {
            pipeline,
            services,
            run_id,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run `platforms` concurrently and collect every outcome
    pub async fn run(&self, platforms: &[PlatformDescriptor], fail_fast: bool) -> MatrixReport {
        let started_at = Utc::now();
        let cancel = CancelSignal::new();
        let semaphore = self.pipeline.max_parallel.map(|n| Arc::new(Semaphore::new(n)));

        info!(
            "Starting {} on {} platform(s) (fail-fast: {})",
            self.pipeline.name,
            platforms.len(),
            fail_fast
        );

        let mut tasks = JoinSet::new();
        for descriptor in platforms.iter().cloned() {
            let worker =
                PlatformWorker::new(self.pipeline.clone(), self.services.clone(), cancel.clone());
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let permit = match semaphore {
                    Some(semaphore) => tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return PlatformOutcome::cancelled(&descriptor.name);
                        }
                        permit = semaphore.acquire_owned() => permit.ok(),
                    },
                    None => None,
                };

                let outcome = match AssertUnwindSafe(worker.run(&descriptor)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!("Worker for {} panicked: {}", descriptor.name, message);
                        PlatformOutcome::aborted(&descriptor.name, message)
                    }
                };

                // Raise before releasing the slot so a waiting platform sees it
                if fail_fast && outcome.status() == RunStatus::Failed && !cancel.is_cancelled() {
                    warn!("{} failed; cancelling remaining platforms", descriptor.name);
                    cancel.cancel();
                }
                drop(permit);
                outcome
            });
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    outcomes.insert(outcome.run.platform.clone(), outcome);
                }
                Err(e) => error!("Platform task ended abnormally: {}", e),
            }
        }
        record_lost_platforms(&mut outcomes, platforms);

        let status = MatrixReport::overall(&outcomes);
        let report = MatrixReport {
            run_id: self.run_id,
            pipeline: self.pipeline.name.clone(),
            fail_fast,
            started_at,
            finished_at: Utc::now(),
            status,
            outcomes,
        };

        match serde_json::to_value(&report) {
            Ok(value) => {
                self.services
                    .run_log
                    .write_document("report.json", &value)
                    .await
            }
            Err(e) => warn!("Failed to serialize matrix report: {}", e),
        }

        info!("Matrix finished: {}", report.status);
        report
    }
}

/// Every requested platform gets an outcome; one whose task never
/// reported back is failed as aborted.
fn record_lost_platforms(
    outcomes: &mut BTreeMap<String, PlatformOutcome>,
    platforms: &[PlatformDescriptor],
) {
    for descriptor in platforms {
        if !outcomes.contains_key(&descriptor.name) {
            outcomes.insert(
                descriptor.name.clone(),
                PlatformOutcome::aborted(&descriptor.name, "platform task ended abnormally"),
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::FsArtifactStore;
    use crate::cache::{CacheManager, MemoryCacheStore};
    use crate::config::Config;
    use crate::error::ShipwrightResult;
    use crate::exec::{ExitState, ToolInvocation, ToolOutput, ToolRunner};
    use crate::pipeline::FailureKind;
    use crate::runlog::RunLog;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct FailingRunner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolRunner for FailingRunner {
        async fn run(&self, _invocation: &ToolInvocation) -> ShipwrightResult<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ToolOutput {
                exit: ExitState::Exited { code: 2 },
                lines: vec!["error: boom".to_string()],
                duration: Duration::from_millis(1),
            })
        }

        fn runner_name(&self) -> &'static str {
            "failing"
        }
    }

    struct PanickingRunner;

    #[async_trait]
    impl ToolRunner for PanickingRunner {
        async fn run(&self, invocation: &ToolInvocation) -> ShipwrightResult<ToolOutput> {
            panic!("runner exploded on {}", invocation.program);
        }

        fn runner_name(&self) -> &'static str {
            "panicking"
        }
    }

    fn pipeline(workspace: &Path, max_parallel: Option<usize>) -> Arc<Pipeline> {
        let mut config: Config = toml::from_str(
            r#"
            provision = []
            cache = []
            artifacts = []

            [[platform]]
            name = "a"
            os = "linux"

            [[platform]]
            name = "b"
            os = "macos"

            [build]
            program = "bundler"
            args = []
            profile = "release"
            secret_env = []
            output_dir = "out"
            "#,
        )
        .unwrap();
        config.matrix.max_parallel = max_parallel;
        Arc::new(Pipeline::from_config(&config, workspace).unwrap())
    }

    fn services(runner: Arc<dyn ToolRunner>, dir: &Path) -> Services {
        Services {
            runner,
            cache: CacheManager::new(Arc::new(MemoryCacheStore::new())),
            artifacts: Arc::new(FsArtifactStore::new(dir)),
            run_log: RunLog::disabled(),
        }
    }

    #[tokio::test]
    async fn fail_fast_prevents_queued_platform() {
        let ws = TempDir::new().unwrap();
        let pipeline = pipeline(ws.path(), Some(1));
        let runner = Arc::new(FailingRunner {
            calls: AtomicUsize::new(0),
        });
        let matrix = MatrixRunner::new(
            pipeline.clone(),
            services(runner.clone(), ws.path()),
            Uuid::new_v4(),
        );

        let report = matrix.run(&pipeline.platforms, true).await;

        assert_eq!(report.status(), RunStatus::Failed);
        assert_eq!(report.failed().len(), 1);
        let statuses: Vec<RunStatus> = report.outcomes.values().map(|o| o.status()).collect();
        assert!(statuses.contains(&RunStatus::Cancelled));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn without_fail_fast_every_platform_runs() {
        let ws = TempDir::new().unwrap();
        let pipeline = pipeline(ws.path(), Some(1));
        let runner = Arc::new(FailingRunner {
            calls: AtomicUsize::new(0),
        });
        let matrix = MatrixRunner::new(
            pipeline.clone(),
            services(runner.clone(), ws.path()),
            Uuid::new_v4(),
        );

        let report = matrix.run(&pipeline.platforms, false).await;

        assert_eq!(report.failed().len(), 2);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
        for outcome in report.outcomes.values() {
            let failure = outcome.run.failure.as_ref().unwrap();
            assert_eq!(failure.kind, FailureKind::BuildToolFailure);
            assert!(failure.output_tail.contains("error: boom"));
        }
    }

    #[tokio::test]
    async fn panicking_worker_fails_only_its_platform() {
        let ws = TempDir::new().unwrap();
        let pipeline = pipeline(ws.path(), None);
        let matrix = MatrixRunner::new(
            pipeline.clone(),
            services(Arc::new(PanickingRunner), ws.path()),
            Uuid::new_v4(),
        );

        let report = matrix.run(&pipeline.platforms, false).await;

        assert_eq!(report.outcomes.len(), 2);
        for outcome in report.outcomes.values() {
            assert_eq!(outcome.status(), RunStatus::Failed);
            assert_eq!(
                outcome.run.failure.as_ref().unwrap().kind,
                FailureKind::Aborted
            );
        }
    }

    #[test]
    fn lost_platform_fails_the_matrix() {
        let ws = TempDir::new().unwrap();
        let pipeline = pipeline(ws.path(), None);
        let first = &pipeline.platforms[0].name;
        let second = &pipeline.platforms[1].name;

        let mut outcomes = BTreeMap::new();
        outcomes.insert(first.clone(), PlatformOutcome::cancelled(first));
        record_lost_platforms(&mut outcomes, &pipeline.platforms);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[first].status(), RunStatus::Cancelled);
        let lost = &outcomes[second];
        assert_eq!(lost.status(), RunStatus::Failed);
        assert_eq!(
            lost.run.failure.as_ref().unwrap().kind,
            FailureKind::Aborted
        );
        assert_eq!(MatrixReport::overall(&outcomes), RunStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_signal_wakes_waiters() {
        let signal = CancelSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        signal.cancel();
        waiter.await.unwrap();
        assert!(signal.is_cancelled());
    }
}

//! Single-platform pipeline execution
//!
//! Step order per platform:
//!
//! | Step | Required | Runs when |
//! |------|----------|-----------|
//! | `resolve` | yes | always |
//! | `cache-restore:<class>` | no | all classes concurrently |
//! | `provision:<step>` | yes | in declared order |
//! | `build` | yes | provisioning succeeded |
//! | `cache-save:<class>` | no | build succeeded |
//! | `collect` | yes | build succeeded |
//! | `upload` | yes | collection succeeded |
//!
//! Once a required step fails, or the matrix is cancelled, every later step
//! is recorded as skipped.

use crate::artifact::{self, ArtifactBundle, ArtifactHandle, ArtifactStore};
use crate::build::{BuildInvoker, BUILD_STEP};
use crate::cache::{CacheClass, CacheEntry, CacheManager, RestoreOutcome, SaveOutcome};
use crate::exec::ToolRunner;
use crate::pipeline::matrix::CancelSignal;
use crate::pipeline::run::{BuildRun, FailureKind, RunStatus, StepFailure, StepId};
use crate::pipeline::Pipeline;
use crate::platform::{PlatformDescriptor, PlatformSpec};
use crate::provision::{self, ProvisioningStep};
use crate::runlog::RunLog;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

const RESOLVE_STEP: &str = "resolve";
const COLLECT_STEP: &str = "collect";
const UPLOAD_STEP: &str = "upload";

/// Backends shared by all platform workers
#[derive(Clone)]
pub struct Services {
    pub runner: Arc<dyn ToolRunner>,
    pub cache: CacheManager,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub run_log: RunLog,
}

/// Everything one platform produced
#[derive(Debug, Clone, Serialize)]
pub struct PlatformOutcome {
    pub run: BuildRun,
    /// Restore result per cache class
    pub cache_entries: Vec<CacheEntry>,
    /// Save result per cache class, for classes that reached the save step
    pub cache_saves: BTreeMap<String, SaveOutcome>,
    pub bundle: Option<ArtifactBundle>,
    pub uploads: Vec<ArtifactHandle>,
}

impl PlatformOutcome {
    fn new(run: BuildRun) -> Self {
        Self {
            run,
            cache_entries: Vec::new(),
            cache_saves: BTreeMap::new(),
            bundle: None,
            uploads: Vec::new(),
        }
    }

    /// Outcome for a worker that ended without producing a run
    pub fn aborted(platform: &str, message: impl Into<String>) -> Self {
        let mut run = BuildRun::new(platform);
        let id = run.start_step("worker", true);
        run.fail(
            id,
            StepFailure::new(FailureKind::Aborted, "worker", message),
        );
        run.finish();
        Self::new(run)
    }

    /// Outcome for a platform that never started because of cancellation
    pub fn cancelled(platform: &str) -> Self {
        let mut run = BuildRun::new(platform);
        run.skip_cancelled(RESOLVE_STEP, true);
        run.finish();
        Self::new(run)
    }

    pub fn status(&self) -> RunStatus {
        self.run.status
    }
}

enum Stage<'a> {
    Provision(&'a ProvisioningStep),
    Build,
    CacheSave(&'a CacheClass),
    Collect,
    Upload,
}

impl Stage<'_> {
    fn name(&self) -> String {
        match self {
            Self::Provision(step) => format!("provision:{}", step.name),
            Self::Build => BUILD_STEP.to_string(),
            Self::CacheSave(class) => format!("cache-save:{}", class.name),
            Self::Collect => COLLECT_STEP.to_string(),
            Self::Upload => UPLOAD_STEP.to_string(),
        }
    }

    fn required(&self) -> bool {
        !matches!(self, Self::CacheSave(_))
    }
}

/// Runs the pipeline for one platform
#[derive(Clone)]
pub struct PlatformWorker {
    pipeline: Arc<Pipeline>,
    services: Services,
    cancel: CancelSignal,
}

impl PlatformWorker {
    pub fn new(pipeline: Arc<Pipeline>, services: Services, cancel: CancelSignal) -> Self {
        Self {
            pipeline,
            services,
            cancel,
        }
    }

    /// Run every step for `descriptor`; never returns an error
    pub async fn run(&self, descriptor: &PlatformDescriptor) -> PlatformOutcome {
        let span = info_span!("platform", name = %descriptor.name);
        self.run_inner(descriptor).instrument(span).await
    }

    async fn run_inner(&self, descriptor: &PlatformDescriptor) -> PlatformOutcome {
        let started = Instant::now();
        let mut outcome = PlatformOutcome::new(BuildRun::new(&descriptor.name));
        self.log(&descriptor.name, "run.started", serde_json::json!({ "run": outcome.run.id }))
            .await;

        if self.cancel.is_cancelled() {
            outcome.run.skip_cancelled(RESOLVE_STEP, true);
            return self.finish(outcome, started).await;
        }

        let resolve = outcome.run.start_step(RESOLVE_STEP, true);
        let platform = match PlatformSpec::resolve(descriptor, &self.pipeline) {
            Ok(platform) => {
                outcome.run.succeed(resolve, None);
                platform
            }
            Err(e) => {
                warn!("{}", e);
                outcome.run.fail(
                    resolve,
                    StepFailure::new(FailureKind::Misconfiguration, RESOLVE_STEP, e.to_string()),
                );
                return self.finish(outcome, started).await;
            }
        };

        let restored = self.restore_caches(&platform, &mut outcome).await;

        let mut stages: Vec<Stage> = platform.steps.iter().map(Stage::Provision).collect();
        stages.push(Stage::Build);
        stages.extend(platform.cache_classes.iter().map(Stage::CacheSave));
        stages.push(Stage::Collect);
        stages.push(Stage::Upload);

        let mut blocked: Option<String> = None;
        for stage in &stages {
            let name = stage.name();
            let required = stage.required();

            if self.cancel.is_cancelled() {
                outcome.run.skip_cancelled(&name, required);
                self.log(&platform.name, "step.skipped", serde_json::json!({ "step": name, "reason": "cancelled" }))
                    .await;
                continue;
            }
            if let Some(reason) = &blocked {
                outcome.run.skip(&name, required, reason.clone());
                self.log(&platform.name, "step.skipped", serde_json::json!({ "step": name, "reason": reason }))
                    .await;
                continue;
            }

            let id = outcome.run.start_step(&name, required);
            self.log(&platform.name, "step.started", serde_json::json!({ "step": name }))
                .await;
            let step_started = Instant::now();

            let result = self.execute(stage, &platform, &restored, &mut outcome).await;
            let elapsed = step_started.elapsed();

            match result {
                Ok(note) => {
                    info!("{} finished in {:.1}s", name, elapsed.as_secs_f64());
                    self.record_success(&platform.name, &mut outcome, id, &name, note)
                        .await;
                }
                Err(failure) => {
                    warn!("{} failed after {:.1}s: {}", name, elapsed.as_secs_f64(), failure);
                    if required {
                        blocked = Some(format!("{} failed", name));
                    }
                    self.record_failure(&platform.name, &mut outcome, id, failure)
                        .await;
                }
            }
        }

        self.finish(outcome, started).await
    }

    /// Restore all applicable cache classes concurrently
    async fn restore_caches(
        &self,
        platform: &PlatformSpec,
        outcome: &mut PlatformOutcome,
    ) -> BTreeMap<String, CacheEntry> {
        let mut restored = BTreeMap::new();
        if platform.cache_classes.is_empty() {
            return restored;
        }

        if self.cancel.is_cancelled() {
            for class in &platform.cache_classes {
                outcome
                    .run
                    .skip_cancelled(format!("cache-restore:{}", class.name), false);
            }
            return restored;
        }

        let ids: Vec<StepId> = platform
            .cache_classes
            .iter()
            .map(|class| {
                outcome
                    .run
                    .start_step(format!("cache-restore:{}", class.name), false)
            })
            .collect();

        let results = join_all(
            platform
                .cache_classes
                .iter()
                .map(|class| self.services.cache.restore(platform, class)),
        )
        .await;

        for ((class, id), result) in platform.cache_classes.iter().zip(ids).zip(results) {
            let step = format!("cache-restore:{}", class.name);
            match result {
                Ok(entry) => {
                    let note = match (&entry.outcome, &entry.restored_key) {
                        (RestoreOutcome::Miss, _) | (_, None) => entry.outcome.to_string(),
                        (hit, Some(key)) => format!("{} ({})", hit, key),
                    };
                    self.record_success(&platform.name, outcome, id, &step, Some(note))
                        .await;
                    outcome.cache_entries.push(entry.clone());
                    restored.insert(class.name.clone(), entry);
                }
                Err(e) => {
                    warn!("Cache restore for {} failed, continuing cold: {}", class.name, e);
                    let failure =
                        StepFailure::new(FailureKind::CacheTransferFailure, &step, e.to_string());
                    self.record_failure(&platform.name, outcome, id, failure)
                        .await;
                }
            }
        }

        restored
    }

    async fn execute(
        &self,
        stage: &Stage<'_>,
        platform: &PlatformSpec,
        restored: &BTreeMap<String, CacheEntry>,
        outcome: &mut PlatformOutcome,
    ) -> Result<Option<String>, StepFailure> {
        let runner = self.services.runner.as_ref();
        let timeout = self.pipeline.step_timeout;

        match stage {
            Stage::Provision(step) => {
                provision::run_step(runner, step, platform, timeout).await?;
                Ok(None)
            }
            Stage::Build => {
                let output = BuildInvoker::new(runner, &self.pipeline.build)
                    .invoke(platform, timeout)
                    .await?;
                outcome.run.output_root = Some(output.output_root);
                Ok(Some(format!("{:.1}s", output.duration.as_secs_f64())))
            }
            Stage::CacheSave(class) => {
                let saved = self.save_cache(platform, class, restored.get(&class.name)).await?;
                outcome.cache_saves.insert(class.name.clone(), saved);
                Ok(Some(saved.to_string()))
            }
            Stage::Collect => {
                let root = outcome
                    .run
                    .output_root
                    .clone()
                    .unwrap_or_else(|| platform.workspace.join(&self.pipeline.build.output_dir));
                let bundle = artifact::collect(&root, &self.pipeline.families, platform);
                let note = format!("{} file(s)", bundle.files.len());
                if bundle.is_empty() {
                    warn!("No deliverables matched in {}", root.display());
                }
                outcome.bundle = Some(bundle);
                Ok(Some(note))
            }
            Stage::Upload => {
                let Some(bundle) = outcome.bundle.as_ref().filter(|b| !b.is_empty()) else {
                    return Ok(Some("nothing to upload".to_string()));
                };
                let handles = self
                    .services
                    .artifacts
                    .upload(&bundle.destination, &bundle.root, &bundle.files)
                    .await
                    .map_err(|e| {
                        StepFailure::new(FailureKind::UploadFailure, UPLOAD_STEP, e.to_string())
                    })?;
                let note = format!("{} file(s) to {}", handles.len(), bundle.destination);
                outcome.uploads = handles;
                Ok(Some(note))
            }
        }
    }

    async fn save_cache(
        &self,
        platform: &PlatformSpec,
        class: &CacheClass,
        entry: Option<&CacheEntry>,
    ) -> Result<SaveOutcome, StepFailure> {
        let step = format!("cache-save:{}", class.name);
        let transfer = |e: crate::error::ShipwrightError| {
            StepFailure::new(FailureKind::CacheTransferFailure, &step, e.to_string())
        };

        let fresh;
        let entry = match entry {
            Some(entry) => entry,
            None => {
                // Restore failed; derive the key now
                let key = self.services.cache.derive_key(platform, class).await.map_err(transfer)?;
                fresh = CacheEntry {
                    class: class.name.clone(),
                    location: String::new(),
                    key,
                    outcome: RestoreOutcome::Miss,
                    restored_key: None,
                };
                &fresh
            }
        };

        self.services
            .cache
            .save(platform, class, entry)
            .await
            .map_err(transfer)
    }

    async fn record_success(
        &self,
        platform: &str,
        outcome: &mut PlatformOutcome,
        id: StepId,
        step: &str,
        note: Option<String>,
    ) {
        self.log(
            platform,
            "step.finished",
            serde_json::json!({ "step": step, "status": "success", "note": note }),
        )
        .await;
        outcome.run.succeed(id, note);
    }

    async fn record_failure(
        &self,
        platform: &str,
        outcome: &mut PlatformOutcome,
        id: StepId,
        failure: StepFailure,
    ) {
        self.log(
            platform,
            "step.finished",
            serde_json::json!({ "step": failure.step, "status": "failed", "failure": failure }),
        )
        .await;
        outcome.run.fail(id, failure);
    }

    async fn finish(&self, mut outcome: PlatformOutcome, started: Instant) -> PlatformOutcome {
        let status = outcome.run.finish();
        let elapsed = started.elapsed().as_secs_f64();
        match status {
            RunStatus::Success => info!("Platform succeeded in {:.1}s", elapsed),
            RunStatus::Cancelled => info!("Platform cancelled after {:.1}s", elapsed),
            _ => warn!("Platform {} after {:.1}s", status, elapsed),
        }
        self.log(
            &outcome.run.platform,
            "run.finished",
            serde_json::json!({ "status": status, "failure": outcome.run.failure }),
        )
        .await;
        debug!("{} step(s) recorded", outcome.run.steps.len());
        outcome
    }

    async fn log(&self, platform: &str, event: &str, data: serde_json::Value) {
        self.services.run_log.log(platform, event, &data).await;
    }
}

//! End-to-end matrix runs against a scripted tool runner

use async_trait::async_trait;
use shipwright::artifact::FsArtifactStore;
use shipwright::cache::{CacheManager, CacheStore, MemoryCacheStore, RestoreOutcome, SaveOutcome};
use shipwright::config::Config;
use shipwright::error::ShipwrightResult;
use shipwright::exec::{ExitState, ToolInvocation, ToolOutput, ToolRunner};
use shipwright::pipeline::{
    FailureKind, MatrixReport, MatrixRunner, Pipeline, RunStatus, Services, StepStatus,
};
use shipwright::runlog::RunLog;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Fakes the packaging tool per workspace directory
struct ScriptedRunner {
    calls: Mutex<Vec<(String, String)>>,
    failing: Vec<String>,
    slow: Duration,
}

impl ScriptedRunner {
    fn new(failing: &[&str], slow: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: failing.iter().map(|s| s.to_string()).collect(),
            slow,
        }
    }

    fn programs_in(&self, workspace: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(ws, _)| ws == workspace)
            .map(|(_, program)| program.clone())
            .collect()
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &ToolInvocation) -> ShipwrightResult<ToolOutput> {
        let workspace = invocation
            .cwd
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push((workspace.clone(), invocation.program.clone()));

        let mut code = 0;
        let mut lines = vec![format!("running {}", invocation.program)];
        match invocation.program.as_str() {
            "slow" => tokio::time::sleep(self.slow).await,
            "bundler" if self.failing.contains(&workspace) => {
                // Let the other platforms get going first
                tokio::time::sleep(Duration::from_millis(50)).await;
                code = 1;
                lines.push("error: bundling failed".to_string());
            }
            "bundler" => {
                let out = invocation.cwd.join("out");
                fs::create_dir_all(out.join("nested")).unwrap();
                if workspace == "windows" {
                    fs::write(out.join("app.msi"), b"msi").unwrap();
                    fs::write(out.join("app.msi.zip"), b"zip").unwrap();
                    fs::write(out.join("app.msi.zip.sig"), b"sig").unwrap();
                } else {
                    fs::write(out.join("nested/app.deb"), b"deb").unwrap();
                }
            }
            _ => {}
        }

        Ok(ToolOutput {
            exit: ExitState::Exited { code },
            lines,
            duration: Duration::from_millis(1),
        })
    }

    fn runner_name(&self) -> &'static str {
        "scripted"
    }
}

const PIPELINE: &str = r#"
[[platform]]
name = "windows"
os = "windows"
workspace = "windows"

[[platform]]
name = "ubuntu"
os = "linux"
package_manager = "apt"
workspace = "ubuntu"

[[provision]]
name = "linux-libs"
when = "unix"
packages = ["libgtk-3-dev"]

[[provision]]
name = "slow-setup"
when = { platform = ["ubuntu"] }
program = "slow"

[[cache]]
name = "deps"
key_files = ["lock"]
paths = ["deps"]

[build]
program = "bundler"
args = ["build"]
profile_arg = "--config"
profile = "release.json"
secret_env = []
output_dir = "out"

[[artifacts]]
name = "windows"
when = { os = ["windows"] }
include = ["*.msi", "*.msi.zip", "*.sig"]
exclude = ["*.sig"]

[[artifacts]]
name = "linux"
when = { os = ["linux"] }
include = ["*.deb"]
"#;

struct Fixture {
    _root: TempDir,
    pipeline: Arc<Pipeline>,
    artifact_dir: PathBuf,
    store: Arc<MemoryCacheStore>,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        for ws in ["windows", "ubuntu"] {
            let dir = root.path().join(ws);
            fs::create_dir_all(dir.join("deps")).unwrap();
            fs::write(dir.join("lock"), "lock v1").unwrap();
            fs::write(dir.join("deps/module.bin"), ws).unwrap();
        }
        let config: Config = toml::from_str(PIPELINE).unwrap();
        let pipeline = Pipeline::from_config(&config, root.path()).unwrap();
        let artifact_dir = root.path().join("uploads");

        Self {
            _root: root,
            pipeline: Arc::new(pipeline),
            artifact_dir,
            store: Arc::new(MemoryCacheStore::new()),
        }
    }

    fn services(&self, runner: Arc<ScriptedRunner>) -> Services {
        Services {
            runner,
            cache: CacheManager::new(self.store.clone()),
            artifacts: Arc::new(FsArtifactStore::new(&self.artifact_dir)),
            run_log: RunLog::disabled(),
        }
    }

    async fn run(&self, runner: Arc<ScriptedRunner>, fail_fast: bool) -> MatrixReport {
        MatrixRunner::new(self.pipeline.clone(), self.services(runner), Uuid::new_v4())
            .run(&self.pipeline.platforms, fail_fast)
            .await
    }
}

#[tokio::test]
async fn one_platform_failure_leaves_the_other_intact() {
    let fixture = Fixture::new();
    let runner = Arc::new(ScriptedRunner::new(&["ubuntu"], Duration::from_millis(1)));

    let report = fixture.run(runner.clone(), false).await;
    assert_eq!(report.status, RunStatus::Failed);

    let windows = &report.outcomes["windows"];
    assert_eq!(windows.status(), RunStatus::Success);
    let bundle = windows.bundle.as_ref().unwrap();
    assert_eq!(
        bundle.files,
        vec![PathBuf::from("app.msi"), PathBuf::from("app.msi.zip")]
    );
    assert!(fixture.artifact_dir.join("windows/app.msi.zip").exists());
    assert!(!fixture.artifact_dir.join("windows/app.msi.zip.sig").exists());
    assert_eq!(windows.cache_saves["deps"], SaveOutcome::Saved);

    let ubuntu = &report.outcomes["ubuntu"];
    let failure = ubuntu.run.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::BuildToolFailure);
    assert!(failure.output_tail.contains("bundling failed"));
    assert!(ubuntu.cache_saves.is_empty());
    assert_eq!(
        ubuntu.run.step("cache-save:deps").unwrap().status,
        StepStatus::Skipped
    );
    assert_eq!(ubuntu.run.step("upload").unwrap().status, StepStatus::Skipped);

    let keys: Vec<String> = fixture
        .store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("windows~deps~"));
}

#[tokio::test]
async fn unix_steps_never_reach_windows() {
    let fixture = Fixture::new();
    let runner = Arc::new(ScriptedRunner::new(&[], Duration::from_millis(1)));

    let report = fixture.run(runner.clone(), false).await;
    assert!(report.success());

    assert_eq!(runner.programs_in("windows"), vec!["bundler"]);
    assert_eq!(runner.programs_in("ubuntu"), vec!["sudo", "slow", "bundler"]);
    assert!(report.outcomes["windows"]
        .run
        .step("provision:linux-libs")
        .is_none());

    let ubuntu = report.outcomes["ubuntu"].bundle.as_ref().unwrap();
    assert_eq!(ubuntu.files, vec![PathBuf::from("nested/app.deb")]);
}

#[tokio::test]
async fn second_run_restores_exact_key() {
    let fixture = Fixture::new();

    let first = fixture
        .run(Arc::new(ScriptedRunner::new(&[], Duration::from_millis(1))), false)
        .await;
    assert_eq!(
        first.outcomes["ubuntu"].cache_entries[0].outcome,
        RestoreOutcome::Miss
    );

    let second = fixture
        .run(Arc::new(ScriptedRunner::new(&[], Duration::from_millis(1))), false)
        .await;
    for outcome in second.outcomes.values() {
        assert_eq!(outcome.cache_entries[0].outcome, RestoreOutcome::HitExact);
        assert_eq!(outcome.cache_saves["deps"], SaveOutcome::AlreadyExists);
    }
}

#[tokio::test]
async fn fail_fast_cancels_slow_platform() {
    let fixture = Fixture::new();
    let runner = Arc::new(ScriptedRunner::new(&["windows"], Duration::from_millis(400)));

    let report = fixture.run(runner.clone(), true).await;
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.outcomes["windows"].status(), RunStatus::Failed);

    let ubuntu = &report.outcomes["ubuntu"];
    assert_eq!(ubuntu.status(), RunStatus::Cancelled);
    // The step already in flight runs to completion
    assert_eq!(
        ubuntu.run.step("provision:slow-setup").unwrap().status,
        StepStatus::Success
    );
    let build = ubuntu.run.step("build").unwrap();
    assert_eq!(build.status, StepStatus::Skipped);
    assert_eq!(build.note.as_deref(), Some("cancelled"));
    assert!(!runner.programs_in("ubuntu").contains(&"bundler".to_string()));
}

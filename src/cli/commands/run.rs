//! Run command - execute the pipeline across the platform matrix

use crate::artifact::FsArtifactStore;
use crate::cache::{CacheManager, FsCacheStore};
use crate::cli::args::{EventKind, OutputFormat, RunArgs};
use crate::config::{Config, ConfigManager};
use crate::error::ShipwrightResult;
use crate::exec::ProcessRunner;
use crate::pipeline::{
    MatrixReport, MatrixRunner, Pipeline, PlatformOutcome, RunStatus, Services, StepStatus,
};
use crate::runlog::RunLog;
use crate::trigger::TriggerEvent;
use crate::ui::{self, RunSpinner, UiContext};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Execute the run command
pub async fn execute(
    args: RunArgs,
    manager: &ConfigManager,
    config: &Config,
) -> ShipwrightResult<ExitCode> {
    let ctx = UiContext::detect();
    let mut pipeline = Pipeline::from_config(config, &manager.base_dir())?;
    pipeline.select_platforms(&args.platforms)?;

    let event = match args.event {
        EventKind::Manual => TriggerEvent::Manual,
        EventKind::Push => TriggerEvent::Push {
            branch: args
                .branch
                .clone()
                .unwrap_or_else(|| pipeline.trigger.branch.clone()),
            changed: args.changed.clone(),
        },
    };
    if !pipeline.trigger.accepts(&event) {
        ui::outro_warn(&ctx, "Trigger conditions not met; nothing to run");
        return Ok(ExitCode::SUCCESS);
    }

    let fail_fast = args.fail_fast_override().unwrap_or(pipeline.fail_fast);
    let run_id = Uuid::new_v4();
    let run_log = RunLog::new(&ConfigManager::runs_dir(), run_id, config.general.run_log);
    let cache_dir = manager.cache_dir(config);
    let artifact_dir = manager.artifact_dir(config);
    debug!(
        "Cache store {}, artifact store {}",
        cache_dir.display(),
        artifact_dir.display()
    );

    let services = Services {
        runner: Arc::new(ProcessRunner::new()),
        cache: CacheManager::new(Arc::new(FsCacheStore::new(cache_dir))),
        artifacts: Arc::new(FsArtifactStore::new(artifact_dir)),
        run_log: run_log.clone(),
    };

    let platforms = pipeline.platforms.clone();
    let pipeline = Arc::new(pipeline);
    if args.format == OutputFormat::Table {
        ui::intro(&ctx, &format!("shipwright run {}", pipeline.name));
    }

    // Keep stdout clean for JSON consumers
    let spinner = (args.format == OutputFormat::Table)
        .then(|| RunSpinner::start(&ctx, &format!("Running {} platform(s)", platforms.len())));
    let report = MatrixRunner::new(pipeline, services, run_id)
        .run(&platforms, fail_fast)
        .await;
    if let Some(spinner) = spinner {
        spinner.finish();
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&ctx, &report, &run_log),
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(ctx: &UiContext, report: &MatrixReport, run_log: &RunLog) {
    for outcome in report.outcomes.values() {
        print_platform(ctx, outcome);
    }

    if run_log.is_enabled() {
        println!();
        ui::key_value(ctx, "run log", &run_log.dir().display().to_string());
    }

    let failed = report.failed();
    match report.status() {
        RunStatus::Success => ui::outro_success(
            ctx,
            &format!("All {} platform(s) succeeded", report.outcomes.len()),
        ),
        RunStatus::Cancelled => ui::outro_warn(ctx, "Run cancelled"),
        _ => {
            let names: Vec<&str> = failed.iter().map(|o| o.run.platform.as_str()).collect();
            ui::outro_error(
                ctx,
                &format!("{} platform(s) failed: {}", names.len(), names.join(", ")),
            );
        }
    }
}

fn print_platform(ctx: &UiContext, outcome: &PlatformOutcome) {
    let run = &outcome.run;
    ui::section(ctx, &format!("{} [{}]", run.platform, run.status));

    for step in &run.steps {
        let note = step.note.as_deref().unwrap_or("");
        match step.status {
            StepStatus::Success if note.is_empty() => ui::step_ok(ctx, &step.name),
            StepStatus::Success => ui::step_ok_detail(ctx, &step.name, note),
            StepStatus::Failed if !step.required => {
                ui::step_warn_hint(ctx, &step.name, note)
            }
            StepStatus::Failed => ui::step_error_detail(ctx, &step.name, note),
            StepStatus::Skipped => ui::step_skipped(ctx, &step.name, note),
            StepStatus::Pending | StepStatus::Running => ui::step_info(ctx, &step.name),
        }
    }

    if let Some(failure) = &run.failure {
        ui::key_value(ctx, "failure", &failure.kind.to_string());
        if let Some(exit) = &failure.exit {
            ui::key_value(ctx, "exit", &exit.to_string());
        }
        if !failure.output_tail.is_empty() {
            ui::remark(ctx, &failure.output_tail);
        }
    }

    for upload in &outcome.uploads {
        ui::key_value(ctx, &upload.path.display().to_string(), &upload.url);
    }
}

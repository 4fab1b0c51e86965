//! Plan command - show the resolved work per platform without running it

use crate::artifact::{DeliverableFamily, RuleKind};
use crate::cache::{derive_hash, exact_key};
use crate::cli::args::{OutputFormat, PlanArgs};
use crate::config::{Config, ConfigManager};
use crate::error::ShipwrightResult;
use crate::pipeline::Pipeline;
use crate::platform::{applies, PlatformDescriptor, PlatformSpec};
use crate::ui::{self, UiContext};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PlatformPlan {
    platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    steps: Vec<StepPlan>,
    caches: Vec<CachePlan>,
    build: String,
    families: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StepPlan {
    name: String,
    command: String,
}

#[derive(Debug, Serialize)]
struct CachePlan {
    class: String,
    key: String,
}

/// Execute the plan command
pub async fn execute(
    args: PlanArgs,
    manager: &ConfigManager,
    config: &Config,
) -> ShipwrightResult<()> {
    let mut pipeline = Pipeline::from_config(config, &manager.base_dir())?;
    pipeline.select_platforms(&args.platforms)?;

    let mut plans = Vec::with_capacity(pipeline.platforms.len());
    for descriptor in &pipeline.platforms {
        plans.push(plan_platform(&pipeline, descriptor).await);
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plans)?),
        OutputFormat::Table => print_plans(&UiContext::detect(), &pipeline, &plans),
    }
    Ok(())
}

async fn plan_platform(pipeline: &Pipeline, descriptor: &PlatformDescriptor) -> PlatformPlan {
    let mut build = vec![pipeline.build.program.clone()];
    build.extend(pipeline.build.command_args());

    let mut plan = PlatformPlan {
        platform: descriptor.name.clone(),
        error: None,
        steps: Vec::new(),
        caches: Vec::new(),
        build: build.join(" "),
        families: Vec::new(),
    };

    let platform = match PlatformSpec::resolve(descriptor, pipeline) {
        Ok(platform) => platform,
        Err(e) => {
            plan.error = Some(e.to_string());
            return plan;
        }
    };

    for step in &platform.steps {
        let command = match step.invocation(&platform, pipeline.step_timeout) {
            Ok(invocation) => invocation.display_command(),
            Err(e) => e.to_string(),
        };
        plan.steps.push(StepPlan {
            name: step.name.clone(),
            command,
        });
    }

    for class in &platform.cache_classes {
        let key = match derive_hash(&platform.workspace, &class.key_files).await {
            Ok(hash) => exact_key(&platform.name, &class.name, &hash).unwrap_or_else(|e| e.to_string()),
            Err(e) => e.to_string(),
        };
        plan.caches.push(CachePlan {
            class: class.name.clone(),
            key,
        });
    }

    plan.families = pipeline
        .families
        .iter()
        .filter(|f| applies(&f.when, &platform))
        .map(describe_family)
        .collect();

    plan
}

fn describe_family(family: &DeliverableFamily) -> String {
    let rules: Vec<String> = family
        .rules
        .iter()
        .map(|r| match r.kind {
            RuleKind::Include => format!("+{}", r.pattern),
            RuleKind::Exclude => format!("-{}", r.pattern),
        })
        .collect();
    format!("{} ({})", family.name, rules.join(" "))
}

fn print_plans(ctx: &UiContext, pipeline: &Pipeline, plans: &[PlatformPlan]) {
    ui::intro(ctx, &format!("shipwright plan {}", pipeline.name));
    ui::key_value(ctx, "workspace", &pipeline.workspace.display().to_string());
    ui::key_value(ctx, "fail-fast", &pipeline.fail_fast.to_string());

    for plan in plans {
        ui::section(ctx, &plan.platform);
        if let Some(error) = &plan.error {
            ui::step_error_detail(ctx, "misconfigured", error);
            continue;
        }
        for step in &plan.steps {
            ui::step_info(ctx, &format!("provision:{}  {}", step.name, step.command));
        }
        ui::step_info(ctx, &format!("build  {}", plan.build));
        for cache in &plan.caches {
            ui::key_value(ctx, &format!("cache {}", cache.class), &cache.key);
        }
        if plan.families.is_empty() {
            ui::key_value(ctx, "deliverables", "none");
        }
        for family in &plan.families {
            ui::key_value(ctx, "deliverables", family);
        }
    }
}

pub mod apply;
pub mod preview;
pub mod schema;

use anyhow::Context;
use clap::Args;
use rostersync_core::diff::render_preview;
use rostersync_core_types::{RunContext, TraceId};
use rostersync_engine::{load_settings, AdapterRegistry, SyncEngine, TargetPlan};
use std::path::PathBuf;

/// Exit code when at least one target is held back by the failsafe
pub const EXIT_BLOCKED: i32 = 2;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Settings file
    #[arg(long, short, default_value = "rostersync.toml")]
    pub config: PathBuf,

    /// Correlation id from a surrounding scheduler
    #[arg(long)]
    pub trace_id: Option<String>,

    /// Print machine-readable JSON instead of Markdown
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn engine(&self) -> anyhow::Result<SyncEngine> {
        let settings = load_settings(&self.config)
            .with_context(|| format!("loading settings from {}", self.config.display()))?;
        let mut context = RunContext::new();
        if let Some(trace_id) = &self.trace_id {
            context = context.with_trace_id(TraceId::from_string(trace_id.clone()));
        }
        let engine = SyncEngine::from_settings(&AdapterRegistry::builtin(), &settings)?
            .with_run_context(context);
        Ok(engine)
    }
}

pub fn print_plans(plans: &[TargetPlan], json: bool) -> anyhow::Result<()> {
    if json {
        let value: Vec<serde_json::Value> = plans.iter().map(plan_json).collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    for plan in plans {
        match plan {
            TargetPlan::Ready {
                change_set,
                verdict,
                ..
            } => println!("{}", render_preview(change_set, verdict)),
            TargetPlan::Unavailable { target, error } => {
                println!("## Preview: {}\n\n**Unavailable**: {}\n", target, error)
            }
        }
    }
    Ok(())
}

fn plan_json(plan: &TargetPlan) -> serde_json::Value {
    match plan {
        TargetPlan::Ready {
            target,
            change_set,
            verdict,
        } => serde_json::json!({
            "target": target,
            "status": "ready",
            "verdict": verdict,
            "confirmation_phrase": verdict.confirmation_phrase(),
            "change_set": change_set,
        }),
        TargetPlan::Unavailable { target, error } => serde_json::json!({
            "target": target,
            "status": "unavailable",
            "error_code": error.code(),
            "error": error.to_string(),
        }),
    }
}

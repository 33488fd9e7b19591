//! Preview command

use super::{print_plans, RunArgs, EXIT_BLOCKED};
use clap::Args;
use rostersync_engine::TargetPlan;

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

/// Exit codes: 0 all targets plannable and unblocked, 1 a target is
/// unavailable, 2 a target is blocked by the failsafe.
pub async fn execute(args: PreviewArgs) -> anyhow::Result<i32> {
    let engine = args.run.engine()?;
    let records = engine.load().await?;
    let plans = engine.plan(&records).await;

    print_plans(&plans, args.run.json)?;

    if plans
        .iter()
        .any(|p| matches!(p, TargetPlan::Unavailable { .. }))
    {
        return Ok(1);
    }
    if plans.iter().any(TargetPlan::is_blocked) {
        return Ok(EXIT_BLOCKED);
    }
    Ok(0)
}

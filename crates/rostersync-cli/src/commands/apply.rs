//! Apply command

use super::{print_plans, RunArgs, EXIT_BLOCKED};
use anyhow::{anyhow, bail};
use clap::Args;
use dialoguer::Confirm;
use rostersync_core::diff::render_run_report;
use rostersync_core::failsafe::FailsafeOverride;
use rostersync_core::model::AbortReason;
use rostersync_core::CancelToken;
use rostersync_engine::TargetPlan;
use std::io::{BufRead, IsTerminal};

#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Lift the failsafe for this target; the confirmation phrase is read
    /// from stdin. May be given more than once.
    #[arg(long = "override-failsafe", value_name = "TARGET")]
    pub override_failsafe: Vec<String>,

    /// Store generated contact addresses in the source
    #[arg(long)]
    pub write_back: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

/// Ask for the confirmation phrase of every named target.
fn acknowledge_overrides(
    plans: &[TargetPlan],
    names: &[String],
    input: &mut dyn BufRead,
) -> anyhow::Result<Vec<FailsafeOverride>> {
    let mut overrides = Vec::new();
    for name in names {
        let plan = plans
            .iter()
            .find(|p| p.target() == name.as_str())
            .ok_or_else(|| anyhow!("--override-failsafe names unknown target '{}'", name))?;
        let TargetPlan::Ready { verdict, .. } = plan else {
            bail!("target '{}' is unavailable; nothing to override", name);
        };
        let Some(phrase) = verdict.confirmation_phrase() else {
            eprintln!("Target '{}' is not blocked; override ignored.", name);
            continue;
        };

        eprintln!("Type `{}` to confirm the suspensions for '{}':", phrase, name);
        let mut line = String::new();
        input.read_line(&mut line)?;
        overrides.push(FailsafeOverride::acknowledge(verdict, line.trim())?);
    }
    Ok(overrides)
}

/// Records the apply phase would touch, blocked targets left out unless
/// an override was acknowledged for them.
fn approvable(plans: &[TargetPlan], overrides: &[FailsafeOverride]) -> usize {
    plans
        .iter()
        .filter_map(|plan| match plan {
            TargetPlan::Ready {
                target,
                change_set,
                verdict,
            } => {
                let overridden = overrides.iter().any(|o| o.target() == target.as_str());
                (!verdict.is_blocked() || overridden).then(|| change_set.pending())
            }
            TargetPlan::Unavailable { .. } => None,
        })
        .sum()
}

/// Read a y/N answer from a non-interactive input; anything else declines.
fn confirm_from(input: &mut dyn BufRead, pending: usize) -> anyhow::Result<bool> {
    eprintln!("Apply {} change(s)? [y/N]", pending);
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Exit codes: 0 every target applied cleanly, 1 failures or unavailable
/// targets, 2 a target stayed blocked by the failsafe.
pub async fn execute(args: ApplyArgs) -> anyhow::Result<i32> {
    let engine = args.run.engine()?;
    let records = engine.load().await?;
    let plans = engine.plan(&records).await;
    print_plans(&plans, args.run.json)?;

    let stdin = std::io::stdin();
    let overrides = acknowledge_overrides(&plans, &args.override_failsafe, &mut stdin.lock())?;

    let pending = approvable(&plans, &overrides);
    if pending > 0 && !args.yes {
        let confirmed = if stdin.is_terminal() {
            Confirm::new()
                .with_prompt(format!("Apply {} change(s)?", pending))
                .default(false)
                .interact()?
        } else {
            confirm_from(&mut stdin.lock(), pending)?
        };
        if !confirmed {
            eprintln!("Cancelled; nothing applied.");
            return Ok(0);
        }
    }

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing dispatched records");
            on_signal.cancel();
        }
    });

    let reports = engine.apply(plans, &overrides, &cancel).await;
    if args.run.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("{}", render_run_report(report));
        }
    }

    if args.write_back {
        let written = engine.write_back(&reports).await?;
        eprintln!("{} generated address(es) written back to the source.", written);
    }

    if reports
        .iter()
        .any(|r| r.aborted == Some(AbortReason::Blocked))
    {
        return Ok(EXIT_BLOCKED);
    }
    Ok(if reports.iter().all(|r| r.is_clean()) { 0 } else { 1 })
}

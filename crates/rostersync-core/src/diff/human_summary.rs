//! Human-readable preview and report renderer.

use crate::failsafe::FailsafeVerdict;
use crate::model::{
    AbortReason, ChangeSet, RecordOutcome, RunReport, SkipReason, TrackedField, UpdateEntry,
};

/// Render the preview of one change set for operator review.
///
/// Lists every pending write so the operator sees exactly what apply will
/// send, including generated addresses.
pub fn render_preview(change_set: &ChangeSet, verdict: &FailsafeVerdict) -> String {
    let mut out = String::new();

    out.push_str(&format!("## Preview: {}\n\n", change_set.target));
    out.push_str(&format!(
        "| Create | Update | Suspend | Unchanged | Already inactive |\n\
         |---|---|---|---|---|\n\
         | {} | {} | {} | {} | {} |\n\n",
        change_set.to_create.len(),
        change_set.to_update.len(),
        change_set.to_suspend.len(),
        change_set.unchanged,
        change_set.already_inactive,
    ));

    match verdict {
        FailsafeVerdict::Pass => out.push_str("**Failsafe**: pass\n\n"),
        FailsafeVerdict::Blocked {
            suspend_count,
            population,
            ratio,
            threshold,
            ..
        } => {
            out.push_str(&format!(
                "**Failsafe**: BLOCKED: {} of {} entries ({:.1}%) would be suspended, limit {:.1}%\n",
                suspend_count,
                population,
                ratio * 100.0,
                threshold * 100.0
            ));
            if let Some(phrase) = verdict.confirmation_phrase() {
                out.push_str(&format!("To override, confirm with: `{}`\n", phrase));
            }
            out.push('\n');
        }
    }

    if change_set.is_empty() && change_set.conflicts.is_empty() {
        out.push_str("_Target is in sync._\n");
        return out;
    }

    if !change_set.to_create.is_empty() {
        out.push_str("### Create\n\n");
        for record in &change_set.to_create {
            out.push_str(&format!(
                "- `{}` {} <{}>\n",
                record.external_id,
                record.display_name(),
                record.address().unwrap_or("no address"),
            ));
        }
        out.push('\n');
    }

    if !change_set.to_update.is_empty() {
        out.push_str("### Update\n\n");
        for entry in &change_set.to_update {
            out.push_str(&format!(
                "- `{}` {}: {}\n",
                entry.record.external_id,
                entry.record.display_name(),
                describe_changes(entry)
            ));
        }
        out.push('\n');
    }

    if !change_set.to_suspend.is_empty() {
        out.push_str("### Suspend\n\n");
        for target in &change_set.to_suspend {
            out.push_str(&format!("- `{}`\n", target.key()));
        }
        out.push('\n');
    }

    if !change_set.conflicts.is_empty() {
        out.push_str("### ⚠ Match Conflicts\n\n");
        for conflict in &change_set.conflicts {
            out.push_str(&format!(
                "- `{}`: source {} / target {} (skipped)\n",
                conflict.address,
                conflict.canonical_ids.join(", "),
                conflict.target_keys.join(", ")
            ));
        }
        out.push('\n');
    }

    if !change_set.anomalies.is_empty() {
        out.push_str("### Hash Anomalies\n\n");
        for anomaly in &change_set.anomalies {
            out.push_str(&format!(
                "- `{}`: hash `{}` vs stored `{}`, full resync\n",
                anomaly.external_id,
                short(anomaly.source_hash.as_str()),
                short(anomaly.target_hash.as_str())
            ));
        }
        out.push('\n');
    }

    out
}

fn describe_changes(entry: &UpdateEntry) -> String {
    if entry.is_anomaly() {
        return "full resync".to_string();
    }
    entry
        .changed
        .iter()
        .map(|field| match field {
            TrackedField::ExternalId => "link external id".to_string(),
            TrackedField::Active => "reactivate".to_string(),
            other => other.as_str().to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the result of one target apply.
pub fn render_run_report(report: &RunReport) -> String {
    let mut out = String::new();
    let counts = report.counts();

    out.push_str(&format!("## Report: {}\n\n", report.target));
    out.push_str(&format!(
        "**Run**: `{}`  \n**Applied**: {}  \n**Skipped**: {}  \n**Failed**: {}  \n**Duration**: {} ms\n\n",
        report.run_id, counts.applied, counts.skipped, counts.failed, report.duration_ms
    ));

    match &report.aborted {
        None => {}
        Some(AbortReason::Blocked) => {
            out.push_str("**Aborted**: failsafe blocked, nothing was applied\n\n")
        }
        Some(AbortReason::Cancelled) => out.push_str("**Aborted**: cancelled\n\n"),
        Some(AbortReason::AdapterUnavailable { reason }) => {
            out.push_str(&format!("**Aborted**: target unavailable ({})\n\n", reason))
        }
    }

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        out.push_str("### Failures\n\n");
        for entry in failures {
            if let RecordOutcome::Failed(reason) = &entry.outcome {
                out.push_str(&format!(
                    "- {} `{}`: {}\n",
                    entry.action.as_str(),
                    entry.key,
                    reason
                ));
            }
        }
        out.push('\n');
    }

    let conflicted = report
        .entries
        .iter()
        .filter(|e| matches!(e.outcome, RecordOutcome::Skipped(SkipReason::MatchConflict)))
        .count();
    if conflicted > 0 {
        out.push_str(&format!(
            "_{} record(s) skipped because of match conflicts._\n\n",
            conflicted
        ));
    }

    if !report.generated_addresses.is_empty() {
        out.push_str("### Generated Addresses\n\n");
        for assignment in &report.generated_addresses {
            out.push_str(&format!(
                "- `{}` → {}\n",
                assignment.external_id, assignment.contact_address
            ));
        }
        out.push('\n');
    }

    out
}

/// Return the first 12 characters of a digest for display purposes.
fn short(digest: &str) -> &str {
    let end = digest
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(digest.len());
    &digest[..end]
}

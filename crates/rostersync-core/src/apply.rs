//! Change set application
//!
//! [`prepare_preview`] runs before the operator sees the preview so that
//! target-generated data is part of what gets approved. [`ApplyCoordinator`]
//! then writes exactly that change set to its target:
//!
//! - a blocked verdict without a matching override applies nothing
//! - creates, then updates, then suspensions, each group finished before the
//!   next starts
//! - inside a group, records are dispatched in chunks of `max_parallel`
//! - one failed record never stops its siblings; an unreachable target stops
//!   the rest of that target's run
//! - cancellation is honoured between chunks; nothing is rolled back

use crate::adapter::TargetAdapter;
use crate::errors::{ExError, ExErrorKind, Result, TargetError};
use crate::failsafe::{FailsafeOverride, FailsafeVerdict};
use crate::model::{
    AbortReason, AddressAssignment, ApplyAction, CanonicalRecord, ChangeSet, FailureReason,
    RecordOutcome, RunReport, SkipReason, TargetRecord, UpdateEntry,
};
use crate::{log_op_end, log_op_error, log_op_start};
use futures::future::join_all;
use rostersync_core_types::RunId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag shared between the caller and running applies
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Let the target fill in generated data on the records it will create.
///
/// The enriched records replace `to_create`; addresses that were absent
/// before and present after are listed in `generated_addresses`.
///
/// # Errors
///
/// Whatever `enrich_preview` reports, and `AdapterContract` when the
/// enrichment drops, adds or re-keys records.
pub async fn prepare_preview(mut change_set: ChangeSet, target: &dyn TargetAdapter) -> Result<ChangeSet> {
    if change_set.to_create.is_empty() {
        return Ok(change_set);
    }

    let original = std::mem::take(&mut change_set.to_create);
    let before: Vec<(String, bool)> = original
        .iter()
        .map(|r| (r.external_id.clone(), r.address().is_some()))
        .collect();

    let enriched = target.enrich_preview(original).await.map_err(|e| {
        e.with_op("prepare_preview")
            .with_target(change_set.target.clone())
    })?;

    let same_keys = enriched.len() == before.len()
        && enriched
            .iter()
            .zip(&before)
            .all(|(record, (id, _))| record.external_id == *id);
    if !same_keys {
        return Err(ExError::new(ExErrorKind::AdapterContract)
            .with_op("prepare_preview")
            .with_target(change_set.target.clone())
            .with_message(format!(
                "enrich_preview returned {} records for {} creates or changed their order",
                enriched.len(),
                before.len()
            )));
    }

    for (record, (_, had_address)) in enriched.iter().zip(&before) {
        if let (false, Some(address)) = (*had_address, record.address()) {
            change_set.generated_addresses.push(AddressAssignment {
                external_id: record.external_id.clone(),
                contact_address: address.to_string(),
            });
        }
    }
    change_set.to_create = enriched;
    Ok(change_set)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Upper bound on in-flight record operations per target
    pub max_parallel: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self { max_parallel: 4 }
    }
}

#[derive(Debug, Clone, Copy)]
enum Op<'a> {
    Create(&'a CanonicalRecord),
    Update(&'a UpdateEntry),
    Suspend(&'a TargetRecord),
}

impl Op<'_> {
    fn key(&self) -> String {
        match self {
            Op::Create(record) => record.external_id.clone(),
            Op::Update(entry) => entry.record.external_id.clone(),
            Op::Suspend(target) => target.key(),
        }
    }

    fn action(&self) -> ApplyAction {
        match self {
            Op::Create(_) => ApplyAction::Create,
            Op::Update(_) => ApplyAction::Update,
            Op::Suspend(_) => ApplyAction::Suspend,
        }
    }

    async fn dispatch(&self, target: &dyn TargetAdapter) -> std::result::Result<(), TargetError> {
        match self {
            Op::Create(record) => target.create(record).await,
            Op::Update(entry) => target.update(entry).await,
            Op::Suspend(record) => target.suspend(record).await,
        }
    }
}

/// Applies approved change sets to one target at a time
#[derive(Debug, Clone, Default)]
pub struct ApplyCoordinator {
    options: ApplyOptions,
}

impl ApplyCoordinator {
    pub fn new(options: ApplyOptions) -> Self {
        Self {
            options: ApplyOptions {
                max_parallel: options.max_parallel.max(1),
            },
        }
    }

    pub fn options(&self) -> ApplyOptions {
        self.options
    }

    /// Apply a previewed change set.
    ///
    /// Never fails as a whole: every outcome, including a refusal by the
    /// failsafe, is recorded in the returned report.
    pub async fn apply(
        &self,
        change_set: &ChangeSet,
        verdict: &FailsafeVerdict,
        failsafe_override: Option<&FailsafeOverride>,
        target: &dyn TargetAdapter,
        cancel: &CancelToken,
    ) -> RunReport {
        let start = Instant::now();
        let target_name = change_set.target.as_str();
        let mut report = RunReport::new(RunId::new(), target_name, verdict.clone());
        report.conflicts = change_set.conflicts.clone();
        report.anomalies = change_set.anomalies.clone();

        log_op_start!(
            "apply",
            target_name = target_name,
            run_id = %report.run_id,
            create_count = change_set.to_create.len(),
            update_count = change_set.to_update.len(),
            suspend_count = change_set.to_suspend.len()
        );

        if let FailsafeVerdict::Blocked {
            ratio, threshold, ..
        } = verdict
        {
            let acknowledged = failsafe_override.is_some_and(|o| o.covers(verdict));
            if !acknowledged {
                report.push(
                    target_name,
                    ApplyAction::Suspend,
                    RecordOutcome::Failed(FailureReason::FailsafeBlocked {
                        ratio: *ratio,
                        threshold: *threshold,
                    }),
                );
                report.aborted = Some(AbortReason::Blocked);
                report.duration_ms = start.elapsed().as_millis() as u64;
                log_op_error!(
                    "apply",
                    ExError::new(ExErrorKind::FailsafeBlocked).with_target(target_name),
                    duration_ms = report.duration_ms,
                    target_name = target_name
                );
                return report;
            }
            tracing::warn!(target_name, "failsafe overridden by operator");
        }

        let conflicted_ids = change_set.conflicted_canonical_ids();
        let conflicted_keys = change_set.conflicted_target_keys();

        let creates: Vec<Op<'_>> = change_set.to_create.iter().map(Op::Create).collect();
        let updates: Vec<Op<'_>> = change_set.to_update.iter().map(Op::Update).collect();
        let suspends: Vec<Op<'_>> = change_set.to_suspend.iter().map(Op::Suspend).collect();

        let mut run = GroupRun {
            target,
            cancel,
            max_parallel: self.options.max_parallel,
            halted: None,
            report: &mut report,
        };
        for group in [creates, updates, suspends] {
            run.run_group(&group, &conflicted_ids, &conflicted_keys)
                .await;
        }

        let applied_creates: HashSet<&str> = report
            .entries
            .iter()
            .filter(|e| e.action == ApplyAction::Create && e.outcome == RecordOutcome::Applied)
            .map(|e| e.key.as_str())
            .collect();
        let generated: Vec<AddressAssignment> = change_set
            .generated_addresses
            .iter()
            .filter(|a| applied_creates.contains(a.external_id.as_str()))
            .cloned()
            .collect();
        report.generated_addresses = generated;

        report.duration_ms = start.elapsed().as_millis() as u64;
        let counts = report.counts();
        log_op_end!(
            "apply",
            duration_ms = report.duration_ms,
            target_name = target_name,
            applied = counts.applied,
            skipped = counts.skipped,
            failed = counts.failed,
            aborted = report.aborted.is_some()
        );
        report
    }
}

/// Mutable state of one target apply across its three groups
struct GroupRun<'r> {
    target: &'r dyn TargetAdapter,
    cancel: &'r CancelToken,
    max_parallel: usize,
    halted: Option<SkipReason>,
    report: &'r mut RunReport,
}

impl GroupRun<'_> {
    async fn run_group(
        &mut self,
        group: &[Op<'_>],
        conflicted_ids: &HashSet<&str>,
        conflicted_keys: &HashSet<&str>,
    ) {
        let mut outcomes: Vec<Option<RecordOutcome>> = vec![None; group.len()];
        let mut pending: Vec<usize> = Vec::with_capacity(group.len());

        for (index, op) in group.iter().enumerate() {
            let conflicted = match op {
                Op::Create(record) => conflicted_ids.contains(record.external_id.as_str()),
                Op::Suspend(record) => conflicted_keys.contains(record.key().as_str()),
                Op::Update(_) => false,
            };
            if conflicted {
                outcomes[index] = Some(RecordOutcome::Skipped(SkipReason::MatchConflict));
            } else {
                pending.push(index);
            }
        }

        for chunk in pending.chunks(self.max_parallel) {
            if self.halted.is_none() && self.cancel.is_cancelled() {
                tracing::warn!(target_name = %self.report.target, "apply cancelled");
                self.halted = Some(SkipReason::Cancelled);
                self.report.aborted = Some(AbortReason::Cancelled);
            }
            if let Some(reason) = &self.halted {
                for &index in chunk {
                    outcomes[index] = Some(RecordOutcome::Skipped(reason.clone()));
                }
                continue;
            }

            let results = join_all(chunk.iter().map(|&i| group[i].dispatch(self.target))).await;
            for (&index, result) in chunk.iter().zip(results) {
                outcomes[index] = Some(match result {
                    Ok(()) => RecordOutcome::Applied,
                    Err(error) => self.record_failure(&group[index], error),
                });
            }
        }

        for (op, outcome) in group.iter().zip(outcomes) {
            let outcome = outcome.unwrap_or(RecordOutcome::Skipped(SkipReason::Cancelled));
            self.report.push(op.key(), op.action(), outcome);
        }
    }

    fn record_failure(&mut self, op: &Op<'_>, error: TargetError) -> RecordOutcome {
        tracing::warn!(
            target_name = %self.report.target,
            record_key = %op.key(),
            action = op.action().as_str(),
            error = %error,
            "record operation failed"
        );
        if let TargetError::Unavailable { reason } = &error {
            if self.halted.is_none() {
                self.halted = Some(SkipReason::TargetUnavailable);
                self.report.aborted = Some(AbortReason::AdapterUnavailable {
                    reason: reason.clone(),
                });
            }
        }
        RecordOutcome::Failed(FailureReason::Target { error })
    }
}

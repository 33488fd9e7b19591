//! Per-target run report

use crate::errors::TargetError;
use crate::failsafe::FailsafeVerdict;
use crate::model::change_set::{HashAnomaly, MatchConflict};
use rostersync_core_types::RunId;
use serde::Serialize;

/// Kind of write a record entry stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    Create,
    Update,
    Suspend,
}

impl ApplyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyAction::Create => "create",
            ApplyAction::Update => "update",
            ApplyAction::Suspend => "suspend",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Record takes part in an ambiguous address match
    MatchConflict,
    /// The run was cancelled before this record was dispatched
    Cancelled,
    /// An earlier operation reported the target unreachable
    TargetUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Aggregate refusal: the failsafe blocked this target
    FailsafeBlocked { ratio: f64, threshold: f64 },
    /// The target adapter rejected the record operation
    Target { error: TargetError },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::FailsafeBlocked { ratio, threshold } => write!(
                f,
                "failsafe blocked: {:.1}% of the population would be suspended (limit {:.1}%)",
                ratio * 100.0,
                threshold * 100.0
            ),
            FailureReason::Target { error } => write!(f, "{}", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RecordOutcome {
    Applied,
    Skipped(SkipReason),
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordReport {
    /// External id, or target key for suspensions of legacy entries
    pub key: String,
    pub action: ApplyAction,
    pub outcome: RecordOutcome,
}

/// Why a target's apply stopped before processing every record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    Blocked,
    Cancelled,
    AdapterUnavailable { reason: String },
}

/// Address generated during preview and accepted by the target
///
/// Handed back to the source when it supports write-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct AddressAssignment {
    pub external_id: String,
    pub contact_address: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of applying one change set to one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub target: String,
    pub verdict: FailsafeVerdict,
    pub entries: Vec<RecordReport>,
    pub conflicts: Vec<MatchConflict>,
    pub anomalies: Vec<HashAnomaly>,
    pub generated_addresses: Vec<AddressAssignment>,
    pub aborted: Option<AbortReason>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: RunId, target: impl Into<String>, verdict: FailsafeVerdict) -> Self {
        Self {
            run_id,
            target: target.into(),
            verdict,
            entries: Vec::new(),
            conflicts: Vec::new(),
            anomalies: Vec::new(),
            generated_addresses: Vec::new(),
            aborted: None,
            duration_ms: 0,
        }
    }

    pub fn push(&mut self, key: impl Into<String>, action: ApplyAction, outcome: RecordOutcome) {
        self.entries.push(RecordReport {
            key: key.into(),
            action,
            outcome,
        });
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.entries
            .iter()
            .fold(OutcomeCounts::default(), |mut acc, entry| {
                match entry.outcome {
                    RecordOutcome::Applied => acc.applied += 1,
                    RecordOutcome::Skipped(_) => acc.skipped += 1,
                    RecordOutcome::Failed(_) => acc.failed += 1,
                }
                acc
            })
    }

    /// Entries that failed, for operator review
    pub fn failures(&self) -> impl Iterator<Item = &RecordReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, RecordOutcome::Failed(_)))
    }

    pub fn is_clean(&self) -> bool {
        self.aborted.is_none() && self.counts().failed == 0
    }

    pub fn outcome_for(&self, key: &str, action: ApplyAction) -> Option<&RecordOutcome> {
        self.entries
            .iter()
            .find(|e| e.key == key && e.action == action)
            .map(|e| &e.outcome)
    }
}

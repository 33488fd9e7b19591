//! Per-target change set produced by the diff engine

use crate::model::record::{CanonicalRecord, ContentHash, TargetRecord, TrackedField};
use crate::model::report::AddressAssignment;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

/// Which identity pass paired a canonical record with a target record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Exact external id equality
    ExternalId,
    /// Case-insensitive contact address equality on a legacy target entry
    ContactAddress,
}

/// A matched pair whose target state must be updated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEntry {
    pub record: CanonicalRecord,
    pub target: TargetRecord,
    /// Tracked fields that differ; empty means the hash differed but no
    /// compared field did (see [`HashAnomaly`])
    pub changed: BTreeSet<TrackedField>,
    pub matched_by: MatchKind,
}

impl UpdateEntry {
    /// The target entry lacks the external id and must be linked
    pub fn backfills_external_id(&self) -> bool {
        self.changed.contains(&TrackedField::ExternalId)
    }

    /// The target entry is suspended and the person is back in the source
    pub fn reactivates(&self) -> bool {
        self.changed.contains(&TrackedField::Active)
    }

    pub fn is_anomaly(&self) -> bool {
        self.changed.is_empty()
    }
}

/// An ambiguous secondary-key match, reported instead of resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchConflict {
    /// Lowercased contact address shared by the records below
    pub address: String,
    pub canonical_ids: Vec<String>,
    /// Keys of the target records involved (see [`TargetRecord::key`])
    pub target_keys: Vec<String>,
}

/// Content hash differs although no compared field differs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashAnomaly {
    pub external_id: String,
    pub source_hash: ContentHash,
    pub target_hash: ContentHash,
}

/// Output of one diff run, scoped to one target
///
/// Every canonical record lands in exactly one of `to_create` / `to_update`.
/// Every target record considered lands in exactly one of `to_update` /
/// `to_suspend` / `unchanged`; unmatched targets that are already inactive
/// are only counted in `already_inactive`. Inactive targets matched again
/// sit in `to_update` as reactivations and are not part of the population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    pub target: String,
    pub to_create: Vec<CanonicalRecord>,
    pub to_update: Vec<UpdateEntry>,
    pub to_suspend: Vec<TargetRecord>,
    pub unchanged: usize,
    pub already_inactive: usize,
    pub conflicts: Vec<MatchConflict>,
    pub anomalies: Vec<HashAnomaly>,
    /// Addresses the target filled in on `to_create` during preview
    pub generated_addresses: Vec<AddressAssignment>,
}

impl ChangeSet {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_suspend: Vec::new(),
            unchanged: 0,
            already_inactive: 0,
            conflicts: Vec::new(),
            anomalies: Vec::new(),
            generated_addresses: Vec::new(),
        }
    }

    /// Target entries considered active before this run
    ///
    /// Equals the number of active target records: reactivations are
    /// updates on entries that were inactive.
    pub fn population(&self) -> usize {
        self.to_update.len() - self.reactivations() + self.to_suspend.len() + self.unchanged
    }

    /// Updates that bring a suspended target entry back
    pub fn reactivations(&self) -> usize {
        self.to_update.iter().filter(|u| u.reactivates()).count()
    }

    /// Number of records the apply phase would touch
    pub fn pending(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_suspend.len()
    }

    /// No create, update or suspension pending
    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// External ids of canonical records involved in a match conflict
    pub fn conflicted_canonical_ids(&self) -> HashSet<&str> {
        self.conflicts
            .iter()
            .flat_map(|c| c.canonical_ids.iter().map(String::as_str))
            .collect()
    }

    /// Keys of target records involved in a match conflict
    pub fn conflicted_target_keys(&self) -> HashSet<&str> {
        self.conflicts
            .iter()
            .flat_map(|c| c.target_keys.iter().map(String::as_str))
            .collect()
    }
}

//! Change set computation

use crate::adapter::RecordHasher;
use crate::matcher::match_records;
use crate::model::{
    CanonicalRecord, ChangeSet, HashAnomaly, MatchKind, TargetRecord, TrackedField, UpdateEntry,
};
use crate::{log_op_end, log_op_start};
use std::collections::BTreeSet;
use std::time::Instant;

/// Tracked fields whose values differ between source and target.
///
/// Only fields the target reports are compared. A contact address the
/// source does not carry yet is owned by the target and never counts as a
/// difference.
fn field_diff(
    record: &CanonicalRecord,
    target: &TargetRecord,
    tracked: &[TrackedField],
) -> BTreeSet<TrackedField> {
    tracked
        .iter()
        .copied()
        .filter(|f| !matches!(f, TrackedField::ExternalId | TrackedField::Active))
        .filter(|&field| {
            let Some(reported) = target.field_value(field) else {
                return false;
            };
            match record.field_value(field) {
                None if field == TrackedField::ContactAddress => false,
                source => source.as_deref() != Some(reported.as_str()),
            }
        })
        .collect()
}

/// Compute the change set for one target.
///
/// `hasher` is the target's own hash contract; equal hashes on an active,
/// id-matched entity mean nothing to do.
pub fn compute_change_set<H>(
    target_name: &str,
    canonical: &[CanonicalRecord],
    manifest: &[TargetRecord],
    hasher: &H,
) -> ChangeSet
where
    H: RecordHasher + ?Sized,
{
    let start = Instant::now();
    log_op_start!(
        "compute_change_set",
        target_name = target_name,
        canonical = canonical.len(),
        manifest = manifest.len()
    );

    let matches = match_records(canonical, manifest);
    let mut change_set = ChangeSet::new(target_name);
    let tracked = hasher.tracked_fields();

    for pair in &matches.pairs {
        let record = &canonical[pair.canonical];
        let target = &manifest[pair.target];
        let source_hash = hasher.content_hash(record);
        let hash_equal = source_hash == target.content_hash;

        if pair.kind == MatchKind::ExternalId && target.active && hash_equal {
            change_set.unchanged += 1;
            continue;
        }

        let mut changed = if hash_equal {
            BTreeSet::new()
        } else {
            field_diff(record, target, tracked)
        };
        if pair.kind == MatchKind::ContactAddress {
            changed.insert(TrackedField::ExternalId);
        }
        if !target.active {
            changed.insert(TrackedField::Active);
        }

        if changed.is_empty() {
            tracing::warn!(
                target_name,
                record_key = %record.external_id,
                "content hash differs but no tracked field does"
            );
            change_set.anomalies.push(HashAnomaly {
                external_id: record.external_id.clone(),
                source_hash,
                target_hash: target.content_hash.clone(),
            });
        }

        change_set.to_update.push(UpdateEntry {
            record: record.clone(),
            target: target.clone(),
            changed,
            matched_by: pair.kind,
        });
    }

    change_set.to_create = matches
        .unmatched_canonical
        .iter()
        .map(|&i| canonical[i].clone())
        .collect();

    for &index in &matches.unmatched_target {
        let target = &manifest[index];
        if target.active {
            change_set.to_suspend.push(target.clone());
        } else {
            change_set.already_inactive += 1;
        }
    }

    change_set.conflicts = matches.conflicts;

    log_op_end!(
        "compute_change_set",
        duration_ms = start.elapsed().as_millis() as u64,
        target_name = target_name,
        create_count = change_set.to_create.len(),
        update_count = change_set.to_update.len(),
        suspend_count = change_set.to_suspend.len(),
        unchanged_count = change_set.unchanged
    );

    change_set
}

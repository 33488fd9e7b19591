//! Identity matcher
//!
//! Pairs canonical records with target records in two passes: exact external
//! id first, then case-insensitive contact address for the legacy target
//! entries that carry no id at all. Ambiguous address matches are reported as
//! [`MatchConflict`]s and left unmatched.

use crate::model::{CanonicalRecord, MatchConflict, MatchKind, TargetRecord};
use std::collections::HashMap;

/// One canonical record paired with one target record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchedPair {
    pub canonical: usize,
    pub target: usize,
    pub kind: MatchKind,
}

/// Indices into the matcher inputs, all in input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub pairs: Vec<MatchedPair>,
    pub unmatched_canonical: Vec<usize>,
    pub unmatched_target: Vec<usize>,
    pub conflicts: Vec<MatchConflict>,
}

/// Match canonical records against a target manifest.
///
/// Primary ids compare case-sensitively; when a target reports one id twice,
/// the first entry wins and the later ones stay unmatched.
pub fn match_records(canonical: &[CanonicalRecord], target: &[TargetRecord]) -> MatchResult {
    let mut target_by_id: HashMap<&str, usize> = HashMap::with_capacity(target.len());
    for (index, record) in target.iter().enumerate() {
        if let Some(id) = record.id() {
            target_by_id.entry(id).or_insert(index);
        }
    }

    let mut canonical_matched = vec![None::<MatchedPair>; canonical.len()];
    let mut target_taken = vec![false; target.len()];

    // Pass 1: external id
    for (c_index, record) in canonical.iter().enumerate() {
        let Some(&t_index) = target_by_id.get(record.external_id.trim()) else {
            continue;
        };
        if target_taken[t_index] {
            continue;
        }
        target_taken[t_index] = true;
        canonical_matched[c_index] = Some(MatchedPair {
            canonical: c_index,
            target: t_index,
            kind: MatchKind::ExternalId,
        });
    }

    // Pass 2: contact address against legacy entries only
    let mut canonical_by_address: HashMap<String, Vec<usize>> = HashMap::new();
    let mut address_order: Vec<String> = Vec::new();
    for (c_index, record) in canonical.iter().enumerate() {
        if canonical_matched[c_index].is_some() {
            continue;
        }
        if let Some(address) = record.address() {
            let key = address.to_lowercase();
            let bucket = canonical_by_address.entry(key.clone()).or_default();
            if bucket.is_empty() {
                address_order.push(key);
            }
            bucket.push(c_index);
        }
    }

    let mut target_by_address: HashMap<String, Vec<usize>> = HashMap::new();
    for (t_index, record) in target.iter().enumerate() {
        if target_taken[t_index] || record.id().is_some() {
            continue;
        }
        if let Some(key) = record.address_key() {
            target_by_address.entry(key).or_default().push(t_index);
        }
    }

    let mut conflicts = Vec::new();
    for address in address_order {
        let (Some(c_bucket), Some(t_bucket)) = (
            canonical_by_address.get(&address),
            target_by_address.get(&address),
        ) else {
            continue;
        };

        if let ([c_index], [t_index]) = (c_bucket.as_slice(), t_bucket.as_slice()) {
            target_taken[*t_index] = true;
            canonical_matched[*c_index] = Some(MatchedPair {
                canonical: *c_index,
                target: *t_index,
                kind: MatchKind::ContactAddress,
            });
            continue;
        }

        tracing::warn!(
            address = %address,
            canonical = c_bucket.len(),
            target = t_bucket.len(),
            "ambiguous contact address match left unresolved"
        );
        conflicts.push(MatchConflict {
            address: address.clone(),
            canonical_ids: c_bucket
                .iter()
                .map(|&i| canonical[i].external_id.clone())
                .collect(),
            target_keys: t_bucket.iter().map(|&i| target[i].key()).collect(),
        });
    }

    let mut result = MatchResult {
        conflicts,
        ..MatchResult::default()
    };
    for (c_index, pair) in canonical_matched.into_iter().enumerate() {
        match pair {
            Some(pair) => result.pairs.push(pair),
            None => result.unmatched_canonical.push(c_index),
        }
    }
    result.unmatched_target = (0..target.len()).filter(|&i| !target_taken[i]).collect();

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentHash;

    fn student(id: &str) -> CanonicalRecord {
        CanonicalRecord::student(id, "Anna", "Schmidt", "5a")
    }

    fn target(id: Option<&str>, address: Option<&str>) -> TargetRecord {
        let mut record = TargetRecord::new(ContentHash::new("h"));
        if let Some(id) = id {
            record = record.with_external_id(id);
        }
        if let Some(address) = address {
            record = record.with_contact_address(address);
        }
        record
    }

    #[test]
    fn test_primary_match_by_id() {
        let canonical = vec![student("A1"), student("A2")];
        let targets = vec![target(Some("A2"), None), target(Some("A1"), None)];

        let result = match_records(&canonical, &targets);

        assert_eq!(result.pairs.len(), 2);
        assert_eq!(result.pairs[0].target, 1);
        assert_eq!(result.pairs[1].target, 0);
        assert!(result
            .pairs
            .iter()
            .all(|p| p.kind == MatchKind::ExternalId));
        assert!(result.unmatched_canonical.is_empty());
        assert!(result.unmatched_target.is_empty());
    }

    #[test]
    fn test_primary_match_is_case_sensitive() {
        let canonical = vec![student("a1")];
        let targets = vec![target(Some("A1"), None)];

        let result = match_records(&canonical, &targets);

        assert!(result.pairs.is_empty());
        assert_eq!(result.unmatched_canonical, vec![0]);
        assert_eq!(result.unmatched_target, vec![0]);
    }

    #[test]
    fn test_duplicate_target_id_first_wins() {
        let canonical = vec![student("A1")];
        let targets = vec![target(Some("A1"), None), target(Some("A1"), None)];

        let result = match_records(&canonical, &targets);

        assert_eq!(result.pairs[0].target, 0);
        assert_eq!(result.unmatched_target, vec![1]);
    }

    #[test]
    fn test_secondary_match_by_address() {
        let canonical = vec![student("A1").with_contact_address("Anna.Schmidt@school.org")];
        let targets = vec![target(None, Some("anna.schmidt@SCHOOL.org"))];

        let result = match_records(&canonical, &targets);

        assert_eq!(
            result.pairs,
            vec![MatchedPair {
                canonical: 0,
                target: 0,
                kind: MatchKind::ContactAddress,
            }]
        );
    }

    #[test]
    fn test_secondary_ignores_targets_with_other_id() {
        let canonical = vec![student("A1").with_contact_address("a@school.org")];
        let targets = vec![target(Some("B7"), Some("a@school.org"))];

        let result = match_records(&canonical, &targets);

        assert!(result.pairs.is_empty());
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_id_match_never_reported_by_address() {
        let canonical = vec![student("A1").with_contact_address("a@school.org")];
        let targets = vec![
            target(Some("A1"), Some("a@school.org")),
            target(None, Some("a@school.org")),
        ];

        let result = match_records(&canonical, &targets);

        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].kind, MatchKind::ExternalId);
        assert_eq!(result.unmatched_target, vec![1]);
    }

    #[test]
    fn test_ambiguous_address_fails_closed() {
        let canonical = vec![
            student("A1").with_contact_address("shared@school.org"),
            student("A2").with_contact_address("shared@school.org"),
        ];
        let targets = vec![target(None, Some("shared@school.org"))];

        let result = match_records(&canonical, &targets);

        assert!(result.pairs.is_empty());
        assert_eq!(result.unmatched_canonical, vec![0, 1]);
        assert_eq!(result.unmatched_target, vec![0]);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].canonical_ids, vec!["A1", "A2"]);
    }

    #[test]
    fn test_ambiguous_target_side_fails_closed() {
        let canonical = vec![student("A1").with_contact_address("x@school.org")];
        let targets = vec![
            target(None, Some("x@school.org")),
            target(None, Some("X@school.org")),
        ];

        let result = match_records(&canonical, &targets);

        assert!(result.pairs.is_empty());
        assert_eq!(result.conflicts[0].target_keys.len(), 2);
    }
}

//! Content hash helper for target adapters
//!
//! Targets own their hash function; this helper implements the usual one:
//! SHA-256 over the `|`-joined normalized values of the tracked fields, in
//! the order the target declares them. Absent values hash as empty strings.
//! Only addresses are case-folded (see [`TrackedField::normalize`]); a case
//! correction in a name changes the hash.

use crate::model::record::{CanonicalRecord, ContentHash, TargetRecord, TrackedField};
use sha2::{Digest, Sha256};

/// Field-ordered SHA-256 content digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDigest {
    fields: Vec<TrackedField>,
}

impl FieldDigest {
    pub fn new(fields: impl Into<Vec<TrackedField>>) -> Self {
        Self {
            fields: fields.into(),
        }
    }

    pub fn fields(&self) -> &[TrackedField] {
        &self.fields
    }

    /// Digest of the source-side values of a canonical record
    pub fn of_record(&self, record: &CanonicalRecord) -> ContentHash {
        self.digest(|field| record.field_value(field))
    }

    /// Digest of the values a target reports for one of its entities
    ///
    /// Equals [`FieldDigest::of_record`] whenever every tracked field holds
    /// the same normalized value on both sides.
    pub fn of_target(&self, record: &TargetRecord) -> ContentHash {
        self.digest(|field| record.field_value(field))
    }

    fn digest<F>(&self, value_of: F) -> ContentHash
    where
        F: Fn(TrackedField) -> Option<String>,
    {
        let joined = self
            .fields
            .iter()
            .map(|field| value_of(*field).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("|");
        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        ContentHash::new(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::Role;
    use chrono::NaiveDate;

    fn digest() -> FieldDigest {
        FieldDigest::new(vec![
            TrackedField::FirstName,
            TrackedField::LastName,
            TrackedField::GroupKey,
        ])
    }

    #[test]
    fn test_stable_for_identical_values() {
        let a = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a");
        let b = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a");
        assert_eq!(digest().of_record(&a), digest().of_record(&b));
        assert_eq!(digest().of_record(&a).as_str().len(), 64);
    }

    #[test]
    fn test_changes_with_tracked_field() {
        let a = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a");
        let b = CanonicalRecord::student("A1", "Anna", "Schmidt", "6a");
        assert_ne!(digest().of_record(&a), digest().of_record(&b));
    }

    #[test]
    fn test_ignores_untracked_field() {
        let a = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a");
        let b = a.clone().with_photo_reference("sha256:abc");
        assert_eq!(digest().of_record(&a), digest().of_record(&b));
    }

    #[test]
    fn test_target_and_record_agree() {
        let record = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a")
            .with_contact_address("Anna.Schmidt@School.org");
        let target = TargetRecord::new(ContentHash::default())
            .with_external_id("A1")
            .with_contact_address("anna.schmidt@school.org")
            .with_field(TrackedField::FirstName, " Anna")
            .with_field(TrackedField::LastName, "Schmidt ")
            .with_field(TrackedField::GroupKey, "5a");
        let digest = FieldDigest::new(vec![
            TrackedField::FirstName,
            TrackedField::LastName,
            TrackedField::GroupKey,
            TrackedField::ContactAddress,
        ]);
        assert_eq!(digest.of_record(&record), digest.of_target(&target));
    }

    #[test]
    fn test_name_case_is_significant() {
        let record = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a");
        let target = TargetRecord::new(ContentHash::default())
            .with_external_id("A1")
            .with_field(TrackedField::FirstName, "anna")
            .with_field(TrackedField::LastName, "SCHMIDT")
            .with_field(TrackedField::GroupKey, "5a");
        assert_ne!(digest().of_record(&record), digest().of_target(&target));
    }

    #[test]
    fn test_every_tracked_field_moves_the_hash() {
        let digest = FieldDigest::new(vec![
            TrackedField::FirstName,
            TrackedField::LastName,
            TrackedField::BirthDate,
            TrackedField::ContactAddress,
            TrackedField::GroupKey,
            TrackedField::Role,
            TrackedField::Photo,
        ]);
        let base = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a")
            .with_birth_date(NaiveDate::from_ymd_opt(2012, 3, 4).unwrap())
            .with_contact_address("old@school.org")
            .with_photo_reference("sha256:aaa");
        let mut variants = vec![base.clone(); 7];
        variants[0].first_name = "Anne".to_string();
        variants[1].last_name = "Schmitt".to_string();
        variants[2].birth_date = NaiveDate::from_ymd_opt(2012, 3, 5);
        variants[3].contact_address = Some("new@school.org".to_string());
        variants[4].group_key = Some("6a".to_string());
        variants[5].role = Role::Teacher;
        variants[6].photo_reference = Some("sha256:bbb".to_string());

        let before = digest.of_record(&base);
        for variant in &variants {
            assert_ne!(digest.of_record(variant), before, "{:?}", variant);
        }
    }
}

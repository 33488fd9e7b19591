//! Canonical and target-side person records

use crate::errors::{ExError, ExErrorKind, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Role of a person in the source roster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Teacher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
        }
    }
}

/// A field a target system can track
///
/// `ExternalId` and `Active` never come from a target's tracked set; the diff
/// engine uses them to mark an identifier backfill and a reactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    FirstName,
    LastName,
    BirthDate,
    ContactAddress,
    GroupKey,
    Role,
    Photo,
    ExternalId,
    Active,
}

impl TrackedField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedField::FirstName => "first_name",
            TrackedField::LastName => "last_name",
            TrackedField::BirthDate => "birth_date",
            TrackedField::ContactAddress => "contact_address",
            TrackedField::GroupKey => "group_key",
            TrackedField::Role => "role",
            TrackedField::Photo => "photo",
            TrackedField::ExternalId => "external_id",
            TrackedField::Active => "active",
        }
    }

    /// Normalize a raw value for comparison.
    ///
    /// Values are trimmed; addresses compare case-insensitively.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            TrackedField::ContactAddress => trimmed.to_lowercase(),
            _ => trimmed.to_string(),
        }
    }
}

impl std::fmt::Display for TrackedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One person as known by the authoritative source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub contact_address: Option<String>,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub photo_reference: Option<String>,
}

impl CanonicalRecord {
    pub fn student(
        external_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        group_key: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            birth_date: None,
            contact_address: None,
            group_key: Some(group_key.into()),
            role: Role::Student,
            photo_reference: None,
        }
    }

    pub fn teacher(
        external_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            birth_date: None,
            contact_address: None,
            group_key: None,
            role: Role::Teacher,
            photo_reference: None,
        }
    }

    pub fn with_birth_date(mut self, date: NaiveDate) -> Self {
        self.birth_date = Some(date);
        self
    }

    pub fn with_contact_address(mut self, address: impl Into<String>) -> Self {
        self.contact_address = Some(address.into());
        self
    }

    pub fn with_photo_reference(mut self, reference: impl Into<String>) -> Self {
        self.photo_reference = Some(reference.into());
        self
    }

    /// Contact address if present and non-blank
    pub fn address(&self) -> Option<&str> {
        self.contact_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    /// Normalized value of a field, `None` when absent or blank.
    pub fn field_value(&self, field: TrackedField) -> Option<String> {
        let raw = match field {
            TrackedField::FirstName => Some(self.first_name.clone()),
            TrackedField::LastName => Some(self.last_name.clone()),
            TrackedField::BirthDate => self.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
            TrackedField::ContactAddress => self.contact_address.clone(),
            TrackedField::GroupKey => self.group_key.clone(),
            TrackedField::Role => Some(self.role.as_str().to_string()),
            TrackedField::Photo => self.photo_reference.clone(),
            TrackedField::ExternalId => Some(self.external_id.clone()),
            TrackedField::Active => Some("true".to_string()),
        }?;
        let normalized = field.normalize(&raw);
        (!normalized.is_empty()).then_some(normalized)
    }
}

/// Opaque digest a target stores for the fields it considers in sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_active() -> bool {
    true
}

/// A target system's view of a previously synchronized entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub contact_address: Option<String>,
    #[serde(default)]
    pub content_hash: ContentHash,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Field values the target reports; may cover only part of its tracked set
    #[serde(default)]
    pub fields: BTreeMap<TrackedField, String>,
}

impl TargetRecord {
    pub fn new(content_hash: ContentHash) -> Self {
        Self {
            external_id: None,
            contact_address: None,
            content_hash,
            active: true,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    pub fn with_contact_address(mut self, address: impl Into<String>) -> Self {
        self.contact_address = Some(address.into());
        self
    }

    pub fn with_field(mut self, field: TrackedField, value: impl Into<String>) -> Self {
        self.fields.insert(field, value.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// External id if the target stores a non-blank one
    pub fn id(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Lowercased contact address if present
    pub fn address_key(&self) -> Option<String> {
        self.contact_address
            .as_deref()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
    }

    /// Key used in previews and reports: id, else address
    pub fn key(&self) -> String {
        self.id()
            .map(str::to_string)
            .or_else(|| self.address_key())
            .unwrap_or_else(|| "<unkeyed>".to_string())
    }

    /// Normalized reported value of a field, `None` when not reported
    pub fn field_value(&self, field: TrackedField) -> Option<String> {
        match field {
            TrackedField::ExternalId => self.id().map(str::to_string),
            TrackedField::Active => Some(self.active.to_string()),
            TrackedField::ContactAddress if !self.fields.contains_key(&field) => {
                self.address_key()
            }
            _ => self.fields.get(&field).map(|v| field.normalize(v)),
        }
    }
}

/// Validate one source load before it reaches the diff engine.
///
/// # Errors
///
/// `SourceMalformed` when a record lacks an external id, a name, or (for
/// students) a group key, or when two records share an external id.
pub fn validate_canonical(records: &[CanonicalRecord]) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let malformed = |message: String| {
            ExError::new(ExErrorKind::SourceMalformed)
                .with_op("validate_canonical")
                .with_message(message)
        };

        let id = record.external_id.trim();
        if id.is_empty() {
            return Err(malformed(format!(
                "record #{} ({}) has no external id",
                index + 1,
                record.display_name()
            )));
        }
        if record.first_name.trim().is_empty() || record.last_name.trim().is_empty() {
            return Err(malformed("first and last name are required".to_string()).with_record(id));
        }
        if record.role == Role::Student
            && record
                .group_key
                .as_deref()
                .map_or(true, |g| g.trim().is_empty())
        {
            return Err(malformed("students require a group key".to_string()).with_record(id));
        }
        if !seen.insert(id) {
            return Err(malformed("duplicate external id in source load".to_string()).with_record(id));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_normalizes() {
        let record = CanonicalRecord::student("A1", " Björn ", "Müller", "5a")
            .with_contact_address("B.Mueller@School.org")
            .with_birth_date(NaiveDate::from_ymd_opt(2012, 3, 4).unwrap());

        assert_eq!(record.field_value(TrackedField::FirstName).as_deref(), Some("Björn"));
        assert_eq!(
            record.field_value(TrackedField::ContactAddress).as_deref(),
            Some("b.mueller@school.org")
        );
        assert_eq!(
            record.field_value(TrackedField::BirthDate).as_deref(),
            Some("2012-03-04")
        );
        assert_eq!(record.field_value(TrackedField::Photo), None);
    }

    #[test]
    fn test_target_key_prefers_id() {
        let with_id = TargetRecord::new(ContentHash::new("h"))
            .with_external_id("A1")
            .with_contact_address("a@x.org");
        let legacy = TargetRecord::new(ContentHash::new("h")).with_contact_address("Legacy@X.org");
        let blank_id = TargetRecord::new(ContentHash::new("h")).with_external_id("  ");

        assert_eq!(with_id.key(), "A1");
        assert_eq!(legacy.key(), "legacy@x.org");
        assert_eq!(blank_id.id(), None);
        assert_eq!(blank_id.key(), "<unkeyed>");
    }

    #[test]
    fn test_target_address_falls_back_to_contact_address() {
        let target = TargetRecord::new(ContentHash::new("h")).with_contact_address("A@X.org");
        assert_eq!(
            target.field_value(TrackedField::ContactAddress).as_deref(),
            Some("a@x.org")
        );
    }

    #[test]
    fn test_validate_accepts_teacher_without_group() {
        let records = vec![
            CanonicalRecord::student("A1", "Anna", "Schmidt", "5a"),
            CanonicalRecord::teacher("T1", "Hans", "Weber"),
        ];
        assert!(validate_canonical(&records).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_id() {
        let records = vec![CanonicalRecord::student("  ", "Anna", "Schmidt", "5a")];
        let err = validate_canonical(&records).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::SourceMalformed);
    }

    #[test]
    fn test_validate_rejects_duplicate_id() {
        let records = vec![
            CanonicalRecord::student("A1", "Anna", "Schmidt", "5a"),
            CanonicalRecord::student("A1", "Ben", "Schulz", "5b"),
        ];
        let err = validate_canonical(&records).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::SourceMalformed);
        assert_eq!(err.record_key(), Some("A1"));
    }

    #[test]
    fn test_validate_rejects_student_without_group() {
        let mut record = CanonicalRecord::student("A1", "Anna", "Schmidt", "5a");
        record.group_key = None;
        assert!(validate_canonical(&[record]).is_err());
    }
}

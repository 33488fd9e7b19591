//! YAML roster source
//!
//! ```yaml
//! people:
//!   - external_id: 1001
//!     first_name: Björn
//!     last_name: Müller
//!     birth_date: 2012-04-01
//!     group: 5a
//!   - external_id: T-17
//!     first_name: Anna
//!     last_name: Schmidt
//!     role: teacher
//!     contact_address: a.schmidt@school.org
//! ```

use super::{read_optional, write_atomically};
use crate::registry::AdapterContext;
use async_trait::async_trait;
use chrono::NaiveDate;
use rostersync_core::adapter::{ConfigField, FieldKind};
use rostersync_core::errors::{ExError, ExErrorKind, Result};
use rostersync_core::model::{AddressAssignment, CanonicalRecord, Role};
use rostersync_core::SourceAdapter;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

pub const NAME: &str = "yaml_roster";
pub const DISPLAY_NAME: &str = "YAML roster file";

const PATH: ConfigField = ConfigField::required("path", "Roster file", FieldKind::Path)
    .with_placeholder("roster.yaml");
const INCLUDE_TEACHERS: ConfigField =
    ConfigField::optional("include_teachers", "Include teachers", FieldKind::Text)
        .with_default("true");

pub const SCHEMA: &[ConfigField] = &[PATH, INCLUDE_TEACHERS];

/// Build from settings.
///
/// # Errors
///
/// `InvalidConfig` for a missing path or a non-boolean `include_teachers`.
pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn SourceAdapter>> {
    let path = ctx.settings.resolve_path(ctx.require(&PATH)?);
    let include_teachers = match ctx.value(&INCLUDE_TEACHERS) {
        Some("true") | None => true,
        Some("false") => false,
        Some(other) => {
            return Err(ExError::new(ExErrorKind::InvalidConfig)
                .with_target(ctx.instance.to_string())
                .with_message(format!(
                    "include_teachers must be true or false, got '{}'",
                    other
                )))
        }
    };
    Ok(Arc::new(YamlRosterSource {
        path,
        include_teachers,
    }))
}

/// Scalar that YAML may give as a number or a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(i64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    external_id: Option<Scalar>,
    first_name: Option<String>,
    last_name: Option<String>,
    birth_date: Option<String>,
    #[serde(alias = "group_key")]
    group: Option<Scalar>,
    #[serde(default)]
    role: Role,
    contact_address: Option<String>,
    #[serde(alias = "photo_reference")]
    photo: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    #[serde(default)]
    people: Vec<RosterRow>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    ["%Y-%m-%d", "%d.%m.%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw.trim(), format).ok())
}

pub struct YamlRosterSource {
    path: PathBuf,
    include_teachers: bool,
}

impl YamlRosterSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            include_teachers: true,
        }
    }

    fn malformed(&self, row: usize, message: impl std::fmt::Display) -> ExError {
        ExError::new(ExErrorKind::SourceMalformed)
            .with_op("load_canonical")
            .with_message(format!("{} row {}: {}", self.path.display(), row + 1, message))
    }

    fn convert(&self, index: usize, row: RosterRow) -> Result<CanonicalRecord> {
        let external_id = row
            .external_id
            .map(Scalar::into_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| self.malformed(index, "missing external_id"))?;
        let first_name = non_blank(row.first_name)
            .ok_or_else(|| self.malformed(index, "missing first_name"))?;
        let last_name = non_blank(row.last_name)
            .ok_or_else(|| self.malformed(index, "missing last_name"))?;

        let birth_date = match non_blank(row.birth_date) {
            Some(raw) => Some(
                parse_date(&raw)
                    .ok_or_else(|| self.malformed(index, format!("invalid birth_date '{}'", raw)))?,
            ),
            None => None,
        };

        Ok(CanonicalRecord {
            external_id,
            first_name,
            last_name,
            birth_date,
            contact_address: non_blank(row.contact_address),
            group_key: row
                .group
                .map(Scalar::into_string)
                .filter(|g| !g.is_empty()),
            role: row.role,
            photo_reference: non_blank(row.photo),
        })
    }
}

#[async_trait]
impl SourceAdapter for YamlRosterSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn load_canonical(&self) -> Result<Vec<CanonicalRecord>> {
        let bytes = read_optional(&self.path, ExErrorKind::SourceUnavailable, "load_canonical")
            .await?
            .ok_or_else(|| {
                ExError::new(ExErrorKind::SourceUnavailable)
                    .with_op("load_canonical")
                    .with_message(format!("roster file not found: {}", self.path.display()))
            })?;

        let file: RosterFile = serde_yaml::from_slice(&bytes).map_err(|e| {
            ExError::new(ExErrorKind::SourceMalformed)
                .with_op("load_canonical")
                .with_message(format!("{}: {}", self.path.display(), e))
        })?;

        let mut records = Vec::with_capacity(file.people.len());
        for (index, row) in file.people.into_iter().enumerate() {
            let record = self.convert(index, row)?;
            if record.role == Role::Teacher && !self.include_teachers {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }

    fn supports_write_back(&self) -> bool {
        true
    }

    async fn write_back(&self, assignments: &[AddressAssignment]) -> Result<usize> {
        if assignments.is_empty() {
            return Ok(0);
        }
        let by_id: HashMap<&str, &str> = assignments
            .iter()
            .map(|a| (a.external_id.as_str(), a.contact_address.as_str()))
            .collect();

        let io_error = |e: std::io::Error| {
            ExError::new(ExErrorKind::Io)
                .with_op("write_back")
                .with_message(format!("{}: {}", self.path.display(), e))
        };
        let bytes = tokio::fs::read(&self.path).await.map_err(io_error)?;
        let mut document: serde_yaml::Value = serde_yaml::from_slice(&bytes).map_err(|e| {
            ExError::new(ExErrorKind::SourceMalformed)
                .with_op("write_back")
                .with_message(e.to_string())
        })?;

        let mut written = 0;
        if let Some(people) = document
            .get_mut("people")
            .and_then(serde_yaml::Value::as_sequence_mut)
        {
            for person in people.iter_mut() {
                let Some(row) = person.as_mapping_mut() else {
                    continue;
                };
                let id = match row.get("external_id") {
                    Some(serde_yaml::Value::String(s)) => s.trim().to_string(),
                    Some(serde_yaml::Value::Number(n)) => n.to_string(),
                    _ => continue,
                };
                let has_address = row
                    .get("contact_address")
                    .and_then(serde_yaml::Value::as_str)
                    .is_some_and(|a| !a.trim().is_empty());
                if has_address {
                    continue;
                }
                if let Some(address) = by_id.get(id.as_str()) {
                    row.insert(
                        serde_yaml::Value::from("contact_address"),
                        serde_yaml::Value::from(*address),
                    );
                    written += 1;
                }
            }
        }

        let serialized = serde_yaml::to_string(&document).map_err(|e| {
            ExError::new(ExErrorKind::Serialization)
                .with_op("write_back")
                .with_message(e.to_string())
        })?;
        write_atomically(&self.path, serialized.as_bytes())
            .await
            .map_err(io_error)?;

        tracing::info!(
            path = %self.path.display(),
            written,
            "generated addresses written back to roster"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2012-04-01"),
            NaiveDate::from_ymd_opt(2012, 4, 1)
        );
        assert_eq!(
            parse_date("01.04.2012"),
            NaiveDate::from_ymd_opt(2012, 4, 1)
        );
        assert_eq!(parse_date("April"), None);
    }

    #[test]
    fn test_numeric_ids_become_strings() {
        let file: RosterFile = serde_yaml::from_str(
            "people:\n  - external_id: 1001\n    first_name: A\n    last_name: B\n    group: 5\n",
        )
        .unwrap();
        let source = YamlRosterSource::new("roster.yaml");
        let record = source
            .convert(0, file.people.into_iter().next().unwrap())
            .unwrap();
        assert_eq!(record.external_id, "1001");
        assert_eq!(record.group_key.as_deref(), Some("5"));
    }
}

//! JSON file directory target
//!
//! Stands in for an account directory: one JSON document holding every
//! entry the directory knows, suspended ones included.
//!
//! ```json
//! { "entries": [ { "external_id": "1001", "contact_address": "bmueller@school.org",
//!                  "content_hash": "…", "active": true, "fields": { "first_name": "Björn" } } ] }
//! ```
//!
//! The stored hash covers every tracked field, the contact address and the
//! photo reference included. An entry whose source carries no address keeps
//! its stored address on update, and its hash is taken without it.

use super::{read_optional, write_atomically};
use crate::registry::AdapterContext;
use async_trait::async_trait;
use rostersync_core::adapter::{ConfigField, FieldKind};
use rostersync_core::address::{
    validate_domain, validate_template, AddressBook, AddressGenerator, DEFAULT_TEMPLATE,
};
use rostersync_core::errors::{ExError, ExErrorKind, Result, TargetError};
use rostersync_core::model::{
    CanonicalRecord, ContentHash, FieldDigest, TargetRecord, TrackedField, UpdateEntry,
};
use rostersync_core::{RecordHasher, TargetAdapter};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const NAME: &str = "json_directory";
pub const DISPLAY_NAME: &str = "JSON directory file";

const PATH: ConfigField = ConfigField::required("path", "Directory file", FieldKind::Path)
    .with_placeholder("directory.json");
const DOMAIN: ConfigField = ConfigField::required("domain", "Mail domain", FieldKind::Text)
    .with_placeholder("school.org");
const TEMPLATE: ConfigField =
    ConfigField::optional("template", "Address template", FieldKind::Text)
        .with_default(DEFAULT_TEMPLATE);

pub const SCHEMA: &[ConfigField] = &[PATH, DOMAIN, TEMPLATE];

const TRACKED: [TrackedField; 7] = [
    TrackedField::FirstName,
    TrackedField::LastName,
    TrackedField::BirthDate,
    TrackedField::GroupKey,
    TrackedField::Role,
    TrackedField::ContactAddress,
    TrackedField::Photo,
];

/// # Errors
///
/// `InvalidConfig` for a missing path, a bad domain or a bad template.
pub fn build(ctx: &AdapterContext<'_>) -> Result<Arc<dyn TargetAdapter>> {
    let path = ctx.settings.resolve_path(ctx.require(&PATH)?);
    let domain = ctx.require(&DOMAIN)?;
    let template = ctx.value(&TEMPLATE).unwrap_or(DEFAULT_TEMPLATE);
    validate_domain(domain).map_err(|e| e.with_target(ctx.instance.to_string()))?;
    validate_template(template).map_err(|e| e.with_target(ctx.instance.to_string()))?;

    Ok(Arc::new(JsonDirectoryTarget::new(
        ctx.instance,
        path,
        AddressGenerator::new(domain).with_template(template),
    )))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    entries: Vec<TargetRecord>,
}

pub struct JsonDirectoryTarget {
    name: String,
    path: PathBuf,
    digest: FieldDigest,
    generator: AddressGenerator,
    /// Loaded on first use, then kept in step with the file
    state: Mutex<Option<DirectoryFile>>,
}

impl JsonDirectoryTarget {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, generator: AddressGenerator) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            digest: FieldDigest::new(TRACKED.to_vec()),
            generator,
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    async fn read_file(&self) -> Result<DirectoryFile> {
        let unavailable = |message: String| {
            ExError::new(ExErrorKind::AdapterUnavailable)
                .with_op("load_manifest")
                .with_target(self.name.clone())
                .with_message(message)
        };
        let bytes = read_optional(&self.path, ExErrorKind::AdapterUnavailable, "load_manifest")
            .await
            .map_err(|e| e.with_target(self.name.clone()))?;
        match bytes {
            None => Ok(DirectoryFile::default()),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| unavailable(format!("corrupt directory file {}: {}", self.path.display(), e))),
        }
    }

    /// The stored entry as a sync of `record` leaves it
    fn entry_for(&self, record: &CanonicalRecord) -> TargetRecord {
        let mut entry = TargetRecord::new(self.digest.of_record(record))
            .with_external_id(record.external_id.clone());
        if let Some(address) = record.address() {
            entry = entry.with_contact_address(address);
        }
        for &field in TRACKED.iter().filter(|f| **f != TrackedField::ContactAddress) {
            if let Some(value) = record.field_value(field) {
                entry = entry.with_field(field, value);
            }
        }
        entry
    }

    /// Run `change` against a copy of the loaded state and persist it.
    ///
    /// The cached state only moves once the file is written.
    async fn mutate<F>(&self, change: F) -> std::result::Result<(), TargetError>
    where
        F: FnOnce(&mut DirectoryFile) -> std::result::Result<(), TargetError>,
    {
        let mut guard = self.state.lock().await;
        let mut next = match guard.as_ref() {
            Some(file) => file.clone(),
            None => self.read_file().await.map_err(|e| TargetError::Unavailable {
                reason: e.to_string(),
            })?,
        };

        change(&mut next)?;

        let serialized = serde_json::to_vec_pretty(&next).map_err(|e| TargetError::Unavailable {
            reason: e.to_string(),
        })?;
        write_atomically(&self.path, &serialized)
            .await
            .map_err(|e| TargetError::Unavailable {
                reason: format!("cannot write {}: {}", self.path.display(), e),
            })?;
        *guard = Some(next);
        Ok(())
    }
}

fn position(entries: &[TargetRecord], wanted: &TargetRecord) -> Option<usize> {
    match wanted.id() {
        Some(id) => entries.iter().position(|e| e.id() == Some(id)),
        None => {
            let address = wanted.address_key();
            entries
                .iter()
                .position(|e| e.id().is_none() && e.address_key() == address)
        }
    }
}

impl RecordHasher for JsonDirectoryTarget {
    fn tracked_fields(&self) -> &[TrackedField] {
        &TRACKED
    }

    fn content_hash(&self, record: &CanonicalRecord) -> ContentHash {
        self.digest.of_record(record)
    }
}

#[async_trait]
impl TargetAdapter for JsonDirectoryTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_manifest(&self) -> Result<Vec<TargetRecord>> {
        let file = self.read_file().await?;
        let entries = file.entries.clone();
        *self.state.lock().await = Some(file);
        Ok(entries)
    }

    async fn create(&self, record: &CanonicalRecord) -> std::result::Result<(), TargetError> {
        let entry = self.entry_for(record);
        self.mutate(|file| {
            if file.entries.iter().any(|e| e.id() == entry.id()) {
                return Err(TargetError::Conflict {
                    reason: format!("external id {} already present", record.external_id),
                });
            }
            if let Some(address) = entry.address_key() {
                if file
                    .entries
                    .iter()
                    .any(|e| e.address_key().as_deref() == Some(address.as_str()))
                {
                    return Err(TargetError::Conflict {
                        reason: format!("address {} already in use", address),
                    });
                }
            }
            file.entries.push(entry);
            Ok(())
        })
        .await
    }

    async fn update(&self, update: &UpdateEntry) -> std::result::Result<(), TargetError> {
        let mut replacement = self.entry_for(&update.record);
        self.mutate(|file| {
            let index = position(&file.entries, &update.target).ok_or_else(|| {
                TargetError::NotFound {
                    key: update.target.key(),
                }
            })?;
            if replacement.contact_address.is_none() {
                replacement.contact_address = file.entries[index].contact_address.clone();
            }
            file.entries[index] = replacement;
            Ok(())
        })
        .await
    }

    async fn suspend(&self, record: &TargetRecord) -> std::result::Result<(), TargetError> {
        self.mutate(|file| {
            let index = position(&file.entries, record)
                .ok_or_else(|| TargetError::NotFound { key: record.key() })?;
            file.entries[index].active = false;
            Ok(())
        })
        .await
    }

    async fn enrich_preview(&self, records: Vec<CanonicalRecord>) -> Result<Vec<CanonicalRecord>> {
        let manifest = self.read_file().await?;
        let mut book: AddressBook = manifest
            .entries
            .iter()
            .filter_map(|e| e.address_key())
            .chain(records.iter().filter_map(|r| r.address().map(str::to_string)))
            .collect();

        Ok(records
            .into_iter()
            .map(|record| {
                if record.address().is_some() {
                    return record;
                }
                let address = book.reserve(
                    &self.generator,
                    &record.first_name,
                    &record.last_name,
                    &record.external_id,
                );
                record.with_contact_address(address)
            })
            .collect())
    }

    async fn test_connection(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::path::Path::new("."));
        if !tokio::fs::try_exists(parent).await.unwrap_or(false) {
            return Err(ExError::new(ExErrorKind::AdapterUnavailable)
                .with_op("test_connection")
                .with_target(self.name.clone())
                .with_message(format!("directory {} does not exist", parent.display())));
        }
        self.read_file().await.map(|_| ())
    }
}

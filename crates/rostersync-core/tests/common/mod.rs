use async_trait::async_trait;
use rostersync_core::address::{AddressBook, AddressGenerator};
use rostersync_core::errors::{Result, TargetError};
use rostersync_core::model::{
    CanonicalRecord, ContentHash, FieldDigest, TargetRecord, TrackedField, UpdateEntry,
};
use rostersync_core::{RecordHasher, TargetAdapter};
use std::collections::HashMap;
use tokio::sync::Mutex;

pub const DOMAIN: &str = "school.org";

/// Fields the in-memory target stores
#[allow(dead_code)]
pub const TRACKED: [TrackedField; 4] = [
    TrackedField::FirstName,
    TrackedField::LastName,
    TrackedField::BirthDate,
    TrackedField::GroupKey,
];

/// Build the target entry a successful sync of `record` leaves behind
#[allow(dead_code)]
pub fn synced(digest: &FieldDigest, record: &CanonicalRecord) -> TargetRecord {
    let mut target = TargetRecord::new(digest.of_record(record))
        .with_external_id(record.external_id.clone());
    if let Some(address) = record.address() {
        target = target.with_contact_address(address);
    }
    for &field in digest.fields() {
        if let Some(value) = record.field_value(field) {
            target = target.with_field(field, value);
        }
    }
    target
}

/// Create `count` students with ids `{prefix}{n}`
#[allow(dead_code)]
pub fn students(prefix: &str, count: usize) -> Vec<CanonicalRecord> {
    (0..count)
        .map(|n| {
            CanonicalRecord::student(
                format!("{}{}", prefix, n),
                format!("First{}", n),
                format!("{}Last{}", prefix, n),
                "5a",
            )
            .with_contact_address(format!("{}{}@{}", prefix.to_lowercase(), n, DOMAIN))
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct MemoryState {
    pub entries: Vec<TargetRecord>,
    /// `action:key` in dispatch order
    pub calls: Vec<String>,
    /// Injected per-record failures, keyed by record key
    pub failures: HashMap<String, TargetError>,
    /// Every operation fails with `Unavailable` once set
    pub unavailable: bool,
}

/// In-memory target used to exercise the core end to end
pub struct MemoryTarget {
    name: String,
    digest: FieldDigest,
    generator: AddressGenerator,
    pub state: Mutex<MemoryState>,
}

#[allow(dead_code)]
impl MemoryTarget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            digest: FieldDigest::new(TRACKED.to_vec()),
            generator: AddressGenerator::new(DOMAIN),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn digest(&self) -> &FieldDigest {
        &self.digest
    }

    /// Seed the target as if `records` had been synced before
    pub fn seeded(name: &str, records: &[CanonicalRecord]) -> Self {
        let target = Self::new(name);
        let entries = records.iter().map(|r| synced(&target.digest, r)).collect();
        target.state.try_lock().expect("fresh mutex").entries = entries;
        target
    }

    pub async fn push_entry(&self, entry: TargetRecord) {
        self.state.lock().await.entries.push(entry);
    }

    pub async fn fail(&self, key: &str, error: TargetError) {
        self.state.lock().await.failures.insert(key.to_string(), error);
    }

    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn entries(&self) -> Vec<TargetRecord> {
        self.state.lock().await.entries.clone()
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
}

fn check_injected(
    state: &mut MemoryState,
    action: &str,
    key: &str,
) -> std::result::Result<(), TargetError> {
    state.calls.push(format!("{}:{}", action, key));
    if state.unavailable {
        return Err(TargetError::Unavailable {
            reason: "connection reset".to_string(),
        });
    }
    if let Some(error) = state.failures.get(key) {
        if error.is_unavailable() {
            state.unavailable = true;
        }
        return Err(error.clone());
    }
    Ok(())
}

impl RecordHasher for MemoryTarget {
    fn tracked_fields(&self) -> &[TrackedField] {
        self.digest.fields()
    }

    fn content_hash(&self, record: &CanonicalRecord) -> ContentHash {
        self.digest.of_record(record)
    }
}

#[async_trait]
impl TargetAdapter for MemoryTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_manifest(&self) -> Result<Vec<TargetRecord>> {
        Ok(self.state.lock().await.entries.clone())
    }

    async fn create(&self, record: &CanonicalRecord) -> std::result::Result<(), TargetError> {
        let mut state = self.state.lock().await;
        check_injected(&mut state, "create", &record.external_id)?;

        if let Some(address) = record.address() {
            let address = address.to_lowercase();
            if state
                .entries
                .iter()
                .any(|e| e.address_key().as_deref() == Some(address.as_str()))
            {
                return Err(TargetError::Conflict {
                    reason: format!("address {} already in use", address),
                });
            }
        }
        state.entries.push(synced(&self.digest, record));
        Ok(())
    }

    async fn update(&self, entry: &UpdateEntry) -> std::result::Result<(), TargetError> {
        let mut state = self.state.lock().await;
        check_injected(&mut state, "update", &entry.record.external_id)?;

        let index = Self::position(&state.entries, &entry.target).ok_or_else(|| {
            TargetError::NotFound {
                key: entry.target.key(),
            }
        })?;
        let mut updated = synced(&self.digest, &entry.record);
        if updated.contact_address.is_none() {
            updated.contact_address = state.entries[index].contact_address.clone();
        }
        state.entries[index] = updated;
        Ok(())
    }

    async fn suspend(&self, record: &TargetRecord) -> std::result::Result<(), TargetError> {
        let mut state = self.state.lock().await;
        check_injected(&mut state, "suspend", &record.key())?;

        let index = Self::position(&state.entries, record)
            .ok_or_else(|| TargetError::NotFound { key: record.key() })?;
        state.entries[index].active = false;
        Ok(())
    }

    async fn enrich_preview(&self, records: Vec<CanonicalRecord>) -> Result<Vec<CanonicalRecord>> {
        let state = self.state.lock().await;
        let mut book: AddressBook = state
            .entries
            .iter()
            .filter_map(|e| e.contact_address.clone())
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
}

//! Target system contract

use crate::errors::{Result, TargetError};
use crate::model::{CanonicalRecord, ContentHash, TargetRecord, TrackedField, UpdateEntry};
use async_trait::async_trait;

/// Hash contract a target exposes to the diff engine
///
/// `content_hash` must be computed the same way the target computed the
/// hash it stores, otherwise every record shows up as changed.
pub trait RecordHasher: Send + Sync {
    /// Fields this target stores and compares, in hash order
    fn tracked_fields(&self) -> &[TrackedField];

    fn content_hash(&self, record: &CanonicalRecord) -> ContentHash;
}

/// One independently reconciled target system
#[async_trait]
pub trait TargetAdapter: RecordHasher {
    fn name(&self) -> &str;

    /// Report every entity the target holds for this roster.
    ///
    /// # Errors
    ///
    /// `AdapterUnavailable` when the target cannot be reached.
    async fn load_manifest(&self) -> Result<Vec<TargetRecord>>;

    async fn create(&self, record: &CanonicalRecord) -> std::result::Result<(), TargetError>;

    /// Write the changed fields of a matched entity, linking its external id
    /// and reactivating it when the entry says so
    async fn update(&self, entry: &UpdateEntry) -> std::result::Result<(), TargetError>;

    async fn suspend(&self, record: &TargetRecord) -> std::result::Result<(), TargetError>;

    /// Fill in target-generated data (addresses) on records about to be
    /// created, so the preview shows exactly what apply will send.
    ///
    /// Must return the same records in the same order.
    ///
    /// # Errors
    ///
    /// Adapter specific; a failure keeps the target out of the run.
    async fn enrich_preview(&self, records: Vec<CanonicalRecord>) -> Result<Vec<CanonicalRecord>> {
        Ok(records)
    }

    /// Cheap reachability check.
    ///
    /// # Errors
    ///
    /// `AdapterUnavailable` when the target cannot be reached.
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }
}

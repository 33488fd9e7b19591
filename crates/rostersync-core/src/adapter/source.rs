//! Authoritative source contract

use crate::errors::{ExError, ExErrorKind, Result};
use crate::model::{AddressAssignment, CanonicalRecord};
use async_trait::async_trait;

/// Supplier of the canonical roster
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    /// Load the complete canonical roster.
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` when the source cannot be read, `SourceMalformed`
    /// when it can be read but a row is unusable.
    async fn load_canonical(&self) -> Result<Vec<CanonicalRecord>>;

    fn supports_write_back(&self) -> bool {
        false
    }

    /// Persist addresses that targets generated and accepted.
    ///
    /// # Errors
    ///
    /// The default implementation rejects the call with `InvalidInput`;
    /// sources that support write-back report their own I/O failures.
    async fn write_back(&self, assignments: &[AddressAssignment]) -> Result<usize> {
        Err(ExError::new(ExErrorKind::InvalidInput)
            .with_op("write_back")
            .with_message(format!(
                "source '{}' does not support write-back ({} assignments dropped)",
                self.name(),
                assignments.len()
            )))
    }
}

//! Reconciliation data model
//!
//! - [`CanonicalRecord`]: one person as read from the authoritative source
//! - [`TargetRecord`]: one entity as reported by a target system
//! - [`ChangeSet`]: the per-target output of one diff run
//! - [`RunReport`]: the per-target result of applying a change set
//!
//! None of these are persisted by the core; they are rebuilt on every run.

pub mod change_set;
pub mod digest;
pub mod record;
pub mod report;

pub use change_set::{ChangeSet, HashAnomaly, MatchConflict, MatchKind, UpdateEntry};
pub use digest::FieldDigest;
pub use record::{
    validate_canonical, CanonicalRecord, ContentHash, Role, TargetRecord, TrackedField,
};
pub use report::{
    AbortReason, AddressAssignment, ApplyAction, FailureReason, OutcomeCounts, RecordOutcome,
    RecordReport, RunReport, SkipReason,
};

//! RosterSync Core - reconciliation kernel
//!
//! This crate compares one authoritative roster with any number of target
//! systems and turns the difference into a previewable, safely applicable
//! change set:
//! - Record model shared by sources, targets and reports
//! - Two-pass identity matcher (external id, then contact address)
//! - Deterministic contact address generation with transliteration
//! - Field-level diff engine and human-readable preview
//! - Mass-suspension failsafe with an explicit per-run override
//! - Apply coordinator with bounded parallelism and per-record isolation
//!
//! The core performs no I/O of its own; adapters implement the traits in
//! [`adapter`].

pub mod adapter;
pub mod address;
pub mod apply;
pub mod diff;
pub mod errors;
pub mod failsafe;
pub mod logging_facility;
pub mod matcher;
pub mod model;

pub use rostersync_core_types as core_types;

// Re-export commonly used types
pub use adapter::{RecordHasher, SourceAdapter, TargetAdapter};
pub use apply::{prepare_preview, ApplyCoordinator, ApplyOptions, CancelToken};
pub use diff::compute_change_set;
pub use errors::{ExError, ExErrorKind, Result, TargetError};
pub use failsafe::{FailsafeGuard, FailsafeOverride, FailsafeVerdict};
pub use matcher::match_records;
pub use model::{CanonicalRecord, ChangeSet, RunReport, TargetRecord, TrackedField};

//! Core types shared across RosterSync facilities
//!
//! This crate provides foundational types used by the error, logging and
//! reconciliation layers:
//!
//! - **Correlation types**: RunId, TraceId, RunContext
//! - **Sensitive data**: Sensitive<T> marker for credentials in adapter options
//! - **Schema constants**: Canonical log field keys and event names

pub mod correlation;
pub mod schema;
pub mod sensitive;

pub use correlation::{RunContext, RunId, TraceId};
pub use sensitive::Sensitive;

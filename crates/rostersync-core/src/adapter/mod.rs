//! Contracts between the core and the systems it reconciles
//!
//! The core never performs I/O itself. A [`SourceAdapter`] supplies the
//! canonical roster, every [`TargetAdapter`] reports its manifest and executes
//! the writes of an approved change set. Each adapter also publishes a
//! declarative [`ConfigField`] schema so settings can be validated before any
//! adapter is built.

pub mod schema;
pub mod source;
pub mod target;

pub use schema::{validate_config, AdapterOptions, ConfigField, FieldKind};
pub use source::SourceAdapter;
pub use target::{RecordHasher, TargetAdapter};

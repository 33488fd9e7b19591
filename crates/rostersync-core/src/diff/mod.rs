//! Roster diff engine.
//!
//! Compares the canonical roster with one target's manifest and produces the
//! per-target [`ChangeSet`](crate::model::ChangeSet) that is previewed and,
//! once approved, applied.
//!
//! ## Entry point
//!
//! ```ignore
//! use rostersync_core::diff::{compute_change_set, render_preview};
//!
//! let change_set = compute_change_set("directory", &canonical, &manifest, &target);
//! let verdict = FailsafeGuard::default().evaluate(&change_set, change_set.population());
//! println!("{}", render_preview(&change_set, &verdict));
//! ```
//!
//! ## Guarantees
//!
//! - **Partition**: every canonical record lands in exactly one of
//!   `to_create` / `to_update`; every active target record in exactly one of
//!   `to_update` / `to_suspend` / `unchanged`.
//! - **Determinism**: output follows input order; re-running on the same
//!   input yields the same change set.
//! - **Fail closed**: ambiguous address matches are never paired.

pub mod engine;
pub mod human_summary;

pub use engine::compute_change_set;
pub use human_summary::{render_preview, render_run_report};

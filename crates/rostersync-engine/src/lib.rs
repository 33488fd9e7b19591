//! RosterSync Engine - Orchestration layer
//!
//! Wires configured adapters to the reconciliation core and runs the three
//! phases of a sync: load the source, plan every target, apply the approved
//! plans.

pub mod adapters;
pub mod registry;
pub mod run;
pub mod settings;

pub use registry::AdapterRegistry;
pub use run::{EngineOptions, SyncEngine, TargetPlan};
pub use settings::{load_settings, Settings};

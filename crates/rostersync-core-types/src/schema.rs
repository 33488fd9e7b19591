//! Canonical schema constants for structured logging
//!
//! These constants keep field names identical across the diff engine, the
//! apply coordinator and the orchestration layer.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_RUN_ID: &str = "run_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Reconciliation identifiers
pub const FIELD_TARGET: &str = "target_name";
pub const FIELD_SOURCE: &str = "source";
pub const FIELD_RECORD_KEY: &str = "record_key";
pub const FIELD_ACTION: &str = "action";

// Change-set sizes
pub const FIELD_CREATE_COUNT: &str = "create_count";
pub const FIELD_UPDATE_COUNT: &str = "update_count";
pub const FIELD_SUSPEND_COUNT: &str = "suspend_count";
pub const FIELD_UNCHANGED_COUNT: &str = "unchanged_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

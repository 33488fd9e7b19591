use serde::Serialize;
use thiserror::Error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code used by the CLI exit path, the run
/// report and the structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Load time (abort the run before diffing)
    SourceUnavailable,
    SourceMalformed,

    // Matching / gating
    /// Ambiguous secondary-key match; reported, never resolved
    MatchConflict,
    /// Suspension ratio exceeded; the whole target apply is refused
    FailsafeBlocked,

    // Apply
    /// One record failed; siblings continue
    RecordApplyFailed,
    /// Target unreachable; this target aborts, other targets continue
    AdapterUnavailable,
    /// An adapter broke its contract (e.g. enrichment dropped records)
    AdapterContract,
    Cancelled,

    // Configuration
    UnknownAdapter,
    InvalidConfig,
    InvalidInput,

    // Integration/IO
    Io,
    Serialization,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::SourceUnavailable => "ERR_SOURCE_UNAVAILABLE",
            ExErrorKind::SourceMalformed => "ERR_SOURCE_MALFORMED",
            ExErrorKind::MatchConflict => "ERR_MATCH_CONFLICT",
            ExErrorKind::FailsafeBlocked => "ERR_FAILSAFE_BLOCKED",
            ExErrorKind::RecordApplyFailed => "ERR_RECORD_APPLY_FAILED",
            ExErrorKind::AdapterUnavailable => "ERR_ADAPTER_UNAVAILABLE",
            ExErrorKind::AdapterContract => "ERR_ADAPTER_CONTRACT",
            ExErrorKind::Cancelled => "ERR_CANCELLED",
            ExErrorKind::UnknownAdapter => "ERR_UNKNOWN_ADAPTER",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Whether this kind aborts a run before any preview can be trusted
    pub fn is_load_time(&self) -> bool {
        matches!(
            self,
            ExErrorKind::SourceUnavailable | ExErrorKind::SourceMalformed
        )
    }
}

/// Canonical structured error type
///
/// Carries a classification plus enough context (operation, target, record
/// key) to locate the failure in a multi-target run.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    target: Option<String>,
    record_key: Option<String>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            target: None,
            record_key: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add target system context
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Add record context (external id or contact address)
    pub fn with_record(mut self, key: impl Into<String>) -> Self {
        self.record_key = Some(key.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn record_key(&self) -> Option<&str> {
        self.record_key.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(target) = &self.target {
            write!(f, " (target: {})", target)?;
        }
        if let Some(key) = &self.record_key {
            write!(f, " (record: {})", key)?;
        }
        if let Some(source) = &self.source {
            write!(f, " caused by {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Typed failure reason returned by a target adapter for one record operation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetError {
    /// The target refused the record (validation, policy, quota)
    #[error("rejected by target: {reason}")]
    Rejected { reason: String },

    /// The entity the operation refers to no longer exists in the target
    #[error("entity not found in target: {key}")]
    NotFound { key: String },

    /// The write would collide with existing target state (e.g. address in use)
    #[error("conflict in target: {reason}")]
    Conflict { reason: String },

    /// The target could not be reached; the rest of this target's apply stops
    #[error("target unavailable: {reason}")]
    Unavailable { reason: String },
}

impl TargetError {
    /// Whether this failure means the whole target is unreachable
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TargetError::Unavailable { .. })
    }
}

impl From<TargetError> for ExError {
    fn from(err: TargetError) -> Self {
        let kind = if err.is_unavailable() {
            ExErrorKind::AdapterUnavailable
        } else {
            ExErrorKind::RecordApplyFailed
        };
        ExError::new(kind).with_message(err.to_string())
    }
}

impl From<serde_json::Error> for ExError {
    fn from(err: serde_json::Error) -> Self {
        ExError::new(ExErrorKind::Serialization).with_message(err.to_string())
    }
}

impl From<std::io::Error> for ExError {
    fn from(err: std::io::Error) -> Self {
        ExError::new(ExErrorKind::Io).with_message(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_codes() {
        let cases = [
            (ExErrorKind::SourceUnavailable, "ERR_SOURCE_UNAVAILABLE"),
            (ExErrorKind::SourceMalformed, "ERR_SOURCE_MALFORMED"),
            (ExErrorKind::MatchConflict, "ERR_MATCH_CONFLICT"),
            (ExErrorKind::FailsafeBlocked, "ERR_FAILSAFE_BLOCKED"),
            (ExErrorKind::RecordApplyFailed, "ERR_RECORD_APPLY_FAILED"),
            (ExErrorKind::AdapterUnavailable, "ERR_ADAPTER_UNAVAILABLE"),
        ];
        for (kind, expected_code) in cases {
            assert_eq!(kind.code(), expected_code, "Wrong code for {:?}", kind);
        }
    }

    #[test]
    fn test_load_time_kinds() {
        assert!(ExErrorKind::SourceUnavailable.is_load_time());
        assert!(ExErrorKind::SourceMalformed.is_load_time());
        assert!(!ExErrorKind::AdapterUnavailable.is_load_time());
    }

    #[test]
    fn test_display_includes_context() {
        let err = ExError::new(ExErrorKind::RecordApplyFailed)
            .with_op("create")
            .with_target("hagen_id")
            .with_record("A1")
            .with_message("quota exceeded");
        let text = err.to_string();
        assert!(text.starts_with("[ERR_RECORD_APPLY_FAILED]"));
        assert!(text.contains("'create'"));
        assert!(text.contains("target: hagen_id"));
        assert!(text.contains("record: A1"));
        assert!(text.contains("quota exceeded"));
    }

    #[test]
    fn test_target_error_conversion() {
        let unavailable: ExError = TargetError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into();
        assert_eq!(unavailable.kind(), ExErrorKind::AdapterUnavailable);

        let rejected: ExError = TargetError::Rejected {
            reason: "invalid group".to_string(),
        }
        .into();
        assert_eq!(rejected.kind(), ExErrorKind::RecordApplyFailed);
        assert!(rejected.message().contains("invalid group"));
    }

    #[test]
    fn test_source_chain() {
        let inner = ExError::new(ExErrorKind::Io).with_message("permission denied");
        let outer = ExError::new(ExErrorKind::SourceUnavailable)
            .with_op("load_canonical")
            .with_source(inner);
        assert_eq!(
            outer.source_error().map(|e| e.kind()),
            Some(ExErrorKind::Io)
        );
        assert!(std::error::Error::source(&outer).is_some());
    }
}

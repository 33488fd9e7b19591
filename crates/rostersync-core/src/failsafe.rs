//! Mass-suspension failsafe
//!
//! A change set that would suspend more than a fixed share of a target's
//! current population is refused as a whole. The refusal can only be lifted
//! by an explicit, per-run [`FailsafeOverride`] bound to the exact verdict the
//! operator reviewed.

use crate::errors::{ExError, ExErrorKind, Result};
use crate::model::ChangeSet;
use serde::Serialize;

/// Default share of the population that may be suspended in one run
pub const DEFAULT_THRESHOLD: f64 = 0.15;

/// Outcome of evaluating one change set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FailsafeVerdict {
    Pass,
    Blocked {
        target: String,
        suspend_count: usize,
        population: usize,
        ratio: f64,
        threshold: f64,
    },
}

impl FailsafeVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, FailsafeVerdict::Blocked { .. })
    }

    /// Phrase the operator has to type to override this verdict
    ///
    /// `None` for a passing verdict, which needs no override.
    pub fn confirmation_phrase(&self) -> Option<String> {
        match self {
            FailsafeVerdict::Pass => None,
            FailsafeVerdict::Blocked {
                target,
                suspend_count,
                ..
            } => Some(format!("override {} {}", target, suspend_count)),
        }
    }
}

/// Guard applied to every change set before apply
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailsafeGuard {
    threshold: f64,
}

impl Default for FailsafeGuard {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl FailsafeGuard {
    /// Create a guard with the given suspension threshold.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `threshold` is not a number in `[0, 1]`.
    pub fn new(threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ExError::new(ExErrorKind::InvalidConfig)
                .with_op("failsafe_guard")
                .with_message(format!(
                    "failsafe threshold must be within [0, 1], got {}",
                    threshold
                )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Evaluate a change set against the population it would act on.
    ///
    /// Blocks when `|to_suspend| / max(population, 1)` strictly exceeds the
    /// threshold. An empty population never blocks.
    pub fn evaluate(&self, change_set: &ChangeSet, population: usize) -> FailsafeVerdict {
        let suspend_count = change_set.to_suspend.len();
        if population == 0 {
            return FailsafeVerdict::Pass;
        }

        let ratio = suspend_count as f64 / population.max(1) as f64;
        if ratio > self.threshold {
            tracing::warn!(
                target_name = %change_set.target,
                suspend_count,
                population,
                ratio,
                threshold = self.threshold,
                "failsafe blocked change set"
            );
            FailsafeVerdict::Blocked {
                target: change_set.target.clone(),
                suspend_count,
                population,
                ratio,
                threshold: self.threshold,
            }
        } else {
            FailsafeVerdict::Pass
        }
    }
}

/// Operator acknowledgement lifting one blocked verdict
///
/// Only constructible from a blocked verdict plus its confirmation phrase, so
/// there is no way to hold an override by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailsafeOverride {
    target: String,
    suspend_count: usize,
}

impl FailsafeOverride {
    /// Acknowledge a blocked verdict.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the verdict is not blocked or the confirmation does
    /// not equal the verdict's phrase.
    pub fn acknowledge(verdict: &FailsafeVerdict, confirmation: &str) -> Result<Self> {
        let (target, suspend_count) = match verdict {
            FailsafeVerdict::Blocked {
                target,
                suspend_count,
                ..
            } => (target, *suspend_count),
            FailsafeVerdict::Pass => {
                return Err(ExError::new(ExErrorKind::InvalidInput)
                    .with_op("failsafe_override")
                    .with_message("verdict is not blocked; nothing to override"));
            }
        };

        let expected = format!("override {} {}", target, suspend_count);
        if confirmation.trim() != expected {
            return Err(ExError::new(ExErrorKind::InvalidInput)
                .with_op("failsafe_override")
                .with_target(target.clone())
                .with_message(format!("confirmation must read '{}'", expected)));
        }

        Ok(Self {
            target: target.clone(),
            suspend_count,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether this acknowledgement covers the given verdict
    pub fn covers(&self, verdict: &FailsafeVerdict) -> bool {
        match verdict {
            FailsafeVerdict::Pass => true,
            FailsafeVerdict::Blocked {
                target,
                suspend_count,
                ..
            } => *target == self.target && *suspend_count == self.suspend_count,
        }
    }
}

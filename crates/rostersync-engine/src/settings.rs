//! Run configuration
//!
//! Loaded from a TOML file and layered with `ROSTERSYNC__…` environment
//! overrides, e.g. `ROSTERSYNC__FAILSAFE__THRESHOLD=0.2`.

use rostersync_core::adapter::AdapterOptions;
use rostersync_core::apply::ApplyOptions;
use rostersync_core::errors::{ExError, ExErrorKind, Result};
use rostersync_core::failsafe::{FailsafeGuard, DEFAULT_THRESHOLD};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "ROSTERSYNC";

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_max_parallel() -> usize {
    ApplyOptions::default().max_parallel
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub source: SourceSettings,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetSettings>,
    #[serde(default)]
    pub failsafe: FailsafeSettings,
    #[serde(default)]
    pub apply: ApplySettings,

    /// Directory relative adapter paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// Registered source adapter name
    pub kind: String,
    #[serde(default)]
    pub options: AdapterOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSettings {
    /// Registered target adapter name
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub options: AdapterOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailsafeSettings {
    /// Largest share of a target's population one run may suspend
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl Default for FailsafeSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplySettings {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
        }
    }
}

impl Settings {
    /// # Errors
    ///
    /// `InvalidConfig` if the threshold is outside `[0, 1]`.
    pub fn failsafe_guard(&self) -> Result<FailsafeGuard> {
        FailsafeGuard::new(self.failsafe.threshold)
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            max_parallel: self.apply.max_parallel,
        }
    }

    /// Enabled targets in name order
    pub fn enabled_targets(&self) -> impl Iterator<Item = (&String, &TargetSettings)> {
        self.targets.iter().filter(|(_, t)| t.enabled)
    }

    /// Resolve an adapter path option against the configuration directory
    pub fn resolve_path(&self, value: &str) -> PathBuf {
        let path = Path::new(value);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// # Errors
    ///
    /// `InvalidConfig` for an out-of-range threshold, a zero parallelism
    /// bound, or no enabled target.
    pub fn validate(&self) -> Result<()> {
        self.failsafe_guard()?;
        if self.apply.max_parallel == 0 {
            return Err(invalid("apply.max_parallel must be at least 1".to_string()));
        }
        if self.enabled_targets().next().is_none() {
            return Err(invalid("no enabled target configured".to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ExError {
    ExError::new(ExErrorKind::InvalidConfig)
        .with_op("load_settings")
        .with_message(message)
}

/// Load settings from a TOML file plus environment overrides.
///
/// # Errors
///
/// `InvalidConfig` when the file is missing, unparsable, or fails
/// [`Settings::validate`].
pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = config::Config::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| invalid(format!("cannot read {}: {}", path.display(), e)))?;

    let mut settings: Settings = raw
        .try_deserialize()
        .map_err(|e| invalid(format!("invalid settings in {}: {}", path.display(), e)))?;

    settings.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    settings.validate()?;

    tracing::debug!(
        path = %path.display(),
        targets = settings.targets.len(),
        threshold = settings.failsafe.threshold,
        "settings loaded"
    );
    Ok(settings)
}

//! Immutable adapter registry
//!
//! Maps the adapter names used in settings to their descriptors: display
//! name, declarative config schema and constructor. The built-in table is
//! fixed at compile time; nothing registers adapters at runtime.

use crate::adapters::{json_directory, yaml_roster};
use crate::settings::Settings;
use rostersync_core::adapter::{validate_config, AdapterOptions, ConfigField};
use rostersync_core::errors::{ExError, ExErrorKind, Result};
use rostersync_core::{SourceAdapter, TargetAdapter};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a constructor gets to build one adapter instance
pub struct AdapterContext<'a> {
    /// Instance name (the `[targets.<name>]` key, or `source`)
    pub instance: &'a str,
    pub options: &'a AdapterOptions,
    pub settings: &'a Settings,
}

impl AdapterContext<'_> {
    /// Configured value of `field`, else its declared default
    pub fn value(&self, field: &ConfigField) -> Option<&str> {
        field.value(self.options)
    }

    /// # Errors
    ///
    /// `InvalidConfig` if a required field has no value.
    pub fn require(&self, field: &ConfigField) -> Result<&str> {
        self.value(field).ok_or_else(|| {
            ExError::new(ExErrorKind::InvalidConfig)
                .with_target(self.instance.to_string())
                .with_message(format!("missing required option '{}'", field.key))
        })
    }
}

pub type SourceBuilder = fn(&AdapterContext<'_>) -> Result<Arc<dyn SourceAdapter>>;
pub type TargetBuilder = fn(&AdapterContext<'_>) -> Result<Arc<dyn TargetAdapter>>;

#[derive(Clone, Copy)]
pub struct SourceDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub schema: &'static [ConfigField],
    pub build: SourceBuilder,
}

#[derive(Clone, Copy)]
pub struct TargetDescriptor {
    pub name: &'static str,
    pub display_name: &'static str,
    pub schema: &'static [ConfigField],
    pub build: TargetBuilder,
}

const BUILTIN_SOURCES: &[SourceDescriptor] = &[SourceDescriptor {
    name: yaml_roster::NAME,
    display_name: yaml_roster::DISPLAY_NAME,
    schema: yaml_roster::SCHEMA,
    build: yaml_roster::build,
}];

const BUILTIN_TARGETS: &[TargetDescriptor] = &[TargetDescriptor {
    name: json_directory::NAME,
    display_name: json_directory::DISPLAY_NAME,
    schema: json_directory::SCHEMA,
    build: json_directory::build,
}];

fn unknown(kind: &str, name: &str) -> ExError {
    ExError::new(ExErrorKind::UnknownAdapter)
        .with_op("adapter_registry")
        .with_message(format!("no {} adapter named '{}'", kind, name))
}

pub struct AdapterRegistry {
    sources: BTreeMap<&'static str, SourceDescriptor>,
    targets: BTreeMap<&'static str, TargetDescriptor>,
}

impl AdapterRegistry {
    /// Registry holding the reference adapters shipped with the engine
    pub fn builtin() -> Self {
        Self {
            sources: BUILTIN_SOURCES.iter().map(|d| (d.name, *d)).collect(),
            targets: BUILTIN_TARGETS.iter().map(|d| (d.name, *d)).collect(),
        }
    }

    /// Registry from an explicit descriptor table.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if two descriptors of one kind share a name.
    pub fn from_descriptors(
        sources: &[SourceDescriptor],
        targets: &[TargetDescriptor],
    ) -> Result<Self> {
        let mut registry = Self {
            sources: BTreeMap::new(),
            targets: BTreeMap::new(),
        };
        for descriptor in sources {
            if registry.sources.insert(descriptor.name, *descriptor).is_some() {
                return Err(duplicate(descriptor.name));
            }
        }
        for descriptor in targets {
            if registry.targets.insert(descriptor.name, *descriptor).is_some() {
                return Err(duplicate(descriptor.name));
            }
        }
        Ok(registry)
    }

    /// Source descriptors sorted by name
    pub fn sources(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.values()
    }

    /// Target descriptors sorted by name
    pub fn targets(&self) -> impl Iterator<Item = &TargetDescriptor> {
        self.targets.values()
    }

    /// # Errors
    ///
    /// `UnknownAdapter` if no source is registered under `name`.
    pub fn source_schema(&self, name: &str) -> Result<&'static [ConfigField]> {
        self.sources
            .get(name)
            .map(|d| d.schema)
            .ok_or_else(|| unknown("source", name))
    }

    /// # Errors
    ///
    /// `UnknownAdapter` if no target is registered under `name`.
    pub fn target_schema(&self, name: &str) -> Result<&'static [ConfigField]> {
        self.targets
            .get(name)
            .map(|d| d.schema)
            .ok_or_else(|| unknown("target", name))
    }

    /// Validate the source options and build the configured source.
    ///
    /// # Errors
    ///
    /// `UnknownAdapter`, `InvalidConfig`, or whatever the constructor reports.
    pub fn build_source(&self, settings: &Settings) -> Result<Arc<dyn SourceAdapter>> {
        let kind = settings.source.kind.as_str();
        let descriptor = self.sources.get(kind).ok_or_else(|| unknown("source", kind))?;
        validate_config("source", descriptor.schema, &settings.source.options)?;

        (descriptor.build)(&AdapterContext {
            instance: "source",
            options: &settings.source.options,
            settings,
        })
    }

    /// Validate and build every enabled target, in name order.
    ///
    /// # Errors
    ///
    /// The first `UnknownAdapter`, `InvalidConfig` or constructor error.
    pub fn build_targets(&self, settings: &Settings) -> Result<Vec<Arc<dyn TargetAdapter>>> {
        let mut built = Vec::new();
        for (instance, target) in settings.enabled_targets() {
            let kind = target.kind.as_str();
            let descriptor = self
                .targets
                .get(kind)
                .ok_or_else(|| unknown("target", kind).with_target(instance.clone()))?;
            validate_config(instance, descriptor.schema, &target.options)?;

            let adapter = (descriptor.build)(&AdapterContext {
                instance,
                options: &target.options,
                settings,
            })?;
            tracing::debug!(target_name = %instance, kind, "target adapter built");
            built.push(adapter);
        }
        Ok(built)
    }
}

fn duplicate(name: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidConfig)
        .with_op("adapter_registry")
        .with_message(format!("adapter name registered twice: {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        let registry = AdapterRegistry::builtin();
        let sources: Vec<_> = registry.sources().map(|d| d.name).collect();
        let targets: Vec<_> = registry.targets().map(|d| d.name).collect();
        assert_eq!(sources, vec!["yaml_roster"]);
        assert_eq!(targets, vec!["json_directory"]);
    }

    #[test]
    fn test_unknown_adapter() {
        let registry = AdapterRegistry::builtin();
        let err = registry.target_schema("moodle").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::UnknownAdapter);
    }

    #[test]
    fn test_duplicate_descriptor_rejected() {
        let err = AdapterRegistry::from_descriptors(BUILTIN_SOURCES, &[BUILTIN_TARGETS[0]; 2])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ExErrorKind::InvalidConfig);
    }
}

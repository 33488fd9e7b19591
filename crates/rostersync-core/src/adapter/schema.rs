//! Declarative adapter configuration schema

use crate::errors::{ExError, ExErrorKind, Result};
use rostersync_core_types::Sensitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw option values of one configured adapter, keyed by [`ConfigField::key`]
pub type AdapterOptions = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    /// Credential; never echoed back in messages or logs
    Secret,
    Url,
    Path,
    Dir,
}

/// One configuration field an adapter accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigField {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub placeholder: &'static str,
    pub default: Option<&'static str>,
}

impl ConfigField {
    pub const fn required(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            label,
            kind,
            required: true,
            placeholder: "",
            default: None,
        }
    }

    pub const fn optional(key: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            key,
            label,
            kind,
            required: false,
            placeholder: "",
            default: None,
        }
    }

    pub const fn with_placeholder(mut self, placeholder: &'static str) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub const fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    /// Configured value, else the declared default
    pub fn value<'a>(&self, options: &'a AdapterOptions) -> Option<&'a str> {
        options
            .get(self.key)
            .map(String::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .or(self.default)
    }

    /// Configured value for display; secrets are redacted
    pub fn display_value(&self, options: &AdapterOptions) -> Option<String> {
        self.value(options).map(|v| match self.kind {
            FieldKind::Secret => Sensitive::new(v).to_string(),
            _ => v.to_string(),
        })
    }
}

/// Check configured options against an adapter schema.
///
/// # Errors
///
/// `InvalidConfig` for a missing required field, an option the schema does
/// not declare, or a malformed URL. Secret values never appear in messages.
pub fn validate_config(adapter: &str, schema: &[ConfigField], options: &AdapterOptions) -> Result<()> {
    let invalid = |message: String| {
        ExError::new(ExErrorKind::InvalidConfig)
            .with_op("validate_config")
            .with_target(adapter.to_string())
            .with_message(message)
    };

    for key in options.keys() {
        if !schema.iter().any(|f| f.key == key) {
            return Err(invalid(format!("unknown option '{}'", key)));
        }
    }

    for field in schema {
        let Some(value) = field.value(options) else {
            if field.required {
                return Err(invalid(format!(
                    "missing required option '{}' ({})",
                    field.key, field.label
                )));
            }
            continue;
        };

        if field.kind == FieldKind::Url
            && !(value.starts_with("http://") || value.starts_with("https://"))
        {
            return Err(invalid(format!(
                "option '{}' must be an http(s) URL, got '{}'",
                field.key, value
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[ConfigField] = &[
        ConfigField::required("path", "Directory file", FieldKind::Path),
        ConfigField::optional("endpoint", "Endpoint", FieldKind::Url),
        ConfigField::optional("template", "Address template", FieldKind::Text)
            .with_default("{i}{n}"),
        ConfigField::optional("api_key", "API key", FieldKind::Secret),
    ];

    fn options(pairs: &[(&str, &str)]) -> AdapterOptions {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_options() {
        let opts = options(&[("path", "dir.json"), ("endpoint", "https://x.org")]);
        assert!(validate_config("t", SCHEMA, &opts).is_ok());
        assert_eq!(SCHEMA[2].value(&opts), Some("{i}{n}"));
    }

    #[test]
    fn test_missing_required() {
        let err = validate_config("t", SCHEMA, &options(&[("path", "  ")])).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidConfig);
        assert!(err.message().contains("path"));
    }

    #[test]
    fn test_unknown_option() {
        let opts = options(&[("path", "a"), ("colour", "red")]);
        let err = validate_config("t", SCHEMA, &opts).unwrap_err();
        assert!(err.message().contains("colour"));
    }

    #[test]
    fn test_bad_url() {
        let opts = options(&[("path", "a"), ("endpoint", "ftp://x")]);
        assert!(validate_config("t", SCHEMA, &opts).is_err());
    }

    #[test]
    fn test_secret_redacted_for_display() {
        let opts = options(&[("path", "a"), ("api_key", "sk_live_1")]);
        assert_eq!(SCHEMA[3].display_value(&opts).as_deref(), Some("***REDACTED***"));
        assert_eq!(SCHEMA[0].display_value(&opts).as_deref(), Some("a"));
        assert_eq!(SCHEMA[1].display_value(&opts), None);
    }
}

//! Adapter schema listing

use clap::Args;
use rostersync_core::adapter::{ConfigField, FieldKind};
use rostersync_engine::AdapterRegistry;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct SchemaArgs {
    /// Print a settings skeleton in TOML instead of the field list
    #[arg(long)]
    pub toml: bool,

    /// Also show the effective option values of this settings file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn execute(args: SchemaArgs) -> anyhow::Result<i32> {
    let registry = AdapterRegistry::builtin();

    if args.toml {
        print!("{}", skeleton(&registry)?);
        return Ok(0);
    }

    println!("# Sources\n");
    for descriptor in registry.sources() {
        print_adapter(descriptor.name, descriptor.display_name, descriptor.schema);
    }
    println!("# Targets\n");
    for descriptor in registry.targets() {
        print_adapter(descriptor.name, descriptor.display_name, descriptor.schema);
    }

    if let Some(path) = args.config {
        let settings = rostersync_engine::load_settings(&path)?;
        println!("# Effective options ({})\n", path.display());
        let schema = registry.source_schema(&settings.source.kind)?;
        print_values("source", &settings.source.kind, schema, &settings.source.options);
        for (name, target) in settings.enabled_targets() {
            let schema = registry.target_schema(&target.kind)?;
            print_values(name, &target.kind, schema, &target.options);
        }
    }
    Ok(0)
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text => "text",
        FieldKind::Secret => "secret",
        FieldKind::Url => "url",
        FieldKind::Path => "path",
        FieldKind::Dir => "dir",
    }
}

fn print_adapter(name: &str, display_name: &str, schema: &[ConfigField]) {
    println!("## {} ({})\n", name, display_name);
    for field in schema {
        let mut line = format!("- `{}` {}, {}", field.key, kind_name(field.kind), field.label);
        if field.required {
            line.push_str(", required");
        }
        if let Some(default) = field.default {
            line.push_str(&format!(", default `{}`", default));
        }
        println!("{}", line);
    }
    println!();
}

fn print_values(
    instance: &str,
    kind: &str,
    schema: &[ConfigField],
    options: &rostersync_core::adapter::AdapterOptions,
) {
    println!("## {} ({})\n", instance, kind);
    for field in schema {
        let value = field
            .display_value(options)
            .unwrap_or_else(|| "<unset>".to_string());
        println!("- `{}` = {}", field.key, value);
    }
    println!();
}

fn options_table(schema: &[ConfigField]) -> toml::Table {
    schema
        .iter()
        .map(|field| {
            let value = field.default.unwrap_or(field.placeholder);
            (field.key.to_string(), toml::Value::String(value.to_string()))
        })
        .collect()
}

fn adapter_table(kind: &str, schema: &[ConfigField]) -> toml::Table {
    let mut table = toml::Table::new();
    table.insert("kind".to_string(), toml::Value::String(kind.to_string()));
    table.insert("options".to_string(), toml::Value::Table(options_table(schema)));
    table
}

/// Settings file using the first source and every target type once
fn skeleton(registry: &AdapterRegistry) -> anyhow::Result<String> {
    let mut root = toml::Table::new();
    if let Some(source) = registry.sources().next() {
        root.insert(
            "source".to_string(),
            toml::Value::Table(adapter_table(source.name, source.schema)),
        );
    }
    let targets: toml::Table = registry
        .targets()
        .map(|t| {
            (
                t.name.to_string(),
                toml::Value::Table(adapter_table(t.name, t.schema)),
            )
        })
        .collect();
    root.insert("targets".to_string(), toml::Value::Table(targets));
    Ok(toml::to_string(&root)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skeleton_parses_back() {
        let text = skeleton(&AdapterRegistry::builtin()).unwrap();
        let parsed: toml::Table = text.parse().unwrap();
        assert_eq!(parsed["source"]["kind"].as_str(), Some("yaml_roster"));
        assert_eq!(
            parsed["targets"]["json_directory"]["options"]["template"].as_str(),
            Some("{i}{n}")
        );
    }
}

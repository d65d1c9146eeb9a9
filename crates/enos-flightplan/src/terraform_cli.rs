// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terraform CLI configurations.
//!
//! ```hcl
//! terraform_cli "default" {
//!   path = "/usr/local/bin/terraform"
//!   env  = { TF_LOG = "debug" }
//!
//!   plugin_cache_dir = "/tmp/plugins"
//!
//!   provider_installation {
//!     network_mirror {
//!       url = "https://example.com/"
//!     }
//!   }
//! }
//! ```
//!
//! Everything except `path` and `env` is CLI configuration, rendered into a
//! `terraform.rc` file next to the generated module.

use enos_hcl::{
    Attribute, AttributeSchema, Block, BlockHeaderSchema, BodySchema, Diagnostic, Diagnostics,
    EvalContext, Range, Type, Value, WriteBody, convert,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::schemaless_block::SchemalessBlock;

/// Name of the CLI configuration that is always present.
pub const DEFAULT_TERRAFORM_CLI_NAME: &str = "default";

static TERRAFORM_CLI_SCHEMA: BodySchema = BodySchema {
    attributes: &[AttributeSchema::optional("path"), AttributeSchema::optional("env")],
    blocks: &[],
};

static TERRAFORM_CLI_CONFIG_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::optional("disable_checkpoint"),
        AttributeSchema::optional("disable_checkpoint_signature"),
        AttributeSchema::optional("plugin_cache_dir"),
    ],
    blocks: &[
        BlockHeaderSchema::new("credentials", &["name"]),
        BlockHeaderSchema::new("credentials_helper", &["name"]),
        BlockHeaderSchema::new("provider_installation", &[]),
    ],
};

/// A `terraform_cli` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerraformCli {
    /// CLI configuration name.
    pub name: String,
    /// Path to the terraform binary. Empty when it could not be found.
    pub path: String,
    /// Environment for terraform invocations.
    pub env: BTreeMap<String, String>,
    /// CLI configuration, if any was given.
    pub config: Option<SchemalessBlock>,
}

impl TerraformCli {
    /// The implicit `default` CLI, using `terraform` from `PATH`.
    pub fn default_cli() -> Self {
        Self {
            name: DEFAULT_TERRAFORM_CLI_NAME.to_string(),
            path: find_in_path("terraform")
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Decodes a `terraform_cli` block.
    pub fn decode(block: &Block, ctx: &EvalContext) -> (TerraformCli, Diagnostics) {
        let mut cli = TerraformCli {
            name: block.labels.first().cloned().unwrap_or_default(),
            ..Self::default()
        };

        let (content, remain, mut diags) = block.body.partial_content(&TERRAFORM_CLI_SCHEMA);
        if diags.has_errors() {
            return (cli, diags);
        }

        if let Some(attr) = content.attribute("path") {
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (cli, diags);
            }
            if let Some(path) = string_or_warn(&val, attr, "terraform_cli path", &mut diags) {
                cli.path = path;
            }
        }

        if let Some(attr) = content.attribute("env") {
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (cli, diags);
            }
            match val.as_value_map() {
                Some(env) => {
                    for (k, v) in env {
                        if let Some(s) = string_or_warn(v, attr, "terraform_cli env", &mut diags) {
                            cli.env.insert(k.clone(), s);
                        }
                    }
                }
                None if val.is_null() => {}
                None => diags.push(
                    Diagnostic::error("invalid value", "terraform_cli env must be a map of strings")
                        .with_subject(&attr.expr.range)
                        .with_context(&attr.range),
                ),
            }
        }

        let (_, more) = remain.content(&TERRAFORM_CLI_CONFIG_SCHEMA);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (cli, diags);
        }

        let (mut config, more) = SchemalessBlock::decode_body(&remain, ctx);
        diags.extend(more);
        diags.extend(check_config_types(&config, &remain.attributes));
        if !config.is_empty() {
            config.type_name = "terraform_cli".to_string();
            cli.config = Some(config);
        }

        (cli, diags)
    }

    /// The CLI as an object value with `name`, `path`, `env` and `config`.
    pub fn to_value(&self) -> Value {
        let env = if self.env.is_empty() {
            Value::Null(Type::map(Type::String))
        } else {
            Value::map(
                self.env
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::string(v)))
                    .collect(),
            )
        };
        let config = match &self.config {
            Some(c) => c.to_value(),
            None => Value::null(),
        };

        Value::object_from([
            ("name", Value::string(&self.name)),
            ("path", Value::string(&self.path)),
            ("env", env),
            ("config", config),
        ])
    }

    /// Reads a CLI back from a value created by [`TerraformCli::to_value`].
    pub fn from_value(val: &Value) -> Result<TerraformCli> {
        let mut cli = TerraformCli::default();
        let Some(map) = val.as_value_map() else {
            return Err(Error::InvalidValue("terraform_cli value must be an object".to_string()));
        };

        for (key, v) in map {
            match key.as_str() {
                "name" | "path" => {
                    let s = v.as_str().ok_or_else(|| {
                        Error::InvalidValue(format!("terraform_cli {} must be a string", key))
                    })?;
                    if key == "name" {
                        cli.name = s.to_string();
                    } else {
                        cli.path = s.to_string();
                    }
                }
                "env" => {
                    if v.is_null() {
                        continue;
                    }
                    let env = v.as_value_map().ok_or_else(|| {
                        Error::InvalidValue("terraform_cli env must be a map of strings".to_string())
                    })?;
                    for (k, ev) in env {
                        let s = ev.as_str().ok_or_else(|| {
                            Error::InvalidValue("terraform_cli env must be a map of strings".to_string())
                        })?;
                        cli.env.insert(k.clone(), s.to_string());
                    }
                }
                "config" => {
                    if !v.is_null() {
                        cli.config = Some(SchemalessBlock::from_value(v)?);
                    }
                }
                other => {
                    return Err(Error::InvalidValue(format!(
                        "{} is not a known terraform_cli attribute",
                        other
                    )));
                }
            }
        }

        Ok(cli)
    }

    /// Renders the CLI configuration as a `terraform.rc` document, or `None`
    /// when there is no configuration to write.
    pub fn rc_file(&self) -> Option<String> {
        let config = self.config.as_ref()?;
        let mut body = WriteBody::new();
        config.write_body(&mut body);
        Some(body.to_hcl())
    }
}

fn string_or_warn(
    val: &Value,
    attr: &Attribute,
    what: &str,
    diags: &mut Diagnostics,
) -> Option<String> {
    if let Some(s) = val.as_str() {
        return Some(s.to_string());
    }

    let context = Range::between(&attr.expr.range.start_range(), &attr.expr.range);
    match convert(val, &Type::String) {
        Ok(converted) => {
            diags.push(
                Diagnostic::warning(
                    "invalid value",
                    format!("{} should be a string value, consider changing it", what),
                )
                .with_subject(&attr.expr.range)
                .with_context(&context),
            );
            converted.as_str().map(str::to_string)
        }
        Err(_) => {
            diags.push(
                Diagnostic::error("invalid value", format!("{} must be a string value", what))
                    .with_subject(&attr.expr.range)
                    .with_context(&context),
            );
            None
        }
    }
}

fn check_config_types(config: &SchemalessBlock, attrs: &[Attribute]) -> Diagnostics {
    let mut diags = Diagnostics::new();
    for attr in attrs {
        let Some(val) = config.attrs.get(&attr.name) else {
            continue;
        };
        let want = if attr.name == "plugin_cache_dir" {
            Type::String
        } else {
            Type::Bool
        };
        if convert(val, &want).is_err() {
            diags.push(
                Diagnostic::error(
                    "invalid value",
                    format!("{} must be a {}", attr.name, want.friendly_name()),
                )
                .with_subject(&attr.expr.range)
                .with_context(&attr.range),
            );
        }
    }
    diags
}

/// Finds an executable named `name` in `PATH`.
fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use enos_hcl::parse;

    fn decode(src: &str) -> (TerraformCli, Diagnostics) {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        TerraformCli::decode(&file.body.blocks[0], &EvalContext::new())
    }

    #[test]
    fn test_decode_with_config() {
        let (cli, diags) = decode(
            r#"terraform_cli "debug" {
                 path = "/usr/local/bin/terraform"
                 env  = { TF_LOG = "debug", TF_INPUT = 0 }

                 plugin_cache_dir = "/tmp/plugins"

                 provider_installation {
                   network_mirror {
                     url = "https://example.com/"
                   }
                 }
               }"#,
        );
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(diags.warnings().count(), 1);
        assert_eq!(cli.name, "debug");
        assert_eq!(cli.path, "/usr/local/bin/terraform");
        assert_eq!(cli.env.get("TF_INPUT").map(String::as_str), Some("0"));

        let rc = cli.rc_file().unwrap();
        assert!(rc.contains("plugin_cache_dir = \"/tmp/plugins\""), "{}", rc);
        assert!(rc.contains("network_mirror {"), "{}", rc);

        assert_eq!(TerraformCli::from_value(&cli.to_value()).unwrap(), cli);
    }

    #[test]
    fn test_decode_without_config() {
        let (cli, diags) = decode(r#"terraform_cli "plain" { path = "tf" }"#);
        assert!(diags.is_empty(), "{}", diags);
        assert!(cli.config.is_none());
        assert!(cli.rc_file().is_none());
    }

    #[test]
    fn test_unknown_config_rejected() {
        let (_, diags) = decode(r#"terraform_cli "bad" { not_a_setting = true }"#);
        assert!(diags.has_errors());

        let (_, diags) = decode(r#"terraform_cli "bad" { disable_checkpoint = "nope" }"#);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_default_cli() {
        let cli = TerraformCli::default_cli();
        assert_eq!(cli.name, DEFAULT_TERRAFORM_CLI_NAME);
        assert!(cli.config.is_none());
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terraform settings blocks.
//!
//! A `terraform "<name>"` block holds what becomes the `terraform { ... }`
//! block of a generated module: version constraints, required providers,
//! provider metadata and either a backend or a cloud configuration.

use enos_hcl::{
    AttributeSchema, Block, BlockHeaderSchema, Body, BodySchema, Diagnostic, Diagnostics, EvalContext,
    Type, Value, WriteBlock, WriteExpr, convert,
};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::schemaless_block::SchemalessBlock;
use crate::verify::verify_no_blocks;

const BLOCK_TYPE_CLOUD: &str = "cloud";
const BLOCK_TYPE_BACKEND: &str = "backend";
const BLOCK_TYPE_REQUIRED_PROVIDERS: &str = "required_providers";
const BLOCK_TYPE_PROVIDER_META: &str = "provider_meta";
const BLOCK_TYPE_WORKSPACES: &str = "workspaces";

static CLOUD_OR_BACKEND_SCHEMA: BodySchema = BodySchema {
    attributes: &[],
    blocks: &[
        BlockHeaderSchema::new(BLOCK_TYPE_CLOUD, &[]),
        BlockHeaderSchema::new(BLOCK_TYPE_BACKEND, &["name"]),
    ],
};

static SETTING_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::optional("required_version"),
        AttributeSchema::optional("experiments"),
    ],
    blocks: &[
        BlockHeaderSchema::new(BLOCK_TYPE_REQUIRED_PROVIDERS, &[]),
        BlockHeaderSchema::new(BLOCK_TYPE_PROVIDER_META, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_BACKEND, &["name"]),
        BlockHeaderSchema::new(BLOCK_TYPE_CLOUD, &[]),
    ],
};

static CLOUD_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::required("organization"),
        AttributeSchema::optional("hostname"),
        AttributeSchema::optional("token"),
    ],
    blocks: &[BlockHeaderSchema::new(BLOCK_TYPE_WORKSPACES, &[])],
};

static CLOUD_WORKSPACES_SCHEMA: BodySchema = BodySchema {
    attributes: &[AttributeSchema::optional("name"), AttributeSchema::optional("tags")],
    blocks: &[],
};

static BACKEND_SCHEMA: BodySchema = BodySchema {
    attributes: &[],
    blocks: &[BlockHeaderSchema::new(BLOCK_TYPE_WORKSPACES, &[])],
};

static BACKEND_WORKSPACES_SCHEMA: BodySchema = BodySchema {
    attributes: &[AttributeSchema::optional("name"), AttributeSchema::optional("prefix")],
    blocks: &[],
};

/// A `terraform "<name>"` settings block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerraformSetting {
    /// Settings name.
    pub name: String,
    /// Terraform version constraint.
    pub required_version: Option<String>,
    /// Enabled language experiments.
    pub experiments: Vec<String>,
    /// Provider requirements by local name. Each is an object with `source`
    /// and optionally `version`.
    pub required_providers: BTreeMap<String, Value>,
    /// Provider metadata by provider name.
    pub provider_metas: BTreeMap<String, BTreeMap<String, Value>>,
    /// State backend.
    pub backend: Option<TerraformSettingBackend>,
    /// Terraform Cloud configuration.
    pub cloud: Option<SchemalessBlock>,
}

/// A `backend "<name>"` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerraformSettingBackend {
    /// Backend type.
    pub name: String,
    /// Backend configuration.
    pub attrs: BTreeMap<String, Value>,
    /// The optional `workspaces` block.
    pub workspaces: Option<SchemalessBlock>,
}

impl TerraformSetting {
    /// Decodes a `terraform` settings block.
    pub fn decode(block: &Block, ctx: &EvalContext) -> (TerraformSetting, Diagnostics) {
        let mut t = TerraformSetting {
            name: block.labels.first().cloned().unwrap_or_default(),
            ..TerraformSetting::default()
        };

        let mut diags = ensure_only_cloud_or_backend(&block.body);

        let (content, more) = block.body.content(&SETTING_SCHEMA);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (t, diags);
        }

        if let Some(attr) = content.attribute("required_version") {
            let (val, more) = attr.expr.value(ctx);
            diags.extend(more);
            match convert(&val, &Type::String) {
                Ok(Value::String(s)) => t.required_version = Some(s),
                Ok(_) => {}
                Err(err) => diags.push(
                    Diagnostic::error("Incorrect attribute value type", err.to_string())
                        .with_subject(&attr.expr.range)
                        .with_context(&attr.range),
                ),
            }
        }

        if let Some(attr) = content.attribute("experiments") {
            let (val, more) = attr.expr.value(ctx);
            diags.extend(more);
            match convert(&val, &Type::list(Type::String)) {
                Ok(list) => {
                    t.experiments = list
                        .as_value_slice()
                        .unwrap_or_default()
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect();
                }
                Err(err) => diags.push(
                    Diagnostic::error("Incorrect attribute value type", err.to_string())
                        .with_subject(&attr.expr.range)
                        .with_context(&attr.range),
                ),
            }
        }

        for rp in content.blocks_of_type(BLOCK_TYPE_REQUIRED_PROVIDERS) {
            diags.extend(t.decode_required_providers(rp, ctx));
        }

        for pm in content.blocks_of_type(BLOCK_TYPE_PROVIDER_META) {
            diags.extend(verify_no_blocks(&pm.body));
            let (attrs, more) = pm.body.just_attributes();
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }
            let mut meta = BTreeMap::new();
            for attr in attrs {
                let (val, more) = attr.expr.value(ctx);
                let failed = more.has_errors();
                diags.extend(more);
                if !failed {
                    meta.insert(attr.name.clone(), val);
                }
            }
            let name = pm.labels.first().cloned().unwrap_or_default();
            t.provider_metas.insert(name, meta);
        }

        for (i, be) in content.blocks_of_type(BLOCK_TYPE_BACKEND).into_iter().enumerate() {
            if i != 0 {
                diags.push(
                    Diagnostic::error("redefined block", "only one backend block is allowed to be defined")
                        .with_subject(&be.type_range)
                        .with_context(&be.def_range),
                );
                continue;
            }
            let (backend, more) = decode_backend(be, ctx);
            diags.extend(more);
            t.backend = backend;
        }

        for (i, cloud) in content.blocks_of_type(BLOCK_TYPE_CLOUD).into_iter().enumerate() {
            if i != 0 {
                diags.push(
                    Diagnostic::error("redefined block", "only one cloud block is allowed to be defined")
                        .with_subject(&cloud.type_range)
                        .with_context(&cloud.def_range),
                );
                continue;
            }
            let (decoded, more) = decode_cloud(cloud, ctx);
            diags.extend(more);
            t.cloud = decoded;
        }

        (t, diags)
    }

    fn decode_required_providers(&mut self, block: &Block, ctx: &EvalContext) -> Diagnostics {
        let mut diags = verify_no_blocks(&block.body);

        let (attrs, more) = block.body.just_attributes();
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return diags;
        }

        for attr in attrs {
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }

            if val.is_null() || !val.is_wholly_known() {
                diags.push(
                    Diagnostic::error(
                        "unknown attribute value",
                        format!("{} required_providers value is not fully known", attr.name),
                    )
                    .with_subject(&attr.expr.range)
                    .with_context(&attr.range),
                );
                continue;
            }

            let Some(fields) = val.as_value_map() else {
                diags.push(
                    Diagnostic::error(
                        "unexpected attribute value",
                        format!("{} value must be an object", attr.name),
                    )
                    .with_subject(&attr.expr.range)
                    .with_context(&attr.range),
                );
                continue;
            };

            for field in fields.keys() {
                if field != "source" && field != "version" {
                    diags.push(
                        Diagnostic::error(
                            "unexpected attribute",
                            format!("{} is not an allowed required_providers attribute", field),
                        )
                        .with_subject(&attr.expr.range)
                        .with_context(&attr.range),
                    );
                }
            }

            self.required_providers.insert(attr.name.clone(), val);
        }

        diags
    }

    /// The settings as an object value.
    pub fn to_value(&self) -> Value {
        let required_version = match &self.required_version {
            Some(v) => Value::string(v),
            None => Value::Null(Type::String),
        };

        let experiments = if self.experiments.is_empty() {
            Value::Null(Type::list(Type::String))
        } else {
            Value::string_list(&self.experiments)
        };

        let required_providers = if self.required_providers.is_empty() {
            Value::Null(Type::Object(BTreeMap::from([
                ("source".to_string(), Type::String),
                ("version".to_string(), Type::String),
            ])))
        } else {
            Value::object(self.required_providers.clone())
        };

        let provider_meta = if self.provider_metas.is_empty() {
            Value::Null(Type::Object(BTreeMap::new()))
        } else {
            Value::object(
                self.provider_metas
                    .iter()
                    .map(|(k, attrs)| (k.clone(), Value::object(attrs.clone())))
                    .collect(),
            )
        };

        let backend = match &self.backend {
            Some(be) => {
                let mut vals = be.attrs.clone();
                vals.insert("name".to_string(), Value::string(&be.name));
                vals.insert(
                    "workspaces".to_string(),
                    be.workspaces.as_ref().map_or_else(Value::null, SchemalessBlock::to_value),
                );
                Value::object(vals)
            }
            None => Value::Null(Type::Object(BTreeMap::new())),
        };

        let cloud = self
            .cloud
            .as_ref()
            .map_or_else(|| Value::Null(Type::Object(BTreeMap::new())), SchemalessBlock::to_value);

        Value::object_from([
            ("name", Value::string(&self.name)),
            ("required_version", required_version),
            ("experiments", experiments),
            ("required_providers", required_providers),
            ("provider_meta", provider_meta),
            ("backend", backend),
            ("cloud", cloud),
        ])
    }

    /// Reads settings back from a value created by [`TerraformSetting::to_value`].
    pub fn from_value(val: &Value) -> Result<TerraformSetting> {
        let invalid = |msg: &str| Error::InvalidValue(msg.to_string());
        let mut t = TerraformSetting::default();
        let map = val
            .as_value_map()
            .ok_or_else(|| invalid("terraform settings value must be an object"))?;

        for (k, v) in map {
            match k.as_str() {
                "name" => {
                    t.name = v
                        .as_str()
                        .ok_or_else(|| {
                            Error::InvalidValue(format!("name type is {}, must be string", v.type_name()))
                        })?
                        .to_string();
                }
                "required_version" => t.required_version = v.as_str().map(str::to_string),
                "experiments" => {
                    if let Some(items) = v.as_value_slice() {
                        t.experiments = items
                            .iter()
                            .map(|i| i.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                            .ok_or_else(|| invalid("experiments must be a list of strings"))?;
                    }
                }
                "required_providers" => {
                    if v.is_null() {
                        continue;
                    }
                    let rps = v
                        .as_value_map()
                        .ok_or_else(|| invalid("required_providers must be an object"))?;
                    t.required_providers = rps.clone();
                }
                "provider_meta" => {
                    if v.is_null() {
                        continue;
                    }
                    let metas = v
                        .as_value_map()
                        .ok_or_else(|| invalid("provider_meta must be an object"))?;
                    for (name, attrs) in metas {
                        let attrs = attrs
                            .as_value_map()
                            .ok_or_else(|| invalid("provider_meta attributes must be an object"))?;
                        t.provider_metas.insert(name.clone(), attrs.clone());
                    }
                }
                "backend" => {
                    if v.is_null() {
                        continue;
                    }
                    let fields = v
                        .as_value_map()
                        .ok_or_else(|| invalid("backend must be an object"))?;
                    let mut be = TerraformSettingBackend::default();
                    for (bk, bv) in fields {
                        match bk.as_str() {
                            "name" => {
                                be.name = bv
                                    .as_str()
                                    .ok_or_else(|| invalid("backend name must be a known string"))?
                                    .to_string();
                            }
                            "workspaces" => {
                                if !bv.is_null() {
                                    be.workspaces = Some(SchemalessBlock::from_value(bv)?);
                                }
                            }
                            _ => {
                                be.attrs.insert(bk.clone(), bv.clone());
                            }
                        }
                    }
                    t.backend = Some(be);
                }
                "cloud" => {
                    if !v.is_null() {
                        t.cloud = Some(SchemalessBlock::from_value(v)?);
                    }
                }
                other => {
                    return Err(Error::InvalidValue(format!(
                        "{} is not a known terraform setting",
                        other
                    )));
                }
            }
        }

        Ok(t)
    }

    /// The `terraform { ... }` block of a generated module.
    pub fn to_write_block(&self) -> WriteBlock {
        let mut block = WriteBlock::new("terraform", &[]);
        let body = block.body_mut();

        if let Some(v) = &self.required_version {
            body.set_attribute_value("required_version", Value::string(v));
        }

        if !self.experiments.is_empty() {
            let keywords = self.experiments.iter().map(|e| WriteExpr::Raw(e.clone())).collect();
            body.set_attribute("experiments", WriteExpr::Tuple(keywords));
        }

        if !self.required_providers.is_empty() {
            let rp = body.append_new_block(BLOCK_TYPE_REQUIRED_PROVIDERS, &[]);
            for (name, val) in &self.required_providers {
                rp.set_attribute_value(name.as_str(), val.clone());
            }
        }

        for (name, attrs) in &self.provider_metas {
            let pm = body.append_new_block(BLOCK_TYPE_PROVIDER_META, &[name.as_str()]);
            for (k, v) in attrs {
                pm.set_attribute_value(k.as_str(), v.clone());
            }
        }

        if let Some(be) = &self.backend {
            let backend = body.append_new_block(BLOCK_TYPE_BACKEND, &[be.name.as_str()]);
            for (k, v) in &be.attrs {
                backend.set_attribute_value(k.as_str(), v.clone());
            }
            if let Some(ws) = &be.workspaces {
                ws.write_body(backend.append_new_block(BLOCK_TYPE_WORKSPACES, &[]));
            }
        }

        if let Some(cloud) = &self.cloud {
            cloud.write_body(body.append_new_block(BLOCK_TYPE_CLOUD, &[]));
        }

        block
    }
}

fn ensure_only_cloud_or_backend(body: &Body) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let (content, _, more) = body.partial_content(&CLOUD_OR_BACKEND_SCHEMA);
    let failed = more.has_errors();
    diags.extend(more);
    if failed {
        return diags;
    }

    let clouds = content.blocks_of_type(BLOCK_TYPE_CLOUD);
    let backends = content.blocks_of_type(BLOCK_TYPE_BACKEND);
    if clouds.is_empty() || backends.is_empty() {
        return diags;
    }

    for cloud in clouds {
        diags.push(
            Diagnostic::error(
                "incompatible block",
                "cloud blocks are not supported if backend blocks have been defined",
            )
            .with_subject(&cloud.type_range)
            .with_context(&cloud.def_range),
        );
    }
    for backend in backends {
        diags.push(
            Diagnostic::error(
                "incompatible block",
                "backend blocks are not supported if a cloud block has been defined",
            )
            .with_subject(&backend.type_range)
            .with_context(&backend.def_range),
        );
    }

    diags
}

fn decode_backend(block: &Block, ctx: &EvalContext) -> (Option<TerraformSettingBackend>, Diagnostics) {
    let mut be = TerraformSettingBackend {
        name: block.labels.first().cloned().unwrap_or_default(),
        ..TerraformSettingBackend::default()
    };

    let (content, remain, mut diags) = block.body.partial_content(&BACKEND_SCHEMA);
    if diags.has_errors() {
        return (None, diags);
    }

    if let Some(ws) = content.blocks_of_type(BLOCK_TYPE_WORKSPACES).first() {
        let (_, more) = ws.body.content(&BACKEND_WORKSPACES_SCHEMA);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (None, diags);
        }
        let (decoded, more) = SchemalessBlock::decode(ws, ctx);
        diags.extend(more);
        be.workspaces = Some(decoded);
    }

    let (attrs, more) = remain.just_attributes();
    diags.extend(more);
    for attr in attrs {
        let (val, more) = attr.expr.value(ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if !failed {
            be.attrs.insert(attr.name.clone(), val);
        }
    }

    (Some(be), diags)
}

fn decode_cloud(block: &Block, ctx: &EvalContext) -> (Option<SchemalessBlock>, Diagnostics) {
    let (content, mut diags) = block.body.content(&CLOUD_SCHEMA);
    if diags.has_errors() {
        return (None, diags);
    }

    for ws in content.blocks_of_type(BLOCK_TYPE_WORKSPACES) {
        let (_, more) = ws.body.content(&CLOUD_WORKSPACES_SCHEMA);
        diags.extend(more);
    }
    if diags.has_errors() {
        return (None, diags);
    }

    let (cloud, more) = SchemalessBlock::decode(block, ctx);
    diags.extend(more);
    (Some(cloud), diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use enos_hcl::parse;

    fn decode(src: &str) -> (TerraformSetting, Diagnostics) {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        TerraformSetting::decode(&file.body.blocks[0], &EvalContext::new())
    }

    const FULL: &str = r#"
terraform "default" {
  required_version = ">= 1.2.0"
  experiments      = ["module_variable_optional_attrs"]

  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = ">= 4.0"
    }
  }

  provider_meta "enos" {
    hello = "world"
  }

  backend "s3" {
    bucket = "state"

    workspaces {
      prefix = "enos-"
    }
  }
}
"#;

    #[test]
    fn test_decode_full() {
        let (t, diags) = decode(FULL);
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(t.name, "default");
        assert_eq!(t.required_version.as_deref(), Some(">= 1.2.0"));
        assert_eq!(t.experiments, vec!["module_variable_optional_attrs"]);
        assert!(t.required_providers.contains_key("aws"));
        assert_eq!(
            t.provider_metas["enos"].get("hello"),
            Some(&Value::string("world"))
        );
        let be = t.backend.as_ref().unwrap();
        assert_eq!(be.name, "s3");
        assert_eq!(be.attrs.get("bucket"), Some(&Value::string("state")));
        assert!(be.workspaces.is_some());
    }

    #[test]
    fn test_value_round_trip() {
        let (t, _) = decode(FULL);
        assert_eq!(TerraformSetting::from_value(&t.to_value()).unwrap(), t);

        let (t, _) = decode(
            r#"terraform "cloud" {
                 cloud {
                   organization = "hashicorp"

                   workspaces {
                     tags = ["enos"]
                   }
                 }
               }"#,
        );
        assert!(t.cloud.is_some());
        assert_eq!(TerraformSetting::from_value(&t.to_value()).unwrap(), t);
    }

    #[test]
    fn test_cloud_and_backend_conflict() {
        let (_, diags) = decode(
            r#"terraform "bad" {
                 backend "s3" {
                 }
                 cloud {
                   organization = "x"
                 }
               }"#,
        );
        assert_eq!(diags.errors().count(), 2);
    }

    #[test]
    fn test_invalid_settings() {
        let (_, diags) = decode(
            r#"terraform "bad" {
                 backend "s3" {
                 }
                 backend "local" {
                 }
               }"#,
        );
        assert!(diags.has_errors());

        let (_, diags) = decode(
            r#"terraform "bad" {
                 required_providers {
                   aws = { source = "hashicorp/aws", other = 1 }
                 }
               }"#,
        );
        assert!(diags.has_errors());

        let (_, diags) = decode(
            r#"terraform "bad" {
                 cloud {
                   hostname = "x"
                 }
               }"#,
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_write_block() {
        let (t, _) = decode(FULL);
        let mut body = enos_hcl::WriteBody::new();
        body.append_block(t.to_write_block());
        let hcl = body.to_hcl();
        assert!(hcl.contains("experiments      = [module_variable_optional_attrs]"), "{}", hcl);
        assert!(hcl.contains("backend \"s3\" {"), "{}", hcl);
        assert!(hcl.contains("required_providers {"), "{}", hcl);
    }
}

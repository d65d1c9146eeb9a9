// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terraform module declarations.

use enos_hcl::{
    Attribute, AttributeSchema, Block, BodySchema, Diagnostic, Diagnostics, EvalContext, Range, Type,
    Value, convert,
};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::verify::{filter_terraform_meta_attrs, verify_no_blocks};

static MODULE_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::required("source"),
        AttributeSchema::optional("version"),
    ],
    blocks: &[],
};

/// A `module` block.
///
/// Every attribute other than `source` and `version` is passed through to
/// the generated Terraform module.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Module name, unique within a flight plan.
    pub name: String,
    /// Terraform module source address.
    pub source: String,
    /// Registry version constraint, empty when unset.
    pub version: String,
    /// Module inputs.
    pub attrs: BTreeMap<String, Value>,
}

impl Module {
    /// Decodes a module block.
    pub fn decode(block: &Block, ctx: &EvalContext) -> (Module, Diagnostics) {
        let mut m = Module::default();
        let (content, remain, mut diags) = block.body.partial_content(&MODULE_SCHEMA);
        if diags.has_errors() {
            return (m, diags);
        }

        m.name = block.labels.first().cloned().unwrap_or_default();

        if let Some(attr) = content.attribute("source") {
            match decode_string_attr(attr, ctx, &mut diags) {
                Some(s) => m.source = s,
                None => return (m, diags),
            }
        }

        if let Some(attr) = content.attribute("version") {
            match decode_string_attr(attr, ctx, &mut diags) {
                Some(s) => m.version = s,
                None => return (m, diags),
            }
        }

        let (attrs, more) = remain.just_attributes();
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (m, diags);
        }

        let (attrs, more) = filter_terraform_meta_attrs(attrs);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (m, diags);
        }

        for attr in attrs {
            let (val, more) = attr.expr.value(ctx);
            diags.extend(more);
            m.attrs.insert(attr.name.clone(), val);
        }

        diags.extend(verify_no_blocks(&remain));

        (m, diags)
    }

    /// The module as an object value: `source`, `name`, `version` when set,
    /// and every attribute.
    pub fn to_value(&self) -> Value {
        let mut vals = BTreeMap::new();
        vals.insert("source".to_string(), Value::string(&self.source));
        vals.insert("name".to_string(), Value::string(&self.name));
        if !self.version.is_empty() {
            vals.insert("version".to_string(), Value::string(&self.version));
        }
        for (k, v) in &self.attrs {
            vals.insert(k.clone(), v.clone());
        }
        Value::object(vals)
    }

    /// Reads a module back from a value created by [`Module::to_value`].
    /// A null value yields an empty module.
    pub fn from_value(val: &Value) -> Result<Module> {
        let mut m = Module::default();
        if val.is_null() {
            return Ok(m);
        }
        if !val.is_wholly_known() {
            return Err(Error::InvalidValue("cannot unmarshal unknown value".to_string()));
        }
        let Some(map) = val.as_value_map() else {
            return Err(Error::InvalidValue("value must be an object".to_string()));
        };

        for (key, v) in map {
            match key.as_str() {
                "source" | "name" | "version" => {
                    let Some(s) = v.as_str() else {
                        return Err(Error::InvalidValue(format!("{} must be a string", key)));
                    };
                    match key.as_str() {
                        "source" => m.source = s.to_string(),
                        "name" => m.name = s.to_string(),
                        _ => m.version = s.to_string(),
                    }
                }
                _ => {
                    m.attrs.insert(key.clone(), v.clone());
                }
            }
        }

        Ok(m)
    }
}

/// Evaluates an attribute that should be a string, converting other
/// primitives with a warning.
fn decode_string_attr(attr: &Attribute, ctx: &EvalContext, diags: &mut Diagnostics) -> Option<String> {
    let (val, more) = attr.expr.value(ctx);
    let failed = more.has_errors();
    diags.extend(more);
    if failed {
        return None;
    }

    if let Some(s) = val.as_str() {
        return Some(s.to_string());
    }

    let context = Range::between(&attr.expr.range.start_range(), &attr.expr.range);
    match convert(&val, &Type::String) {
        Ok(converted) => {
            diags.push(
                Diagnostic::warning(
                    "invalid value",
                    format!("{} should be a string value, consider changing it", attr.name),
                )
                .with_subject(&attr.expr.range)
                .with_context(&context),
            );
            converted.as_str().map(str::to_string)
        }
        Err(_) => {
            diags.push(
                Diagnostic::error("invalid value", format!("{} must be a string value", attr.name))
                    .with_subject(&attr.expr.range)
                    .with_context(&context),
            );
            // Keep decoding the rest of the block.
            Some(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enos_hcl::parse;

    fn decode(src: &str) -> (Module, Diagnostics) {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        Module::decode(&file.body.blocks[0], &EvalContext::new())
    }

    #[test]
    fn test_decode_module() {
        let (m, diags) = decode(
            r#"module "backend" {
                 source  = "hashicorp/consul/aws"
                 version = "0.1.0"
                 region  = "us-east-1"
                 count_x = 3
               }"#,
        );
        assert!(diags.is_empty(), "{}", diags);
        assert_eq!(m.name, "backend");
        assert_eq!(m.source, "hashicorp/consul/aws");
        assert_eq!(m.version, "0.1.0");
        assert_eq!(m.attrs.get("region"), Some(&Value::string("us-east-1")));
        assert_eq!(m.attrs.len(), 2);
    }

    #[test]
    fn test_source_is_required() {
        let (_, diags) = decode(r#"module "backend" { version = "1" }"#);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_non_string_source_warns() {
        let (m, diags) = decode(r#"module "backend" { source = 1 }"#);
        assert!(!diags.has_errors());
        assert_eq!(diags.warnings().count(), 1);
        assert_eq!(m.source, "1");

        let (_, diags) = decode(r#"module "backend" { source = ["x"] }"#);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_meta_attributes_rejected() {
        let (_, diags) = decode(
            r#"module "backend" {
                 source     = "./mod"
                 depends_on = []
               }"#,
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_blocks_rejected() {
        let (_, diags) = decode(
            r#"module "backend" {
                 source = "./mod"
                 nested { }
               }"#,
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_value_round_trip() {
        let (m, _) = decode(
            r#"module "backend" {
                 source = "./mod"
                 tags   = { a = "b" }
               }"#,
        );
        let val = m.to_value();
        assert_eq!(val.get_attr("name"), Some(&Value::string("backend")));
        assert!(val.get_attr("version").is_none());
        assert_eq!(Module::from_value(&val).unwrap(), m);
    }

    #[test]
    fn test_from_value_errors() {
        assert!(Module::from_value(&Value::string("x")).is_err());
        assert!(Module::from_value(&Value::unknown()).is_err());
        let bad = Value::object_from([("source", Value::number(1.0))]);
        assert!(Module::from_value(&bad).is_err());
        assert_eq!(Module::from_value(&Value::null()).unwrap(), Module::default());
    }
}

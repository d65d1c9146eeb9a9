// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Input variables.
//!
//! A `variable` block declares a name, an optional type constraint and an
//! optional default. Values are supplied by `enos*.vars.hcl` files or by
//! `ENOS_VAR_<name>` environment variables, with the environment winning.

use enos_hcl::{
    AttributeSchema, Block, BlockHeaderSchema, BodySchema, Diagnostic, Diagnostics, EvalContext, Expr,
    Pos, Range, Type, Value, convert, parse_expression, type_constraint,
};
use std::collections::BTreeMap;

/// Prefix of environment variables that set variable values.
pub const ENV_VAR_PREFIX: &str = "ENOS_VAR_";

static VARIABLE_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::optional("description"),
        AttributeSchema::optional("default"),
        AttributeSchema::optional("type"),
        AttributeSchema::optional("sensitive"),
    ],
    blocks: &[BlockHeaderSchema::new("validation", &[])],
};

/// Where a user supplied value came from.
#[derive(Debug, Clone)]
pub enum VariableValueSource {
    /// An attribute in a variables file.
    VarsFile(Expr),
    /// The raw text of an `ENOS_VAR_` environment variable.
    EnvVar(String),
}

/// A user supplied variable value.
#[derive(Debug, Clone)]
pub struct VariableValue {
    /// The value's source.
    pub source: VariableValueSource,
    /// Where the value was defined.
    pub range: Range,
}

impl VariableValue {
    /// A value from an `ENOS_VAR_` environment variable.
    pub fn from_env(raw: impl Into<String>) -> Self {
        Self {
            source: VariableValueSource::EnvVar(raw.into()),
            range: Range::new("environment_variables", Pos::START, Pos::START),
        }
    }
}

/// Collects `ENOS_VAR_<name>=<value>` entries. Entries without the prefix or
/// without `=` are ignored.
pub fn values_from_env<S: AsRef<str>>(env: &[S]) -> BTreeMap<String, VariableValue> {
    let mut values = BTreeMap::new();
    for entry in env {
        let Some(trimmed) = entry.as_ref().strip_prefix(ENV_VAR_PREFIX) else {
            continue;
        };
        let Some((name, raw)) = trimmed.split_once('=') else {
            continue;
        };
        values.insert(name.to_string(), VariableValue::from_env(raw));
    }
    values
}

/// A decoded `variable` block.
#[derive(Debug, Clone, Default)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Human readable description.
    pub description: String,
    /// Reserved; sensitive values are not treated specially yet.
    pub sensitive: bool,
    /// The default value, if declared.
    pub default: Option<Value>,
    /// The user supplied value, if any.
    pub set_value: Option<Value>,
    /// The declared type constraint, if any.
    pub constraint: Option<Type>,
}

impl Variable {
    /// Decodes a variable block, resolving its value from `values`.
    pub fn decode(block: &Block, values: &BTreeMap<String, VariableValue>) -> (Variable, Diagnostics) {
        let mut v = Variable::default();
        let (content, mut diags) = block.body.content(&VARIABLE_SCHEMA);
        if diags.has_errors() {
            return (v, diags);
        }

        v.name = block.labels.first().cloned().unwrap_or_default();
        let static_ctx = EvalContext::new();

        if let Some(attr) = content.attribute("description") {
            let (val, more) = attr.expr.value(&static_ctx);
            diags.extend(more);
            match val.as_str() {
                Some(s) => v.description = s.to_string(),
                None => diags.push(
                    Diagnostic::error("Unsuitable value type", "description must be a string")
                        .with_subject(&attr.expr.range),
                ),
            }
        }

        if let Some(attr) = content.attribute("type") {
            match type_constraint(&attr.expr) {
                Ok(ty) => v.constraint = Some(ty),
                Err(more) => {
                    diags.extend(more);
                    v.constraint = Some(Type::Dynamic);
                }
            }
        }

        if let Some(attr) = content.attribute("sensitive") {
            let (val, more) = attr.expr.value(&static_ctx);
            diags.extend(more);
            match val.as_bool() {
                Some(b) => v.sensitive = b,
                None => diags.push(
                    Diagnostic::error("Unsuitable value type", "sensitive must be a bool")
                        .with_subject(&attr.expr.range),
                ),
            }
        }

        if let Some(attr) = content.attribute("default") {
            let (mut val, more) = attr.expr.value(&static_ctx);
            diags.extend(more);
            if let Some(ty) = &v.constraint {
                match convert(&val, ty) {
                    Ok(converted) => val = converted,
                    Err(err) => {
                        diags.push(
                            Diagnostic::error(
                                "Invalid default value for variable",
                                format!(
                                    "This default value is not compatible with the variable's type constraint: {}.",
                                    err
                                ),
                            )
                            .with_subject(&attr.expr.range),
                        );
                        val = Value::unknown();
                    }
                }
            }
            v.default = Some(val);
        }

        if let Some(set) = values.get(&v.name) {
            let val = match &set.source {
                VariableValueSource::EnvVar(raw) => v.env_value(raw, &set.range),
                VariableValueSource::VarsFile(expr) => {
                    let (val, more) = expr.value(&static_ctx);
                    let failed = more.has_errors();
                    diags.extend(more);
                    if failed {
                        v.set_value = Some(Value::unknown());
                        return (v, diags);
                    }
                    val
                }
            };

            let val = match &v.constraint {
                Some(ty) => match convert(&val, ty) {
                    Ok(converted) => converted,
                    Err(err) => {
                        diags.push(
                            Diagnostic::error(
                                "Invalid value for variable",
                                format!(
                                    "This value is not compatible with the variable's type constraint: {}.",
                                    err
                                ),
                            )
                            .with_subject(&set.range),
                        );
                        Value::unknown()
                    }
                },
                None => val,
            };
            v.set_value = Some(val);
        }

        (v, diags)
    }

    /// Environment values are taken literally for string variables. Otherwise
    /// they are parsed as an expression, falling back to a literal string.
    fn env_value(&self, raw: &str, range: &Range) -> Value {
        if self.constraint == Some(Type::String) {
            return Value::string(raw);
        }

        let (expr, mut diags) = parse_expression(raw, &range.filename);
        let Some(expr) = expr else {
            return Value::string(raw);
        };
        let (val, more) = expr.value(&EvalContext::new());
        diags.extend(more);
        if diags.has_errors() {
            return Value::string(raw);
        }
        val
    }

    /// The user supplied value, the default, or null.
    pub fn value(&self) -> Value {
        self.set_value
            .clone()
            .or_else(|| self.default.clone())
            .unwrap_or_else(Value::null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enos_hcl::parse;

    fn decode(src: &str, values: &BTreeMap<String, VariableValue>) -> (Variable, Diagnostics) {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        Variable::decode(&file.body.blocks[0], values)
    }

    #[test]
    fn test_default_converted_to_type() {
        let (v, diags) = decode(
            r#"variable "count" {
                 type    = number
                 default = "3"
               }"#,
            &BTreeMap::new(),
        );
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(v.value(), Value::number(3.0));
    }

    #[test]
    fn test_invalid_default() {
        let (_, diags) = decode(
            r#"variable "count" {
                 type    = number
                 default = "three"
               }"#,
            &BTreeMap::new(),
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn test_env_values() {
        let values = values_from_env(&[
            "ENOS_VAR_region=us-east-1",
            "ENOS_VAR_sizes=[1, 2]",
            "ENOS_VAR_words=not an expression",
            "OTHER=1",
        ]);
        assert_eq!(values.len(), 3);

        let (v, _) = decode(r#"variable "region" { type = string }"#, &values);
        assert_eq!(v.value(), Value::string("us-east-1"));

        let (v, diags) = decode(r#"variable "sizes" { type = list(number) }"#, &values);
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(v.value().as_value_slice().map(<[Value]>::len), Some(2));

        let (v, _) = decode(r#"variable "words" { }"#, &values);
        assert_eq!(v.value(), Value::string("not an expression"));
    }

    #[test]
    fn test_env_value_wrong_type() {
        let values = values_from_env(&["ENOS_VAR_count=[1]"]);
        let (_, diags) = decode(r#"variable "count" { type = number }"#, &values);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_unset_without_default_is_null() {
        let (v, _) = decode(r#"variable "nothing" { }"#, &BTreeMap::new());
        assert!(v.value().is_null());
    }
}

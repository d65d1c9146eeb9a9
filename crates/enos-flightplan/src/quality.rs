// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Qualities that scenario steps verify.

use enos_hcl::{AttributeSchema, Block, BodySchema, Diagnostic, Diagnostics, EvalContext, Value};
use serde::Serialize;

use crate::error::{Error, Result};

static QUALITY_SCHEMA: BodySchema = BodySchema {
    attributes: &[AttributeSchema::required("description")],
    blocks: &[],
};

/// A `quality "<name>" { description = "..." }` block.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Quality {
    /// Quality name, unique within a flight plan.
    pub name: String,
    /// What the quality means.
    pub description: String,
}

impl Quality {
    /// Decodes a quality block.
    pub fn decode(block: &Block, ctx: &EvalContext) -> (Quality, Diagnostics) {
        let mut q = Quality {
            name: block.labels.first().cloned().unwrap_or_default(),
            ..Quality::default()
        };

        let (content, mut diags) = block.body.content(&QUALITY_SCHEMA);
        if diags.has_errors() {
            return (q, diags);
        }

        if let Some(attr) = content.attribute("description") {
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if !failed {
                match val.as_str() {
                    Some(s) => q.description = s.to_string(),
                    None => diags.push(
                        Diagnostic::error(
                            "invalid value",
                            format!("quality description must be a string, got {}", val.type_name()),
                        )
                        .with_subject(&attr.expr.range),
                    ),
                }
            }
        }

        (q, diags)
    }

    /// The quality as an object value with `name` and `description`.
    pub fn to_value(&self) -> Value {
        Value::object_from([
            ("name", Value::string(&self.name)),
            ("description", Value::string(&self.description)),
        ])
    }

    /// Reads a quality back from a value created by [`Quality::to_value`].
    pub fn from_value(val: &Value) -> Result<Quality> {
        let mut q = Quality::default();
        if val.is_null() {
            return Ok(q);
        }
        if !val.is_wholly_known() {
            return Err(Error::InvalidValue("cannot unmarshal unknown value".to_string()));
        }
        let Value::Object(map) = val else {
            return Err(Error::InvalidValue("value must be an object".to_string()));
        };

        for (key, v) in map {
            let s = v
                .as_str()
                .ok_or_else(|| Error::InvalidValue(format!("{} must be a string", key)))?;
            match key.as_str() {
                "name" => q.name = s.to_string(),
                "description" => q.description = s.to_string(),
                other => {
                    return Err(Error::InvalidValue(format!("unknown attribute {:?}", other)));
                }
            }
        }

        Ok(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enos_hcl::parse;

    fn decode(src: &str) -> (Quality, Diagnostics) {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        Quality::decode(&file.body.blocks[0], &EvalContext::new())
    }

    #[test]
    fn test_decode() {
        let (q, diags) = decode(r#"quality "data_durable" { description = "data survives" }"#);
        assert!(diags.is_empty(), "{}", diags);
        assert_eq!(q.name, "data_durable");
        assert_eq!(q.description, "data survives");
        assert_eq!(Quality::from_value(&q.to_value()).unwrap(), q);
    }

    #[test]
    fn test_decode_errors() {
        assert!(decode(r#"quality "q" { }"#).1.has_errors());
        assert!(decode("quality \"q\" {\n  description = \"x\"\n  other = 1\n}\n").1.has_errors());
        assert!(decode(r#"quality "q" { description = ["x"] }"#).1.has_errors());
    }

    #[test]
    fn test_from_value_errors() {
        let bad = Value::object_from([("nope", Value::string("x"))]);
        assert!(Quality::from_value(&bad).is_err());
        assert!(Quality::from_value(&Value::string_list(&["x"])).is_err());
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blocks with no known schema, such as provider configuration.

use enos_hcl::{Block, Body, Diagnostics, EvalContext, Type, Value, WriteBody};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// An arbitrary block tree with evaluated attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemalessBlock {
    /// Block type.
    pub type_name: String,
    /// Block labels.
    pub labels: Vec<String>,
    /// Evaluated attributes.
    pub attrs: BTreeMap<String, Value>,
    /// Nested blocks, in source order.
    pub children: Vec<SchemalessBlock>,
}

impl SchemalessBlock {
    /// Decodes a block and all of its nested blocks.
    ///
    /// Attributes that fail to evaluate are skipped. A failing child stops
    /// decoding of the remaining children.
    pub fn decode(block: &Block, ctx: &EvalContext) -> (SchemalessBlock, Diagnostics) {
        let (mut s, diags) = SchemalessBlock::decode_body(&block.body, ctx);
        s.type_name = block.type_name.clone();
        s.labels = block.labels.clone();
        (s, diags)
    }

    /// Decodes a bare body. The result has no type or labels.
    pub fn decode_body(body: &Body, ctx: &EvalContext) -> (SchemalessBlock, Diagnostics) {
        let mut diags = Diagnostics::new();
        let mut s = SchemalessBlock::default();

        for attr in &body.attributes {
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                continue;
            }
            s.attrs.insert(attr.name.clone(), val);
        }

        for child in &body.blocks {
            let (csb, more) = SchemalessBlock::decode(child, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (s, diags);
            }
            s.children.push(csb);
        }

        (s, diags)
    }

    /// True if the block has neither attributes nor children.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.children.is_empty()
    }

    /// The block as an object value with `type`, `labels`, `attrs` and `blocks`.
    pub fn to_value(&self) -> Value {
        let labels = if self.labels.is_empty() {
            Value::empty_list(Type::String)
        } else {
            Value::string_list(&self.labels)
        };

        let attrs = if self.attrs.is_empty() {
            Value::Null(Type::Object(BTreeMap::new()))
        } else {
            Value::object(self.attrs.clone())
        };

        let blocks = if self.children.is_empty() {
            Value::empty_list(Type::Object(BTreeMap::new()))
        } else {
            Value::list(self.children.iter().map(SchemalessBlock::to_value).collect())
        };

        Value::object_from([
            ("type", Value::string(&self.type_name)),
            ("labels", labels),
            ("attrs", attrs),
            ("blocks", blocks),
        ])
    }

    /// Reads a block back from a value created by [`SchemalessBlock::to_value`].
    pub fn from_value(val: &Value) -> Result<SchemalessBlock> {
        let mut s = SchemalessBlock::default();
        if val.is_null() {
            return Ok(s);
        }
        if !val.is_wholly_known() {
            return Err(Error::InvalidValue("cannot unmarshal unknown value".to_string()));
        }
        let Some(map) = val.as_value_map() else {
            return Err(Error::InvalidValue("value must be an object".to_string()));
        };

        for (key, v) in map {
            match key.as_str() {
                "type" => {
                    s.type_name = v
                        .as_str()
                        .ok_or_else(|| Error::InvalidValue("block type must be a string".to_string()))?
                        .to_string();
                }
                "labels" => {
                    let labels = v.as_value_slice().ok_or_else(|| {
                        Error::InvalidValue("block labels must be a list of strings".to_string())
                    })?;
                    for label in labels {
                        match label {
                            Value::String(l) => s.labels.push(l.clone()),
                            Value::Null(_) | Value::Unknown(_) => {}
                            _ => {
                                return Err(Error::InvalidValue(
                                    "block labels must be a list of strings".to_string(),
                                ));
                            }
                        }
                    }
                }
                "attrs" => {
                    if v.is_null() {
                        continue;
                    }
                    let attrs = v.as_value_map().ok_or_else(|| {
                        Error::InvalidValue("block attrs must be a map of attributes".to_string())
                    })?;
                    s.attrs.extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                "blocks" => {
                    let blocks = v.as_value_slice().ok_or_else(|| {
                        Error::InvalidValue("block children must be a list of blocks".to_string())
                    })?;
                    for b in blocks {
                        s.children.push(SchemalessBlock::from_value(b)?);
                    }
                }
                other => {
                    return Err(Error::InvalidValue(format!(
                        "unknown key in value object: {}",
                        other
                    )));
                }
            }
        }

        Ok(s)
    }

    /// Writes the attributes and nested blocks into `body`.
    pub fn write_body(&self, body: &mut WriteBody) {
        for (name, val) in &self.attrs {
            body.set_attribute_value(name.as_str(), val.clone());
        }
        for child in &self.children {
            let labels: Vec<&str> = child.labels.iter().map(String::as_str).collect();
            let child_body = body.append_new_block(child.type_name.as_str(), &labels);
            child.write_body(child_body);
        }
    }
}

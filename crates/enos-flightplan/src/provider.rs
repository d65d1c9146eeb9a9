// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Terraform provider configurations.

use enos_hcl::{Block, Diagnostics, EvalContext, Value};

use crate::error::{Error, Result};
use crate::schemaless_block::SchemalessBlock;

/// A `provider "<type>" "<alias>"` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provider {
    /// Provider type, e.g. `aws`.
    pub provider_type: String,
    /// Provider alias, unique per type.
    pub alias: String,
    /// The provider body.
    pub config: SchemalessBlock,
}

impl Provider {
    /// Decodes a provider block. The caller has verified the two labels.
    pub fn decode(block: &Block, ctx: &EvalContext) -> (Provider, Diagnostics) {
        let (config, diags) = SchemalessBlock::decode(block, ctx);
        let provider = Provider {
            provider_type: block.labels.first().cloned().unwrap_or_default(),
            alias: block.labels.get(1).cloned().unwrap_or_default(),
            config,
        };
        (provider, diags)
    }

    /// `<type>.<alias>`, as written in references.
    pub fn address(&self) -> String {
        format!("{}.{}", self.provider_type, self.alias)
    }

    /// The provider as an object value with `type`, `alias` and `config`.
    pub fn to_value(&self) -> Value {
        Value::object_from([
            ("type", Value::string(&self.provider_type)),
            ("alias", Value::string(&self.alias)),
            ("config", self.config.to_value()),
        ])
    }

    /// Reads a provider back from a value created by [`Provider::to_value`].
    pub fn from_value(val: &Value) -> Result<Provider> {
        let mut p = Provider::default();
        if val.is_null() {
            return Ok(p);
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
                    p.provider_type = v
                        .as_str()
                        .ok_or_else(|| Error::InvalidValue("provider type must be a string".to_string()))?
                        .to_string();
                }
                "alias" => {
                    p.alias = v
                        .as_str()
                        .ok_or_else(|| Error::InvalidValue("provider alias must be a string".to_string()))?
                        .to_string();
                }
                "config" => p.config = SchemalessBlock::from_value(v)?,
                other => {
                    return Err(Error::InvalidValue(format!(
                        "unknown key in value object: {}",
                        other
                    )));
                }
            }
        }

        Ok(p)
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Sample subsets.
//!
//! A subset selects the scenario instances of a single scenario block, either
//! by name, by a `scenario_filter` string, or by a matrix that is intersected
//! with the scenario's own matrix.

use enos_hcl::{
    Attribute, AttributeSchema, Block, BlockHeaderSchema, BodySchema, Diagnostic, Diagnostics,
    EvalContext, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::flightplan::FlightPlan;
use crate::matrix::Matrix;
use crate::matrix_decoder::{BLOCK_TYPE_MATRIX, decode_matrix};
use crate::sample_subset_frame::SampleSubsetFrame;
use crate::scenario_filter::ScenarioFilter;
use crate::verify::verify_valid_identifier;

pub(crate) const BLOCK_TYPE_SAMPLE_SUBSET: &str = "subset";

static SAMPLE_SUBSET_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::optional("attributes"),
        AttributeSchema::optional("scenario_name"),
        AttributeSchema::optional("scenario_filter"),
    ],
    blocks: &[BlockHeaderSchema::new(BLOCK_TYPE_MATRIX, &[])],
};

/// A `subset "<name>"` block of a sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSubset {
    /// Subset name. Also the scenario name when neither `scenario_name` nor
    /// `scenario_filter` is set.
    pub name: String,
    /// Name of the sample that declares the subset.
    pub sample_name: String,
    /// Explicit scenario name.
    pub scenario_name: Option<String>,
    /// A scenario filter in command line form.
    pub scenario_filter: Option<String>,
    /// Attributes assigned to the subset's elements. Null when unset.
    pub attributes: Value,
    /// Variants the subset is limited to.
    pub matrix: Option<Matrix>,
}

impl SampleSubset {
    /// Decodes a subset block.
    pub fn decode(block: &Block, ctx: &Arc<EvalContext>) -> (SampleSubset, Diagnostics) {
        let mut subset = SampleSubset {
            name: block.labels.first().cloned().unwrap_or_default(),
            ..SampleSubset::default()
        };

        let (content, mut diags) = block.body.content(&SAMPLE_SUBSET_SCHEMA);
        if diags.has_errors() {
            return (subset, diags);
        }

        let (name, more) = decode_string_field(content.attribute("scenario_name"), ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (subset, diags);
        }
        if let (Some(name), Some(attr)) = (&name, content.attribute("scenario_name")) {
            let more = verify_valid_identifier(name, &attr.name_range);
            let failed = more.has_errors();
            diags.extend(more);
            if failed {
                return (subset, diags);
            }
        }
        subset.scenario_name = name;

        let (filter, more) = decode_string_field(content.attribute("scenario_filter"), ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (subset, diags);
        }
        subset.scenario_filter = filter;

        let (attrs, more) = decode_sample_attributes(content.attribute("attributes"), ctx);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (subset, diags);
        }
        subset.attributes = attrs;

        let (matrix, more) = decode_matrix(ctx, block);
        let failed = more.has_errors();
        diags.extend(more);
        if failed {
            return (subset, diags);
        }
        subset.matrix = matrix.map(|m| m.final_product);

        let problem = |summary: &str| {
            Diagnostic::error(summary, "")
                .with_subject(&block.body.missing_item_range())
                .with_context(&block.type_range)
        };

        if subset.name.is_empty() && subset.scenario_name.is_none() && subset.scenario_filter.is_none() {
            diags.push(problem(
                "A subset name, scenario_name, or scenario_filter is required but not defined",
            ));
        }

        if subset.scenario_filter.is_some() && subset.matrix.as_ref().is_some_and(|m| !m.is_empty()) {
            diags.push(problem(
                "cannot filter scenarios from subset because the subset has been configured with both a matrix and scenario filter",
            ));
        }

        if subset.scenario_name.is_some() && subset.scenario_filter.is_some() {
            diags.push(problem(
                "cannot filter scenarios from subset because a scenario_name and scenario_filter are both defined",
            ));
        }

        (subset, diags)
    }

    /// Builds the subset's frame from the scenario blocks of `fp`.
    ///
    /// The subset's filter is applied to the scenario blocks at matrix depth.
    /// When nothing matches, the frame is empty and fails validation.
    pub fn frame(&self, fp: &FlightPlan) -> Result<SampleSubsetFrame> {
        let filter = ScenarioFilter::for_subset(self)?;
        let (blocks, diags) = fp.decode_scenario_blocks(&filter);
        if diags.has_errors() {
            return Err(Error::Diagnostics(diags));
        }

        debug!(
            sample = %self.sample_name,
            subset = %self.name,
            filter = %filter,
            blocks = blocks.len(),
            "framing sample subset"
        );

        let matrix = match blocks.as_slice() {
            [] => Some(Matrix::new()),
            [one] => one.matrix.as_ref().map(|m| m.final_product.clone()),
            many => {
                let found: Vec<&str> = many.iter().map(|b| b.name.as_str()).collect();
                return Err(Error::Sampling(format!(
                    "unsupported sample filter: sample filter expected on scenario {}, found scenarios {}",
                    filter.name.as_deref().unwrap_or_default(),
                    found.join(" ")
                )));
            }
        };

        Ok(SampleSubsetFrame {
            subset: self.clone(),
            scenario_filter: filter,
            matrix,
        })
    }
}

fn decode_string_field(attr: Option<&Attribute>, ctx: &EvalContext) -> (Option<String>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let Some(attr) = attr else {
        return (None, diags);
    };

    let (val, more) = attr.expr.value(ctx);
    let failed = more.has_errors();
    diags.extend(more);
    if failed || val.is_null() {
        return (None, diags);
    }

    if !val.is_wholly_known() {
        diags.push(
            Diagnostic::error(format!("value of {} must be knowable", attr.name), "")
                .with_subject(&attr.name_range)
                .with_context(&attr.range),
        );
        return (None, diags);
    }

    match val.as_str() {
        Some(s) if !s.is_empty() => (Some(s.to_string()), diags),
        Some(_) => (None, diags),
        None => {
            diags.push(
                Diagnostic::error(
                    format!("value of {} must be a string, got {}", attr.name, val.type_name()),
                    "",
                )
                .with_subject(&attr.name_range)
                .with_context(&attr.range),
            );
            (None, diags)
        }
    }
}

/// Evaluates a sample or subset `attributes` attribute. The value must be
/// known and must be an object or map.
pub(crate) fn decode_sample_attributes(attr: Option<&Attribute>, ctx: &EvalContext) -> (Value, Diagnostics) {
    let mut diags = Diagnostics::new();
    let Some(attr) = attr else {
        return (Value::null(), diags);
    };

    let (val, more) = attr.expr.value(ctx);
    let failed = more.has_errors();
    diags.extend(more);
    if failed || val.is_null() {
        return (val, diags);
    }

    if !val.is_wholly_known() {
        diags.push(
            Diagnostic::error(
                "sample attributes must be knowable",
                "all sample attributes must be knowable when decoding samples",
            )
            .with_subject(&attr.name_range)
            .with_context(&attr.range),
        );
        return (Value::unknown(), diags);
    }

    if val.as_value_map().is_none() {
        diags.push(
            Diagnostic::error(
                "sample attributes must be an object or map",
                format!("cannot use attributes of type {}", val.type_name()),
            )
            .with_subject(&attr.name_range)
            .with_context(&attr.range),
        );
    }

    (val, diags)
}

/// The entries of an attributes value. Null gives no entries.
pub(crate) fn sample_attr_values(val: &Value) -> Result<BTreeMap<String, Value>> {
    if val.is_null() {
        return Ok(BTreeMap::new());
    }
    if !val.is_wholly_known() {
        return Err(Error::Sampling(
            "sample attribute values cannot be unknowable".to_string(),
        ));
    }
    val.as_value_map().cloned().ok_or_else(|| {
        Error::Sampling(format!(
            "cannot iterate sample attributes type: {}. Must be a string keyed map of value",
            val.type_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Vector;
    use enos_hcl::parse;

    fn decode(src: &str) -> (SampleSubset, Diagnostics) {
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        SampleSubset::decode(&file.body.blocks[0], &Arc::new(EvalContext::new()))
    }

    #[test]
    fn test_decode_subset() {
        let (subset, diags) = decode(
            r#"
subset "smoke" {
  scenario_name = "upgrade"
  attributes = {
    aws_region = ["us-east-1", "us-west-2"]
  }

  matrix {
    arch = ["amd64", "arm64"]
  }
}
"#,
        );
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(subset.name, "smoke");
        assert_eq!(subset.scenario_name.as_deref(), Some("upgrade"));
        assert!(subset.scenario_filter.is_none());
        assert!(subset.attributes.get_attr("aws_region").is_some());
        let matrix = subset.matrix.unwrap();
        assert_eq!(matrix.len(), 2);
        assert!(matrix.has_vector(&Vector::from_pairs([("arch", "amd64")])));
    }

    #[test]
    fn test_mutually_exclusive_fields() {
        let (_, diags) = decode(
            r#"
subset "both" {
  scenario_name   = "upgrade"
  scenario_filter = "upgrade arch:amd64"
}
"#,
        );
        assert!(
            diags
                .errors()
                .any(|d| d.summary.contains("scenario_name and scenario_filter"))
        );

        let (_, diags) = decode(
            r#"
subset "both" {
  scenario_filter = "upgrade arch:amd64"
  matrix {
    arch = ["amd64"]
  }
}
"#,
        );
        assert!(diags.errors().any(|d| d.summary.contains("matrix and scenario filter")));
    }

    #[test]
    fn test_invalid_attribute_values() {
        let (_, diags) = decode(r#"subset "x" { scenario_name = 1 }"#);
        assert!(diags.errors().any(|d| d.summary.starts_with("value of scenario_name must be a string")));

        let (_, diags) = decode(r#"subset "x" { attributes = "nope" }"#);
        assert!(
            diags
                .errors()
                .any(|d| d.summary == "sample attributes must be an object or map")
        );
    }

    #[test]
    fn test_sample_attr_values() {
        assert!(sample_attr_values(&Value::null()).unwrap().is_empty());
        let vals = sample_attr_values(&Value::object_from([("a", Value::string("b"))])).unwrap();
        assert_eq!(vals.len(), 1);
        assert!(sample_attr_values(&Value::string("x")).is_err());
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scenario outputs.

use enos_hcl::{AttributeSchema, Block, BodySchema, Diagnostic, Diagnostics, EvalContext, Type, Value, convert};

use crate::step_variable::decode_step_variable;

pub(crate) const BLOCK_TYPE_OUTPUT: &str = "output";

static SCENARIO_OUTPUT_SCHEMA: BodySchema = BodySchema {
    attributes: &[
        AttributeSchema::optional("description"),
        AttributeSchema::optional("sensitive"),
        AttributeSchema::required("value"),
    ],
    blocks: &[],
};

/// An `output "<name>"` block of a scenario.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScenarioOutput {
    /// Output name.
    pub name: String,
    /// Optional description.
    pub description: String,
    /// Whether Terraform should redact the value.
    pub sensitive: bool,
    /// A step variable capsule, usually a reference to a step output.
    pub value: Value,
}

impl ScenarioOutput {
    /// Decodes an output block.
    pub fn decode(block: &Block, ctx: &EvalContext) -> (ScenarioOutput, Diagnostics) {
        let mut out = ScenarioOutput {
            name: block.labels.first().cloned().unwrap_or_default(),
            ..ScenarioOutput::default()
        };

        let (content, mut diags) = block.body.content(&SCENARIO_OUTPUT_SCHEMA);
        if diags.has_errors() {
            return (out, diags);
        }

        for (name, want) in [("description", Type::String), ("sensitive", Type::Bool)] {
            let Some(attr) = content.attribute(name) else {
                continue;
            };
            let (val, more) = attr.expr.value(ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if failed || val.is_null() || !val.is_wholly_known() {
                continue;
            }
            match convert(&val, &want) {
                Ok(Value::String(s)) => out.description = s,
                Ok(Value::Bool(b)) => out.sensitive = b,
                _ => diags.push(
                    Diagnostic::error(
                        "Incorrect attribute value type",
                        format!("Inappropriate value for attribute {:?}: {} required.", name, want.friendly_name()),
                    )
                    .with_subject(&attr.expr.range)
                    .with_context(&attr.range),
                ),
            }
        }

        if let Some(attr) = content.attribute("value") {
            let (val, more) = decode_step_variable(&attr.expr, ctx);
            let failed = more.has_errors();
            diags.extend(more);
            if !failed {
                out.value = val;
            }
        }

        (out, diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step_variable::StepVariable;
    use enos_hcl::parse;

    #[test]
    fn test_decode_output() {
        let src = r#"
output "vpc_id" {
  description = "the vpc"
  sensitive   = true
  value       = step.create_vpc.id
}
"#;
        let (file, diags) = parse(src, "enos.hcl");
        assert!(!diags.has_errors(), "{}", diags);

        let mut ctx = EvalContext::new();
        ctx.set_variable(
            "step",
            Value::object_from([("create_vpc", Value::object_from([("name", Value::string("create_vpc"))]))]),
        );

        let (out, diags) = ScenarioOutput::decode(&file.body.blocks[0], &ctx);
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(out.name, "vpc_id");
        assert_eq!(out.description, "the vpc");
        assert!(out.sensitive);
        assert!(matches!(StepVariable::from_value(&out.value), Some(StepVariable::Traversal(_))));
    }

    #[test]
    fn test_value_is_required() {
        let (file, _) = parse(r#"output "x" { description = "d" }"#, "enos.hcl");
        let (_, diags) = ScenarioOutput::decode(&file.body.blocks[0], &EvalContext::new());
        assert!(diags.has_errors());
    }
}

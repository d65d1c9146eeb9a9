// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Step variables.
//!
//! A step variable is either a value known at decode time or a reference to
//! the output of an earlier step, such as `step.create_vpc.vpc_id`. Module
//! outputs only exist once Terraform runs, so such references are kept as
//! traversals and rendered as `module.create_vpc.vpc_id` in generated code.
//!
//! Step variables travel through the value system as capsules so they can be
//! stored in module attributes and referenced by later steps.

use enos_hcl::{
    Capsule, Diagnostic, Diagnostics, EvalContext, Expr, ExprKind, Traversal, Traverser, Type, Value,
    WriteExpr, convert,
};

/// Capsule type name of step variables.
pub const STEP_VARIABLE_TYPE: &str = "stepvar";

/// A known value or a reference to a prior step's output.
#[derive(Debug, Clone, PartialEq)]
pub enum StepVariable {
    /// A value known at decode time.
    Value(Value),
    /// A reference rooted at `step`.
    Traversal(Traversal),
}

impl StepVariable {
    /// Wraps the step variable in a capsule value.
    pub fn into_value(self) -> Value {
        Value::Capsule(Capsule::new(STEP_VARIABLE_TYPE, self))
    }

    /// Borrows the step variable inside a capsule value.
    pub fn from_value(val: &Value) -> Option<&StepVariable> {
        let capsule = val.as_capsule()?;
        if capsule.type_name() != STEP_VARIABLE_TYPE {
            return None;
        }
        capsule.downcast_ref::<StepVariable>()
    }

    /// The expression written into a generated module. References are
    /// rewritten from `step.<name>` to `module.<name>`.
    pub fn to_write_expr(&self) -> WriteExpr {
        match self {
            StepVariable::Value(v) => value_to_write_expr(v),
            StepVariable::Traversal(t) => WriteExpr::Traversal(t.with_root("module")),
        }
    }
}

/// Converts a value that may hold step variable capsules into a writable
/// expression.
pub fn value_to_write_expr(val: &Value) -> WriteExpr {
    if let Some(sv) = StepVariable::from_value(val) {
        return sv.to_write_expr();
    }
    if !contains_capsule(val) {
        return WriteExpr::Value(val.clone());
    }

    match val {
        Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
            WriteExpr::Tuple(elems.iter().map(value_to_write_expr).collect())
        }
        Value::Map(_, entries) | Value::Object(entries) => WriteExpr::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), value_to_write_expr(v)))
                .collect(),
        ),
        _ => WriteExpr::Value(val.clone()),
    }
}

fn contains_capsule(val: &Value) -> bool {
    match val {
        Value::Capsule(_) => true,
        Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
            elems.iter().any(contains_capsule)
        }
        Value::Map(_, entries) | Value::Object(entries) => entries.values().any(contains_capsule),
        _ => false,
    }
}

/// Wraps a successfully evaluated value, keeping the evaluation's warnings.
fn evaluated_step_variable(val: Value, diags: Diagnostics) -> (Value, Diagnostics) {
    if StepVariable::from_value(&val).is_some() {
        return (val, diags);
    }
    (StepVariable::Value(val).into_value(), diags)
}

/// Decodes an expression into a step variable capsule.
///
/// The expression is evaluated first. If that fails, it must be a reference
/// to a previously defined step, which is kept as a traversal.
pub fn decode_step_variable(expr: &Expr, ctx: &EvalContext) -> (Value, Diagnostics) {
    let (val, more) = expr.value(ctx);
    if !more.has_errors() {
        return evaluated_step_variable(val, more);
    }

    let mut diags = Diagnostics::new();

    let unknown = || StepVariable::Value(Value::unknown()).into_value();

    let traversal = match abs_traversal_for_expr(expr, ctx) {
        Ok(t) => t,
        Err(more) => {
            diags.extend(more);
            return (unknown(), diags);
        }
    };

    if traversal.root_name() != Some("step") {
        diags.push(
            Diagnostic::error(
                "step variable is unknowable",
                "step variables can only be unknown if the value is a reference to a step module output",
            )
            .with_subject(&traversal.source_range())
            .with_context(&expr.range),
        );
        return (unknown(), diags);
    }

    let Some(steps) = ctx.variable("step") else {
        diags.push(
            Diagnostic::error("no previous steps have been defined", "")
                .with_subject(&traversal.source_range())
                .with_context(&expr.range),
        );
        return (unknown(), diags);
    };

    let Some(Traverser::Attr(step_name, step_range)) = traversal.steps().get(1) else {
        diags.push(
            Diagnostic::error("invalid step traversal", "")
                .with_subject(&traversal.source_range())
                .with_context(&expr.range),
        );
        return (unknown(), diags);
    };

    if steps.get_attr(step_name).is_none() {
        diags.push(
            Diagnostic::error(
                format!("no step named {} has been previously defined", step_name),
                "",
            )
            .with_subject(step_range)
            .with_context(&traversal.source_range()),
        );
        return (unknown(), diags);
    }

    (StepVariable::Traversal(traversal).into_value(), diags)
}

/// Resolves an expression to a static traversal, evaluating dynamic index
/// keys and conditionals along the way.
fn abs_traversal_for_expr(expr: &Expr, ctx: &EvalContext) -> Result<Traversal, Diagnostics> {
    let mut suffix: Vec<Traverser> = Vec::new();
    let mut expr = expr;

    loop {
        match &expr.kind {
            ExprKind::ScopeTraversal(t) => {
                let mut steps = t.steps().to_vec();
                steps.extend(suffix);
                return Ok(Traversal(steps));
            }
            ExprKind::Parens(inner) | ExprKind::TemplateWrap(inner) => expr = inner.as_ref(),
            ExprKind::RelativeTraversal(source, steps) => {
                let mut steps = steps.clone();
                steps.extend(suffix);
                suffix = steps;
                expr = source.as_ref();
            }
            ExprKind::Index(collection, key) => {
                let (k, diags) = key.value(ctx);
                if diags.has_errors() {
                    let mut out: Diagnostics = Diagnostic::error(
                        "unable to resolve index value",
                        "the index key of a step reference must be known",
                    )
                    .with_subject(&key.range)
                    .with_context(&expr.range)
                    .into();
                    out.extend(diags);
                    return Err(out);
                }
                suffix.insert(0, Traverser::Index(k, expr.range.clone()));
                expr = collection.as_ref();
            }
            ExprKind::Conditional(cond, if_true, if_false) => {
                let (c, diags) = cond.value(ctx);
                if diags.has_errors() {
                    let (_, more) = expr.value(ctx);
                    let mut out = diags;
                    out.extend(more);
                    return Err(out);
                }
                if c.is_null() || !c.is_known() {
                    return Err(Diagnostic::error(
                        "unknown or null condition",
                        "The condition value is null or unknown. Conditions must either be true or false.",
                    )
                    .with_subject(&cond.range)
                    .with_context(&expr.range)
                    .into());
                }
                match convert(&c, &Type::Bool) {
                    Ok(Value::Bool(true)) => expr = if_true.as_ref(),
                    Ok(_) => expr = if_false.as_ref(),
                    Err(_) => {
                        return Err(Diagnostic::error(
                            "Incorrect condition type",
                            "The condition expression must be of type bool.",
                        )
                        .with_subject(&cond.range)
                        .with_context(&expr.range)
                        .into());
                    }
                }
            }
            _ => {
                let (_, diags) = expr.value(ctx);
                return Err(diags);
            }
        }
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Expression evaluation.
//!
//! Evaluation never fails outright: problems are reported as diagnostics and
//! the offending sub-expression evaluates to an unknown value so that the
//! caller can keep going and report as much as possible.

use crate::ast::{BinaryOp, Expr, ExprKind, ForExpr, TemplateItem, UnaryOp};
use crate::convert::convert;
use crate::diagnostics::{Diagnostic, Diagnostics, Range};
use crate::functions::{Function, FunctionError, FunctionTable};
use crate::schema::find_similar_name;
use crate::traversal::{Traversal, Traverser};
use crate::value::{Type, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Evaluation Context
// ============================================================================

/// Variables and functions available to expressions.
///
/// Contexts form a chain: a child sees its own variables first and then those
/// of its ancestors. Functions are normally set on the root only.
#[derive(Clone, Default)]
pub struct EvalContext {
    variables: BTreeMap<String, Value>,
    functions: Option<Arc<FunctionTable>>,
    parent: Option<Arc<EvalContext>>,
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("has_functions", &self.functions.is_some())
            .field("parent", &self.parent)
            .finish()
    }
}

impl EvalContext {
    /// An empty context with no functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty context exposing the given functions.
    pub fn with_functions(functions: Arc<FunctionTable>) -> Self {
        Self {
            functions: Some(functions),
            ..Self::default()
        }
    }

    /// A new context whose lookups fall back to `parent`.
    pub fn child_of(parent: Arc<EvalContext>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::default()
        }
    }

    /// Sets a variable in this context.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Looks up a variable here or in an ancestor.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        match self.variables.get(name) {
            Some(v) => Some(v),
            None => self.parent.as_ref().and_then(|p| p.variable(name)),
        }
    }

    /// The variables defined directly on this context.
    pub fn local_variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Looks up a function here or in an ancestor.
    pub fn function(&self, name: &str) -> Option<&Function> {
        match self.functions.as_ref().and_then(|f| f.get(name)) {
            Some(f) => Some(f),
            None => self.parent.as_ref().and_then(|p| p.function(name)),
        }
    }

    fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.variables.keys().cloned().collect();
        if let Some(p) = &self.parent {
            names.extend(p.variable_names());
        }
        names
    }

    fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .functions
            .as_ref()
            .map(|f| f.names().map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(p) = &self.parent {
            names.extend(p.function_names());
        }
        names
    }
}

/// Lexical scope for iterator variables introduced by `for` expressions.
struct Scope<'a> {
    ctx: &'a EvalContext,
    locals: Vec<(String, Value)>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn root(ctx: &'a EvalContext) -> Self {
        Self {
            ctx,
            locals: Vec::new(),
            parent: None,
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        if let Some((_, v)) = self.locals.iter().find(|(n, _)| n == name) {
            return Some(v);
        }
        match self.parent {
            Some(p) => p.lookup(name),
            None => self.ctx.variable(name),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

impl Expr {
    /// Evaluates the expression.
    pub fn value(&self, ctx: &EvalContext) -> (Value, Diagnostics) {
        let mut diags = Diagnostics::new();
        let value = eval(self, &Scope::root(ctx), &mut diags);
        (value, diags)
    }
}

/// Evaluates a static traversal against a context.
pub fn traverse_abs(traversal: &Traversal, ctx: &EvalContext) -> (Value, Diagnostics) {
    let mut diags = Diagnostics::new();
    let value = eval_traversal(traversal, &Scope::root(ctx), &mut diags);
    (value, diags)
}

fn eval(expr: &Expr, scope: &Scope<'_>, diags: &mut Diagnostics) -> Value {
    match &expr.kind {
        ExprKind::Literal(v) => v.clone(),
        ExprKind::Parens(inner) | ExprKind::TemplateWrap(inner) => eval(inner, scope, diags),
        ExprKind::Template(items) => eval_template(items, scope, diags),
        ExprKind::ScopeTraversal(t) => eval_traversal(t, scope, diags),
        ExprKind::RelativeTraversal(source, steps) => {
            let mut value = eval(source, scope, diags);
            for step in steps {
                value = traverse_step(value, step, diags);
            }
            value
        }
        ExprKind::Index(coll, key) => {
            let coll_val = eval(coll, scope, diags);
            let key_val = eval(key, scope, diags);
            index_value(coll_val, &key_val, &key.range, diags)
        }
        ExprKind::Splat(source, steps) => eval_splat(source, steps, scope, diags),
        ExprKind::FunctionCall {
            name,
            args,
            expand_final,
            name_range,
        } => eval_call(name, args, *expand_final, name_range, &expr.range, scope, diags),
        ExprKind::Conditional(cond, t, f) => eval_conditional(cond, t, f, scope, diags),
        ExprKind::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, &expr.range, scope, diags),
        ExprKind::Unary(op, operand) => eval_unary(*op, operand, scope, diags),
        ExprKind::Tuple(items) => Value::Tuple(items.iter().map(|e| eval(e, scope, diags)).collect()),
        ExprKind::Object(items) => {
            let mut attrs = BTreeMap::new();
            let mut unknown = false;
            for item in items {
                let key = eval(&item.key, scope, diags);
                let value = eval(&item.value, scope, diags);
                match key_string(&key) {
                    KeyString::Known(k) => {
                        attrs.insert(k, value);
                    }
                    KeyString::Unknown => unknown = true,
                    KeyString::Null => diags.push(
                        Diagnostic::error("Null value as key", "Can't use a null value as a key.")
                            .with_subject(&item.key.range),
                    ),
                    KeyString::Invalid => diags.push(
                        Diagnostic::error(
                            "Incorrect key type",
                            "Can't use this value as a key: string required.",
                        )
                        .with_subject(&item.key.range),
                    ),
                }
            }
            if unknown {
                Value::unknown()
            } else {
                Value::Object(attrs)
            }
        }
        ExprKind::For(f) => eval_for(f, &expr.range, scope, diags),
    }
}

enum KeyString {
    Known(String),
    Unknown,
    Null,
    Invalid,
}

fn key_string(v: &Value) -> KeyString {
    match v {
        Value::Unknown(_) => KeyString::Unknown,
        Value::Null(_) => KeyString::Null,
        other => match convert(other, &Type::String) {
            Ok(Value::String(s)) => KeyString::Known(s),
            _ => KeyString::Invalid,
        },
    }
}

fn eval_template(items: &[TemplateItem], scope: &Scope<'_>, diags: &mut Diagnostics) -> Value {
    let mut out = String::new();
    let mut unknown = false;
    for item in items {
        match item {
            TemplateItem::Literal(s) => out.push_str(s),
            TemplateItem::Interp(expr) => {
                let value = eval(expr, scope, diags);
                match &value {
                    Value::Null(_) => diags.push(
                        Diagnostic::error(
                            "Invalid template interpolation value",
                            "The expression result is null. Cannot include a null value in a string template.",
                        )
                        .with_subject(&expr.range),
                    ),
                    Value::Unknown(_) => unknown = true,
                    other => match convert(other, &Type::String) {
                        Ok(Value::String(s)) => out.push_str(&s),
                        Ok(_) => unknown = true,
                        Err(_) => diags.push(
                            Diagnostic::error(
                                "Invalid template interpolation value",
                                format!(
                                    "Cannot include the given value in a string template: string required, but have {}.",
                                    other.type_name()
                                ),
                            )
                            .with_subject(&expr.range),
                        ),
                    },
                }
            }
        }
    }
    if unknown {
        Value::Unknown(Type::String)
    } else {
        Value::String(out)
    }
}

fn eval_traversal(t: &Traversal, scope: &Scope<'_>, diags: &mut Diagnostics) -> Value {
    let steps = t.steps();
    let Some(Traverser::Root(name, range)) = steps.first() else {
        return Value::unknown();
    };
    let Some(root) = scope.lookup(name) else {
        let detail = match find_similar_name(name, &scope.ctx.variable_names()) {
            Some(s) => format!("There is no variable named {:?}. Did you mean {:?}?", name, s),
            None => format!("There is no variable named {:?}.", name),
        };
        diags.push(Diagnostic::error("Unknown variable", detail).with_subject(range));
        return Value::unknown();
    };
    let mut value = root.clone();
    for step in &steps[1..] {
        value = traverse_step(value, step, diags);
    }
    value
}

/// Applies a single traversal step to a value.
pub(crate) fn traverse_step(value: Value, step: &Traverser, diags: &mut Diagnostics) -> Value {
    match step {
        Traverser::Root(..) => value,
        Traverser::Attr(name, range) => get_attr(value, name, range, diags),
        Traverser::Index(key, range) => index_value(value, key, range, diags),
    }
}

fn get_attr(value: Value, name: &str, range: &Range, diags: &mut Diagnostics) -> Value {
    match value {
        Value::Unknown(_) => Value::unknown(),
        Value::Null(_) => {
            diags.push(
                Diagnostic::error(
                    "Attempt to get attribute from null value",
                    "This value is null, so it does not have any attributes.",
                )
                .with_subject(range),
            );
            Value::unknown()
        }
        Value::Object(mut attrs) => match attrs.remove(name) {
            Some(v) => v,
            None => {
                let names: Vec<String> = attrs.keys().cloned().collect();
                let detail = match find_similar_name(name, &names) {
                    Some(s) => format!(
                        "This object does not have an attribute named {:?}. Did you mean {:?}?",
                        name, s
                    ),
                    None => format!("This object does not have an attribute named {:?}.", name),
                };
                diags.push(Diagnostic::error("Unsupported attribute", detail).with_subject(range));
                Value::unknown()
            }
        },
        Value::Map(_, mut entries) => match entries.remove(name) {
            Some(v) => v,
            None => {
                diags.push(
                    Diagnostic::error(
                        "Missing map element",
                        format!("This map does not have an element with the key {:?}.", name),
                    )
                    .with_subject(range),
                );
                Value::unknown()
            }
        },
        other => {
            let detail = if other.ty().is_primitive() {
                format!(
                    "Can't access attributes on a primitive-typed value ({}).",
                    other.type_name()
                )
            } else {
                "This value does not have any attributes.".to_string()
            };
            diags.push(Diagnostic::error("Unsupported attribute", detail).with_subject(range));
            Value::unknown()
        }
    }
}

fn index_value(value: Value, key: &Value, range: &Range, diags: &mut Diagnostics) -> Value {
    let invalid_index = |diags: &mut Diagnostics, detail: &str| {
        diags.push(Diagnostic::error("Invalid index", detail.to_string()).with_subject(range));
        Value::unknown()
    };

    if !key.is_known() {
        return Value::unknown();
    }
    match value {
        Value::Unknown(_) => Value::unknown(),
        Value::Null(_) => {
            diags.push(
                Diagnostic::error(
                    "Attempt to index null value",
                    "This value is null, so it does not have any indices.",
                )
                .with_subject(range),
            );
            Value::unknown()
        }
        Value::List(_, elems) | Value::Tuple(elems) => {
            let idx = match convert(key, &Type::Number) {
                Ok(Value::Number(n)) if n.fract() == 0.0 && n >= 0.0 => n as usize,
                Ok(_) | Err(_) => {
                    return invalid_index(
                        diags,
                        "The given key does not identify an element in this collection value: a whole number is required.",
                    );
                }
            };
            match elems.into_iter().nth(idx) {
                Some(v) => v,
                None => invalid_index(
                    diags,
                    "The given key does not identify an element in this collection value: the given index is greater than or equal to the length of the collection.",
                ),
            }
        }
        Value::Map(_, mut entries) | Value::Object(mut entries) => {
            let Ok(Value::String(k)) = convert(key, &Type::String) else {
                return invalid_index(
                    diags,
                    "The given key does not identify an element in this collection value: string required.",
                );
            };
            match entries.remove(&k) {
                Some(v) => v,
                None => invalid_index(
                    diags,
                    "The given key does not identify an element in this collection value.",
                ),
            }
        }
        Value::Set(..) => invalid_index(
            diags,
            "Elements of a set are identified only by their value and don't have any separate index or key to select with, so it's only possible to perform operations across all elements of the set.",
        ),
        other => {
            diags.push(
                Diagnostic::error(
                    "Invalid index",
                    format!("This value does not have any indices ({}).", other.type_name()),
                )
                .with_subject(range),
            );
            Value::unknown()
        }
    }
}

fn eval_splat(source: &Expr, steps: &[Traverser], scope: &Scope<'_>, diags: &mut Diagnostics) -> Value {
    let value = eval(source, scope, diags);
    let elems = match value {
        Value::Null(_) => return Value::Tuple(Vec::new()),
        Value::Unknown(_) => return Value::unknown(),
        Value::List(_, v) | Value::Set(_, v) | Value::Tuple(v) => v,
        other => vec![other],
    };
    Value::Tuple(
        elems
            .into_iter()
            .map(|mut e| {
                for step in steps {
                    e = traverse_step(e, step, diags);
                }
                e
            })
            .collect(),
    )
}

fn eval_conditional(
    cond: &Expr,
    t: &Expr,
    f: &Expr,
    scope: &Scope<'_>,
    diags: &mut Diagnostics,
) -> Value {
    let cond_val = eval(cond, scope, diags);
    match cond_val {
        Value::Unknown(_) => {
            let mut ignored = Diagnostics::new();
            let tv = eval(t, scope, &mut ignored);
            let fv = eval(f, scope, &mut ignored);
            let ty = if tv.ty() == fv.ty() { tv.ty() } else { Type::Dynamic };
            Value::Unknown(ty)
        }
        Value::Null(_) => {
            diags.push(
                Diagnostic::error(
                    "Null condition",
                    "The condition value is null. Conditions must either be true or false.",
                )
                .with_subject(&cond.range),
            );
            Value::unknown()
        }
        other => match convert(&other, &Type::Bool) {
            Ok(Value::Bool(true)) => eval(t, scope, diags),
            Ok(Value::Bool(false)) => eval(f, scope, diags),
            _ => {
                diags.push(
                    Diagnostic::error(
                        "Incorrect condition type",
                        "The condition expression must be of type bool.",
                    )
                    .with_subject(&cond.range),
                );
                Value::unknown()
            }
        },
    }
}

fn eval_binary(
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    range: &Range,
    scope: &Scope<'_>,
    diags: &mut Diagnostics,
) -> Value {
    let lv = eval(lhs, scope, diags);
    let rv = eval(rhs, scope, diags);

    match op {
        BinaryOp::Equal => return lv.equals(&rv),
        BinaryOp::NotEqual => {
            return match lv.equals(&rv) {
                Value::Bool(b) => Value::Bool(!b),
                other => other,
            };
        }
        _ => {}
    }

    let (want, result_ty) = match op {
        BinaryOp::And | BinaryOp::Or => (Type::Bool, Type::Bool),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            (Type::Number, Type::Bool)
        }
        _ => (Type::Number, Type::Number),
    };

    let operand = |v: &Value, side: &str, expr: &Expr, diags: &mut Diagnostics| -> Option<Value> {
        if v.is_null() {
            diags.push(
                Diagnostic::error(
                    "Invalid operand",
                    format!("Unsuitable value for {} operand: argument must not be null.", side),
                )
                .with_subject(&expr.range),
            );
            return None;
        }
        match convert(v, &want) {
            Ok(v) => Some(v),
            Err(e) => {
                diags.push(
                    Diagnostic::error(
                        "Invalid operand",
                        format!("Unsuitable value for {} operand: {}.", side, e),
                    )
                    .with_subject(&expr.range),
                );
                None
            }
        }
    };

    let (Some(l), Some(r)) = (
        operand(&lv, "left", lhs, diags),
        operand(&rv, "right", rhs, diags),
    ) else {
        return Value::Unknown(result_ty);
    };

    match (l, r) {
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::And => Value::Bool(a && b),
            _ => Value::Bool(a || b),
        },
        (Value::Number(a), Value::Number(b)) => match op {
            BinaryOp::Less => Value::Bool(a < b),
            BinaryOp::LessEqual => Value::Bool(a <= b),
            BinaryOp::Greater => Value::Bool(a > b),
            BinaryOp::GreaterEqual => Value::Bool(a >= b),
            BinaryOp::Add => Value::Number(a + b),
            BinaryOp::Subtract => Value::Number(a - b),
            BinaryOp::Multiply => Value::Number(a * b),
            BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => {
                diags.push(
                    Diagnostic::error(
                        "Operation failed",
                        "Error during operation: can't divide by zero.",
                    )
                    .with_subject(range),
                );
                Value::Unknown(Type::Number)
            }
            BinaryOp::Divide => Value::Number(a / b),
            BinaryOp::Modulo => Value::Number(a % b),
            _ => Value::Unknown(result_ty),
        },
        // At least one side is unknown.
        _ => Value::Unknown(result_ty),
    }
}

fn eval_unary(op: UnaryOp, operand: &Expr, scope: &Scope<'_>, diags: &mut Diagnostics) -> Value {
    let v = eval(operand, scope, diags);
    let want = match op {
        UnaryOp::Not => Type::Bool,
        UnaryOp::Negate => Type::Number,
    };
    if v.is_null() {
        diags.push(
            Diagnostic::error(
                "Invalid operand",
                "Unsuitable value for unary operand: argument must not be null.",
            )
            .with_subject(&operand.range),
        );
        return Value::Unknown(want);
    }
    match (op, convert(&v, &want)) {
        (UnaryOp::Not, Ok(Value::Bool(b))) => Value::Bool(!b),
        (UnaryOp::Negate, Ok(Value::Number(n))) => Value::Number(-n),
        (_, Ok(_)) => Value::Unknown(want),
        (_, Err(e)) => {
            diags.push(
                Diagnostic::error(
                    "Invalid operand",
                    format!("Unsuitable value for unary operand: {}.", e),
                )
                .with_subject(&operand.range),
            );
            Value::Unknown(want)
        }
    }
}

fn eval_for(f: &ForExpr, range: &Range, scope: &Scope<'_>, diags: &mut Diagnostics) -> Value {
    let coll = eval(&f.collection, scope, diags);
    let pairs: Vec<(Value, Value)> = match coll {
        Value::Null(_) => {
            diags.push(
                Diagnostic::error(
                    "Iteration over null value",
                    "A null value cannot be used as the collection in a 'for' expression.",
                )
                .with_subject(&f.collection.range),
            );
            return Value::unknown();
        }
        Value::Unknown(_) => return Value::unknown(),
        Value::List(_, v) | Value::Tuple(v) => v
            .into_iter()
            .enumerate()
            .map(|(i, e)| (Value::from(i), e))
            .collect(),
        Value::Set(_, v) => v.into_iter().map(|e| (e.clone(), e)).collect(),
        Value::Map(_, m) | Value::Object(m) => {
            m.into_iter().map(|(k, e)| (Value::String(k), e)).collect()
        }
        other => {
            diags.push(
                Diagnostic::error(
                    "Iteration over non-iterable value",
                    format!(
                        "A value of type {} cannot be used as the collection in a 'for' expression.",
                        other.type_name()
                    ),
                )
                .with_subject(&f.collection.range),
            );
            return Value::unknown();
        }
    };

    let mut tuple = Vec::new();
    let mut object: BTreeMap<String, Value> = BTreeMap::new();
    let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    let mut unknown = false;

    for (k, v) in pairs {
        let mut locals = vec![(f.value_var.clone(), v)];
        if let Some(key_var) = &f.key_var {
            locals.push((key_var.clone(), k));
        }
        let child = Scope {
            ctx: scope.ctx,
            locals,
            parent: Some(scope),
        };

        if let Some(cond) = &f.cond {
            match eval(cond, &child, diags) {
                Value::Bool(true) => {}
                Value::Bool(false) => continue,
                Value::Unknown(_) => {
                    unknown = true;
                    continue;
                }
                _ => {
                    diags.push(
                        Diagnostic::error(
                            "Invalid 'for' condition",
                            "The 'if' clause value is invalid: bool required.",
                        )
                        .with_subject(&cond.range),
                    );
                    return Value::unknown();
                }
            }
        }

        match &f.key_expr {
            None => tuple.push(eval(&f.value_expr, &child, diags)),
            Some(key_expr) => {
                let key = eval(key_expr, &child, diags);
                let value = eval(&f.value_expr, &child, diags);
                match key_string(&key) {
                    KeyString::Known(k) => {
                        if f.group {
                            groups.entry(k).or_default().push(value);
                        } else if object.contains_key(&k) {
                            diags.push(
                                Diagnostic::error(
                                    "Duplicate object key",
                                    format!(
                                        "Two different items produced the key {:?} in this 'for' expression. If duplicates are expected, use the ellipsis (...) after the value expression to enable grouping by key.",
                                        k
                                    ),
                                )
                                .with_subject(&key_expr.range)
                                .with_context(range),
                            );
                        } else {
                            object.insert(k, value);
                        }
                    }
                    KeyString::Unknown => unknown = true,
                    KeyString::Null => {
                        diags.push(
                            Diagnostic::error(
                                "Invalid object key",
                                "Key expression in 'for' expression must not produce a null value.",
                            )
                            .with_subject(&key_expr.range),
                        );
                    }
                    KeyString::Invalid => {
                        diags.push(
                            Diagnostic::error(
                                "Invalid object key",
                                "The key expression produced an invalid result: string required.",
                            )
                            .with_subject(&key_expr.range),
                        );
                    }
                }
            }
        }
    }

    if unknown {
        return Value::unknown();
    }
    if f.key_expr.is_none() {
        Value::Tuple(tuple)
    } else if f.group {
        Value::Object(
            groups
                .into_iter()
                .map(|(k, v)| (k, Value::Tuple(v)))
                .collect(),
        )
    } else {
        Value::Object(object)
    }
}

// ============================================================================
// Function Calls
// ============================================================================

fn eval_call(
    name: &str,
    args: &[Expr],
    expand_final: bool,
    name_range: &Range,
    range: &Range,
    scope: &Scope<'_>,
    diags: &mut Diagnostics,
) -> Value {
    match name {
        "try" => return eval_try(args, range, scope, diags),
        "can" => return eval_can(args, range, scope, diags),
        _ => {}
    }

    let Some(function) = scope.ctx.function(name) else {
        let detail = match find_similar_name(name, &scope.ctx.function_names()) {
            Some(s) => format!("There is no function named {:?}. Did you mean {:?}?", name, s),
            None => format!("There is no function named {:?}.", name),
        };
        diags.push(Diagnostic::error("Call to unknown function", detail).with_subject(name_range));
        return Value::unknown();
    };

    let mut values: Vec<Value> = Vec::with_capacity(args.len());
    let mut ranges: Vec<Range> = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let v = eval(arg, scope, diags);
        if expand_final && i == args.len() - 1 {
            match v {
                Value::Unknown(_) => return Value::unknown(),
                Value::Null(_) => {
                    diags.push(
                        Diagnostic::error(
                            "Invalid expanding argument value",
                            "The expanding argument (indicated by ...) must not be null.",
                        )
                        .with_subject(&arg.range),
                    );
                    return Value::unknown();
                }
                Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
                    for e in elems {
                        values.push(e);
                        ranges.push(arg.range.clone());
                    }
                }
                other => {
                    diags.push(
                        Diagnostic::error(
                            "Invalid expanding argument value",
                            format!(
                                "The expanding argument (indicated by ...) must be of a tuple, list, or set type, not {}.",
                                other.type_name()
                            ),
                        )
                        .with_subject(&arg.range),
                    );
                    return Value::unknown();
                }
            }
        } else {
            values.push(v);
            ranges.push(arg.range.clone());
        }
    }

    let params = function.params();
    if values.len() < params.len() {
        let missing = &params[values.len()];
        diags.push(
            Diagnostic::error(
                "Not enough function arguments",
                format!(
                    "Function {:?} expects {} argument(s). Missing value for {:?}.",
                    name,
                    params.len(),
                    missing.name
                ),
            )
            .with_subject(range),
        );
        return Value::unknown();
    }
    if values.len() > params.len() && function.variadic_param().is_none() {
        let extra = ranges
            .get(params.len())
            .cloned()
            .unwrap_or_else(|| range.clone());
        diags.push(
            Diagnostic::error(
                "Too many function arguments",
                format!("Function {:?} expects only {} argument(s).", name, params.len()),
            )
            .with_subject(&extra),
        );
        return Value::unknown();
    }

    match function.call(&values) {
        Ok(v) => v,
        Err(FunctionError::Arg { index, message }) => {
            let param_name = function
                .param_at(index)
                .map(|p| p.name)
                .unwrap_or("argument");
            diags.push(
                Diagnostic::error(
                    "Invalid function argument",
                    format!("Invalid value for {:?} parameter: {}.", param_name, message),
                )
                .with_subject(ranges.get(index).unwrap_or(range)),
            );
            Value::unknown()
        }
        Err(FunctionError::Call(message)) => {
            diags.push(
                Diagnostic::error(
                    "Error in function call",
                    format!("Call to function {:?} failed: {}.", name, message),
                )
                .with_subject(range),
            );
            Value::unknown()
        }
    }
}

fn eval_try(args: &[Expr], range: &Range, scope: &Scope<'_>, diags: &mut Diagnostics) -> Value {
    if args.is_empty() {
        diags.push(
            Diagnostic::error(
                "Not enough function arguments",
                "Function \"try\" expects at least one argument.",
            )
            .with_subject(range),
        );
        return Value::unknown();
    }
    let mut failures = Vec::new();
    for arg in args {
        let mut arg_diags = Diagnostics::new();
        let value = eval(arg, scope, &mut arg_diags);
        if !arg_diags.has_errors() {
            if !value.is_wholly_known() {
                return Value::unknown();
            }
            return value;
        }
        for d in arg_diags.errors() {
            let at = d
                .subject
                .as_ref()
                .map(|r| format!("\n  at {}", r))
                .unwrap_or_default();
            failures.push(format!("- {}{}", d.detail, at));
        }
    }
    diags.push(
        Diagnostic::error(
            "Error in function call",
            format!(
                "Call to function \"try\" failed: no expression succeeded:\n{}\n\nAt least one expression must produce a successful result.",
                failures.join("\n")
            ),
        )
        .with_subject(range),
    );
    Value::unknown()
}

fn eval_can(args: &[Expr], range: &Range, scope: &Scope<'_>, diags: &mut Diagnostics) -> Value {
    let [arg] = args else {
        diags.push(
            Diagnostic::error(
                "Incorrect function arguments",
                "Function \"can\" expects exactly one argument.",
            )
            .with_subject(range),
        );
        return Value::Unknown(Type::Bool);
    };
    let mut arg_diags = Diagnostics::new();
    let value = eval(arg, scope, &mut arg_diags);
    if arg_diags.has_errors() {
        return Value::Bool(false);
    }
    if !value.is_wholly_known() {
        return Value::Unknown(Type::Bool);
    }
    Value::Bool(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::base_functions;
    use crate::parser::parse_expression;
    use std::path::Path;

    fn ctx() -> EvalContext {
        let mut ctx = EvalContext::with_functions(Arc::new(base_functions(Path::new("/tmp"))));
        ctx.set_variable(
            "var",
            Value::object_from([
                ("name", Value::string("vault")),
                ("count", Value::number(3.0)),
                ("regions", Value::string_list(&["us-east-1", "us-west-2"])),
                (
                    "tags",
                    Value::map([("a".to_string(), Value::string("1"))].into_iter().collect()),
                ),
            ]),
        );
        ctx
    }

    fn eval_str(src: &str) -> (Value, Diagnostics) {
        let (expr, diags) = parse_expression(src, "test.hcl");
        assert!(!diags.has_errors(), "parse failed: {}", diags);
        expr.unwrap().value(&ctx())
    }

    fn eval_ok(src: &str) -> Value {
        let (v, diags) = eval_str(src);
        assert!(!diags.has_errors(), "{}: {}", src, diags);
        v
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        assert_eq!(eval_ok("1 + 2 * 3"), Value::number(7.0));
        assert_eq!(eval_ok("var.count % 2"), Value::number(1.0));
        assert_eq!(eval_ok("var.count > 2 && true"), Value::Bool(true));
        assert_eq!(eval_ok("\"a\" != \"b\""), Value::Bool(true));
        assert_eq!(eval_ok("-var.count"), Value::number(-3.0));
    }

    #[test]
    fn test_template_and_traversal() {
        assert_eq!(
            eval_ok("\"${var.name}-${var.regions[1]}\""),
            Value::string("vault-us-west-2")
        );
        assert_eq!(eval_ok("var.tags[\"a\"]"), Value::string("1"));
        assert_eq!(eval_ok("\"${var.count}\""), Value::number(3.0));
    }

    #[test]
    fn test_unknown_variable() {
        let (_, diags) = eval_str("vars.name");
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Unknown variable");
        assert!(diag.detail.contains("Did you mean \"var\"?"));
    }

    #[test]
    fn test_unsupported_attribute() {
        let (_, diags) = eval_str("var.nmae");
        assert_eq!(diags.iter().next().unwrap().summary, "Unsupported attribute");
    }

    #[test]
    fn test_conditional() {
        assert_eq!(eval_ok("var.count == 3 ? \"y\" : \"n\""), Value::string("y"));
        let (_, diags) = eval_str("\"x\" ? 1 : 2");
        assert_eq!(diags.iter().next().unwrap().summary, "Incorrect condition type");
    }

    #[test]
    fn test_for_expressions() {
        assert_eq!(
            eval_ok("[for r in var.regions : upper(r)]"),
            Value::tuple(vec![Value::string("US-EAST-1"), Value::string("US-WEST-2")])
        );
        assert_eq!(
            eval_ok("{ for i, r in var.regions : r => i if i > 0 }"),
            Value::object_from([("us-west-2", Value::number(1.0))])
        );
        assert_eq!(
            eval_ok("{ for r in [\"a\", \"b\", \"a\"] : r => r... }"),
            Value::object_from([
                ("a", Value::tuple(vec![Value::string("a"), Value::string("a")])),
                ("b", Value::tuple(vec![Value::string("b")])),
            ])
        );
    }

    #[test]
    fn test_splat() {
        assert_eq!(
            eval_ok("[{ id = 1 }, { id = 2 }][*].id"),
            Value::tuple(vec![Value::number(1.0), Value::number(2.0)])
        );
    }

    #[test]
    fn test_try_and_can() {
        assert_eq!(eval_ok("try(var.missing, \"fallback\")"), Value::string("fallback"));
        assert_eq!(eval_ok("can(var.missing)"), Value::Bool(false));
        assert_eq!(eval_ok("can(var.name)"), Value::Bool(true));
        let (_, diags) = eval_str("try(var.missing, var.also_missing)");
        assert!(diags.iter().next().unwrap().detail.contains("no expression succeeded"));
    }

    #[test]
    fn test_unknown_function() {
        let (_, diags) = eval_str("lenght(var.regions)");
        let diag = diags.iter().next().unwrap();
        assert_eq!(diag.summary, "Call to unknown function");
        assert!(diag.detail.contains("Did you mean \"length\"?"));
    }

    #[test]
    fn test_function_arity() {
        let (_, diags) = eval_str("upper()");
        assert_eq!(diags.iter().next().unwrap().summary, "Not enough function arguments");
        let (_, diags) = eval_str("upper(\"a\", \"b\")");
        assert_eq!(diags.iter().next().unwrap().summary, "Too many function arguments");
    }

    #[test]
    fn test_expand_final_argument() {
        assert_eq!(eval_ok("max([1, 5, 3]...)"), Value::number(5.0));
    }

    #[test]
    fn test_unknowns_propagate() {
        let mut ctx = ctx();
        ctx.set_variable("later", Value::unknown());
        let (expr, _) = parse_expression("later.id + 1", "test.hcl");
        let (v, diags) = expr.unwrap().value(&ctx);
        assert!(!diags.has_errors());
        assert_eq!(v, Value::Unknown(Type::Number));
    }

    #[test]
    fn test_child_context_shadows_parent() {
        let parent = Arc::new(ctx());
        let mut child = EvalContext::child_of(parent);
        child.set_variable("matrix", Value::object_from([("arch", Value::string("arm64"))]));
        let (expr, _) = parse_expression("\"${var.name}-${matrix.arch}\"", "test.hcl");
        let (v, diags) = expr.unwrap().value(&child);
        assert!(!diags.has_errors(), "{}", diags);
        assert_eq!(v, Value::string("vault-arm64"));
        assert!(child.function("upper").is_some());
    }
}

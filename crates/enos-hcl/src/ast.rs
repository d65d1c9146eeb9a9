// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Syntax tree for HCL native syntax.
//!
//! Bodies keep attributes and blocks in source order, and every node carries
//! the range it was parsed from so diagnostics can point at it.

use crate::diagnostics::Range;
use crate::traversal::{Traversal, Traverser};
use crate::value::Value;

/// A parsed configuration file.
#[derive(Debug, Clone)]
pub struct File {
    /// The file name given to the parser.
    pub filename: String,
    /// The top-level body.
    pub body: Body,
}

/// A sequence of attributes and blocks.
#[derive(Debug, Clone, Default)]
pub struct Body {
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
    /// Blocks in source order.
    pub blocks: Vec<Block>,
    /// The range of the whole body.
    pub range: Range,
    /// The closing range of the body, used for "missing" diagnostics.
    pub end_range: Range,
}

impl Body {
    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// A range suitable for reporting that something is missing from the body.
    pub fn missing_item_range(&self) -> Range {
        self.end_range.clone()
    }

    /// Merges several bodies into one, keeping each body's items in order.
    pub fn merge(bodies: impl IntoIterator<Item = Body>) -> Body {
        let mut merged = Body::default();
        let mut first = true;
        for body in bodies {
            if first {
                merged.range = body.range.clone();
                merged.end_range = body.end_range.clone();
                first = false;
            }
            merged.attributes.extend(body.attributes);
            merged.blocks.extend(body.blocks);
        }
        merged
    }
}

/// `name = expr`
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// The expression to the right of `=`.
    pub expr: Expr,
    /// The range of the name.
    pub name_range: Range,
    /// The range of the whole attribute.
    pub range: Range,
}

/// `type "label" { ... }`
#[derive(Debug, Clone)]
pub struct Block {
    /// The block type.
    pub type_name: String,
    /// Labels in order.
    pub labels: Vec<String>,
    /// The range of each label.
    pub label_ranges: Vec<Range>,
    /// The block body.
    pub body: Body,
    /// The range of the type name.
    pub type_range: Range,
    /// The range of the header (type name and labels).
    pub def_range: Range,
    /// The range of the whole block.
    pub range: Range,
}

/// An expression with its source range.
#[derive(Debug, Clone)]
pub struct Expr {
    /// What the expression is.
    pub kind: ExprKind,
    /// Where it is.
    pub range: Range,
}

/// Expression kinds.
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A literal value (`1`, `true`, `null`, or a template with no interpolations).
    Literal(Value),
    /// A string template with interpolations.
    Template(Vec<TemplateItem>),
    /// A template consisting of a single interpolation, which yields the raw value.
    TemplateWrap(Box<Expr>),
    /// `a.b[0].c`
    ScopeTraversal(Traversal),
    /// A traversal applied to the result of another expression.
    RelativeTraversal(Box<Expr>, Vec<Traverser>),
    /// `collection[key]` with a non-literal key.
    Index(Box<Expr>, Box<Expr>),
    /// `source.*.attr` or `source[*].attr`
    Splat(Box<Expr>, Vec<Traverser>),
    /// `name(args...)`
    FunctionCall {
        /// Function name.
        name: String,
        /// Arguments.
        args: Vec<Expr>,
        /// True if the final argument is followed by `...`.
        expand_final: bool,
        /// The range of the name.
        name_range: Range,
    },
    /// `cond ? a : b`
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `a op b`
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `op a`
    Unary(UnaryOp, Box<Expr>),
    /// `[a, b]`
    Tuple(Vec<Expr>),
    /// `{ k = v }`
    Object(Vec<ObjectItem>),
    /// `[for ...]` or `{for ...}`
    For(Box<ForExpr>),
    /// `( expr )`
    Parens(Box<Expr>),
}

/// One part of a template.
#[derive(Debug, Clone)]
pub enum TemplateItem {
    /// Literal text.
    Literal(String),
    /// An interpolated expression.
    Interp(Expr),
}

/// A key/value pair in an object constructor.
#[derive(Debug, Clone)]
pub struct ObjectItem {
    /// The key expression. A bare identifier parses as a literal string.
    pub key: Expr,
    /// The value expression.
    pub value: Expr,
}

/// A `for` expression.
#[derive(Debug, Clone)]
pub struct ForExpr {
    /// Name bound to the key or index, if two names were given.
    pub key_var: Option<String>,
    /// Name bound to the element value.
    pub value_var: String,
    /// The collection being iterated.
    pub collection: Expr,
    /// Key expression for object results.
    pub key_expr: Option<Expr>,
    /// Value expression.
    pub value_expr: Expr,
    /// Optional `if` filter.
    pub cond: Option<Expr>,
    /// True for `...` grouping mode in object results.
    pub group: bool,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal | BinaryOp::NotEqual => 3,
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => 4,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 6,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

impl Expr {
    /// Creates a literal expression.
    pub fn literal(value: Value, range: Range) -> Expr {
        Expr {
            kind: ExprKind::Literal(value),
            range,
        }
    }

    /// Strips parentheses and single-interpolation template wrappers.
    pub fn unwrap(&self) -> &Expr {
        match &self.kind {
            ExprKind::Parens(inner) | ExprKind::TemplateWrap(inner) => inner.unwrap(),
            _ => self,
        }
    }

    /// Interprets the expression as an absolute traversal, if it is one.
    pub fn as_abs_traversal(&self) -> Option<&Traversal> {
        match &self.unwrap().kind {
            ExprKind::ScopeTraversal(t) => Some(t),
            _ => None,
        }
    }

    /// Interprets a bare identifier (or a single-root traversal) as a keyword.
    pub fn as_keyword(&self) -> Option<&str> {
        match self.as_abs_traversal() {
            Some(t) if t.len() == 1 => t.root_name(),
            _ => None,
        }
    }

    /// Returns the expressions of a tuple constructor.
    pub fn as_tuple_exprs(&self) -> Option<&[Expr]> {
        match &self.unwrap().kind {
            ExprKind::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the items of an object constructor.
    pub fn as_object_items(&self) -> Option<&[ObjectItem]> {
        match &self.unwrap().kind {
            ExprKind::Object(items) => Some(items),
            _ => None,
        }
    }

    /// Every absolute traversal referenced anywhere in the expression.
    pub fn variables(&self) -> Vec<Traversal> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<Traversal>) {
        match &self.kind {
            ExprKind::Literal(_) => {}
            ExprKind::Template(items) => {
                for item in items {
                    if let TemplateItem::Interp(e) = item {
                        e.collect_variables(out);
                    }
                }
            }
            ExprKind::TemplateWrap(e) | ExprKind::Parens(e) | ExprKind::Unary(_, e) => {
                e.collect_variables(out)
            }
            ExprKind::ScopeTraversal(t) => out.push(t.clone()),
            ExprKind::RelativeTraversal(e, _) | ExprKind::Splat(e, _) => e.collect_variables(out),
            ExprKind::Index(a, b) | ExprKind::Binary(_, a, b) => {
                a.collect_variables(out);
                b.collect_variables(out);
            }
            ExprKind::FunctionCall { args, .. } => {
                for a in args {
                    a.collect_variables(out);
                }
            }
            ExprKind::Conditional(a, b, c) => {
                a.collect_variables(out);
                b.collect_variables(out);
                c.collect_variables(out);
            }
            ExprKind::Tuple(items) => {
                for e in items {
                    e.collect_variables(out);
                }
            }
            ExprKind::Object(items) => {
                for item in items {
                    item.key.collect_variables(out);
                    item.value.collect_variables(out);
                }
            }
            ExprKind::For(f) => {
                // Iterator variables are local to the for expression.
                let mut inner = Vec::new();
                f.collection.collect_variables(out);
                if let Some(k) = &f.key_expr {
                    k.collect_variables(&mut inner);
                }
                f.value_expr.collect_variables(&mut inner);
                if let Some(c) = &f.cond {
                    c.collect_variables(&mut inner);
                }
                out.extend(inner.into_iter().filter(|t| {
                    let root = t.root_name();
                    root != Some(f.value_var.as_str()) && root != f.key_var.as_deref()
                }));
            }
        }
    }
}

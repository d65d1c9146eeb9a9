// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Writes HCL documents with canonical formatting.
//!
//! Bodies are built up from attributes, nested blocks and blank lines, then
//! rendered with two-space indentation and the `=` of consecutive attributes
//! aligned:
//!
//! ```text
//! module "vpc" {
//!   source  = "../modules/vpc"
//!   version = "1.0.0"
//!
//!   cidr = "10.0.0.0/16"
//! }
//! ```

use crate::lexer::is_valid_identifier;
use crate::traversal::Traversal;
use crate::value::{Value, format_number};
use std::fmt::Write as _;

/// An expression to write as an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteExpr {
    /// A literal value.
    Value(Value),
    /// A reference such as `module.vpc.id`.
    Traversal(Traversal),
    /// Source text written as-is.
    Raw(String),
    /// A tuple of expressions.
    Tuple(Vec<WriteExpr>),
    /// An object of expressions, in the given order.
    Object(Vec<(String, WriteExpr)>),
}

impl From<Value> for WriteExpr {
    fn from(v: Value) -> Self {
        WriteExpr::Value(v)
    }
}

impl From<Traversal> for WriteExpr {
    fn from(t: Traversal) -> Self {
        WriteExpr::Traversal(t)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Attribute(String, WriteExpr),
    /// Index into the body's blocks.
    Block(usize),
    Newline,
}

/// A body under construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBody {
    items: Vec<Item>,
    blocks: Vec<WriteBlock>,
}

/// A block under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBlock {
    type_name: String,
    labels: Vec<String>,
    body: WriteBody,
}

impl WriteBlock {
    /// A new empty block.
    pub fn new(type_name: impl Into<String>, labels: &[&str]) -> Self {
        Self {
            type_name: type_name.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            body: WriteBody::default(),
        }
    }

    /// The block body.
    pub fn body_mut(&mut self) -> &mut WriteBody {
        &mut self.body
    }
}

impl WriteBody {
    /// An empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sets an attribute, replacing an existing one of the same name in place.
    pub fn set_attribute(&mut self, name: impl Into<String>, expr: impl Into<WriteExpr>) -> &mut Self {
        let name = name.into();
        let expr = expr.into();
        for item in &mut self.items {
            if let Item::Attribute(n, e) = item {
                if *n == name {
                    *e = expr;
                    return self;
                }
            }
        }
        self.items.push(Item::Attribute(name, expr));
        self
    }

    /// Sets an attribute to a literal value.
    pub fn set_attribute_value(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.set_attribute(name, WriteExpr::Value(value))
    }

    /// Sets an attribute to a reference.
    pub fn set_attribute_traversal(&mut self, name: impl Into<String>, traversal: Traversal) -> &mut Self {
        self.set_attribute(name, WriteExpr::Traversal(traversal))
    }

    /// Appends a new block and returns its body.
    pub fn append_new_block(&mut self, type_name: impl Into<String>, labels: &[&str]) -> &mut WriteBody {
        let index = self.push_block(WriteBlock::new(type_name, labels));
        &mut self.blocks[index].body
    }

    /// Appends an existing block.
    pub fn append_block(&mut self, block: WriteBlock) -> &mut Self {
        self.push_block(block);
        self
    }

    fn push_block(&mut self, block: WriteBlock) -> usize {
        self.blocks.push(block);
        let index = self.blocks.len() - 1;
        self.items.push(Item::Block(index));
        index
    }

    /// Appends a blank line.
    pub fn append_newline(&mut self) -> &mut Self {
        self.items.push(Item::Newline);
        self
    }

    fn render(&self, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        let mut i = 0;
        while i < self.items.len() {
            match &self.items[i] {
                Item::Newline => {
                    out.push('\n');
                    i += 1;
                }
                Item::Block(index) => {
                    // Blocks following attributes are separated by a blank line.
                    if i > 0 && matches!(self.items[i - 1], Item::Attribute(..)) {
                        out.push('\n');
                    }
                    self.blocks[*index].render(indent, out);
                    if matches!(self.items.get(i + 1), Some(Item::Attribute(..) | Item::Block(_))) {
                        out.push('\n');
                    }
                    i += 1;
                }
                Item::Attribute(..) => {
                    let run_end = self.items[i..]
                        .iter()
                        .position(|it| !matches!(it, Item::Attribute(..)))
                        .map_or(self.items.len(), |p| i + p);
                    let width = self.items[i..run_end]
                        .iter()
                        .map(|it| match it {
                            Item::Attribute(n, _) => attr_name(n).chars().count(),
                            _ => 0,
                        })
                        .max()
                        .unwrap_or(0);
                    for item in &self.items[i..run_end] {
                        if let Item::Attribute(name, expr) = item {
                            let name = attr_name(name);
                            let _ = write!(out, "{}{:<width$} = ", pad, name, width = width);
                            write_expr(expr, indent, out);
                            out.push('\n');
                        }
                    }
                    i = run_end;
                }
            }
        }
    }

    /// Renders the body as a document.
    pub fn to_hcl(&self) -> String {
        let mut out = String::new();
        self.render(0, &mut out);
        out
    }
}

impl WriteBlock {
    fn render(&self, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        out.push_str(&pad);
        out.push_str(&self.type_name);
        for label in &self.labels {
            out.push(' ');
            out.push_str(&quote(label));
        }
        if self.body.is_empty() {
            out.push_str(" {\n");
            out.push_str(&pad);
            out.push_str("}\n");
            return;
        }
        out.push_str(" {\n");
        self.body.render(indent + 1, out);
        out.push_str(&pad);
        out.push_str("}\n");
    }
}

fn attr_name(name: &str) -> String {
    if is_valid_identifier(name) {
        name.to_string()
    } else {
        quote(name)
    }
}

/// Quotes and escapes a string literal, including template sequences.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    let chars: Vec<char> = s.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.get(i + 1) == Some(&'{') => {
                out.push(*c);
                out.push(*c);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", *c as u32);
            }
            c => out.push(*c),
        }
    }
    out.push('"');
    out
}

fn write_expr(expr: &WriteExpr, indent: usize, out: &mut String) {
    match expr {
        WriteExpr::Value(v) => write_value(v, indent, out),
        WriteExpr::Traversal(t) => {
            let _ = write!(out, "{}", t);
        }
        WriteExpr::Raw(s) => out.push_str(s),
        WriteExpr::Tuple(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(item, indent, out);
            }
            out.push(']');
        }
        WriteExpr::Object(items) => {
            if items.is_empty() {
                out.push_str("{}");
                return;
            }
            let pad = "  ".repeat(indent + 1);
            let width = items.iter().map(|(k, _)| attr_name(k).chars().count()).max().unwrap_or(0);
            out.push_str("{\n");
            for (k, v) in items {
                let _ = write!(out, "{}{:<width$} = ", pad, attr_name(k), width = width);
                write_expr(v, indent + 1, out);
                out.push('\n');
            }
            out.push_str(&"  ".repeat(indent));
            out.push('}');
        }
    }
}

fn write_value(v: &Value, indent: usize, out: &mut String) {
    match v {
        Value::Null(_) | Value::Unknown(_) | Value::Capsule(_) => out.push_str("null"),
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::String(s) => out.push_str(&quote(s)),
        Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
            out.push('[');
            for (i, e) in elems.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(e, indent, out);
            }
            out.push(']');
        }
        Value::Map(_, entries) | Value::Object(entries) => {
            if entries.is_empty() {
                out.push_str("{}");
                return;
            }
            let pad = "  ".repeat(indent + 1);
            let width = entries.keys().map(|k| attr_name(k).chars().count()).max().unwrap_or(0);
            out.push_str("{\n");
            for (k, e) in entries {
                let _ = write!(out, "{}{:<width$} = ", pad, attr_name(k), width = width);
                write_value(e, indent + 1, out);
                out.push('\n');
            }
            out.push_str(&"  ".repeat(indent));
            out.push('}');
        }
    }
}

/// Renders a value as an HCL expression.
pub fn value_to_hcl(v: &Value) -> String {
    let mut out = String::new();
    write_value(v, 0, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Range;
    use crate::traversal::Traverser;
    use std::collections::BTreeMap;

    fn traversal(parts: &[&str]) -> Traversal {
        let mut steps = vec![Traverser::Root(parts[0].to_string(), Range::default())];
        steps.extend(parts[1..].iter().map(|p| Traverser::Attr(p.to_string(), Range::default())));
        Traversal(steps)
    }

    #[test]
    fn test_module_block_alignment() {
        let mut file = WriteBody::new();
        {
            let body = file.append_new_block("module", &["vpc"]);
            body.set_attribute_value("source", Value::string("../modules/vpc"));
            body.set_attribute_value("version", Value::string("1.0.0"));
        }
        file.append_newline();
        {
            let body = file.append_new_block("module", &["app"]);
            body.set_attribute(
                "depends_on",
                WriteExpr::Tuple(vec![WriteExpr::Traversal(traversal(&["module", "vpc"]))]),
            );
            body.set_attribute_value("source", Value::string("./app"));
            body.append_newline();
            body.set_attribute_traversal("vpc_id", traversal(&["module", "vpc", "id"]));
        }
        let expected = "module \"vpc\" {\n  source  = \"../modules/vpc\"\n  version = \"1.0.0\"\n}\n\nmodule \"app\" {\n  depends_on = [module.vpc]\n  source     = \"./app\"\n\n  vpc_id = module.vpc.id\n}\n";
        assert_eq!(file.to_hcl(), expected);
    }

    #[test]
    fn test_values() {
        let mut obj = BTreeMap::new();
        obj.insert("a".to_string(), Value::string("x${y}"));
        obj.insert("bb-c".to_string(), Value::string_list(&["1", "2"]));
        obj.insert("n".to_string(), Value::number(1.5));
        let got = value_to_hcl(&Value::Object(obj));
        assert_eq!(got, "{\n  a    = \"x$${y}\"\n  bb-c = [\"1\", \"2\"]\n  n    = 1.5\n}");
        assert_eq!(value_to_hcl(&Value::string("a\"b\n")), "\"a\\\"b\\n\"");
    }

    #[test]
    fn test_set_attribute_replaces_in_place() {
        let mut body = WriteBody::new();
        body.set_attribute_value("a", Value::Bool(true));
        body.set_attribute_value("b", Value::Bool(true));
        body.set_attribute_value("a", Value::Bool(false));
        assert_eq!(body.to_hcl(), "a = false\nb = true\n");
    }

    #[test]
    fn test_nested_blocks() {
        let mut file = WriteBody::new();
        let tf = file.append_new_block("terraform", &[]);
        tf.set_attribute_value("required_version", Value::string(">= 1.2.0"));
        let backend = tf.append_new_block("backend", &["local"]);
        backend.set_attribute_value("path", Value::string("state"));
        let expected = "terraform {\n  required_version = \">= 1.2.0\"\n\n  backend \"local\" {\n    path = \"state\"\n  }\n}\n";
        assert_eq!(file.to_hcl(), expected);
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Enos HCL - Configuration Language Runtime
//!
//! This crate parses, evaluates and writes the HCL dialect used by enos flight
//! plans. It carries its own dynamic value system so that decoded configuration
//! can flow through expressions, functions and generated Terraform modules
//! without losing type information.
//!
//! # Pipeline
//!
//! ```text
//!   source text ──► lexer ──► parser ──► AST (File / Body / Expr)
//!                                            │
//!                      schema ◄──────────────┤  content extraction
//!                                            ▼
//!              EvalContext + FunctionTable ──► Value + Diagnostics
//!                                            │
//!                                            ▼
//!                                 writer (canonical HCL text)
//! ```
//!
//! Every stage reports problems as [`Diagnostics`] with source ranges rather
//! than failing outright, so callers can surface as many problems as possible
//! in one pass.
//!
//! # Values
//!
//! | Kind | Notes |
//! |------|-------|
//! | `string`, `number`, `bool` | Primitives. Numbers are `f64`. |
//! | `null`, unknown | Both carry a type. Unknowns propagate through operations. |
//! | `list`, `set`, `map` | Homogeneous collections with an element type. |
//! | `object`, `tuple` | Structural values. |
//! | capsule | Opaque host values, compared with the payload's `PartialEq`. |
//!
//! # Modules
//!
//! - [`diagnostics`]: Source positions, ranges and diagnostics
//! - [`value`]: The dynamic value system and its types
//! - [`convert`]: Value conversion to a type constraint
//! - [`lexer`]: Tokenizer with template and heredoc support
//! - [`parser`]: Recursive descent parser producing the AST
//! - [`ast`]: Files, bodies, blocks, attributes and expressions
//! - [`traversal`]: Absolute and relative traversals (`a.b[0]`)
//! - [`schema`]: Schema-driven body content extraction
//! - [`eval`]: Expression evaluation against an [`EvalContext`]
//! - [`functions`]: The function library
//! - [`typeexpr`]: Type constraint expressions
//! - [`writer`]: Canonical HCL output

#![deny(missing_docs)]

/// Expression and block syntax tree.
pub mod ast;

/// Conversion of values to type constraints.
pub mod convert;

/// Diagnostics with source ranges.
pub mod diagnostics;

/// Expression evaluation.
pub mod eval;

/// Functions callable from expressions.
pub mod functions;

/// Tokenizer.
pub mod lexer;

/// Parser producing the syntax tree.
pub mod parser;

/// Schema-driven body decoding.
pub mod schema;

/// Traversals over values.
pub mod traversal;

/// Type constraint expressions.
pub mod typeexpr;

/// The dynamic value system.
pub mod value;

/// Canonical HCL writer.
pub mod writer;

// Re-export commonly used types
pub use ast::{Attribute, Block, Body, Expr, ExprKind, File};
pub use convert::{ConvertError, convert};
pub use diagnostics::{Diagnostic, Diagnostics, Pos, Range, Severity};
pub use eval::EvalContext;
pub use functions::{Function, FunctionError, FunctionTable, Param, base_functions};
pub use parser::{parse, parse_expression};
pub use schema::{AttributeSchema, BlockHeaderSchema, BodyContent, BodySchema, find_similar_name};
pub use traversal::{Traversal, Traverser};
pub use typeexpr::type_constraint;
pub use value::{Capsule, Type, Value};
pub use writer::{WriteBlock, WriteBody, WriteExpr};

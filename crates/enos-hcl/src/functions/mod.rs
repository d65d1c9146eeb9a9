// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The function library available to configuration expressions.
//!
//! Every function declares its parameters with a type. Arguments are converted
//! to the parameter type before the implementation runs, so implementations
//! only deal with well-typed values. Unless a parameter opts in, null
//! arguments are rejected and unknown arguments short-circuit the call to an
//! unknown result.

mod collection;
mod datetime;
mod encoding;
mod filesystem;
mod numeric;
mod semver;
mod string;

pub use encoding::{json_to_value, value_to_json};
pub use semver::{Version, VersionConstraints};

use crate::convert::convert;
use crate::value::{Type, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Why a function call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FunctionError {
    /// A specific argument is invalid.
    #[error("argument {index}: {message}")]
    Arg {
        /// Zero-based argument index.
        index: usize,
        /// What is wrong with it.
        message: String,
    },
    /// The call as a whole failed.
    #[error("{0}")]
    Call(String),
}

impl FunctionError {
    /// An error about the argument at `index`.
    pub fn arg(index: usize, message: impl Into<String>) -> Self {
        FunctionError::Arg {
            index,
            message: message.into(),
        }
    }

    /// An error about the call.
    pub fn call(message: impl Into<String>) -> Self {
        FunctionError::Call(message.into())
    }
}

/// A declared function parameter.
#[derive(Debug, Clone)]
pub struct Param {
    /// Name used in error messages.
    pub name: &'static str,
    /// Arguments are converted to this type.
    pub ty: Type,
    /// Whether null arguments are passed through.
    pub allow_null: bool,
    /// Whether unknown arguments are passed through instead of short-circuiting.
    pub allow_unknown: bool,
}

impl Param {
    /// A parameter of the given type.
    pub fn new(name: &'static str, ty: Type) -> Self {
        Self {
            name,
            ty,
            allow_null: false,
            allow_unknown: false,
        }
    }

    /// Permits null arguments.
    pub fn allow_null(mut self) -> Self {
        self.allow_null = true;
        self
    }

    /// Permits unknown arguments.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown = true;
        self
    }
}

type FunctionImpl = Arc<dyn Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync>;

/// A callable function.
#[derive(Clone)]
pub struct Function {
    params: Vec<Param>,
    variadic: Option<Param>,
    imp: FunctionImpl,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish()
    }
}

impl Function {
    /// A function with fixed parameters.
    pub fn new<F>(params: Vec<Param>, imp: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        Self {
            params,
            variadic: None,
            imp: Arc::new(imp),
        }
    }

    /// Accepts any number of trailing arguments matching `param`.
    pub fn variadic(mut self, param: Param) -> Self {
        self.variadic = Some(param);
        self
    }

    /// The fixed parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// The variadic parameter, if any.
    pub fn variadic_param(&self) -> Option<&Param> {
        self.variadic.as_ref()
    }

    /// The parameter that argument `index` binds to.
    pub fn param_at(&self, index: usize) -> Option<&Param> {
        self.params.get(index).or(self.variadic.as_ref())
    }

    /// Checks and converts arguments, then calls the implementation.
    pub fn call(&self, args: &[Value]) -> Result<Value, FunctionError> {
        if args.len() < self.params.len()
            || (self.variadic.is_none() && args.len() > self.params.len())
        {
            return Err(FunctionError::call(format!(
                "wrong number of arguments: expected {}, got {}",
                self.params.len(),
                args.len()
            )));
        }

        let mut converted = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let Some(param) = self.param_at(i) else {
                return Err(FunctionError::arg(i, "unexpected argument"));
            };
            if arg.is_null() && !param.allow_null {
                return Err(FunctionError::arg(i, "argument must not be null"));
            }
            if !arg.is_wholly_known() && !param.allow_unknown {
                return Ok(Value::unknown());
            }
            let value = convert(arg, &param.ty).map_err(|e| FunctionError::arg(i, e.to_string()))?;
            converted.push(value);
        }

        (self.imp)(&converted)
    }
}

/// Functions by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable(BTreeMap<String, Function>);

impl FunctionTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a function.
    pub fn insert(&mut self, name: impl Into<String>, function: Function) {
        self.0.insert(name.into(), function);
    }

    /// Looks up a function.
    pub fn get(&self, name: &str) -> Option<&Function> {
        self.0.get(name)
    }

    /// Function names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of functions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The standard function library. Filesystem functions resolve relative
/// paths against `base_dir`.
pub fn base_functions(base_dir: &Path) -> FunctionTable {
    let mut table = FunctionTable::new();
    collection::register(&mut table);
    datetime::register(&mut table);
    encoding::register(&mut table);
    filesystem::register(&mut table, base_dir);
    numeric::register(&mut table);
    semver::register(&mut table);
    string::register(&mut table);
    table
}

// ============================================================================
// Helpers shared by the implementations
// ============================================================================

pub(crate) fn str_at(args: &[Value], i: usize) -> &str {
    args.get(i).and_then(Value::as_str).unwrap_or_default()
}

pub(crate) fn num_at(args: &[Value], i: usize) -> f64 {
    args.get(i).and_then(Value::as_f64).unwrap_or_default()
}

pub(crate) fn int_at(args: &[Value], i: usize, what: &str) -> Result<i64, FunctionError> {
    let n = num_at(args, i);
    if n.fract() != 0.0 {
        return Err(FunctionError::arg(i, format!("{} must be a whole number", what)));
    }
    Ok(n as i64)
}

pub(crate) fn elems_at(args: &[Value], i: usize) -> Result<&[Value], FunctionError> {
    args.get(i)
        .and_then(Value::as_value_slice)
        .ok_or_else(|| FunctionError::arg(i, "must be a list, set, or tuple"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_converts_and_checks() {
        let f = Function::new(vec![Param::new("n", Type::Number)], |args| {
            Ok(Value::number(num_at(args, 0) * 2.0))
        });
        assert_eq!(f.call(&[Value::string("21")]).unwrap(), Value::number(42.0));
        assert!(matches!(
            f.call(&[Value::null()]),
            Err(FunctionError::Arg { index: 0, .. })
        ));
        assert_eq!(f.call(&[Value::unknown()]).unwrap(), Value::unknown());
        assert!(f.call(&[]).is_err());
    }

    #[test]
    fn test_base_functions_registered() {
        let table = base_functions(Path::new("/tmp"));
        for name in [
            "abspath", "alltrue", "base64encode", "concat", "file", "format", "join", "jsonencode",
            "length", "max", "merge", "semverconstraint", "split", "timestamp", "upper", "zipmap",
        ] {
            assert!(table.get(name).is_some(), "missing function {}", name);
        }
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Type constraint expressions such as `list(string)` or `object({ a = number })`.

use crate::ast::{Expr, ExprKind};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::value::Type;
use std::collections::BTreeMap;

fn invalid(expr: &Expr, detail: impl Into<String>) -> Diagnostics {
    Diagnostic::error("Invalid type specification", detail)
        .with_subject(&expr.range)
        .into()
}

/// Interprets an expression as a type constraint.
pub fn type_constraint(expr: &Expr) -> Result<Type, Diagnostics> {
    parse_type(expr, false)
}

fn parse_type(expr: &Expr, in_object: bool) -> Result<Type, Diagnostics> {
    if let Some(keyword) = expr.as_keyword() {
        return match keyword {
            "string" => Ok(Type::String),
            "number" => Ok(Type::Number),
            "bool" => Ok(Type::Bool),
            "any" => Ok(Type::Dynamic),
            "list" | "set" | "map" | "tuple" | "object" => Err(invalid(
                expr,
                format!("The {} type constructor requires one argument specifying the element type.", keyword),
            )),
            other => Err(invalid(expr, format!("The keyword {:?} is not a valid type specification.", other))),
        };
    }

    let ExprKind::FunctionCall { name, args, .. } = &expr.unwrap().kind else {
        return Err(invalid(expr, "A type specification is either a primitive type keyword (bool, number, string) or a complex type constructor call, like list(string)."));
    };

    let [arg] = args.as_slice() else {
        return Err(invalid(expr, format!("The {} type constructor requires one argument.", name)));
    };

    match name.as_str() {
        "list" => Ok(Type::list(parse_type(arg, false)?)),
        "set" => Ok(Type::set(parse_type(arg, false)?)),
        "map" => Ok(Type::map(parse_type(arg, false)?)),
        "optional" if in_object => Ok(Type::Optional(Box::new(parse_type(arg, false)?))),
        "optional" => Err(invalid(expr, "Keyword \"optional\" is valid only as a modifier for object type attributes.")),
        "tuple" => {
            let Some(items) = arg.as_tuple_exprs() else {
                return Err(invalid(arg, "The tuple type constructor requires a list of element types."));
            };
            let mut elems = Vec::with_capacity(items.len());
            for item in items {
                elems.push(parse_type(item, false)?);
            }
            Ok(Type::Tuple(elems))
        }
        "object" => {
            let Some(items) = arg.as_object_items() else {
                return Err(invalid(arg, "The object type constructor requires an object of attribute types."));
            };
            let mut attrs = BTreeMap::new();
            for item in items {
                let key = match (&item.key.unwrap().kind, item.key.as_keyword()) {
                    (ExprKind::Literal(v), _) => v.as_str().map(str::to_string),
                    (_, Some(k)) => Some(k.to_string()),
                    _ => None,
                };
                let Some(key) = key else {
                    return Err(invalid(&item.key, "Object constructor map keys must be attribute names."));
                };
                attrs.insert(key, parse_type(&item.value, true)?);
            }
            Ok(Type::Object(attrs))
        }
        other => Err(invalid(expr, format!("Keyword {:?} is not a valid type constructor.", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;

    fn ty(src: &str) -> Result<Type, Diagnostics> {
        let (expr, diags) = parse_expression(src, "type.hcl");
        assert!(!diags.has_errors(), "{}", diags);
        type_constraint(&expr.unwrap())
    }

    #[test]
    fn test_primitives_and_collections() {
        assert_eq!(ty("string").unwrap(), Type::String);
        assert_eq!(ty("any").unwrap(), Type::Dynamic);
        assert_eq!(ty("list(number)").unwrap(), Type::list(Type::Number));
        assert_eq!(ty("map(set(bool))").unwrap(), Type::map(Type::set(Type::Bool)));
        assert_eq!(
            ty("tuple([string, number])").unwrap(),
            Type::Tuple(vec![Type::String, Type::Number])
        );
    }

    #[test]
    fn test_object_with_optional() {
        let got = ty("object({ name = string, size = optional(number) })").unwrap();
        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), Type::String);
        attrs.insert("size".to_string(), Type::Optional(Box::new(Type::Number)));
        assert_eq!(got, Type::Object(attrs));
    }

    #[test]
    fn test_invalid_types() {
        assert!(ty("strin").is_err());
        assert!(ty("list").is_err());
        assert!(ty("optional(string)").is_err());
        assert!(ty("\"string\"").is_err());
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Type conversion and unification.

use crate::value::{Type, Value, format_number};
use std::collections::BTreeMap;

/// Why a value could not be converted to a type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{prefix}{message}", prefix = path_prefix(.path))]
pub struct ConvertError {
    /// Attribute names and indexes leading to the failing nested value.
    pub path: Vec<String>,
    /// What went wrong.
    pub message: String,
}

fn path_prefix(path: &[String]) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{}: ", path.join(""))
    }
}

impl ConvertError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    fn at(mut self, step: String) -> Self {
        self.path.insert(0, step);
        self
    }
}

/// Converts `value` so that it conforms to `want`.
///
/// Nulls and unknowns convert to nulls and unknowns of the wanted type.
/// Primitives convert between each other where the string form is valid.
/// Structural and collection types convert element by element.
pub fn convert(value: &Value, want: &Type) -> Result<Value, ConvertError> {
    match want {
        Type::Dynamic => return Ok(value.clone()),
        Type::Optional(inner) => return convert(value, inner),
        _ => {}
    }

    match value {
        Value::Null(_) => return Ok(Value::Null(want.clone())),
        Value::Unknown(_) => return Ok(Value::Unknown(want.clone())),
        _ => {}
    }

    match want {
        Type::String => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(format_number(*n))),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            _ => Err(ConvertError::new("string required")),
        },
        Type::Number => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite() && !s.trim().is_empty())
                .map(Value::Number)
                .ok_or_else(|| ConvertError::new("a number is required")),
            _ => Err(ConvertError::new("number required")),
        },
        Type::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            Value::String(_) => Err(ConvertError::new("a bool is required")),
            _ => Err(ConvertError::new("bool required")),
        },
        Type::List(elem) | Type::Set(elem) => {
            let Some(elems) = value.as_value_slice() else {
                return Err(ConvertError::new(format!(
                    "{} required",
                    want.friendly_name()
                )));
            };
            let mut out = Vec::with_capacity(elems.len());
            for (i, e) in elems.iter().enumerate() {
                out.push(convert(e, elem).map_err(|err| err.at(format!("[{}]", i)))?);
            }
            let (elem_ty, out) = if **elem == Type::Dynamic {
                unify_converted(out)?
            } else {
                ((**elem).clone(), out)
            };
            if matches!(want, Type::Set(_)) {
                Ok(Value::set_of(elem_ty, out))
            } else {
                Ok(Value::List(elem_ty, out))
            }
        }
        Type::Map(elem) => {
            let Some(entries) = value.as_value_map() else {
                return Err(ConvertError::new(format!(
                    "{} required",
                    want.friendly_name()
                )));
            };
            let mut keys = Vec::with_capacity(entries.len());
            let mut vals = Vec::with_capacity(entries.len());
            for (k, e) in entries {
                keys.push(k.clone());
                vals.push(convert(e, elem).map_err(|err| err.at(format!("[{:?}]", k)))?);
            }
            let (elem_ty, vals) = if **elem == Type::Dynamic {
                unify_converted(vals)?
            } else {
                ((**elem).clone(), vals)
            };
            Ok(Value::Map(elem_ty, keys.into_iter().zip(vals).collect()))
        }
        Type::Object(attrs) => {
            let Some(entries) = value.as_value_map() else {
                return Err(ConvertError::new("object required"));
            };
            for k in entries.keys() {
                if !attrs.contains_key(k) {
                    return Err(ConvertError::new(format!("unsupported attribute {:?}", k)));
                }
            }
            let mut out = BTreeMap::new();
            for (name, attr_ty) in attrs {
                match entries.get(name) {
                    Some(v) => {
                        out.insert(
                            name.clone(),
                            convert(v, attr_ty).map_err(|err| err.at(format!(".{}", name)))?,
                        );
                    }
                    None => match attr_ty {
                        Type::Optional(inner) => {
                            out.insert(name.clone(), Value::Null((**inner).clone()));
                        }
                        _ => {
                            return Err(ConvertError::new(format!(
                                "attribute {:?} is required",
                                name
                            )));
                        }
                    },
                }
            }
            Ok(Value::Object(out))
        }
        Type::Tuple(types) => {
            let Some(elems) = value.as_value_slice() else {
                return Err(ConvertError::new("tuple required"));
            };
            if elems.len() != types.len() {
                return Err(ConvertError::new(format!(
                    "tuple required with {} elements",
                    types.len()
                )));
            }
            let mut out = Vec::with_capacity(elems.len());
            for (i, (e, t)) in elems.iter().zip(types).enumerate() {
                out.push(convert(e, t).map_err(|err| err.at(format!("[{}]", i)))?);
            }
            Ok(Value::Tuple(out))
        }
        Type::Capsule(name) => match value {
            Value::Capsule(c) if c.type_name() == *name => Ok(value.clone()),
            _ => Err(ConvertError::new(format!("{} required", name))),
        },
        Type::Dynamic | Type::Optional(_) => Ok(value.clone()),
    }
}

fn unify_converted(vals: Vec<Value>) -> Result<(Type, Vec<Value>), ConvertError> {
    if vals.is_empty() {
        return Ok((Type::Dynamic, vals));
    }
    let types: Vec<Type> = vals.iter().map(Value::ty).collect();
    let Some(unified) = unify(&types) else {
        return Err(ConvertError::new("all elements must have the same type"));
    };
    let mut out = Vec::with_capacity(vals.len());
    for (i, v) in vals.iter().enumerate() {
        out.push(convert(v, &unified).map_err(|err| err.at(format!("[{}]", i)))?);
    }
    Ok((unified, out))
}

/// Finds a single type every one of `types` can convert to.
///
/// Returns `None` when no such type exists. Primitive mixes unify to string;
/// objects unify to a map when their attributes differ; collections unify
/// element-wise.
pub fn unify(types: &[Type]) -> Option<Type> {
    let concrete: Vec<&Type> = types.iter().filter(|t| **t != Type::Dynamic).collect();
    let Some(first) = concrete.first() else {
        return Some(Type::Dynamic);
    };
    if concrete.iter().all(|t| t == first) {
        return Some((*first).clone());
    }

    if concrete.iter().all(|t| t.is_primitive()) {
        return Some(Type::String);
    }

    if concrete
        .iter()
        .all(|t| matches!(t, Type::Object(_) | Type::Map(_)))
    {
        // Objects with identical attribute names unify attribute-wise.
        if let Type::Object(first_attrs) = first {
            let same_shape = concrete.iter().all(|t| match t {
                Type::Object(a) => a.keys().eq(first_attrs.keys()),
                _ => false,
            });
            if same_shape {
                let mut attrs = BTreeMap::new();
                for name in first_attrs.keys() {
                    let attr_types: Vec<Type> = concrete
                        .iter()
                        .filter_map(|t| match t {
                            Type::Object(a) => a.get(name).cloned(),
                            _ => None,
                        })
                        .collect();
                    attrs.insert(name.clone(), unify(&attr_types)?);
                }
                return Some(Type::Object(attrs));
            }
        }
        let mut elem_types = Vec::new();
        for t in &concrete {
            match t {
                Type::Object(a) => elem_types.extend(a.values().cloned()),
                Type::Map(e) => elem_types.push((**e).clone()),
                _ => {}
            }
        }
        let elem = unify(&elem_types)?;
        return Some(Type::map(elem));
    }

    if concrete
        .iter()
        .all(|t| matches!(t, Type::List(_) | Type::Tuple(_)))
    {
        let mut elem_types = Vec::new();
        for t in &concrete {
            match t {
                Type::Tuple(e) => elem_types.extend(e.iter().cloned()),
                Type::List(e) => elem_types.push((**e).clone()),
                _ => {}
            }
        }
        let elem = unify(&elem_types)?;
        return Some(Type::list(elem));
    }

    if concrete.iter().all(|t| matches!(t, Type::Set(_))) {
        let elem_types: Vec<Type> = concrete
            .iter()
            .filter_map(|t| t.element_type().cloned())
            .collect();
        return Some(Type::set(unify(&elem_types)?));
    }

    None
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Encoding functions and the JSON value bridge.

use super::{Function, FunctionError, FunctionTable, Param, str_at};
use crate::value::{Type, Value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;

pub(super) fn register(table: &mut FunctionTable) {
    let s = |name| Param::new(name, Type::String);

    table.insert("base64encode", Function::new(vec![s("str")], |a| {
        Ok(Value::string(STANDARD.encode(str_at(a, 0))))
    }));
    table.insert("base64decode", Function::new(vec![s("str")], |a| decode_utf8(str_at(a, 0))));
    table.insert(
        "textencodebase64",
        Function::new(vec![s("string"), s("encoding")], |a| {
            check_encoding(str_at(a, 1))?;
            Ok(Value::string(STANDARD.encode(str_at(a, 0))))
        }),
    );
    table.insert(
        "textdecodebase64",
        Function::new(vec![s("source"), s("encoding")], |a| {
            check_encoding(str_at(a, 1))?;
            decode_utf8(str_at(a, 0))
        }),
    );
    table.insert(
        "jsonencode",
        Function::new(vec![Param::new("val", Type::Dynamic).allow_null()], |a| {
            serde_json::to_string(&value_to_json(&a[0]))
                .map(Value::string)
                .map_err(|e| FunctionError::call(e.to_string()))
        }),
    );
    table.insert("jsondecode", Function::new(vec![s("str")], |a| {
        let json: serde_json::Value = serde_json::from_str(str_at(a, 0))
            .map_err(|e| FunctionError::arg(0, format!("invalid JSON: {}", e)))?;
        Ok(json_to_value(&json))
    }));
    table.insert("urlencode", Function::new(vec![s("str")], |a| Ok(Value::string(urlencode(str_at(a, 0))))));
}

fn check_encoding(name: &str) -> Result<(), FunctionError> {
    match name.to_ascii_uppercase().replace('-', "").as_str() {
        "UTF8" => Ok(()),
        _ => Err(FunctionError::arg(1, format!("{:?} is not a supported IANA encoding name or alias", name))),
    }
}

fn decode_utf8(encoded: &str) -> Result<Value, FunctionError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| FunctionError::arg(0, format!("failed to decode base64 data: {}", e)))?;
    String::from_utf8(bytes)
        .map(Value::string)
        .map_err(|_| FunctionError::arg(0, "the result of decoding the provided string is not valid UTF-8"))
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Converts a value to JSON. Unknown values and capsules become null.
pub fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null(_) | Value::Unknown(_) | Value::Capsule(_) => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                serde_json::Value::from(*n as i64)
            } else {
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::List(_, elems) | Value::Set(_, elems) | Value::Tuple(elems) => {
            serde_json::Value::Array(elems.iter().map(value_to_json).collect())
        }
        Value::Map(_, entries) | Value::Object(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Converts JSON to a value. Arrays become tuples and objects become objects.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::null(),
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => Value::Tuple(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
        let mut t = FunctionTable::new();
        register(&mut t);
        t.get(name).unwrap().call(&args)
    }

    #[test]
    fn test_base64() {
        let enc = call("base64encode", vec![Value::string("hello")]).unwrap();
        assert_eq!(enc, Value::string("aGVsbG8="));
        assert_eq!(call("base64decode", vec![enc]).unwrap(), Value::string("hello"));
        assert!(call("base64decode", vec![Value::string("!!")]).is_err());
    }

    #[test]
    fn test_text_base64_encodings() {
        assert!(call("textencodebase64", vec![Value::string("x"), Value::string("UTF-8")]).is_ok());
        assert!(call("textencodebase64", vec![Value::string("x"), Value::string("UTF-16LE")]).is_err());
    }

    #[test]
    fn test_json_roundtrip_shapes() {
        let v = Value::object_from([
            ("n", Value::number(1.0)),
            ("l", Value::string_list(&["a"])),
            ("z", Value::null()),
        ]);
        let enc = call("jsonencode", vec![v]).unwrap();
        assert_eq!(enc, Value::string(r#"{"l":["a"],"n":1,"z":null}"#));
        let dec = call("jsondecode", vec![enc]).unwrap();
        assert_eq!(dec.get_attr("n"), Some(&Value::number(1.0)));
        assert_eq!(dec.get_attr("l"), Some(&Value::tuple(vec![Value::string("a")])));
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(call("urlencode", vec![Value::string("a b/c")]).unwrap(), Value::string("a+b%2Fc"));
    }
}

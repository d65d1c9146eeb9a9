// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Collection functions.

use super::{Function, FunctionError, FunctionTable, Param, elems_at, int_at, num_at, str_at};
use crate::convert::convert;
use crate::value::{Type, Value, canonical_cmp};
use std::collections::BTreeMap;

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("alltrue", Function::new(vec![Param::new("list", Type::list(Type::Bool)).allow_unknown()], alltrue));
    table.insert("anytrue", Function::new(vec![Param::new("list", Type::list(Type::Bool)).allow_unknown()], anytrue));
    table.insert(
        "chunklist",
        Function::new(
            vec![Param::new("list", Type::list(Type::Dynamic)), Param::new("size", Type::Number)],
            chunklist,
        ),
    );
    table.insert(
        "coalesce",
        Function::new(vec![], coalesce).variadic(Param::new("vals", Type::Dynamic).allow_null()),
    );
    table.insert(
        "coalescelist",
        Function::new(vec![], coalescelist).variadic(Param::new("vals", Type::Dynamic).allow_null()),
    );
    table.insert("compact", Function::new(vec![Param::new("list", Type::list(Type::String))], compact));
    table.insert("concat", Function::new(vec![], concat).variadic(Param::new("seqs", Type::Dynamic)));
    table.insert(
        "contains",
        Function::new(
            vec![Param::new("list", Type::Dynamic), Param::new("value", Type::Dynamic).allow_null()],
            contains,
        ),
    );
    table.insert("distinct", Function::new(vec![Param::new("list", Type::list(Type::Dynamic))], distinct));
    table.insert(
        "element",
        Function::new(vec![Param::new("list", Type::Dynamic), Param::new("index", Type::Number)], element),
    );
    table.insert("flatten", Function::new(vec![Param::new("list", Type::Dynamic)], flatten));
    table.insert(
        "hasindex",
        Function::new(vec![Param::new("collection", Type::Dynamic), Param::new("key", Type::Dynamic)], hasindex),
    );
    table.insert(
        "index",
        Function::new(vec![Param::new("list", Type::Dynamic), Param::new("value", Type::Dynamic)], index),
    );
    table.insert("keys", Function::new(vec![Param::new("inputMap", Type::Dynamic)], keys));
    table.insert("length", Function::new(vec![Param::new("value", Type::Dynamic)], length));
    table.insert(
        "lookup",
        Function::new(vec![Param::new("inputMap", Type::Dynamic), Param::new("key", Type::String)], lookup)
            .variadic(Param::new("default", Type::Dynamic).allow_null()),
    );
    table.insert(
        "matchkeys",
        Function::new(
            vec![
                Param::new("values", Type::list(Type::Dynamic)),
                Param::new("keys", Type::list(Type::Dynamic)),
                Param::new("searchset", Type::list(Type::Dynamic)),
            ],
            matchkeys,
        ),
    );
    table.insert("merge", Function::new(vec![], merge).variadic(Param::new("maps", Type::Dynamic).allow_null()));
    table.insert("one", Function::new(vec![Param::new("list", Type::Dynamic)], one));
    table.insert("range", Function::new(vec![], range).variadic(Param::new("params", Type::Number)));
    table.insert("reverse", Function::new(vec![Param::new("list", Type::Dynamic)], reverse));
    table.insert("reverselist", Function::new(vec![Param::new("list", Type::Dynamic)], reverse));
    table.insert(
        "sethaselement",
        Function::new(
            vec![Param::new("set", Type::set(Type::Dynamic)), Param::new("elem", Type::Dynamic)],
            sethaselement,
        ),
    );
    table.insert(
        "setintersection",
        Function::new(vec![Param::new("first_set", Type::set(Type::Dynamic))], setintersection)
            .variadic(Param::new("other_sets", Type::set(Type::Dynamic))),
    );
    table.insert(
        "setproduct",
        Function::new(vec![], setproduct).variadic(Param::new("sets", Type::Dynamic)),
    );
    table.insert(
        "setsubtract",
        Function::new(
            vec![Param::new("a", Type::set(Type::Dynamic)), Param::new("b", Type::set(Type::Dynamic))],
            setsubtract,
        ),
    );
    table.insert(
        "setsymmetricdifference",
        Function::new(vec![Param::new("first_set", Type::set(Type::Dynamic))], setsymmetricdifference)
            .variadic(Param::new("other_sets", Type::set(Type::Dynamic))),
    );
    table.insert(
        "setunion",
        Function::new(vec![Param::new("first_set", Type::set(Type::Dynamic))], setunion)
            .variadic(Param::new("other_sets", Type::set(Type::Dynamic))),
    );
    table.insert(
        "slice",
        Function::new(
            vec![
                Param::new("list", Type::Dynamic),
                Param::new("start_index", Type::Number),
                Param::new("end_index", Type::Number),
            ],
            slice,
        ),
    );
    table.insert("sort", Function::new(vec![Param::new("list", Type::list(Type::String))], sort));
    table.insert("transpose", Function::new(vec![Param::new("values", Type::map(Type::list(Type::String)))], transpose));
    table.insert("values", Function::new(vec![Param::new("mapping", Type::Dynamic)], values));
    table.insert(
        "zipmap",
        Function::new(vec![Param::new("keys", Type::list(Type::String)), Param::new("values", Type::Dynamic)], zipmap),
    );
}

fn alltrue(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    let mut result = true;
    for e in elems {
        match e {
            Value::Unknown(_) => return Ok(Value::Unknown(Type::Bool)),
            Value::Bool(false) | Value::Null(_) => result = false,
            _ => {}
        }
    }
    Ok(Value::Bool(result))
}

fn anytrue(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    let mut saw_unknown = false;
    for e in elems {
        match e {
            Value::Bool(true) => return Ok(Value::Bool(true)),
            Value::Unknown(_) => saw_unknown = true,
            _ => {}
        }
    }
    if saw_unknown {
        return Ok(Value::Unknown(Type::Bool));
    }
    Ok(Value::Bool(false))
}

fn chunklist(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    let size = int_at(args, 1, "the size")?;
    if size < 0 {
        return Err(FunctionError::arg(1, "the size argument must be positive"));
    }
    if size == 0 {
        return Ok(Value::list(vec![Value::list(elems.to_vec())]));
    }
    let chunks: Vec<Value> = elems
        .chunks(size as usize)
        .map(|c| Value::list(c.to_vec()))
        .collect();
    if chunks.is_empty() {
        return Ok(Value::empty_list(args[0].ty()));
    }
    Ok(Value::list(chunks))
}

fn coalesce(args: &[Value]) -> Result<Value, FunctionError> {
    for v in args {
        match v {
            Value::Null(_) => continue,
            Value::String(s) if s.is_empty() => continue,
            other => return Ok(other.clone()),
        }
    }
    Err(FunctionError::call("no non-null, non-empty-string arguments"))
}

fn coalescelist(args: &[Value]) -> Result<Value, FunctionError> {
    for (i, v) in args.iter().enumerate() {
        if v.is_null() {
            continue;
        }
        let Some(elems) = v.as_value_slice() else {
            return Err(FunctionError::arg(i, "coalescelist arguments must be lists or tuples"));
        };
        if !elems.is_empty() {
            return Ok(v.clone());
        }
    }
    Err(FunctionError::call("no non-null arguments"))
}

fn compact(args: &[Value]) -> Result<Value, FunctionError> {
    let kept: Vec<Value> = elems_at(args, 0)?
        .iter()
        .filter(|v| !v.is_null() && v.as_str() != Some(""))
        .cloned()
        .collect();
    if kept.is_empty() {
        return Ok(Value::empty_list(Type::String));
    }
    Ok(Value::List(Type::String, kept))
}

fn concat(args: &[Value]) -> Result<Value, FunctionError> {
    let mut all = Vec::new();
    for (i, v) in args.iter().enumerate() {
        let Some(elems) = v.as_value_slice() else {
            return Err(FunctionError::arg(i, "all arguments must be lists or tuples"));
        };
        all.extend(elems.iter().cloned());
    }
    Ok(Value::list(all))
}

fn contains(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    let needle = &args[1];
    Ok(Value::Bool(elems.iter().any(|e| e.semantic_eq(needle))))
}

fn distinct(args: &[Value]) -> Result<Value, FunctionError> {
    let mut out: Vec<Value> = Vec::new();
    for e in elems_at(args, 0)? {
        if !out.iter().any(|o| o.semantic_eq(e)) {
            out.push(e.clone());
        }
    }
    match &args[0] {
        Value::List(ty, _) => Ok(Value::List(ty.clone(), out)),
        _ => Ok(Value::list(out)),
    }
}

fn element(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    let idx = int_at(args, 1, "the index")?;
    if idx < 0 {
        return Err(FunctionError::arg(1, "cannot use element function with a negative index"));
    }
    if elems.is_empty() {
        return Err(FunctionError::arg(0, "cannot use element function with an empty list"));
    }
    Ok(elems[idx as usize % elems.len()].clone())
}

fn flatten(args: &[Value]) -> Result<Value, FunctionError> {
    fn walk(v: &Value, out: &mut Vec<Value>) -> bool {
        match v.as_value_slice() {
            Some(elems) => {
                for e in elems {
                    if !e.is_known() {
                        return false;
                    }
                    if !walk_inner(e, out) {
                        return false;
                    }
                }
                true
            }
            None => {
                out.push(v.clone());
                true
            }
        }
    }
    fn walk_inner(v: &Value, out: &mut Vec<Value>) -> bool {
        if v.as_value_slice().is_some() {
            walk(v, out)
        } else {
            out.push(v.clone());
            true
        }
    }

    elems_at(args, 0)?;
    let mut out = Vec::new();
    if !walk(&args[0], &mut out) {
        return Ok(Value::unknown());
    }
    Ok(Value::list(out))
}

fn hasindex(args: &[Value]) -> Result<Value, FunctionError> {
    let coll = &args[0];
    let key = &args[1];
    let found = match coll {
        Value::List(_, elems) | Value::Tuple(elems) => match convert(key, &Type::Number) {
            Ok(Value::Number(n)) => n >= 0.0 && n.fract() == 0.0 && (n as usize) < elems.len(),
            _ => false,
        },
        Value::Map(_, entries) | Value::Object(entries) => match convert(key, &Type::String) {
            Ok(Value::String(k)) => entries.contains_key(&k),
            _ => false,
        },
        _ => return Err(FunctionError::arg(0, "collection must be a list, tuple, map, or object")),
    };
    Ok(Value::Bool(found))
}

fn index(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    elems
        .iter()
        .position(|e| e.semantic_eq(&args[1]))
        .map(Value::from)
        .ok_or_else(|| FunctionError::call("item not found"))
}

fn keys(args: &[Value]) -> Result<Value, FunctionError> {
    let Some(entries) = args[0].as_value_map() else {
        return Err(FunctionError::arg(0, "must have map or object type"));
    };
    let keys: Vec<&String> = entries.keys().collect();
    Ok(Value::string_list(&keys))
}

fn length(args: &[Value]) -> Result<Value, FunctionError> {
    args[0]
        .length()
        .map(Value::from)
        .ok_or_else(|| FunctionError::arg(0, "argument must be a string, a collection type, or a structural type"))
}

fn lookup(args: &[Value]) -> Result<Value, FunctionError> {
    if args.len() > 3 {
        return Err(FunctionError::call("lookup() takes no more than three arguments"));
    }
    let Some(entries) = args[0].as_value_map() else {
        return Err(FunctionError::arg(0, "must have map or object type"));
    };
    let key = str_at(args, 1);
    match entries.get(key) {
        Some(v) => Ok(v.clone()),
        None => match args.get(2) {
            Some(default) => Ok(default.clone()),
            None => Err(FunctionError::call(format!("lookup failed to find key {:?}", key))),
        },
    }
}

fn matchkeys(args: &[Value]) -> Result<Value, FunctionError> {
    let values = elems_at(args, 0)?;
    let keys = elems_at(args, 1)?;
    let search = elems_at(args, 2)?;
    if values.len() != keys.len() {
        return Err(FunctionError::call("length of keys and values should be equal"));
    }
    let out: Vec<Value> = values
        .iter()
        .zip(keys)
        .filter(|(_, k)| search.iter().any(|s| s.semantic_eq(k)))
        .map(|(v, _)| v.clone())
        .collect();
    if out.is_empty() {
        if let Value::List(ty, _) = &args[0] {
            return Ok(Value::empty_list(ty.clone()));
        }
    }
    Ok(Value::list(out))
}

fn merge(args: &[Value]) -> Result<Value, FunctionError> {
    let mut out = BTreeMap::new();
    let mut all_maps = true;
    for (i, v) in args.iter().enumerate() {
        if v.is_null() {
            continue;
        }
        let Some(entries) = v.as_value_map() else {
            return Err(FunctionError::arg(i, "arguments must be maps or objects"));
        };
        if !matches!(v, Value::Map(..)) {
            all_maps = false;
        }
        for (k, e) in entries {
            out.insert(k.clone(), e.clone());
        }
    }
    if all_maps && !args.is_empty() {
        return Ok(Value::map(out));
    }
    Ok(Value::Object(out))
}

fn one(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    match elems {
        [] => Ok(Value::null()),
        [only] => Ok(only.clone()),
        _ => Err(FunctionError::arg(
            0,
            "must be a list, set, or tuple value with either zero or one elements",
        )),
    }
}

fn range(args: &[Value]) -> Result<Value, FunctionError> {
    let (start, limit, step) = match args.len() {
        1 => (0.0, num_at(args, 0), 1.0),
        2 => {
            let (s, l) = (num_at(args, 0), num_at(args, 1));
            (s, l, if l < s { -1.0 } else { 1.0 })
        }
        3 => (num_at(args, 0), num_at(args, 1), num_at(args, 2)),
        _ => return Err(FunctionError::call("must have one, two, or three arguments")),
    };
    if step == 0.0 {
        return Err(FunctionError::call("step must not be zero"));
    }
    if (step > 0.0 && limit < start) || (step < 0.0 && limit > start) {
        return Err(FunctionError::call("step must be positive when start is less than limit, or negative otherwise"));
    }
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0.0 && i < limit) || (step < 0.0 && i > limit) {
        if out.len() >= 1024 {
            return Err(FunctionError::call("more than 1024 values were generated; either decrease the difference between start and end or use a smaller step"));
        }
        out.push(Value::number(i));
        i += step;
    }
    if out.is_empty() {
        return Ok(Value::empty_list(Type::Number));
    }
    Ok(Value::List(Type::Number, out))
}

fn reverse(args: &[Value]) -> Result<Value, FunctionError> {
    match &args[0] {
        Value::List(ty, elems) => Ok(Value::List(ty.clone(), elems.iter().rev().cloned().collect())),
        Value::Set(_, elems) => Ok(Value::list(elems.iter().rev().cloned().collect())),
        Value::Tuple(elems) => Ok(Value::Tuple(elems.iter().rev().cloned().collect())),
        _ => Err(FunctionError::arg(0, "can only reverse list or tuple values")),
    }
}

fn set_elems(args: &[Value], i: usize) -> Result<Vec<Value>, FunctionError> {
    Ok(elems_at(args, i)?.to_vec())
}

fn sethaselement(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    Ok(Value::Bool(elems.iter().any(|e| e.semantic_eq(&args[1]))))
}

fn setintersection(args: &[Value]) -> Result<Value, FunctionError> {
    let mut acc = set_elems(args, 0)?;
    for i in 1..args.len() {
        let other = set_elems(args, i)?;
        acc.retain(|e| other.iter().any(|o| o.semantic_eq(e)));
    }
    Ok(Value::set(acc))
}

fn setunion(args: &[Value]) -> Result<Value, FunctionError> {
    let mut acc = Vec::new();
    for i in 0..args.len() {
        acc.extend(set_elems(args, i)?);
    }
    Ok(Value::set(acc))
}

fn setsubtract(args: &[Value]) -> Result<Value, FunctionError> {
    let mut a = set_elems(args, 0)?;
    let b = set_elems(args, 1)?;
    a.retain(|e| !b.iter().any(|o| o.semantic_eq(e)));
    Ok(Value::set(a))
}

fn setsymmetricdifference(args: &[Value]) -> Result<Value, FunctionError> {
    let mut acc = set_elems(args, 0)?;
    for i in 1..args.len() {
        let other = set_elems(args, i)?;
        let mut next: Vec<Value> = acc
            .iter()
            .filter(|e| !other.iter().any(|o| o.semantic_eq(e)))
            .cloned()
            .collect();
        next.extend(
            other
                .iter()
                .filter(|o| !acc.iter().any(|e| e.semantic_eq(o)))
                .cloned(),
        );
        acc = next;
    }
    Ok(Value::set(acc))
}

fn setproduct(args: &[Value]) -> Result<Value, FunctionError> {
    if args.len() < 2 {
        return Err(FunctionError::call("at least two arguments are required"));
    }
    let mut product: Vec<Vec<Value>> = vec![Vec::new()];
    for i in 0..args.len() {
        let elems = elems_at(args, i)?;
        let mut next = Vec::with_capacity(product.len() * elems.len());
        for prefix in &product {
            for e in elems {
                let mut combo = prefix.clone();
                combo.push(e.clone());
                next.push(combo);
            }
        }
        product = next;
    }
    let tuples: Vec<Value> = product.into_iter().map(Value::Tuple).collect();
    if args.iter().all(|a| matches!(a, Value::Set(..))) {
        return Ok(Value::set(tuples));
    }
    Ok(Value::list(tuples))
}

fn slice(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    let start = int_at(args, 1, "the start index")?;
    let end = int_at(args, 2, "the end index")?;
    if start < 0 {
        return Err(FunctionError::arg(1, "start index must not be less than zero"));
    }
    if end as usize > elems.len() || end < 0 {
        return Err(FunctionError::arg(2, "end index must not be greater than the length of the list"));
    }
    if start > end {
        return Err(FunctionError::arg(1, "start index must not be greater than end index"));
    }
    let out = elems[start as usize..end as usize].to_vec();
    match &args[0] {
        Value::Tuple(_) => Ok(Value::Tuple(out)),
        Value::List(ty, _) => Ok(Value::List(ty.clone(), out)),
        _ => Ok(Value::list(out)),
    }
}

fn sort(args: &[Value]) -> Result<Value, FunctionError> {
    let mut elems = elems_at(args, 0)?.to_vec();
    if elems.iter().any(|e| !e.is_known()) {
        return Ok(Value::Unknown(Type::list(Type::String)));
    }
    elems.sort_by(canonical_cmp);
    if elems.is_empty() {
        return Ok(Value::empty_list(Type::String));
    }
    Ok(Value::List(Type::String, elems))
}

fn transpose(args: &[Value]) -> Result<Value, FunctionError> {
    let Some(entries) = args[0].as_value_map() else {
        return Err(FunctionError::arg(0, "must be a map of lists of strings"));
    };
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, list) in entries {
        for v in list.as_value_slice().unwrap_or_default() {
            let Some(s) = v.as_str() else {
                return Err(FunctionError::arg(0, "input must be a map of lists of strings"));
            };
            out.entry(s.to_string()).or_default().push(k.clone());
        }
    }
    let out: BTreeMap<String, Value> = out
        .into_iter()
        .map(|(k, v)| (k, Value::string_list(&v)))
        .collect();
    Ok(Value::Map(Type::list(Type::String), out))
}

fn values(args: &[Value]) -> Result<Value, FunctionError> {
    match &args[0] {
        Value::Map(ty, entries) => Ok(Value::List(ty.clone(), entries.values().cloned().collect())),
        Value::Object(entries) => Ok(Value::Tuple(entries.values().cloned().collect())),
        _ => Err(FunctionError::arg(0, "values() requires a map as the first argument")),
    }
}

fn zipmap(args: &[Value]) -> Result<Value, FunctionError> {
    let keys = elems_at(args, 0)?;
    let vals = elems_at(args, 1)?;
    if keys.len() != vals.len() {
        return Err(FunctionError::call(format!(
            "number of keys ({}) does not match number of values ({})",
            keys.len(),
            vals.len()
        )));
    }
    let out: BTreeMap<String, Value> = keys
        .iter()
        .zip(vals)
        .map(|(k, v)| (k.as_str().unwrap_or_default().to_string(), v.clone()))
        .collect();
    match &args[1] {
        Value::Tuple(_) => Ok(Value::Object(out)),
        _ => Ok(Value::map(out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(table: &FunctionTable, name: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
        table.get(name).unwrap().call(&args)
    }

    fn table() -> FunctionTable {
        let mut t = FunctionTable::new();
        register(&mut t);
        t
    }

    #[test]
    fn test_alltrue_anytrue() {
        let t = table();
        let bools = |v: Vec<Value>| Value::tuple(v);
        assert_eq!(call(&t, "alltrue", vec![bools(vec![Value::Bool(true), Value::Bool(true)])]).unwrap(), Value::Bool(true));
        assert_eq!(call(&t, "alltrue", vec![bools(vec![Value::Bool(true), Value::Null(Type::Bool)])]).unwrap(), Value::Bool(false));
        assert_eq!(call(&t, "alltrue", vec![bools(vec![Value::Bool(true), Value::Unknown(Type::Bool)])]).unwrap(), Value::Unknown(Type::Bool));
        assert_eq!(call(&t, "anytrue", vec![bools(vec![Value::Null(Type::Bool), Value::Bool(true)])]).unwrap(), Value::Bool(true));
        assert_eq!(call(&t, "anytrue", vec![bools(vec![Value::Bool(false), Value::Unknown(Type::Bool)])]).unwrap(), Value::Unknown(Type::Bool));
        assert_eq!(call(&t, "anytrue", vec![Value::empty_list(Type::Bool)]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_element_wraps() {
        let t = table();
        let list = Value::string_list(&["a", "b", "c"]);
        assert_eq!(call(&t, "element", vec![list.clone(), Value::number(4.0)]).unwrap(), Value::string("b"));
        assert!(call(&t, "element", vec![list, Value::number(-1.0)]).is_err());
    }

    #[test]
    fn test_merge_and_lookup() {
        let t = table();
        let a = Value::object_from([("x", Value::string("1")), ("y", Value::string("2"))]);
        let b = Value::object_from([("y", Value::string("3"))]);
        let merged = call(&t, "merge", vec![a, b, Value::null()]).unwrap();
        assert_eq!(merged.get_attr("y"), Some(&Value::string("3")));
        assert_eq!(call(&t, "lookup", vec![merged.clone(), Value::string("x")]).unwrap(), Value::string("1"));
        assert_eq!(
            call(&t, "lookup", vec![merged.clone(), Value::string("z"), Value::string("d")]).unwrap(),
            Value::string("d")
        );
        assert!(call(&t, "lookup", vec![merged, Value::string("z")]).is_err());
    }

    #[test]
    fn test_flatten_and_distinct() {
        let t = table();
        let nested = Value::tuple(vec![
            Value::string_list(&["a", "b"]),
            Value::tuple(vec![Value::string_list(&["c"]), Value::string("a")]),
        ]);
        let flat = call(&t, "flatten", vec![nested]).unwrap();
        assert_eq!(flat, Value::string_list(&["a", "b", "c", "a"]));
        assert_eq!(call(&t, "distinct", vec![flat]).unwrap(), Value::string_list(&["a", "b", "c"]));
    }

    #[test]
    fn test_range() {
        let t = table();
        let r = call(&t, "range", vec![Value::number(3.0)]).unwrap();
        assert_eq!(r.as_value_slice().unwrap().len(), 3);
        let r = call(&t, "range", vec![Value::number(5.0), Value::number(1.0), Value::number(-2.0)]).unwrap();
        assert_eq!(r, Value::List(Type::Number, vec![Value::number(5.0), Value::number(3.0)]));
    }

    #[test]
    fn test_setproduct() {
        let t = table();
        let r = call(
            &t,
            "setproduct",
            vec![Value::string_list(&["a", "b"]), Value::string_list(&["1", "2"])],
        )
        .unwrap();
        assert_eq!(r.as_value_slice().unwrap().len(), 4);
    }

    #[test]
    fn test_zipmap_and_keys() {
        let t = table();
        let m = call(
            &t,
            "zipmap",
            vec![Value::string_list(&["b", "a"]), Value::string_list(&["2", "1"])],
        )
        .unwrap();
        assert_eq!(call(&t, "keys", vec![m]).unwrap(), Value::string_list(&["a", "b"]));
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! String functions.

use super::encoding::value_to_json;
use super::{Function, FunctionError, FunctionTable, Param, elems_at, int_at, str_at};
use crate::value::{Type, Value, format_number};
use regex::Regex;
use std::collections::BTreeMap;

pub(super) fn register(table: &mut FunctionTable) {
    let s = |name| Param::new(name, Type::String);

    table.insert("chomp", Function::new(vec![s("str")], |a| {
        Ok(Value::string(str_at(a, 0).trim_end_matches(['\n', '\r'])))
    }));
    table.insert("endswith", Function::new(vec![s("str"), s("suffix")], |a| {
        Ok(Value::Bool(str_at(a, 0).ends_with(str_at(a, 1))))
    }));
    table.insert("startswith", Function::new(vec![s("str"), s("prefix")], |a| {
        Ok(Value::Bool(str_at(a, 0).starts_with(str_at(a, 1))))
    }));
    table.insert("strcontains", Function::new(vec![s("str"), s("substr")], |a| {
        Ok(Value::Bool(str_at(a, 0).contains(str_at(a, 1))))
    }));
    table.insert(
        "format",
        Function::new(vec![s("format")], format)
            .variadic(Param::new("args", Type::Dynamic).allow_null()),
    );
    table.insert(
        "formatlist",
        Function::new(vec![s("format")], formatlist)
            .variadic(Param::new("args", Type::Dynamic).allow_null()),
    );
    table.insert("indent", Function::new(vec![Param::new("spaces", Type::Number), s("str")], indent));
    table.insert(
        "join",
        Function::new(vec![s("separator")], join).variadic(Param::new("lists", Type::list(Type::String))),
    );
    table.insert("lower", Function::new(vec![s("str")], |a| Ok(Value::string(str_at(a, 0).to_lowercase()))));
    table.insert("upper", Function::new(vec![s("str")], |a| Ok(Value::string(str_at(a, 0).to_uppercase()))));
    table.insert("title", Function::new(vec![s("str")], |a| Ok(Value::string(title(str_at(a, 0))))));
    table.insert("strrev", Function::new(vec![s("str")], |a| {
        Ok(Value::string(str_at(a, 0).chars().rev().collect::<String>()))
    }));
    table.insert("strlen", Function::new(vec![s("str")], |a| Ok(Value::from(str_at(a, 0).chars().count()))));
    table.insert("trim", Function::new(vec![s("str"), s("cutset")], |a| {
        let cutset: Vec<char> = str_at(a, 1).chars().collect();
        Ok(Value::string(str_at(a, 0).trim_matches(cutset.as_slice())))
    }));
    table.insert("trimprefix", Function::new(vec![s("str"), s("prefix")], |a| {
        let (st, prefix) = (str_at(a, 0), str_at(a, 1));
        Ok(Value::string(st.strip_prefix(prefix).unwrap_or(st)))
    }));
    table.insert("trimsuffix", Function::new(vec![s("str"), s("suffix")], |a| {
        let (st, suffix) = (str_at(a, 0), str_at(a, 1));
        Ok(Value::string(st.strip_suffix(suffix).unwrap_or(st)))
    }));
    table.insert("trimspace", Function::new(vec![s("str")], |a| Ok(Value::string(str_at(a, 0).trim()))));
    table.insert("replace", Function::new(vec![s("str"), s("substr"), s("replace")], replace));
    table.insert("regex", Function::new(vec![s("pattern"), s("string")], regex));
    table.insert("regexall", Function::new(vec![s("pattern"), s("string")], regexall));
    table.insert("regexreplace", Function::new(vec![s("str"), s("pattern"), s("replace")], |a| {
        let re = compile(str_at(a, 1), 1)?;
        Ok(Value::string(re.replace_all(str_at(a, 0), str_at(a, 2)).into_owned()))
    }));
    table.insert("split", Function::new(vec![s("separator"), s("str")], |a| {
        let (sep, st) = (str_at(a, 0), str_at(a, 1));
        let parts: Vec<&str> = if sep.is_empty() {
            st.split_inclusive(|_: char| true).collect()
        } else {
            st.split(sep).collect()
        };
        Ok(Value::string_list(&parts))
    }));
    table.insert(
        "substr",
        Function::new(
            vec![s("str"), Param::new("offset", Type::Number), Param::new("length", Type::Number)],
            substr,
        ),
    );
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    out
}

fn indent(args: &[Value]) -> Result<Value, FunctionError> {
    let spaces = int_at(args, 0, "the number of spaces")?;
    let pad = " ".repeat(spaces.max(0) as usize);
    let mut lines = str_at(args, 1).split('\n');
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        out.push_str(&pad);
        out.push_str(line);
    }
    Ok(Value::string(out))
}

fn join(args: &[Value]) -> Result<Value, FunctionError> {
    if args.len() < 2 {
        return Err(FunctionError::call("at least one list is required"));
    }
    let sep = str_at(args, 0);
    let mut parts = Vec::new();
    for i in 1..args.len() {
        for (j, v) in elems_at(args, i)?.iter().enumerate() {
            let Some(s) = v.as_str() else {
                return Err(FunctionError::arg(i, format!("element {} is null; cannot concatenate null values", j)));
            };
            parts.push(s);
        }
    }
    Ok(Value::string(parts.join(sep)))
}

fn replace(args: &[Value]) -> Result<Value, FunctionError> {
    let (st, substr, with) = (str_at(args, 0), str_at(args, 1), str_at(args, 2));
    if substr.len() > 2 && substr.starts_with('/') && substr.ends_with('/') {
        let re = compile(&substr[1..substr.len() - 1], 1)?;
        return Ok(Value::string(re.replace_all(st, with).into_owned()));
    }
    Ok(Value::string(st.replace(substr, with)))
}

fn compile(pattern: &str, index: usize) -> Result<Regex, FunctionError> {
    Regex::new(pattern).map_err(|e| FunctionError::arg(index, format!("invalid regular expression pattern: {}", e)))
}

fn captures_value(re: &Regex, caps: &regex::Captures<'_>) -> Value {
    let names: Vec<Option<&str>> = re.capture_names().skip(1).collect();
    let named = names.iter().any(Option::is_some);
    if named {
        let mut attrs = BTreeMap::new();
        for (i, name) in names.iter().enumerate() {
            if let Some(name) = name {
                let v = caps
                    .get(i + 1)
                    .map(|m| Value::string(m.as_str()))
                    .unwrap_or(Value::Null(Type::String));
                attrs.insert(name.to_string(), v);
            }
        }
        return Value::Object(attrs);
    }
    if names.is_empty() {
        return caps.get(0).map(|m| Value::string(m.as_str())).unwrap_or(Value::Null(Type::String));
    }
    Value::Tuple(
        (1..=names.len())
            .map(|i| caps.get(i).map(|m| Value::string(m.as_str())).unwrap_or(Value::Null(Type::String)))
            .collect(),
    )
}

fn regex(args: &[Value]) -> Result<Value, FunctionError> {
    let re = compile(str_at(args, 0), 0)?;
    match re.captures(str_at(args, 1)) {
        Some(caps) => Ok(captures_value(&re, &caps)),
        None => Err(FunctionError::call("pattern did not match any part of the given string")),
    }
}

fn regexall(args: &[Value]) -> Result<Value, FunctionError> {
    let re = compile(str_at(args, 0), 0)?;
    let all: Vec<Value> = re
        .captures_iter(str_at(args, 1))
        .map(|caps| captures_value(&re, &caps))
        .collect();
    if all.is_empty() {
        return Ok(Value::empty_list(Type::Dynamic));
    }
    Ok(Value::list(all))
}

fn substr(args: &[Value]) -> Result<Value, FunctionError> {
    let chars: Vec<char> = str_at(args, 0).chars().collect();
    let len = chars.len() as i64;
    let mut offset = int_at(args, 1, "the offset")?;
    let length = int_at(args, 2, "the length")?;
    if offset < 0 {
        offset += len;
    }
    let offset = offset.clamp(0, len);
    let end = if length < 0 { len } else { (offset + length).min(len) };
    Ok(Value::string(chars[offset as usize..end as usize].iter().collect::<String>()))
}

// ============================================================================
// format / formatlist
// ============================================================================

struct Verb {
    flags: String,
    width: Option<usize>,
    precision: Option<usize>,
    arg: Option<usize>,
    kind: char,
}

fn parse_verb(chars: &[char], mut i: usize) -> Result<(Verb, usize), FunctionError> {
    let mut flags = String::new();
    while i < chars.len() && "+- #0".contains(chars[i]) {
        flags.push(chars[i]);
        i += 1;
    }
    let mut arg = None;
    if i < chars.len() && chars[i] == '[' {
        let start = i + 1;
        while i < chars.len() && chars[i] != ']' {
            i += 1;
        }
        let n: String = chars[start..i.min(chars.len())].iter().collect();
        arg = Some(
            n.parse::<usize>()
                .map_err(|_| FunctionError::arg(0, "invalid argument index in format verb"))?,
        );
        i += 1;
    }
    let read_num = |i: &mut usize| {
        let start = *i;
        while *i < chars.len() && chars[*i].is_ascii_digit() {
            *i += 1;
        }
        chars[start..*i].iter().collect::<String>().parse::<usize>().ok()
    };
    let width = read_num(&mut i);
    let mut precision = None;
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        precision = Some(read_num(&mut i).unwrap_or(0));
    }
    let Some(&kind) = chars.get(i) else {
        return Err(FunctionError::arg(0, "unterminated format verb"));
    };
    Ok((
        Verb {
            flags,
            width,
            precision,
            arg,
            kind,
        },
        i + 1,
    ))
}

fn pad(s: String, verb: &Verb) -> String {
    let Some(width) = verb.width else {
        return s;
    };
    let len = s.chars().count();
    if len >= width {
        return s;
    }
    let fill = width - len;
    if verb.flags.contains('-') {
        format!("{}{}", s, " ".repeat(fill))
    } else if verb.flags.contains('0') && !matches!(verb.kind, 's' | 'q' | 'v') {
        let (sign, digits) = match s.strip_prefix('-') {
            Some(rest) => ("-", rest.to_string()),
            None => ("", s),
        };
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        format!("{}{}", " ".repeat(fill), s)
    }
}

fn format_one(verb: &Verb, v: &Value, index: usize) -> Result<String, FunctionError> {
    let need_num = |v: &Value| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            .ok_or_else(|| FunctionError::arg(index, format!("unsupported value for \"%{}\" at {}: number required", verb.kind, index)))
    };
    let s = match verb.kind {
        'v' => match v {
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
            Value::Null(_) => "null".to_string(),
            other => serde_json::to_string(&value_to_json(other)).unwrap_or_default(),
        },
        '#' => serde_json::to_string(&value_to_json(v)).unwrap_or_default(),
        't' => match v.as_bool().or_else(|| v.as_str().and_then(|s| s.parse().ok())) {
            Some(b) => b.to_string(),
            None => {
                return Err(FunctionError::arg(index, format!("unsupported value for \"%t\" at {}: bool required", index)));
            }
        },
        'd' => {
            let n = need_num(v)?;
            if n.fract() != 0.0 {
                return Err(FunctionError::arg(index, format!("unsupported value for \"%d\" at {}: integer required", index)));
            }
            let s = format!("{}", n as i64);
            if verb.flags.contains('+') && n >= 0.0 { format!("+{}", s) } else { s }
        }
        'f' | 'e' | 'g' => {
            let n = need_num(v)?;
            let s = match verb.kind {
                'e' => format!("{:.*e}", verb.precision.unwrap_or(6), n),
                'g' => format_number(n),
                _ => format!("{:.*}", verb.precision.unwrap_or(6), n),
            };
            if verb.flags.contains('+') && n >= 0.0 { format!("+{}", s) } else { s }
        }
        'b' => format!("{:b}", need_num(v)? as i64),
        'o' => format!("{:o}", need_num(v)? as i64),
        'x' => match v {
            Value::String(s) => s.bytes().map(|b| format!("{:02x}", b)).collect(),
            _ => format!("{:x}", need_num(v)? as i64),
        },
        'X' => match v {
            Value::String(s) => s.bytes().map(|b| format!("{:02X}", b)).collect(),
            _ => format!("{:X}", need_num(v)? as i64),
        },
        's' | 'q' => {
            let s = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => format_number(*n),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(FunctionError::arg(index, format!("unsupported value for \"%{}\" at {}: string required", verb.kind, index)));
                }
            };
            let s = match verb.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s,
            };
            if verb.kind == 'q' { format!("{:?}", s) } else { s }
        }
        other => {
            return Err(FunctionError::arg(0, format!("unsupported format verb %{:?}", other)));
        }
    };
    Ok(pad(s, verb))
}

pub(crate) fn format_str(fmt: &str, args: &[Value]) -> Result<String, FunctionError> {
    let chars: Vec<char> = fmt.chars().collect();
    let mut out = String::new();
    let mut next_arg = 0usize;
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'%') {
            out.push('%');
            i += 2;
            continue;
        }
        let (verb, next) = parse_verb(&chars, i + 1)?;
        i = next;
        let idx = match verb.arg {
            Some(n) => n.saturating_sub(1),
            None => next_arg,
        };
        next_arg = idx + 1;
        let Some(v) = args.get(idx) else {
            return Err(FunctionError::call(format!(
                "not enough arguments for \"%{}\" at {}: need index {} but have {} total",
                verb.kind,
                i - 1,
                idx + 1,
                args.len()
            )));
        };
        if v.is_null() && verb.kind != 'v' {
            return Err(FunctionError::arg(idx + 1, "argument must not be null"));
        }
        out.push_str(&format_one(&verb, v, idx + 1)?);
    }
    Ok(out)
}

fn format(args: &[Value]) -> Result<Value, FunctionError> {
    Ok(Value::string(format_str(str_at(args, 0), &args[1..])?))
}

fn formatlist(args: &[Value]) -> Result<Value, FunctionError> {
    let rest = &args[1..];
    let mut iterations: Option<usize> = None;
    for (i, a) in rest.iter().enumerate() {
        if let Some(elems) = a.as_value_slice() {
            match iterations {
                None => iterations = Some(elems.len()),
                Some(n) if n != elems.len() => {
                    return Err(FunctionError::arg(
                        i + 1,
                        format!("argument {} has length {}, which is inconsistent with {}", i + 1, elems.len(), n),
                    ));
                }
                _ => {}
            }
        }
    }
    let n = iterations.unwrap_or(1);
    let mut out = Vec::with_capacity(n);
    for it in 0..n {
        let row: Vec<Value> = rest
            .iter()
            .map(|a| match a.as_value_slice() {
                Some(elems) => elems[it].clone(),
                None => a.clone(),
            })
            .collect();
        out.push(format_str(str_at(args, 0), &row)?);
    }
    Ok(Value::string_list(&out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> FunctionTable {
        let mut t = FunctionTable::new();
        register(&mut t);
        t
    }

    fn call(name: &str, args: Vec<Value>) -> Result<Value, FunctionError> {
        table().get(name).unwrap().call(&args)
    }

    #[test]
    fn test_format_verbs() {
        let got = call(
            "format",
            vec![
                Value::string("%s-%03d-%.2f-%q-%t-%%"),
                Value::string("a"),
                Value::number(7.0),
                Value::number(1.5),
                Value::string("x"),
                Value::Bool(true),
            ],
        )
        .unwrap();
        assert_eq!(got, Value::string("a-007-1.50-\"x\"-true-%"));
    }

    #[test]
    fn test_format_errors() {
        assert!(call("format", vec![Value::string("%s %s"), Value::string("a")]).is_err());
        assert!(call("format", vec![Value::string("%d"), Value::number(1.5)]).is_err());
    }

    #[test]
    fn test_formatlist() {
        let got = call(
            "formatlist",
            vec![Value::string("%s=%s"), Value::string_list(&["a", "b"]), Value::string("v")],
        )
        .unwrap();
        assert_eq!(got, Value::string_list(&["a=v", "b=v"]));
    }

    #[test]
    fn test_join_split() {
        let joined = call("join", vec![Value::string(","), Value::string_list(&["a", "b"])]).unwrap();
        assert_eq!(joined, Value::string("a,b"));
        let split = call("split", vec![Value::string(","), joined]).unwrap();
        assert_eq!(split, Value::string_list(&["a", "b"]));
    }

    #[test]
    fn test_regex_functions() {
        let got = call("regex", vec![Value::string("(\\d+)\\.(\\d+)"), Value::string("v1.23")]).unwrap();
        assert_eq!(got, Value::tuple(vec![Value::string("1"), Value::string("23")]));
        let got = call("regexall", vec![Value::string("[a-z]"), Value::string("a1b")]).unwrap();
        assert_eq!(got, Value::string_list(&["a", "b"]));
        let got = call("replace", vec![Value::string("a-b-c"), Value::string("/-/"), Value::string("_")]).unwrap();
        assert_eq!(got, Value::string("a_b_c"));
        assert!(call("regex", vec![Value::string("z"), Value::string("abc")]).is_err());
    }

    #[test]
    fn test_misc_string_functions() {
        assert_eq!(call("title", vec![Value::string("hello world")]).unwrap(), Value::string("Hello World"));
        assert_eq!(
            call("substr", vec![Value::string("hello"), Value::number(-3.0), Value::number(2.0)]).unwrap(),
            Value::string("ll")
        );
        assert_eq!(call("strrev", vec![Value::string("abc")]).unwrap(), Value::string("cba"));
        assert_eq!(call("chomp", vec![Value::string("x\r\n")]).unwrap(), Value::string("x"));
        assert_eq!(
            call("indent", vec![Value::number(2.0), Value::string("a\nb")]).unwrap(),
            Value::string("a\n  b")
        );
        assert_eq!(
            call("trim", vec![Value::string("?!hi!?"), Value::string("!?")]).unwrap(),
            Value::string("hi")
        );
    }
}

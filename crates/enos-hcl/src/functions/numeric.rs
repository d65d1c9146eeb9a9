// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Numeric, comparison and boolean functions.

use super::{Function, FunctionError, FunctionTable, Param, elems_at, int_at, num_at, str_at};
use crate::value::{Type, Value};

fn binary(f: fn(f64, f64) -> Result<f64, FunctionError>) -> Function {
    Function::new(
        vec![Param::new("a", Type::Number), Param::new("b", Type::Number)],
        move |a| Ok(Value::number(f(num_at(a, 0), num_at(a, 1))?)),
    )
}

fn compare(f: fn(f64, f64) -> bool) -> Function {
    Function::new(
        vec![Param::new("a", Type::Number), Param::new("b", Type::Number)],
        move |a| Ok(Value::Bool(f(num_at(a, 0), num_at(a, 1)))),
    )
}

fn unary(f: fn(f64) -> f64) -> Function {
    Function::new(vec![Param::new("num", Type::Number)], move |a| Ok(Value::number(f(num_at(a, 0)))))
}

pub(super) fn register(table: &mut FunctionTable) {
    table.insert("abs", unary(f64::abs));
    table.insert("absolute", unary(f64::abs));
    table.insert("ceil", unary(f64::ceil));
    table.insert("floor", unary(f64::floor));
    table.insert("negate", unary(|n| -n));
    table.insert("int", unary(f64::trunc));
    table.insert("signum", unary(|n| if n == 0.0 { 0.0 } else { n.signum() }));

    table.insert("add", binary(|a, b| Ok(a + b)));
    table.insert("subtract", binary(|a, b| Ok(a - b)));
    table.insert("multiply", binary(|a, b| Ok(a * b)));
    table.insert(
        "divide",
        binary(|a, b| {
            if b == 0.0 {
                return Err(FunctionError::arg(1, "can't divide by zero"));
            }
            Ok(a / b)
        }),
    );
    table.insert(
        "modulo",
        binary(|a, b| {
            if b == 0.0 {
                return Err(FunctionError::arg(1, "can't use modulo with zero"));
            }
            Ok(a % b)
        }),
    );
    table.insert("pow", binary(|a, b| Ok(a.powf(b))));
    table.insert(
        "log",
        binary(|n, base| {
            if n <= 0.0 || base <= 0.0 || base == 1.0 {
                return Err(FunctionError::call("logarithm is undefined for the given arguments"));
            }
            Ok(n.ln() / base.ln())
        }),
    );

    table.insert("greaterthan", compare(|a, b| a > b));
    table.insert("greaterthanorequalto", compare(|a, b| a >= b));
    table.insert("lessthan", compare(|a, b| a < b));
    table.insert("lessthanorequalto", compare(|a, b| a <= b));

    table.insert(
        "equal",
        Function::new(
            vec![
                Param::new("a", Type::Dynamic).allow_null(),
                Param::new("b", Type::Dynamic).allow_null(),
            ],
            |a| Ok(Value::Bool(a[0].semantic_eq(&a[1]))),
        ),
    );
    table.insert(
        "notequal",
        Function::new(
            vec![
                Param::new("a", Type::Dynamic).allow_null(),
                Param::new("b", Type::Dynamic).allow_null(),
            ],
            |a| Ok(Value::Bool(!a[0].semantic_eq(&a[1]))),
        ),
    );
    table.insert(
        "and",
        Function::new(vec![Param::new("a", Type::Bool), Param::new("b", Type::Bool)], |a| {
            Ok(Value::Bool(a[0].is_true() && a[1].is_true()))
        }),
    );
    table.insert(
        "or",
        Function::new(vec![Param::new("a", Type::Bool), Param::new("b", Type::Bool)], |a| {
            Ok(Value::Bool(a[0].is_true() || a[1].is_true()))
        }),
    );
    table.insert(
        "not",
        Function::new(vec![Param::new("val", Type::Bool)], |a| Ok(Value::Bool(!a[0].is_true()))),
    );

    table.insert(
        "max",
        Function::new(vec![], |a| extremum(a, f64::max)).variadic(Param::new("numbers", Type::Number)),
    );
    table.insert(
        "min",
        Function::new(vec![], |a| extremum(a, f64::min)).variadic(Param::new("numbers", Type::Number)),
    );
    table.insert(
        "sum",
        Function::new(vec![Param::new("list", Type::Dynamic)], sum),
    );
    table.insert(
        "parseint",
        Function::new(vec![Param::new("number", Type::String), Param::new("base", Type::Number)], parseint),
    );
}

fn extremum(args: &[Value], pick: fn(f64, f64) -> f64) -> Result<Value, FunctionError> {
    let mut nums = args.iter().filter_map(Value::as_f64);
    let Some(first) = nums.next() else {
        return Err(FunctionError::call("must pass at least one number"));
    };
    Ok(Value::number(nums.fold(first, pick)))
}

fn sum(args: &[Value]) -> Result<Value, FunctionError> {
    let elems = elems_at(args, 0)?;
    if elems.is_empty() {
        return Err(FunctionError::arg(0, "cannot sum an empty list"));
    }
    let mut total = 0.0;
    for (i, e) in elems.iter().enumerate() {
        let n = e
            .as_f64()
            .or_else(|| e.as_str().and_then(|s| s.parse().ok()))
            .ok_or_else(|| FunctionError::arg(0, format!("element {} is not a number", i)))?;
        total += n;
    }
    Ok(Value::number(total))
}

fn parseint(args: &[Value]) -> Result<Value, FunctionError> {
    let base = int_at(args, 1, "the base")?;
    if !(2..=62).contains(&base) {
        return Err(FunctionError::arg(1, "base must be a whole number between 2 and 62 inclusive"));
    }
    let s = str_at(args, 0);
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if digits.is_empty() {
        return Err(FunctionError::arg(0, format!("cannot parse {:?} as a base {} integer", s, base)));
    }
    let mut n: f64 = 0.0;
    for c in digits.chars() {
        let d = match c {
            '0'..='9' => c as i64 - '0' as i64,
            'a'..='z' => c as i64 - 'a' as i64 + 10,
            'A'..='Z' if base > 36 => c as i64 - 'A' as i64 + 36,
            'A'..='Z' => c as i64 - 'A' as i64 + 10,
            _ => base,
        };
        if d >= base {
            return Err(FunctionError::arg(0, format!("cannot parse {:?} as a base {} integer", s, base)));
        }
        n = n * base as f64 + d as f64;
    }
    Ok(Value::number(if neg { -n } else { n }))
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
    fn test_arithmetic() {
        assert_eq!(call("add", vec![Value::number(1.0), Value::string("2")]).unwrap(), Value::number(3.0));
        assert_eq!(call("modulo", vec![Value::number(7.0), Value::number(3.0)]).unwrap(), Value::number(1.0));
        assert!(call("divide", vec![Value::number(1.0), Value::number(0.0)]).is_err());
        assert_eq!(call("signum", vec![Value::number(-4.0)]).unwrap(), Value::number(-1.0));
    }

    #[test]
    fn test_max_min_sum() {
        let nums = vec![Value::number(3.0), Value::number(9.0), Value::number(1.0)];
        assert_eq!(call("max", nums.clone()).unwrap(), Value::number(9.0));
        assert_eq!(call("min", nums.clone()).unwrap(), Value::number(1.0));
        assert_eq!(call("sum", vec![Value::tuple(nums)]).unwrap(), Value::number(13.0));
        assert!(call("max", vec![]).is_err());
    }

    #[test]
    fn test_parseint() {
        assert_eq!(call("parseint", vec![Value::string("ff"), Value::number(16.0)]).unwrap(), Value::number(255.0));
        assert_eq!(call("parseint", vec![Value::string("-101"), Value::number(2.0)]).unwrap(), Value::number(-5.0));
        assert!(call("parseint", vec![Value::string("9"), Value::number(8.0)]).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("greaterthan", vec![Value::number(2.0), Value::number(1.0)]).unwrap(), Value::Bool(true));
        assert_eq!(call("equal", vec![Value::string("a"), Value::string("a")]).unwrap(), Value::Bool(true));
        assert_eq!(call("not", vec![Value::Bool(true)]).unwrap(), Value::Bool(false));
    }
}

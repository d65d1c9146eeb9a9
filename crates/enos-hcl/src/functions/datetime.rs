// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Date and time functions over RFC 3339 timestamps.

use super::{Function, FunctionError, FunctionTable, Param, str_at};
use crate::value::{Type, Value};
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Utc};

pub(super) fn register(table: &mut FunctionTable) {
    table.insert(
        "timestamp",
        Function::new(vec![], |_| Ok(Value::string(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)))),
    );
    table.insert(
        "timeadd",
        Function::new(
            vec![Param::new("timestamp", Type::String), Param::new("duration", Type::String)],
            |a| {
                let ts = parse_timestamp(str_at(a, 0), 0)?;
                let dur = parse_duration(str_at(a, 1))?;
                Ok(Value::string(format_timestamp(ts + dur)))
            },
        ),
    );
    table.insert(
        "timecmp",
        Function::new(
            vec![Param::new("timestamp_a", Type::String), Param::new("timestamp_b", Type::String)],
            |a| {
                let ta = parse_timestamp(str_at(a, 0), 0)?;
                let tb = parse_timestamp(str_at(a, 1), 1)?;
                Ok(Value::number(match ta.cmp(&tb) {
                    std::cmp::Ordering::Less => -1.0,
                    std::cmp::Ordering::Equal => 0.0,
                    std::cmp::Ordering::Greater => 1.0,
                }))
            },
        ),
    );
}

fn parse_timestamp(s: &str, index: usize) -> Result<DateTime<FixedOffset>, FunctionError> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| FunctionError::arg(index, format!("not a valid RFC3339 timestamp: {}", e)))
}

fn format_timestamp(ts: DateTime<FixedOffset>) -> String {
    if ts.offset().local_minus_utc() == 0 {
        ts.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::AutoSi, true)
    } else {
        ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
    }
}

/// Parses a duration such as `1h30m`, `-10s` or `1.5h`.
fn parse_duration(s: &str) -> Result<Duration, FunctionError> {
    let invalid = || FunctionError::arg(1, format!("invalid duration {:?}", s));
    let (neg, mut rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    if rest == "0" {
        return Ok(Duration::zero());
    }
    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let n: f64 = rest[..num_end].parse().map_err(|_| invalid())?;
        rest = &rest[num_end..];
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        total_nanos += n * scale;
        rest = &rest[unit_end..];
    }
    let nanos = total_nanos.round() as i64;
    Ok(Duration::nanoseconds(if neg { -nanos } else { nanos }))
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
    fn test_timeadd() {
        let got = call(
            "timeadd",
            vec![Value::string("2024-01-01T00:00:00Z"), Value::string("1h30m")],
        )
        .unwrap();
        assert_eq!(got, Value::string("2024-01-01T01:30:00Z"));
        assert!(call("timeadd", vec![Value::string("2024-01-01T00:00:00Z"), Value::string("3x")]).is_err());
    }

    #[test]
    fn test_timecmp() {
        let got = call(
            "timecmp",
            vec![Value::string("2024-01-01T00:00:00Z"), Value::string("2024-01-01T01:00:00+01:00")],
        )
        .unwrap();
        assert_eq!(got, Value::number(0.0));
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let got = call("timestamp", vec![]).unwrap();
        assert!(DateTime::parse_from_rfc3339(got.as_str().unwrap()).is_ok());
    }
}

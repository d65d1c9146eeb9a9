// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Semantic versions and version constraints.
//!
//! Constraint syntax:
//!
//! ```text
//! ">= 1.2.0, < 2.0.0 || ~1.0"     AND with commas or spaces, OR with ||
//! "1.2 - 1.4.5"                   inclusive hyphen range
//! "~1.2.3"  "~>1.2"               patch-level changes
//! "^1.2.3"                        changes that keep the leftmost non-zero part
//! "1.2.x"  "1.*"  "*"  "1.2"      wildcards; missing parts act as wildcards
//! ```
//!
//! A prerelease version only satisfies an AND group if at least one of the
//! group's constraints names a prerelease itself.

use super::{Function, FunctionError, FunctionTable, Param, str_at};
use crate::value::{Type, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub(super) fn register(table: &mut FunctionTable) {
    table.insert(
        "semverconstraint",
        Function::new(
            vec![Param::new("version", Type::String), Param::new("constraint", Type::String)],
            |a| {
                let version: Version = str_at(a, 0).parse().map_err(|e| FunctionError::arg(0, e))?;
                let constraints: VersionConstraints =
                    str_at(a, 1).parse().map_err(|e| FunctionError::arg(1, e))?;
                Ok(Value::Bool(constraints.check(&version)))
            },
        ),
    );
}

// ============================================================================
// Version
// ============================================================================

/// A semantic version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    /// Major version.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
    /// Patch version.
    pub patch: u64,
    /// Prerelease identifiers, without the leading `-`.
    pub prerelease: String,
    /// Build metadata, without the leading `+`. Ignored when comparing.
    pub build: String,
}

static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v?([0-9]+)(?:\.([0-9]+))?(?:\.([0-9]+))?(?:-([0-9A-Za-z\-\.]+))?(?:\+([0-9A-Za-z\-\.]+))?$")
        .expect("version regex is valid")
});

impl Version {
    /// A release version.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: String::new(),
            build: String::new(),
        }
    }

    /// True if the version has prerelease identifiers.
    pub fn is_prerelease(&self) -> bool {
        !self.prerelease.is_empty()
    }

    fn core(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = VERSION_RE
            .captures(s.trim())
            .ok_or_else(|| format!("invalid semantic version {:?}", s))?;
        let part = |i: usize| -> Result<u64, String> {
            caps.get(i)
                .map(|m| m.as_str().parse::<u64>().map_err(|e| format!("invalid semantic version {:?}: {}", s, e)))
                .unwrap_or(Ok(0))
        };
        Ok(Version {
            major: part(1)?,
            minor: part(2)?,
            patch: part(3)?,
            prerelease: caps.get(4).map(|m| m.as_str().to_string()).unwrap_or_default(),
            build: caps.get(5).map(|m| m.as_str().to_string()).unwrap_or_default(),
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.prerelease.is_empty() {
            write!(f, "-{}", self.prerelease)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.core()
            .cmp(&other.core())
            .then_with(|| cmp_prerelease(&self.prerelease, &other.prerelease))
    }
}

fn cmp_prerelease(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    let mut ai = a.split('.');
    let mut bi = b.split('.');
    loop {
        match (ai.next(), bi.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

// ============================================================================
// Constraints
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone)]
enum Check {
    Any,
    Cmp(Op, Version),
    /// `lo <= v < hi`
    Within(Version, Version),
    NotWithin(Version, Version),
}

impl Check {
    fn matches(&self, v: &Version) -> bool {
        match self {
            Check::Any => true,
            Check::Cmp(op, c) => {
                let ord = v.cmp(c);
                match op {
                    Op::Eq => ord == Ordering::Equal,
                    Op::Ne => ord != Ordering::Equal,
                    Op::Gt => ord == Ordering::Greater,
                    Op::Ge => ord != Ordering::Less,
                    Op::Lt => ord == Ordering::Less,
                    Op::Le => ord != Ordering::Greater,
                }
            }
            Check::Within(lo, hi) => v >= lo && release_lt(v, hi),
            Check::NotWithin(lo, hi) => !(v >= lo && release_lt(v, hi)),
        }
    }
}

/// Upper bounds of wildcard and tilde/caret ranges exclude prereleases of the bound.
fn release_lt(v: &Version, hi: &Version) -> bool {
    v.core() < hi.core()
}

#[derive(Debug, Clone)]
struct Constraint {
    check: Check,
    prerelease: bool,
}

/// A parsed version constraint expression.
#[derive(Debug, Clone)]
pub struct VersionConstraints {
    groups: Vec<Vec<Constraint>>,
}

static HYPHEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(v?[0-9xX*][^\s,]*)\s+-\s+(v?[0-9xX*][^\s,]*)")
        .expect("hyphen regex is valid")
});

static TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(!=|>=|=>|<=|=<|~>|>|<|=|~|\^)?\s*(v?[0-9xX*][0-9A-Za-z\-\.\+\*]*)")
        .expect("constraint regex is valid")
});

impl FromStr for VersionConstraints {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut groups = Vec::new();
        for group in s.split("||") {
            let group = HYPHEN_RE.replace_all(group.trim(), ">= $1, <= $2");
            let mut constraints = Vec::new();
            let mut consumed = 0;
            for caps in TERM_RE.captures_iter(&group) {
                let whole = caps.get(0).map(|m| m.range()).unwrap_or_default();
                let between = &group[consumed..whole.start];
                if between.chars().any(|c| !(c.is_whitespace() || c == ',')) {
                    return Err(format!("improper constraint: {}", s));
                }
                consumed = whole.end;
                let op = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let ver = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                constraints.push(parse_term(op, ver).map_err(|e| format!("improper constraint: {}: {}", s, e))?);
            }
            if group[consumed..].trim().trim_matches(',').trim() != "" || constraints.is_empty() {
                return Err(format!("improper constraint: {}", s));
            }
            groups.push(constraints);
        }
        Ok(VersionConstraints { groups })
    }
}

fn is_wild(part: Option<&str>) -> bool {
    matches!(part, None | Some("x") | Some("X") | Some("*"))
}

fn parse_term(op: &str, raw: &str) -> Result<Constraint, String> {
    let trimmed = raw.trim_start_matches('v');
    let (core, suffix) = match trimmed.find(['-', '+']) {
        Some(i) => (&trimmed[..i], &trimmed[i..]),
        None => (trimmed, ""),
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() > 3 {
        return Err(format!("invalid version {:?}", raw));
    }
    let major_wild = is_wild(parts.first().copied());
    let minor_wild = major_wild || is_wild(parts.get(1).copied());
    let patch_wild = minor_wild || is_wild(parts.get(2).copied());

    let num = |i: usize, wild: bool| -> Result<u64, String> {
        if wild {
            return Ok(0);
        }
        parts[i].parse::<u64>().map_err(|_| format!("invalid version {:?}", raw))
    };
    let mut base = Version::new(num(0, major_wild)?, num(1, minor_wild)?, num(2, patch_wild)?);
    if !patch_wild && !suffix.is_empty() {
        let full: Version = format!("{}{}", core, suffix).parse()?;
        base.prerelease = full.prerelease;
        base.build = full.build;
    }
    let prerelease = base.is_prerelease();

    // The first version past the wildcard range.
    let wild_next = || {
        if major_wild {
            None
        } else if minor_wild {
            Some(Version::new(base.major + 1, 0, 0))
        } else {
            Some(Version::new(base.major, base.minor + 1, 0))
        }
    };

    let check = match op {
        "" | "=" if patch_wild => match wild_next() {
            None => Check::Any,
            Some(hi) => Check::Within(base.clone(), hi),
        },
        "" | "=" => Check::Cmp(Op::Eq, base),
        "!=" if patch_wild => match wild_next() {
            None => Check::Cmp(Op::Lt, Version::new(0, 0, 0)),
            Some(hi) => Check::NotWithin(base.clone(), hi),
        },
        "!=" => Check::Cmp(Op::Ne, base),
        ">" if patch_wild => match wild_next() {
            None => Check::Cmp(Op::Lt, Version::new(0, 0, 0)),
            Some(hi) => Check::Cmp(Op::Ge, hi),
        },
        ">" => Check::Cmp(Op::Gt, base),
        ">=" | "=>" if major_wild => Check::Any,
        ">=" | "=>" => Check::Cmp(Op::Ge, base),
        "<" if major_wild => Check::Cmp(Op::Lt, Version::new(0, 0, 0)),
        "<" => Check::Cmp(Op::Lt, base),
        "<=" | "=<" if patch_wild => match wild_next() {
            None => Check::Any,
            Some(hi) => Check::Within(Version::new(0, 0, 0), hi),
        },
        "<=" | "=<" => Check::Cmp(Op::Le, base),
        "~" | "~>" => {
            if major_wild {
                Check::Any
            } else if minor_wild {
                Check::Within(base.clone(), Version::new(base.major + 1, 0, 0))
            } else {
                Check::Within(base.clone(), Version::new(base.major, base.minor + 1, 0))
            }
        }
        "^" => {
            if major_wild {
                Check::Any
            } else if base.major > 0 || minor_wild {
                Check::Within(base.clone(), Version::new(base.major + 1, 0, 0))
            } else if base.minor > 0 || patch_wild {
                Check::Within(base.clone(), Version::new(0, base.minor + 1, 0))
            } else {
                Check::Within(base.clone(), Version::new(0, 0, base.patch + 1))
            }
        }
        other => return Err(format!("unsupported operator {:?}", other)),
    };

    Ok(Constraint { check, prerelease })
}

impl VersionConstraints {
    /// Reports whether `version` satisfies any OR group.
    pub fn check(&self, version: &Version) -> bool {
        self.groups.iter().any(|group| {
            if version.is_prerelease() && !group.iter().any(|c| c.prerelease) {
                return false;
            }
            group.iter().all(|c| c.check.matches(version))
        })
    }
}

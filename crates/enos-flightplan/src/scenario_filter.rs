// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scenario filters.
//!
//! A filter selects scenario instances by name and variants. The command line
//! form is a list of tokens: at most one bare scenario name, `key:value`
//! includes and `!key:value` excludes.
//!
//! ```text
//! test backend:consul !arch:arm64
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::matrix::{Element, Exclude, ExcludeMode, Matrix, Vector};
use crate::sample_subset::SampleSubset;

/// Selects scenarios by name and variants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioFilter {
    /// Scenario name. `None` matches every name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Select everything regardless of the other fields.
    #[serde(default)]
    pub select_all: bool,
    /// Variants a selected scenario must have.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vector>,
    /// Variant patterns a selected scenario must not match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<Exclude>,
    /// When set, selected variants must also intersect this matrix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersection_matrix: Option<Matrix>,
}

impl ScenarioFilter {
    /// A filter that selects every scenario.
    pub fn select_all() -> Self {
        Self {
            select_all: true,
            ..Self::default()
        }
    }

    /// A filter that selects scenarios with the given name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// A filter for exactly one scenario instance.
    pub fn for_scenario(name: impl Into<String>, variants: &Vector) -> Self {
        Self {
            name: Some(name.into()),
            include: (!variants.is_empty()).then(|| variants.clone()),
            ..Self::default()
        }
    }

    /// Parses command line style filter tokens.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        if args.is_empty() {
            return Ok(Self::select_all());
        }

        let mut filter = Self::default();
        let mut include = Vector::new();

        for arg in args {
            let arg = arg.as_ref();
            if arg.is_empty() {
                continue;
            }

            if !arg.contains(':') && !arg.starts_with('!') {
                if let Some(name) = &filter.name {
                    return Err(Error::Matrix(format!(
                        "invalid filter: more than one scenario name given, found {:?} and {:?}",
                        name, arg
                    )));
                }
                filter.name = Some(arg.to_string());
                continue;
            }

            let (negate, pair) = match arg.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, arg),
            };
            let element = parse_element(pair)?;
            if negate {
                filter.exclude.push(Exclude::new(
                    ExcludeMode::Contains,
                    Vector::from_elements([element]),
                ));
            } else {
                include.push(element);
            }
        }

        if !include.is_empty() {
            filter.include = Some(include);
        }

        Ok(filter)
    }

    /// Derives the filter that selects a sample subset's scenarios.
    ///
    /// The scenario name comes from `scenario_name`, the name given in
    /// `scenario_filter`, or the subset name, in that order. A subset matrix
    /// becomes the filter's intersection matrix.
    pub fn for_subset(subset: &SampleSubset) -> Result<Self> {
        let mut filter = match &subset.scenario_filter {
            Some(raw) => {
                let tokens: Vec<&str> = raw.split_whitespace().collect();
                let parsed = Self::parse(&tokens)?;
                if parsed.select_all {
                    Self::default()
                } else {
                    parsed
                }
            }
            None => Self::default(),
        };

        match (&subset.scenario_name, &filter.name) {
            (Some(want), Some(got)) if want != got => {
                return Err(Error::Sampling(format!(
                    "subset {} scenario_name {} does not match scenario_filter name {}",
                    subset.name, want, got
                )));
            }
            (Some(want), _) => filter.name = Some(want.clone()),
            (None, Some(_)) => {}
            (None, None) => {
                if subset.name.is_empty() {
                    return Err(Error::Sampling(
                        "subset does not have a scenario_name, scenario_filter, or name".to_string(),
                    ));
                }
                filter.name = Some(subset.name.clone());
            }
        }

        if let Some(matrix) = &subset.matrix {
            if !matrix.is_empty() {
                filter.intersection_matrix = Some(matrix.clone());
            }
        }

        Ok(filter)
    }

    /// Returns true if the filter names a scenario and that name is `name`,
    /// or if the filter does not constrain the name.
    pub fn matches_name(&self, name: &str) -> bool {
        if self.select_all {
            return true;
        }
        match &self.name {
            Some(n) => n == name,
            None => true,
        }
    }

    /// Returns true if only scenarios with variants can match.
    pub fn requires_variants(&self) -> bool {
        if self.select_all {
            return false;
        }
        self.include.as_ref().is_some_and(|v| !v.is_empty())
            || !self.exclude.is_empty()
            || self.intersection_matrix.as_ref().is_some_and(|m| !m.is_empty())
    }
}

fn parse_element(pair: &str) -> Result<Element> {
    let parts: Vec<&str> = pair.split(':').collect();
    match parts.as_slice() {
        [key, val] if !key.is_empty() && !val.is_empty() => Ok(Element::new(*key, *val)),
        _ => Err(Error::Matrix(format!(
            "invalid filter: variants must be of the form key:value, got {:?}",
            pair
        ))),
    }
}

impl fmt::Display for ScenarioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(name) = &self.name {
            parts.push(name.clone());
        }
        if let Some(include) = &self.include {
            parts.extend(include.iter().map(ToString::to_string));
        }
        for ex in &self.exclude {
            parts.extend(ex.vector.iter().map(|e| format!("!{}", e)));
        }
        f.write_str(&parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blank_selects_all() {
        let empty: [&str; 0] = [];
        assert_eq!(ScenarioFilter::parse(&empty).unwrap(), ScenarioFilter::select_all());
    }

    #[test]
    fn test_parse_name_and_variants() {
        let filter = ScenarioFilter::parse(&["test", "backend:consul", "!arch:arm64"]).unwrap();
        assert_eq!(
            filter,
            ScenarioFilter {
                name: Some("test".to_string()),
                include: Some(Vector::from_pairs([("backend", "consul")])),
                exclude: vec![Exclude::new(
                    ExcludeMode::Contains,
                    Vector::from_pairs([("arch", "arm64")])
                )],
                ..ScenarioFilter::default()
            }
        );
        assert_eq!(filter.to_string(), "test backend:consul !arch:arm64");
    }

    #[test]
    fn test_parse_variants_without_name() {
        let filter = ScenarioFilter::parse(&["!arch:amd64", "backend:raft"]).unwrap();
        assert_eq!(filter.name, None);
        assert_eq!(filter.include, Some(Vector::from_pairs([("backend", "raft")])));
        assert_eq!(filter.exclude.len(), 1);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ScenarioFilter::parse(&["one", "two"]).is_err());
        assert!(ScenarioFilter::parse(&["a:b:c"]).is_err());
        assert!(ScenarioFilter::parse(&[":b"]).is_err());
        assert!(ScenarioFilter::parse(&["!a:"]).is_err());
    }

    #[test]
    fn test_parse_negated_token_requires_variant() {
        for arg in ["!foo", "!"] {
            let err = ScenarioFilter::parse(&[arg]).unwrap_err();
            assert!(
                err.to_string().contains("variants must be of the form key:value"),
                "{}",
                err
            );
        }
        let err = ScenarioFilter::parse(&["upgrade", "!foo"]).unwrap_err();
        assert!(err.to_string().contains("variants must be of the form key:value"));
    }

    fn subset(name: &str) -> SampleSubset {
        SampleSubset {
            name: name.to_string(),
            ..SampleSubset::default()
        }
    }

    #[test]
    fn test_for_subset() {
        let filter = ScenarioFilter::for_subset(&subset("foo")).unwrap();
        assert_eq!(filter, ScenarioFilter::with_name("foo"));

        let mut s = subset("bar");
        s.scenario_name = Some("foo".to_string());
        s.scenario_filter = Some("foo something:other".to_string());
        let filter = ScenarioFilter::for_subset(&s).unwrap();
        assert_eq!(filter.name.as_deref(), Some("foo"));
        assert_eq!(filter.include, Some(Vector::from_pairs([("something", "other")])));

        s.scenario_filter = Some("baz backend:raft".to_string());
        assert!(ScenarioFilter::for_subset(&s).is_err());

        let mut s = subset("foo");
        s.scenario_filter = Some("backend:raft".to_string());
        let filter = ScenarioFilter::for_subset(&s).unwrap();
        assert_eq!(filter.name.as_deref(), Some("foo"));

        let mut s = subset("foo");
        let m = Matrix::from_vectors([Vector::from_pairs([("backend", "raft"), ("arch", "amd64")])]);
        s.matrix = Some(m.clone());
        let filter = ScenarioFilter::for_subset(&s).unwrap();
        assert_eq!(filter.intersection_matrix, Some(m));

        assert!(ScenarioFilter::for_subset(&subset("")).is_err());
    }
}

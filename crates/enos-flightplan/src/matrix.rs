// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Matrix algebra over variant vectors.
//!
//! A [`Matrix`] is a collection of [`Vector`]s, each an ordered list of
//! `key:value` [`Element`]s. A scenario's matrix block is decoded into one
//! vector per variant axis, combined with [`Matrix::cartesian_product`] and then
//! refined with includes, [`Exclude`]s and [`ScenarioFilter`]s.
//!
//! Three vector relations are used throughout:
//!
//! | Relation | Meaning |
//! |----------|---------|
//! | `==` | Same elements in the same order |
//! | [`Vector::equal_unordered`] | Same elements in any order |
//! | [`Vector::contains_unordered`] | Every element of the other vector is present |

use enos_hcl::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::error::Error;
use crate::scenario_filter::ScenarioFilter;

// ============================================================================
// Element
// ============================================================================

/// A single `key:value` variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Element {
    /// Variant axis name.
    pub key: String,
    /// Variant value.
    #[serde(rename = "value")]
    pub val: String,
}

impl Element {
    /// Creates an element.
    pub fn new(key: impl Into<String>, val: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            val: val.into(),
        }
    }
}

impl PartialOrd for Element {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Element {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key).then_with(|| self.val.cmp(&other.val))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.val)
    }
}

// ============================================================================
// Vector
// ============================================================================

/// An ordered list of elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector(Vec<Element>);

impl Vector {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a vector from elements.
    pub fn from_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        Self(elements.into_iter().collect())
    }

    /// Creates a vector from `(key, value)` pairs.
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        Self(pairs.into_iter().map(|(k, v)| Element::new(k, v)).collect())
    }

    /// Appends an element.
    pub fn push(&mut self, element: Element) {
        self.0.push(element);
    }

    /// The elements in order.
    pub fn elements(&self) -> &[Element] {
        &self.0
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, Element> {
        self.0.iter()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The value of the first element with the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|e| e.key == key).map(|e| e.val.as_str())
    }

    /// Returns true if both vectors have the same elements regardless of order.
    pub fn equal_unordered(&self, other: &Vector) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let mut a = self.0.clone();
        let mut b = other.0.clone();
        a.sort();
        b.sort();
        a == b
    }

    /// Returns true if every element of `other` is in this vector. Empty
    /// vectors never contain or are contained.
    pub fn contains_unordered(&self, other: &Vector) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        other.0.iter().all(|o| self.0.contains(o))
    }

    /// Sorts elements by key, then value.
    pub fn sort(&mut self) {
        self.0.sort();
    }

    /// Returns a sorted copy.
    pub fn sorted(&self) -> Vector {
        let mut v = self.clone();
        v.sort();
        v
    }

    /// The vector as an object of `key = "value"` attributes, as bound to
    /// `matrix` in evaluation contexts.
    pub fn to_value(&self) -> Value {
        Value::object_from(self.0.iter().map(|e| (e.key.clone(), Value::string(&e.val))))
    }

    /// The elements joined by spaces without brackets, as used in filter strings.
    pub fn filter_str(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PartialOrd for Vector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shorter vectors sort first; vectors of equal length compare element-wise.
impl Ord for Vector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.0.iter().cmp(other.0.iter()))
    }
}

impl fmt::Display for Vector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "[{}]", self.filter_str())
    }
}

impl FromIterator<Element> for Vector {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Vector {
    type Item = &'a Element;
    type IntoIter = std::slice::Iter<'a, Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Exclude
// ============================================================================

/// How an [`Exclude`] matches a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludeMode {
    /// Same elements in the same order.
    Exactly,
    /// Same elements in any order.
    EqualUnordered,
    /// The vector contains every element of the exclude.
    Contains,
}

impl std::str::FromStr for ExcludeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exactly" => Ok(ExcludeMode::Exactly),
            // Both spellings mean multiset equality.
            "equal_unordered" | "equal_values" => Ok(ExcludeMode::EqualUnordered),
            "contains" => Ok(ExcludeMode::Contains),
            other => Err(Error::Matrix(format!("unknown exclude mode {:?}", other))),
        }
    }
}

/// A filter that removes matching vectors from a matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclude {
    /// Match mode.
    pub mode: ExcludeMode,
    /// The vector to match against.
    pub vector: Vector,
}

impl Exclude {
    /// Creates an exclude.
    pub fn new(mode: ExcludeMode, vector: Vector) -> Self {
        Self { mode, vector }
    }

    /// Returns true if `vec` is excluded.
    pub fn matches(&self, vec: &Vector) -> bool {
        match self.mode {
            ExcludeMode::Exactly => *vec == self.vector,
            ExcludeMode::EqualUnordered => vec.equal_unordered(&self.vector),
            ExcludeMode::Contains => vec.contains_unordered(&self.vector),
        }
    }
}

// ============================================================================
// Matrix
// ============================================================================

/// A collection of vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    vectors: Vec<Vector>,
}

impl Matrix {
    /// Creates an empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a matrix from vectors. Empty vectors are dropped.
    pub fn from_vectors(vectors: impl IntoIterator<Item = Vector>) -> Self {
        let mut m = Self::new();
        for v in vectors {
            m.add_vector(v);
        }
        m
    }

    /// The vectors in order.
    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }

    /// Consumes the matrix, returning its vectors.
    pub fn into_vectors(self) -> Vec<Vector> {
        self.vectors
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns true if the matrix has no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Adds a vector. Empty vectors are dropped.
    pub fn add_vector(&mut self, vec: Vector) {
        if vec.is_empty() {
            return;
        }
        self.vectors.push(vec);
    }

    /// Adds a copy of the vector with its elements sorted.
    pub fn add_vector_sorted(&mut self, vec: &Vector) {
        self.add_vector(vec.sorted());
    }

    /// Returns true if an identical vector is present.
    pub fn has_vector(&self, vec: &Vector) -> bool {
        self.vectors.iter().any(|v| v == vec)
    }

    /// Returns true if a vector with the same elements in any order is present.
    pub fn has_vector_unordered(&self, vec: &Vector) -> bool {
        self.vectors.iter().any(|v| v.equal_unordered(vec))
    }

    /// Returns true if some vector contains every element of `vec`.
    pub fn contains_vector_unordered(&self, vec: &Vector) -> bool {
        self.vectors.iter().any(|v| v.contains_unordered(vec))
    }

    /// Treats each vector as a variant axis and returns every combination
    /// taking one element from each axis.
    ///
    /// Element order follows axis order. Vectors are produced in odometer
    /// order: the last axis advances fastest.
    pub fn cartesian_product(&self) -> Matrix {
        let mut product = Matrix::new();
        if self.vectors.is_empty() {
            return product;
        }

        let mut idx = vec![0usize; self.vectors.len()];
        loop {
            let vec: Vector = self
                .vectors
                .iter()
                .zip(&idx)
                .map(|(axis, &i)| axis.0[i].clone())
                .collect();
            product.add_vector(vec);

            // Advance the odometer from the rightmost axis.
            let mut axis = self.vectors.len();
            loop {
                if axis == 0 {
                    return product;
                }
                axis -= 1;
                idx[axis] += 1;
                if idx[axis] < self.vectors[axis].len() {
                    break;
                }
                idx[axis] = 0;
            }
        }
    }

    /// Returns a copy with exact duplicates removed, keeping first occurrences.
    pub fn unique(&self) -> Matrix {
        let mut m = Matrix::new();
        for v in &self.vectors {
            if !m.has_vector(v) {
                m.add_vector(v.clone());
            }
        }
        m
    }

    /// Returns a copy with vectors that are equal in any order collapsed,
    /// keeping first occurrences.
    pub fn unique_values(&self) -> Matrix {
        let mut m = Matrix::new();
        for v in &self.vectors {
            if !m.has_vector_unordered(v) {
                m.add_vector(v.clone());
            }
        }
        m
    }

    /// Returns a copy without the vectors matched by any exclude.
    pub fn exclude(&self, excludes: &[Exclude]) -> Matrix {
        if excludes.is_empty() {
            return self.clone();
        }
        Matrix::from_vectors(
            self.vectors
                .iter()
                .filter(|v| !excludes.iter().any(|ex| ex.matches(v)))
                .cloned(),
        )
    }

    /// Returns the vectors selected by a scenario filter.
    pub fn filter(&self, filter: &ScenarioFilter) -> Matrix {
        if filter.select_all {
            return self.clone();
        }

        let mut nm = match &filter.include {
            Some(include) if !include.is_empty() => self
                .intersection_contains_unordered(&Matrix::from_vectors([include.clone()]))
                .unwrap_or_default(),
            _ => self.clone(),
        };

        if !filter.exclude.is_empty() {
            nm = nm.exclude(&filter.exclude);
        }

        if let Some(intersection) = &filter.intersection_matrix {
            if !intersection.is_empty() {
                nm = nm.intersection_contains_unordered(intersection).unwrap_or_default();
            }
        }

        nm
    }

    /// Returns the vectors of either matrix that contain some vector of the
    /// other, with duplicates collapsed. `None` when nothing matches.
    pub fn intersection_contains_unordered(&self, other: &Matrix) -> Option<Matrix> {
        if self.is_empty() || other.is_empty() {
            return None;
        }

        let mut nm = Matrix::new();
        for v in &self.vectors {
            if other.vectors.iter().any(|o| v.contains_unordered(o)) {
                nm.add_vector(v.clone());
            }
        }
        for o in &other.vectors {
            if self.vectors.iter().any(|v| o.contains_unordered(v)) {
                nm.add_vector(o.clone());
            }
        }

        if nm.is_empty() {
            return None;
        }
        Some(nm.unique_values())
    }

    /// Returns the vectors that are in exactly one of the matrices, compared
    /// without regard to element order.
    pub fn symmetric_difference_unordered(&self, other: &Matrix) -> Matrix {
        let mut nm = Matrix::new();
        for v in &other.vectors {
            if !self.has_vector_unordered(v) {
                nm.add_vector(v.clone());
            }
        }
        for v in &self.vectors {
            if !other.has_vector_unordered(v) {
                nm.add_vector(v.clone());
            }
        }
        nm
    }

    /// Sorts each vector's elements and then the vectors themselves.
    pub fn sort(&mut self) {
        for v in &mut self.vectors {
            v.sort();
        }
        self.vectors.sort();
    }

    /// The matrix as a list of vector objects.
    pub fn to_value(&self) -> Value {
        Value::tuple(self.vectors.iter().map(Vector::to_value).collect())
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.vectors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(pairs: &[(&str, &str)]) -> Vector {
        Vector::from_pairs(pairs.iter().copied())
    }

    fn axis(key: &str, vals: &[&str]) -> Vector {
        Vector::from_elements(vals.iter().map(|v| Element::new(key, *v)))
    }

    #[test]
    fn test_vector_relations() {
        let v = vec_of(&[("backend", "raft"), ("arch", "amd64")]);
        let reversed = vec_of(&[("arch", "amd64"), ("backend", "raft")]);
        let sub = vec_of(&[("arch", "amd64")]);

        assert_eq!(v, v.clone());
        assert_ne!(v, reversed);
        assert!(v.equal_unordered(&reversed));
        assert!(v.contains_unordered(&sub));
        assert!(!sub.contains_unordered(&v));
        assert!(!v.contains_unordered(&Vector::new()));
        assert!(!Vector::new().contains_unordered(&sub));
    }

    #[test]
    fn test_vector_display() {
        let v = vec_of(&[("backend", "raft"), ("arch", "amd64")]);
        assert_eq!(v.to_string(), "[backend:raft arch:amd64]");
        assert_eq!(v.filter_str(), "backend:raft arch:amd64");
        assert_eq!(Vector::new().to_string(), "");
    }

    #[test]
    fn test_add_vector_drops_empty() {
        let mut m = Matrix::new();
        m.add_vector(Vector::new());
        m.add_vector(vec_of(&[("a", "b")]));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_cartesian_product_odometer_order() {
        let m = Matrix::from_vectors([axis("a", &["x", "y"]), axis("b", &["1", "2", "3"])]);
        let product = m.cartesian_product();

        assert_eq!(product.len(), 6);
        let got: Vec<String> = product.vectors().iter().map(ToString::to_string).collect();
        assert_eq!(
            got,
            vec![
                "[a:x b:1]", "[a:x b:2]", "[a:x b:3]", "[a:y b:1]", "[a:y b:2]", "[a:y b:3]",
            ]
        );
    }

    #[test]
    fn test_cartesian_product_size_is_product_of_axes() {
        let m = Matrix::from_vectors([
            axis("a", &["1", "2"]),
            axis("b", &["1", "2", "3"]),
            axis("c", &["1", "2", "3", "4"]),
        ]);
        assert_eq!(m.cartesian_product().len(), 24);
        assert!(Matrix::new().cartesian_product().is_empty());
    }

    #[test]
    fn test_unique_and_unique_values() {
        let m = Matrix::from_vectors([
            vec_of(&[("a", "1"), ("b", "2")]),
            vec_of(&[("a", "1"), ("b", "2")]),
            vec_of(&[("b", "2"), ("a", "1")]),
        ]);
        assert_eq!(m.unique().len(), 2);
        let uv = m.unique_values();
        assert_eq!(uv.len(), 1);
        assert_eq!(uv.unique_values(), uv);
    }

    #[test]
    fn test_exclude_modes() {
        let v = vec_of(&[("a", "1"), ("b", "2")]);
        assert!(Exclude::new(ExcludeMode::Exactly, v.clone()).matches(&v));
        assert!(!Exclude::new(ExcludeMode::Exactly, vec_of(&[("b", "2"), ("a", "1")])).matches(&v));
        assert!(Exclude::new(ExcludeMode::EqualUnordered, vec_of(&[("b", "2"), ("a", "1")])).matches(&v));
        assert!(Exclude::new(ExcludeMode::Contains, vec_of(&[("b", "2")])).matches(&v));
        assert!(!Exclude::new(ExcludeMode::Contains, vec_of(&[("b", "3")])).matches(&v));
    }

    #[test]
    fn test_exclude_mode_parse() {
        assert_eq!("equal_values".parse::<ExcludeMode>().unwrap(), ExcludeMode::EqualUnordered);
        assert_eq!("contains".parse::<ExcludeMode>().unwrap(), ExcludeMode::Contains);
        assert!("unspecified".parse::<ExcludeMode>().is_err());
    }

    #[test]
    fn test_filter_include_and_exclude() {
        let m = Matrix::from_vectors([axis("backend", &["raft", "consul"]), axis("arch", &["amd64", "arm64"])])
            .cartesian_product();
        let filter = ScenarioFilter {
            include: Some(vec_of(&[("backend", "consul")])),
            exclude: vec![Exclude::new(ExcludeMode::Contains, vec_of(&[("arch", "arm64")]))],
            ..ScenarioFilter::default()
        };

        let got = m.filter(&filter);
        assert_eq!(got.vectors(), &[vec_of(&[("backend", "consul"), ("arch", "amd64")])]);
        for v in got.vectors() {
            assert!(v.contains_unordered(filter.include.as_ref().unwrap()));
            assert!(!filter.exclude.iter().any(|ex| ex.matches(v)));
        }

        let all = ScenarioFilter {
            select_all: true,
            ..ScenarioFilter::default()
        };
        assert_eq!(m.filter(&all), m);
    }

    #[test]
    fn test_filter_intersection_matrix() {
        let m = Matrix::from_vectors([axis("backend", &["raft", "consul"]), axis("arch", &["amd64", "arm64"])])
            .cartesian_product();
        let filter = ScenarioFilter {
            intersection_matrix: Some(Matrix::from_vectors([vec_of(&[("arch", "arm64"), ("backend", "raft")])])),
            ..ScenarioFilter::default()
        };
        let got = m.filter(&filter);
        assert_eq!(got.len(), 1);
        assert!(got.vectors()[0].equal_unordered(&vec_of(&[("backend", "raft"), ("arch", "arm64")])));
    }

    #[test]
    fn test_intersection_contains_unordered() {
        let m = Matrix::from_vectors([vec_of(&[("a", "1"), ("b", "1")]), vec_of(&[("a", "2"), ("b", "1")])]);
        let other = Matrix::from_vectors([vec_of(&[("a", "1")])]);
        let got = m.intersection_contains_unordered(&other).unwrap();
        assert_eq!(got.vectors(), &[vec_of(&[("a", "1"), ("b", "1")])]);

        let none = Matrix::from_vectors([vec_of(&[("c", "1")])]);
        assert!(m.intersection_contains_unordered(&none).is_none());
        assert!(m.intersection_contains_unordered(&Matrix::new()).is_none());
    }

    #[test]
    fn test_symmetric_difference_unordered() {
        let a = Matrix::from_vectors([vec_of(&[("a", "1")]), vec_of(&[("a", "2")])]);
        let b = Matrix::from_vectors([vec_of(&[("a", "2")]), vec_of(&[("a", "3")])]);
        let diff = a.symmetric_difference_unordered(&b);
        assert_eq!(diff.vectors(), &[vec_of(&[("a", "3")]), vec_of(&[("a", "1")])]);
    }

    #[test]
    fn test_sort() {
        let mut m = Matrix::from_vectors([
            vec_of(&[("b", "2"), ("a", "2")]),
            vec_of(&[("b", "1"), ("a", "2")]),
            vec_of(&[("a", "1")]),
        ]);
        m.sort();
        assert_eq!(m.to_string(), "[a:1]\n[a:2 b:1]\n[a:2 b:2]");
    }

    #[test]
    fn test_vector_to_value() {
        let v = vec_of(&[("backend", "raft")]);
        assert_eq!(
            v.to_value().get_attr("backend"),
            Some(&Value::string("raft"))
        );
    }
}

// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The dynamic, type-tagged value system.
//!
//! Every [`Value`] carries enough information to recover its [`Type`]. Null and
//! unknown values are typed as well, so a partially evaluated expression can
//! still be type-checked. Unknown leaves propagate upward through operators and
//! function calls.
//!
//! Capsules wrap opaque host values (for example a step variable that is
//! either a concrete value or a symbolic reference) so they can travel through
//! evaluation contexts alongside ordinary values.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Types
// ============================================================================

/// The type of a value, or a type constraint when it contains [`Type::Dynamic`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    /// Any type. Used for constraints and for values whose type is not yet known.
    Dynamic,
    /// UTF-8 string.
    String,
    /// Arbitrary number.
    Number,
    /// Boolean.
    Bool,
    /// Ordered homogeneous collection.
    List(Box<Type>),
    /// Unordered homogeneous collection of unique values.
    Set(Box<Type>),
    /// String-keyed homogeneous collection.
    Map(Box<Type>),
    /// String-keyed structural type with a fixed set of attributes.
    Object(BTreeMap<String, Type>),
    /// Ordered structural type with a fixed number of elements.
    Tuple(Vec<Type>),
    /// An opaque host type, identified by name.
    Capsule(&'static str),
    /// An optional object attribute. Only meaningful inside [`Type::Object`] constraints.
    Optional(Box<Type>),
}

impl Type {
    /// Creates a list type.
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    /// Creates a set type.
    pub fn set(elem: Type) -> Type {
        Type::Set(Box::new(elem))
    }

    /// Creates a map type.
    pub fn map(elem: Type) -> Type {
        Type::Map(Box::new(elem))
    }

    /// Returns true for string, number and bool.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::String | Type::Number | Type::Bool)
    }

    /// Returns the element type of a list, set or map.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::List(t) | Type::Set(t) | Type::Map(t) => Some(t),
            _ => None,
        }
    }

    /// Returns true if the type contains no [`Type::Dynamic`] placeholders.
    pub fn is_concrete(&self) -> bool {
        match self {
            Type::Dynamic => false,
            Type::List(t) | Type::Set(t) | Type::Map(t) | Type::Optional(t) => t.is_concrete(),
            Type::Object(attrs) => attrs.values().all(Type::is_concrete),
            Type::Tuple(elems) => elems.iter().all(Type::is_concrete),
            _ => true,
        }
    }

    /// A human-readable name, as used in error messages.
    pub fn friendly_name(&self) -> String {
        match self {
            Type::Dynamic => "dynamic".to_string(),
            Type::String => "string".to_string(),
            Type::Number => "number".to_string(),
            Type::Bool => "bool".to_string(),
            Type::List(t) => format!("list of {}", t.friendly_name()),
            Type::Set(t) => format!("set of {}", t.friendly_name()),
            Type::Map(t) => format!("map of {}", t.friendly_name()),
            Type::Object(_) => "object".to_string(),
            Type::Tuple(_) => "tuple".to_string(),
            Type::Capsule(name) => (*name).to_string(),
            Type::Optional(t) => format!("optional {}", t.friendly_name()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.friendly_name())
    }
}

// ============================================================================
// Capsules
// ============================================================================

type CapsuleEq = fn(&(dyn Any + Send + Sync), &(dyn Any + Send + Sync)) -> bool;
type CapsuleDebug = fn(&(dyn Any + Send + Sync), &mut fmt::Formatter<'_>) -> fmt::Result;

/// An opaque host value embedded in the value system.
#[derive(Clone)]
pub struct Capsule {
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
    eq: CapsuleEq,
    debug: CapsuleDebug,
}

impl Capsule {
    /// Wraps `payload` in a capsule of the named type.
    pub fn new<T>(type_name: &'static str, payload: T) -> Self
    where
        T: Any + Send + Sync + PartialEq + fmt::Debug,
    {
        fn eq_impl<T: Any + PartialEq>(
            a: &(dyn Any + Send + Sync),
            b: &(dyn Any + Send + Sync),
        ) -> bool {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        fn debug_impl<T: Any + fmt::Debug>(
            v: &(dyn Any + Send + Sync),
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            match v.downcast_ref::<T>() {
                Some(v) => fmt::Debug::fmt(v, f),
                None => f.write_str("<capsule>"),
            }
        }

        Self {
            type_name,
            payload: Arc::new(payload),
            eq: eq_impl::<T>,
            debug: debug_impl::<T>,
        }
    }

    /// The capsule's type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the payload as `T` if it has that type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl PartialEq for Capsule {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && (self.eq)(&*self.payload, &*other.payload)
    }
}

impl fmt::Debug for Capsule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capsule<{}>(", self.type_name)?;
        (self.debug)(&*self.payload, f)?;
        f.write_str(")")
    }
}

// ============================================================================
// Values
// ============================================================================

/// A dynamic value.
#[derive(Debug, Clone)]
pub enum Value {
    /// A null of the given type.
    Null(Type),
    /// A value of the given type that is not yet known.
    Unknown(Type),
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
    /// List with its element type.
    List(Type, Vec<Value>),
    /// Set with its element type. Elements are unique and canonically ordered.
    Set(Type, Vec<Value>),
    /// Map with its element type.
    Map(Type, BTreeMap<String, Value>),
    /// Object.
    Object(BTreeMap<String, Value>),
    /// Tuple.
    Tuple(Vec<Value>),
    /// Opaque host value.
    Capsule(Capsule),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null(a), Value::Null(b)) => a == b || *a == Type::Dynamic || *b == Type::Dynamic,
            (Value::Unknown(a), Value::Unknown(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(_, a), Value::List(_, b)) => a == b,
            (Value::Set(_, a), Value::Set(_, b)) => a == b,
            (Value::Map(_, a), Value::Map(_, b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Capsule(a), Value::Capsule(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::null()
    }
}

impl Value {
    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// An untyped null.
    pub fn null() -> Value {
        Value::Null(Type::Dynamic)
    }

    /// An unknown value of dynamic type.
    pub fn unknown() -> Value {
        Value::Unknown(Type::Dynamic)
    }

    /// A string value.
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    /// A number value.
    pub fn number(n: impl Into<f64>) -> Value {
        Value::Number(n.into())
    }

    /// A list value whose element type is inferred from the elements.
    ///
    /// Elements of differing types are unified where possible (for example a
    /// mix of strings and numbers becomes a list of strings); otherwise the
    /// elements keep their own types under a dynamic element type.
    pub fn list(elems: Vec<Value>) -> Value {
        let (ty, elems) = unify_elements(elems);
        Value::List(ty, elems)
    }

    /// An empty list of the given element type.
    pub fn empty_list(elem: Type) -> Value {
        Value::List(elem, Vec::new())
    }

    /// A set value whose element type is inferred. Duplicates are removed.
    pub fn set(elems: Vec<Value>) -> Value {
        let (ty, elems) = unify_elements(elems);
        Value::Set(ty, canonical_set(elems))
    }

    /// A set value of a known element type. Duplicates are removed.
    pub fn set_of(ty: Type, elems: Vec<Value>) -> Value {
        Value::Set(ty, canonical_set(elems))
    }

    /// A map value whose element type is inferred.
    pub fn map(entries: BTreeMap<String, Value>) -> Value {
        let (keys, vals): (Vec<String>, Vec<Value>) = entries.into_iter().unzip();
        let (ty, vals) = unify_elements(vals);
        Value::Map(ty, keys.into_iter().zip(vals).collect())
    }

    /// An object value.
    pub fn object(attrs: BTreeMap<String, Value>) -> Value {
        Value::Object(attrs)
    }

    /// An object value from key/value pairs.
    pub fn object_from<K: Into<String>>(attrs: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Object(attrs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// An empty object.
    pub fn empty_object() -> Value {
        Value::Object(BTreeMap::new())
    }

    /// A tuple value.
    pub fn tuple(elems: Vec<Value>) -> Value {
        Value::Tuple(elems)
    }

    /// A list of strings.
    pub fn string_list<S: AsRef<str>>(items: &[S]) -> Value {
        if items.is_empty() {
            return Value::empty_list(Type::String);
        }
        Value::List(
            Type::String,
            items.iter().map(|s| Value::string(s.as_ref())).collect(),
        )
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// The value's type.
    pub fn ty(&self) -> Type {
        match self {
            Value::Null(t) | Value::Unknown(t) => t.clone(),
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::List(t, _) => Type::list(t.clone()),
            Value::Set(t, _) => Type::set(t.clone()),
            Value::Map(t, _) => Type::map(t.clone()),
            Value::Object(attrs) => {
                Type::Object(attrs.iter().map(|(k, v)| (k.clone(), v.ty())).collect())
            }
            Value::Tuple(elems) => Type::Tuple(elems.iter().map(Value::ty).collect()),
            Value::Capsule(c) => Type::Capsule(c.type_name),
        }
    }

    /// Returns true if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Returns true unless the value itself is unknown. Nested unknowns are ignored.
    pub fn is_known(&self) -> bool {
        !matches!(self, Value::Unknown(_))
    }

    /// Returns true if neither the value nor anything nested within it is unknown.
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Value::Unknown(_) => false,
            Value::List(_, v) | Value::Set(_, v) | Value::Tuple(v) => {
                v.iter().all(Value::is_wholly_known)
            }
            Value::Map(_, m) | Value::Object(m) => m.values().all(Value::is_wholly_known),
            _ => true,
        }
    }

    /// Returns the string if this is a known string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number if this is a known number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the bool if this is a known bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the capsule if this is one.
    pub fn as_capsule(&self) -> Option<&Capsule> {
        match self {
            Value::Capsule(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the attributes of an object or the entries of a map.
    pub fn as_value_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(_, m) | Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the elements of a list, set or tuple.
    pub fn as_value_slice(&self) -> Option<&[Value]> {
        match self {
            Value::List(_, v) | Value::Set(_, v) | Value::Tuple(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true for a known `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// Returns true for lists, sets, tuples, maps and objects.
    pub fn can_iterate_elements(&self) -> bool {
        matches!(
            self,
            Value::List(..) | Value::Set(..) | Value::Tuple(_) | Value::Map(..) | Value::Object(_)
        ) || matches!(self, Value::Unknown(t) | Value::Null(t) if matches!(t, Type::List(_) | Type::Set(_) | Type::Map(_) | Type::Object(_) | Type::Tuple(_)))
    }

    /// Number of elements of a collection or structural value.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::List(_, v) | Value::Set(_, v) | Value::Tuple(v) => Some(v.len()),
            Value::Map(_, m) | Value::Object(m) => Some(m.len()),
            Value::String(s) => Some(s.chars().count()),
            _ => None,
        }
    }

    /// Looks up an attribute of an object or an entry of a map.
    pub fn get_attr(&self, name: &str) -> Option<&Value> {
        self.as_value_map().and_then(|m| m.get(name))
    }

    /// A short name for the value's type, for use in error messages.
    pub fn type_name(&self) -> String {
        self.ty().friendly_name()
    }

    /// Language-level equality. Returns an unknown bool if either side is
    /// not wholly known.
    pub fn equals(&self, other: &Value) -> Value {
        if !self.is_wholly_known() || !other.is_wholly_known() {
            return Value::Unknown(Type::Bool);
        }
        Value::Bool(self.semantic_eq(other))
    }

    /// Equality ignoring collection kind, so a tuple equals a list with the same elements.
    pub fn semantic_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null(_), Value::Null(_)) => true,
            (a, b) if a.as_value_slice().is_some() && b.as_value_slice().is_some() => {
                let (a, b) = (a.as_value_slice().unwrap_or_default(), b.as_value_slice().unwrap_or_default());
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.semantic_eq(y))
            }
            (a, b) if a.as_value_map().is_some() && b.as_value_map().is_some() => {
                match (a.as_value_map(), b.as_value_map()) {
                    (Some(a), Some(b)) => {
                        a.len() == b.len()
                            && a.iter()
                                .zip(b)
                                .all(|((ka, va), (kb, vb))| ka == kb && va.semantic_eq(vb))
                    }
                    _ => false,
                }
            }
            (a, b) => a == b,
        }
    }

    /// Replaces nested capsules, nulls and unknowns where `f` returns a replacement.
    pub fn transform(&self, f: &dyn Fn(&Value) -> Option<Value>) -> Value {
        if let Some(v) = f(self) {
            return v;
        }
        match self {
            Value::List(t, v) => Value::List(t.clone(), v.iter().map(|e| e.transform(f)).collect()),
            Value::Set(t, v) => Value::Set(t.clone(), v.iter().map(|e| e.transform(f)).collect()),
            Value::Tuple(v) => Value::Tuple(v.iter().map(|e| e.transform(f)).collect()),
            Value::Map(t, m) => Value::Map(
                t.clone(),
                m.iter().map(|(k, e)| (k.clone(), e.transform(f))).collect(),
            ),
            Value::Object(m) => {
                Value::Object(m.iter().map(|(k, e)| (k.clone(), e.transform(f))).collect())
            }
            other => other.clone(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

/// Formats a number the way HCL prints it: integers without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A total order over values used for canonical set ordering and sorting.
///
/// Strings sort lexically, numbers numerically, `false` before `true`. Values
/// of different kinds sort by kind.
pub fn canonical_cmp(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::List(..) | Value::Set(..) | Value::Tuple(_) => 3,
            Value::Map(..) | Value::Object(_) => 4,
            Value::Capsule(_) => 5,
            Value::Null(_) => 6,
            Value::Unknown(_) => 7,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (x, y) if rank(x) == 3 && rank(y) == 3 => {
            let xs = x.as_value_slice().unwrap_or_default();
            let ys = y.as_value_slice().unwrap_or_default();
            for (xe, ye) in xs.iter().zip(ys) {
                let ord = canonical_cmp(xe, ye);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        (x, y) if rank(x) == 4 && rank(y) == 4 => {
            let (Some(xm), Some(ym)) = (x.as_value_map(), y.as_value_map()) else {
                return Ordering::Equal;
            };
            for ((xk, xv), (yk, yv)) in xm.iter().zip(ym) {
                let ord = xk.cmp(yk).then_with(|| canonical_cmp(xv, yv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xm.len().cmp(&ym.len())
        }
        (x, y) => rank(x).cmp(&rank(y)),
    }
}

fn canonical_set(mut elems: Vec<Value>) -> Vec<Value> {
    elems.sort_by(canonical_cmp);
    elems.dedup_by(|a, b| a == b);
    elems
}

fn unify_elements(elems: Vec<Value>) -> (Type, Vec<Value>) {
    if elems.is_empty() {
        return (Type::Dynamic, elems);
    }
    let types: Vec<Type> = elems.iter().map(Value::ty).collect();
    match crate::convert::unify(&types) {
        Some(ty) if ty != Type::Dynamic => {
            let converted: Result<Vec<Value>, _> = elems
                .iter()
                .map(|e| crate::convert::convert(e, &ty))
                .collect();
            match converted {
                Ok(vals) => (ty, vals),
                Err(_) => (Type::Dynamic, elems),
            }
        }
        _ => (Type::Dynamic, elems),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null(_) => f.write_str("null"),
            Value::Unknown(_) => f.write_str("(known after apply)"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::List(_, v) | Value::Set(_, v) | Value::Tuple(v) => {
                f.write_str("[")?;
                for (i, e) in v.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                f.write_str("]")
            }
            Value::Map(_, m) | Value::Object(m) => {
                f.write_str("{")?;
                for (i, (k, e)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", k, e)?;
                }
                f.write_str("}")
            }
            Value::Capsule(c) => write!(f, "{:?}", c),
        }
    }
}

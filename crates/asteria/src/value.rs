//! The `Value` tagged union.
//!
//! Containers (`String`, `Array`, `Object`) are COW-shared: cloning a
//! `Value` only bumps a reference count, and a mutating operation clones
//! the underlying storage first only if the count is greater than one
//! (`Rc::make_mut`). `String` payloads never
//! mutate in place at all — Asteria strings are immutable — so they are a
//! plain `Rc<str>` with no `make_mut` path.

use std::{cmp::Ordering, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::function::FunctionValue;

/// An immutable, shared string payload.
pub type Rstr = Rc<str>;

/// A COW-shared array payload.
pub type Rarr = Rc<Vec<Value>>;

/// A COW-shared, insertion-ordered object payload.
///
/// `IndexMap` already preserves insertion order and precomputes hashes for
/// its keys internally, matching this "keys carry a precomputed
/// hash" note without any bespoke hashing code here.
pub type Robj = Rc<IndexMap<Rstr, Value>>;

/// A host-defined object carried by `Value::Opaque`.
///
/// `describe` backs the textual representation used by `typeof`/formatting
/// diagnostics; `collect_variables` is the GC trace hook —
/// an opaque value may transitively keep other variables alive and must
/// report them so the collector can trace through it.
pub trait Opaque: fmt::Debug {
    fn describe(&self) -> String;

    fn collect_variables(&self, _visit: &mut dyn FnMut(crate::gc::GcId)) {}
}

/// Three-way, partial comparison result for [`Value::compare`].
///
/// `Unordered` covers every case that has no total order: NaN on either side,
/// heterogeneous cross-type comparison, and opaque/function/object
/// comparisons (which have no total order at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    Less,
    Equal,
    Greater,
    Unordered,
}

impl Compare {
    #[must_use]
    pub fn is_equal(self) -> bool {
        matches!(self, Self::Equal)
    }
}

/// The nine-variant dynamically-typed value.
#[derive(Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(Rstr),
    Opaque(Rc<dyn Opaque>),
    Function(Rc<dyn FunctionValue>),
    Array(Rarr),
    Object(Robj),
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl Value {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::Opaque(_) => "opaque",
            Self::Function(_) => "function",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Real(r) => *r != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Array(a) => !a.is_empty(),
            Self::Object(_) | Self::Opaque(_) | Self::Function(_) => true,
        }
    }

    /// Three-way, partial comparison.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Compare {
        match (self, other) {
            (Self::Null, Self::Null) => Compare::Equal,
            (Self::Boolean(a), Self::Boolean(b)) => bool_cmp(*a, *b),
            (Self::Integer(a), Self::Integer(b)) => ord_cmp(a.cmp(b)),
            (Self::Real(a), Self::Real(b)) => real_cmp(*a, *b),
            (Self::Integer(a), Self::Real(b)) => real_cmp(*a as f64, *b),
            (Self::Real(a), Self::Integer(b)) => real_cmp(*a, *b as f64),
            (Self::String(a), Self::String(b)) => ord_cmp(a.as_bytes().cmp(b.as_bytes())),
            (Self::Array(a), Self::Array(b)) => array_cmp(a, b),
            _ => Compare::Unordered,
        }
    }

    /// A short human-readable description, used in `typeof`-adjacent
    /// diagnostics and `Debug` output. Not a serialization format.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_owned(),
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) => r.to_string(),
            Self::String(s) => format!("{s:?}"),
            Self::Opaque(o) => o.describe(),
            Self::Function(f) => format!("<function {}>", f.name()),
            Self::Array(a) => {
                let mut out = String::from("[");
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&v.describe());
                }
                out.push(']');
                out
            }
            Self::Object(o) => {
                let mut out = String::from("{");
                for (i, (k, v)) in o.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&format!("{k:?}: {}", v.describe()));
                }
                out.push('}');
                out
            }
        }
    }
}

fn bool_cmp(a: bool, b: bool) -> Compare {
    ord_cmp(a.cmp(&b))
}

fn ord_cmp(ord: Ordering) -> Compare {
    match ord {
        Ordering::Less => Compare::Less,
        Ordering::Equal => Compare::Equal,
        Ordering::Greater => Compare::Greater,
    }
}

fn real_cmp(a: f64, b: f64) -> Compare {
    match a.partial_cmp(&b) {
        Some(ord) => ord_cmp(ord),
        None => Compare::Unordered,
    }
}

fn array_cmp(a: &[Value], b: &[Value]) -> Compare {
    let mut ia = a.iter();
    let mut ib = b.iter();
    loop {
        match (ia.next(), ib.next()) {
            (None, None) => return Compare::Equal,
            (None, Some(_)) => return Compare::Less,
            (Some(_), None) => return Compare::Greater,
            (Some(x), Some(y)) => match x.compare(y) {
                Compare::Equal => continue,
                other => return other,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(Rc::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(Rc::from(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Array(Rc::new(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_spec() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(!Value::Real(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from(Vec::<Value>::new()).is_truthy());
        assert!(Value::Integer(-1).is_truthy());
        assert!(Value::from("x").is_truthy());
    }

    #[test]
    fn nan_is_unordered_with_itself() {
        let nan = Value::Real(f64::NAN);
        assert_eq!(nan.compare(&nan), Compare::Unordered);
    }

    #[test]
    fn cross_type_comparison_is_unordered() {
        assert_eq!(Value::Null.compare(&Value::Boolean(false)), Compare::Unordered);
        assert_eq!(Value::from("1").compare(&Value::Integer(1)), Compare::Unordered);
    }

    #[test]
    fn negative_real_compares_below_positive_integer() {
        assert_eq!(Value::Real(-1.5).compare(&Value::Integer(0)), Compare::Less);
    }

    #[test]
    fn array_compares_lexicographically() {
        let a = Value::from(vec![Value::Integer(1), Value::Integer(2)]);
        let b = Value::from(vec![Value::Integer(1), Value::Integer(3)]);
        assert_eq!(a.compare(&b), Compare::Less);
    }
}

//! Settlement payloads.
//!
//! The original system this models is dynamically typed, so the payload of a
//! deferred value is a small dynamic `Value` rather than a generic parameter.
//! All heap data sits behind `Arc`, which keeps `Value` cheap to clone and
//! `Send + Sync`.
//!
//! A `Value::Deferred` payload is what triggers adoption: resolving a
//! deferred value with another deferred value flattens instead of nesting.

use crate::deferred::Deferred;
use std::fmt;
use std::sync::Arc;

/// A dynamically typed settlement payload.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Absent value; what a handler that "returns nothing" produces.
    #[default]
    Undefined,
    /// Boolean.
    Bool(bool),
    /// Double-precision number.
    Number(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Ordered sequence; the all-combinator's success payload.
    List(Arc<[Value]>),
    /// Another deferred value. Resolving with this adopts its outcome.
    Deferred(Arc<Deferred>),
}

impl Value {
    /// The undefined value.
    pub fn undefined() -> Self {
        Value::Undefined
    }

    /// Create a boolean value.
    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    /// Create a number value.
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    /// Create a string value.
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    /// Create a list value.
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }

    /// Wrap a deferred value.
    pub fn deferred(d: Arc<Deferred>) -> Self {
        Value::Deferred(d)
    }

    /// Check if this is the undefined value.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if this wraps a deferred value.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Deferred(_))
    }

    /// Get the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get the number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the list slice, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Get the wrapped deferred value, if any.
    pub fn as_deferred(&self) -> Option<&Arc<Deferred>> {
        match self {
            Value::Deferred(d) => Some(d),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Deferred values compare by identity, like object references.
            (Value::Deferred(a), Value::Deferred(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Deferred(d) => write!(f, "{d:?}"),
        }
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

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items.into())
    }
}

impl From<Arc<Deferred>> for Value {
    fn from(d: Arc<Deferred>) -> Self {
        Value::Deferred(d)
    }
}

//! Values stored in containers and content accepted by inserts

use braid_core::ContainerId;
use serde::{Deserialize, Serialize};

/// A value read out of a container
///
/// Nested containers are returned by identity; resolve them with
/// [`Document::map_ref`](crate::Document::map_ref) or
/// [`Document::sequence_ref`](crate::Document::sequence_ref).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Reference to a nested container
    Container(ContainerId),
}

impl Value {
    /// Borrow the string, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer, if this is an integer value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the container id, if this is a container reference
    pub fn as_container(&self) -> Option<&ContainerId> {
        match self {
            Value::Container(id) => Some(id),
            _ => None,
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

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

/// Content accepted by insert and set operations
///
/// `Map` and `Sequence` create a new nested container, populated with the given
/// children, inside the same transaction as the insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// A scalar value
    Value(Value),
    /// A new map container with initial entries
    Map(Vec<(String, Content)>),
    /// A new sequence container with initial elements
    Sequence(Vec<Content>),
}

impl Content {
    /// A new map container built from key/content pairs
    pub fn map<K, C, I>(entries: I) -> Self
    where
        K: Into<String>,
        C: Into<Content>,
        I: IntoIterator<Item = (K, C)>,
    {
        Content::Map(
            entries
                .into_iter()
                .map(|(k, c)| (k.into(), c.into()))
                .collect(),
        )
    }

    /// A new sequence container built from elements
    pub fn sequence<C, I>(items: I) -> Self
    where
        C: Into<Content>,
        I: IntoIterator<Item = C>,
    {
        Content::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Value(value)
    }
}

macro_rules! scalar_content {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Content {
                fn from(value: $ty) -> Self {
                    Content::Value(Value::from(value))
                }
            }
        )*
    };
}

scalar_content!(&str, String, i64, i32, bool, f64);

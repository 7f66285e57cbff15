//! Runtime values

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Handle of an object on the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// Handle of a wrapper node owned by an [`Engine`](crate::Engine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProxyId(pub u32);

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy#{}", self.0)
    }
}

/// Upper bound on array length, `2^32 - 1`. Indices run below it.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// A property name. Array indices are stored as their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyKey(String);

impl PropertyKey {
    pub fn new(name: impl Into<String>) -> Self {
        PropertyKey(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as an array index, if it is the canonical text of one below
    /// [`MAX_ARRAY_LENGTH`]. Larger integers are ordinary names.
    pub fn as_index(&self) -> Option<usize> {
        let index: usize = self.0.parse().ok()?;
        (index < MAX_ARRAY_LENGTH && index.to_string() == self.0).then_some(index)
    }

    /// Starts with a letter or underscore, followed only by letters, digits
    /// and underscores. These keys render with dot notation in paths.
    pub fn is_identifier(&self) -> bool {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() || first == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PropertyKey {
    fn from(name: &str) -> Self {
        PropertyKey(name.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(name: String) -> Self {
        PropertyKey(name)
    }
}

impl From<&String> for PropertyKey {
    fn from(name: &String) -> Self {
        PropertyKey(name.clone())
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        PropertyKey(index.to_string())
    }
}

impl From<&PropertyKey> for PropertyKey {
    fn from(key: &PropertyKey) -> Self {
        key.clone()
    }
}

/// A value in the object graph.
///
/// `Object` refers to a raw heap object; operations on it are not observed.
/// `Proxy` is the wrapper handle handed out by an engine; every structural
/// operation on it goes through the engine's traps.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectId),
    Proxy(ProxyId),
}

impl Value {
    /// Everything except objects and wrappers.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Object(_) | Value::Proxy(_))
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Value::Proxy(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Proxy(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

fn integral(n: f64) -> Option<i64> {
    (n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15).then_some(n as i64)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => match integral(*n) {
                Some(i) => write!(f, "{i}"),
                None => write!(f, "{n}"),
            },
            Value::String(s) => write!(f, "{s}"),
            Value::Object(id) => write!(f, "[{id}]"),
            Value::Proxy(id) => write!(f, "[{id}]"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => match integral(*n) {
                Some(i) => serializer.serialize_i64(i),
                None => serializer.serialize_f64(*n),
            },
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(id) => serializer.collect_str(id),
            Value::Proxy(id) => serializer.collect_str(id),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Value::Object(id)
    }
}

impl From<ProxyId> for Value {
    fn from(id: ProxyId) -> Self {
        Value::Proxy(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_rule() {
        assert!(PropertyKey::from("a").is_identifier());
        assert!(PropertyKey::from("_private1").is_identifier());
        assert!(PropertyKey::from("camelCase_2").is_identifier());
        assert!(!PropertyKey::from("0").is_identifier());
        assert!(!PropertyKey::from("1abc").is_identifier());
        assert!(!PropertyKey::from("with-dash").is_identifier());
        assert!(!PropertyKey::from("has space").is_identifier());
        assert!(!PropertyKey::from("").is_identifier());
    }

    #[test]
    fn index_keys_are_canonical() {
        assert_eq!(PropertyKey::from(3usize).as_index(), Some(3));
        assert_eq!(PropertyKey::from("03").as_index(), None);
        assert_eq!(PropertyKey::from("x").as_index(), None);
        assert_eq!(PropertyKey::from("4294967294").as_index(), Some(4294967294));
        assert_eq!(PropertyKey::from("4294967295").as_index(), None);
        assert_eq!(PropertyKey::from("18446744073709551615").as_index(), None);
    }

    #[test]
    fn display_and_truthiness() {
        assert_eq!(Value::Number(2.0).to_string(), "2");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Proxy(ProxyId(4)).to_string(), "[proxy#4]");
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::Object(ObjectId(0)).is_truthy());
    }

    #[test]
    fn serializes_integral_numbers_without_fraction() {
        let json = serde_json::to_string(&vec![Value::Number(5.0), Value::Number(0.5)]).unwrap();
        assert_eq!(json, "[5,0.5]");
    }
}

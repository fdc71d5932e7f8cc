//! Typed property values.

use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Property map ordered by property name.
///
/// "No properties" is an empty map, never an error.
pub type PropertyMap = BTreeMap<String, PropValue>;

/// A typed scalar property value.
///
/// Serialized untagged so payloads read as plain JSON
/// (`{"age": 42, "name": "ada"}`); integers and doubles stay distinct because
/// serde_json writes doubles with a fractional part. Non-finite doubles have
/// no JSON form and fail to serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Long(i64),
    #[serde(serialize_with = "finite_double")]
    Double(f64),
    Text(String),
}

impl PropValue {
    /// Infer a value from a bare literal: booleans, integers, finite doubles,
    /// and text for everything else.
    pub fn parse_literal(text: &str) -> Self {
        match text {
            "true" => return PropValue::Bool(true),
            "false" => return PropValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = text.parse::<i64>() {
            return PropValue::Long(n);
        }
        let looks_numeric = text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
        if looks_numeric {
            if let Ok(x) = text.parse::<f64>() {
                if x.is_finite() {
                    return PropValue::Double(x);
                }
            }
        }
        PropValue::Text(text.to_string())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Long(n) => Some(*n as f64),
            PropValue::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Order two values of compatible kinds. Numbers compare across
    /// `Long`/`Double`; mixed kinds are unordered.
    pub fn compare(&self, other: &PropValue) -> Option<Ordering> {
        match (self, other) {
            (PropValue::Long(a), PropValue::Long(b)) => Some(a.cmp(b)),
            (PropValue::Bool(a), PropValue::Bool(b)) => Some(a.cmp(b)),
            (PropValue::Text(a), PropValue::Text(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

fn finite_double<S: Serializer>(x: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !x.is_finite() {
        return Err(serde::ser::Error::custom(format!("non-finite double {x}")));
    }
    serializer.serialize_f64(*x)
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Long(n) => write!(f, "{n}"),
            PropValue::Double(x) => write!(f, "{x}"),
            PropValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Text(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Text(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Long(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Double(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

/// Build a [`PropertyMap`] from `(name, value)` pairs.
pub fn props<K, V, I>(pairs: I) -> PropertyMap
where
    K: Into<String>,
    V: Into<PropValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

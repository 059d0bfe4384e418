//! Dynamically typed cell values.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One cell of a record.
///
/// Stored untagged, so JSON `null`, `true`, `25`, `"Alice"` and `["a","b"]`
/// map directly onto the variants.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
}

/// Record payload: property name to value.
pub type RecordData = BTreeMap<String, Value>;

/// Anything the engine can read property values from.
pub trait Fields {
    fn field(&self, name: &str) -> Option<&Value>;
}

impl Fields for RecordData {
    fn field(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Value {
    /// Null, the empty string and the empty list are empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view: numbers as-is, numeric text parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Total order used by comparisons and sorting.
    ///
    /// Null sorts first. Two booleans compare `false < true`. When either
    /// side is a number and the other has a numeric reading the comparison
    /// is numeric. Everything else compares by string form.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(_), _) | (_, Self::Number(_)) => {
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a.total_cmp(&b),
                    _ => self.to_string().cmp(&other.to_string()),
                }
            }
            _ => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// JSON objects have no cell representation and are kept as their JSON text.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            obj @ serde_json::Value::Object(_) => Self::Text(obj.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_shape() {
        let data: RecordData =
            serde_json::from_str(r#"{"a":null,"b":true,"c":25,"d":"x","e":["p","q"]}"#).unwrap();
        assert_eq!(data["a"], Value::Null);
        assert_eq!(data["b"], Value::Bool(true));
        assert_eq!(data["c"], Value::Number(25.0));
        assert_eq!(data["d"], Value::from("x"));
        assert_eq!(data["e"], Value::from(vec!["p", "q"]));
        assert_eq!(
            serde_json::to_string(&data).unwrap(),
            r#"{"a":null,"b":true,"c":25.0,"d":"x","e":["p","q"]}"#
        );
    }

    #[test]
    fn emptiness() {
        assert!(Value::Null.is_empty());
        assert!(Value::from("").is_empty());
        assert!(Value::List(vec![]).is_empty());
        assert!(!Value::from(0.0).is_empty());
        assert!(!Value::from(false).is_empty());
    }

    #[test]
    fn comparison_rules() {
        assert_eq!(Value::from(10.0).compare(&Value::from(9.0)), Ordering::Greater);
        assert_eq!(Value::from(10.0).compare(&Value::from("9")), Ordering::Greater);
        // Two texts compare as strings even when numeric.
        assert_eq!(Value::from("10").compare(&Value::from("9")), Ordering::Less);
        assert_eq!(Value::from(false).compare(&Value::from(true)), Ordering::Less);
        assert_eq!(Value::Null.compare(&Value::from("")), Ordering::Less);
        assert_eq!(Value::from("b").compare(&Value::from("a")), Ordering::Greater);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Value::from(25.0).to_string(), "25");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
        assert_eq!(Value::from(vec!["a", "b"]).to_string(), "a, b");
        assert_eq!(Value::Null.to_string(), "");
    }

    #[test]
    fn from_json_objects_become_text() {
        let v = Value::from(serde_json::json!({"k": 1}));
        assert_eq!(v, Value::from(r#"{"k":1}"#));
    }
}

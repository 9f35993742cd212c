//! Tagged scalar values for event arguments and node attributes.
//!
//! The host's object model is duck-typed; argument lists and attribute maps
//! arrive as loose JSON scalars. A closed variant keeps some type safety on
//! this side without fixing a schema per node kind.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One scalar value: event argument or node attribute.
///
/// Untagged on the wire so host glue can post plain JSON scalars. Variant
/// order matters for deserialization: bools before ints, ints before floats,
/// so `true` stays a bool and `3` stays an integer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ArgValue {
    /// Interpret as a collection index. Negative ints are not indices.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            ArgValue::Int(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }

    /// Numeric value, coercing ints to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Float(f) => Some(*f),
            ArgValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean value. Host glue sometimes sends 0/1, so ints coerce.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            ArgValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Int(i) => write!(f, "{}", i),
            ArgValue::Float(x) => write!(f, "{}", x),
            ArgValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(b: bool) -> Self {
        ArgValue::Bool(b)
    }
}

impl From<i64> for ArgValue {
    fn from(i: i64) -> Self {
        ArgValue::Int(i)
    }
}

impl From<usize> for ArgValue {
    fn from(i: usize) -> Self {
        ArgValue::Int(i as i64)
    }
}

impl From<f64> for ArgValue {
    fn from(f: f64) -> Self {
        ArgValue::Float(f)
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::Str(s.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(s: String) -> Self {
        ArgValue::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn untagged_roundtrip_preserves_variants() {
        let values = vec![
            ArgValue::Bool(true),
            ArgValue::Int(3),
            ArgValue::Float(0.85),
            ArgValue::Str("Vocals".to_string()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[true,3,0.85,"Vocals"]"#);
        let back: Vec<ArgValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn int_coerces_to_float_and_bool() {
        assert_eq!(ArgValue::Int(2).as_f64(), Some(2.0));
        assert_eq!(ArgValue::Int(0).as_bool(), Some(false));
        assert_eq!(ArgValue::Int(1).as_bool(), Some(true));
    }

    #[test]
    fn negative_int_is_not_an_index() {
        assert_eq!(ArgValue::Int(-1).as_index(), None);
        assert_eq!(ArgValue::Int(4).as_index(), Some(4));
        assert_eq!(ArgValue::Str("4".into()).as_index(), None);
    }
}

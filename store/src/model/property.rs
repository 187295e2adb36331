//! Tagged property values.
//!
//! A type declares the kind of each property; an instance carries the value.
//! Values are stored in three typed columns (int, double, string), never a
//! single stringly-typed one, so the tag round-trips exactly.

use serde::{Deserialize, Serialize};

/// The declared kind of a property. Code 0 is reserved for unknown and is
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Int,
    Double,
    String,
}

impl PropertyType {
    /// Stored tag code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Int => 1,
            Self::Double => 2,
            Self::String => 3,
        }
    }

    /// Parse a stored tag code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Int),
            2 => Some(Self::Double),
            3 => Some(Self::String),
            _ => None,
        }
    }
}

/// A property value carried by an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Int(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    /// The tag of this value.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::Int(_) => PropertyType::Int,
            Self::Double(_) => PropertyType::Double,
            Self::String(_) => PropertyType::String,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for t in [PropertyType::Int, PropertyType::Double, PropertyType::String] {
            assert_eq!(PropertyType::from_code(t.code()), Some(t));
        }
        assert_eq!(PropertyType::from_code(0), None);
        assert_eq!(PropertyType::from_code(7), None);
    }

    #[test]
    fn test_value_tags() {
        assert_eq!(PropertyValue::from(3i64).property_type(), PropertyType::Int);
        assert_eq!(
            PropertyValue::from(0.5).property_type(),
            PropertyType::Double
        );
        assert_eq!(
            PropertyValue::from("uri").property_type(),
            PropertyType::String
        );
    }
}

//! Registered types: named property schemas for artifacts, executions, and
//! contexts.

use crate::model::property::PropertyType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which side of the catalog a type (or instance) belongs to.
///
/// The code is the stored discriminator in the `type` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Execution,
    Artifact,
    Context,
}

impl TypeKind {
    /// Stored discriminator code.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Execution => 0,
            Self::Artifact => 1,
            Self::Context => 2,
        }
    }

    /// Parse a stored discriminator code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Execution),
            1 => Some(Self::Artifact),
            2 => Some(Self::Context),
            _ => None,
        }
    }

    /// Human-readable label for error messages.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Execution => "execution type",
            Self::Artifact => "artifact type",
            Self::Context => "context type",
        }
    }
}

/// A registered type: a name plus the declared property schema.
///
/// `name` is unique within a [`TypeKind`]. The id is assigned by storage on
/// first insert and preserved across property-set evolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Type {
    pub id: Option<i64>,
    pub name: String,
    /// Declared properties, keyed by property name.
    pub properties: BTreeMap<String, PropertyType>,
}

impl Type {
    /// A new unregistered type with no properties.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            properties: BTreeMap::new(),
        }
    }

    /// Declare a property, builder style.
    #[must_use]
    pub fn with_property(mut self, name: &str, property_type: PropertyType) -> Self {
        self.properties.insert(name.to_string(), property_type);
        self
    }
}

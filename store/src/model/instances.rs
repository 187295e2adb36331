//! Catalog instances: artifacts, executions, contexts, and the edges that
//! group them into contexts.

use crate::model::property::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property values keyed by name. Ordered so round-trips are deterministic.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A persisted data object participating in a pipeline (dataset, model, ...).
///
/// `uri` may be empty and is not unique; an absent uri is treated as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Option<i64>,
    pub type_id: i64,
    pub uri: Option<String>,
    /// Properties declared by the artifact's type; validated on write.
    pub properties: PropertyMap,
    /// Free-form properties; names and tags are unconstrained.
    pub custom_properties: PropertyMap,
}

impl Artifact {
    /// A new unsaved artifact of the given type.
    #[must_use]
    pub fn new(type_id: i64) -> Self {
        Self {
            id: None,
            type_id,
            uri: None,
            properties: PropertyMap::new(),
            custom_properties: PropertyMap::new(),
        }
    }

    /// Set the uri, builder style.
    #[must_use]
    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.to_string());
        self
    }
}

/// A recorded run of a pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Option<i64>,
    pub type_id: i64,
    pub properties: PropertyMap,
    pub custom_properties: PropertyMap,
}

impl Execution {
    /// A new unsaved execution of the given type.
    #[must_use]
    pub fn new(type_id: i64) -> Self {
        Self {
            id: None,
            type_id,
            properties: PropertyMap::new(),
            custom_properties: PropertyMap::new(),
        }
    }
}

/// A grouping of artifacts and executions (experiment, run, pipeline).
///
/// `name` must be non-empty and is unique per `(type_id, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub id: Option<i64>,
    pub type_id: i64,
    pub name: String,
    pub properties: PropertyMap,
    pub custom_properties: PropertyMap,
}

impl Context {
    /// A new unsaved context of the given type.
    #[must_use]
    pub fn new(type_id: i64, name: &str) -> Self {
        Self {
            id: None,
            type_id,
            name: name.to_string(),
            properties: PropertyMap::new(),
            custom_properties: PropertyMap::new(),
        }
    }
}

/// An artifact-to-context edge. Re-inserting an existing edge is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    pub artifact_id: i64,
    pub context_id: i64,
}

/// An execution-to-context edge. Re-inserting an existing edge is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub execution_id: i64,
    pub context_id: i64,
}

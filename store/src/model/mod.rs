//! Domain models for the metadata store.
//!
//! This module contains all catalog types:
//! - Property values and their declared kinds
//! - `Type` and `TypeKind` (the registry side of the catalog)
//! - `Artifact`, `Execution`, `Context` (the instance side)
//! - `Event` with its path steps
//! - `Attribution` and `Association` edges

pub mod events;
pub mod instances;
pub mod property;
pub mod types;

pub use events::{Event, EventType, PathStep};
pub use instances::{Artifact, Association, Attribution, Context, Execution, PropertyMap};
pub use property::{PropertyType, PropertyValue};
pub use types::{Type, TypeKind};

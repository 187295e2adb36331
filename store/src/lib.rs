//! Metaline - a metadata catalog for ML pipelines.
//!
//! This crate records the types of artifacts, executions, and contexts, the
//! instances of each, the events that link executions to the artifacts they
//! consume and produce, and the attributions and associations that group
//! instances into contexts (runs, experiments). Every public operation is a
//! single transaction against a SQLite database.
//!
//! # Architecture
//!
//! - [`model`] - Domain types (property values, types, instances, events, edges)
//! - [`query`] - Query catalog: schema version, DDL, migration schemes
//! - [`storage`] - Schema manager, instance store, type registry, event log, graph linker
//! - [`store`] - [`MetadataStore`], the public transactional API
//! - [`cancel`] - Cooperative cancellation tokens
//! - [`error`] - Error types and status codes
//!
//! [`MetadataStore`]: store::MetadataStore

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod error;
pub mod model;
pub mod query;
pub mod storage;
pub mod store;

pub use cancel::CancellationToken;
pub use error::{Error, Result, StatusCode};
pub use model::{
    Artifact, Association, Attribution, Context, Event, EventType, Execution, PathStep,
    PropertyType, PropertyValue, Type, TypeKind,
};
pub use storage::schema::MigrationOptions;
pub use storage::types::PutTypeOptions;
pub use store::{ArtifactAndEvent, MetadataStore, PutTypesResult};

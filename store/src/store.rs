//! The public transactional API.
//!
//! `MetadataStore` owns exactly one storage connection. Every public
//! operation runs inside exactly one transaction: immediate-behavior
//! transactions for writes, auto-commit statements for reads. The schema
//! manager runs once per open, before any operation is accepted.

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::model::{
    Artifact, Association, Attribution, Context, Event, Execution, Type, TypeKind,
};
use crate::query::QueryConfig;
use crate::storage::node::{self, Node};
use crate::storage::schema::{self, MigrationOptions};
use crate::storage::types::{self, PutTypeOptions};
use crate::storage::{events, links};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// One artifact plus the optional event tying it to the execution in a
/// [`MetadataStore::put_execution`] request.
#[derive(Debug, Clone)]
pub struct ArtifactAndEvent {
    pub artifact: Artifact,
    /// When present, its endpoint ids are overridden with the ids resolved
    /// during the write.
    pub event: Option<Event>,
}

/// Parallel id lists returned by [`MetadataStore::put_types`].
#[derive(Debug, Clone, Default)]
pub struct PutTypesResult {
    pub artifact_type_ids: Vec<i64>,
    pub execution_type_ids: Vec<i64>,
    pub context_type_ids: Vec<i64>,
}

/// A metadata store over a SQLite database. Each method is an atomic
/// operation.
#[derive(Debug)]
pub struct MetadataStore {
    conn: Connection,
    config: QueryConfig,
}

impl MetadataStore {
    /// Open a store at the given path, creating or migrating the schema as
    /// the migration options direct.
    ///
    /// # Errors
    ///
    /// Fails with `VersionMismatch` when the stored schema differs from the
    /// library's and no directive authorizes migration, with
    /// `DowngradeCompleted` after a requested downgrade finishes (the store
    /// stays closed), and with `InvalidArgument` for an out-of-range
    /// downgrade target.
    pub fn open(path: &Path, options: &MigrationOptions) -> Result<Self> {
        Self::open_with_timeout(path, None, options)
    }

    /// Open a store with an explicit busy timeout.
    ///
    /// # Errors
    ///
    /// See [`MetadataStore::open`].
    pub fn open_with_timeout(
        path: &Path,
        timeout_ms: Option<u64>,
        options: &MigrationOptions,
    ) -> Result<Self> {
        let conn = Connection::open(path).map_err(Error::Database)?;
        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }
        Self::connect(conn, options)
    }

    /// Open an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::connect(conn, &MigrationOptions::default())
    }

    fn connect(mut conn: Connection, options: &MigrationOptions) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let config = QueryConfig::sqlite();
        schema::prepare_schema(&mut conn, &config, options)?;
        Ok(Self { conn, config })
    }

    /// One-shot schema creation; fails if any schema table already exists.
    ///
    /// # Errors
    ///
    /// Surfaces the driver failure for an existing schema.
    pub fn init_metadata_store(&mut self) -> Result<()> {
        let config = self.config.clone();
        schema::init_metadata_store(&mut self.conn, &config)
    }

    /// Idempotent schema creation.
    ///
    /// # Errors
    ///
    /// Fails with `DataLoss` against a legacy unversioned store and with
    /// `VersionMismatch` when the stored version differs and upgrades are
    /// disabled.
    pub fn init_metadata_store_if_not_exists(
        &mut self,
        options: &MigrationOptions,
    ) -> Result<()> {
        let config = self.config.clone();
        schema::init_metadata_store_if_not_exists(&mut self.conn, &config, options)
    }

    /// Run one write operation in an immediate transaction.
    ///
    /// The cancellation token is checked before the transaction starts and
    /// again before commit; a cancellation observed at either point rolls
    /// the whole operation back.
    fn execute_write<F, R>(&mut self, op: &'static str, cancel: &CancellationToken, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        cancel.check()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        cancel.check()?;
        tx.commit()?;
        debug!(op, "committed");
        Ok(result)
    }

    /// Run one read operation in an auto-commit transaction.
    fn execute_read<F, R>(&self, cancel: &CancellationToken, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        cancel.check()?;
        f(&self.conn)
    }

    // ===============
    // Type Registry
    // ===============

    /// Insert or evolve an artifact type; returns its id.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty name; `AlreadyExists` when the
    /// property-set diff is not authorized by the options.
    pub fn put_artifact_type(
        &mut self,
        artifact_type: &Type,
        options: &PutTypeOptions,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        self.execute_write("put_artifact_type", cancel, |tx| {
            types::put_type(tx, TypeKind::Artifact, artifact_type, options)
        })
    }

    /// Insert or evolve an execution type; returns its id.
    ///
    /// # Errors
    ///
    /// See [`MetadataStore::put_artifact_type`].
    pub fn put_execution_type(
        &mut self,
        execution_type: &Type,
        options: &PutTypeOptions,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        self.execute_write("put_execution_type", cancel, |tx| {
            types::put_type(tx, TypeKind::Execution, execution_type, options)
        })
    }

    /// Insert or evolve a context type; returns its id.
    ///
    /// # Errors
    ///
    /// See [`MetadataStore::put_artifact_type`].
    pub fn put_context_type(
        &mut self,
        context_type: &Type,
        options: &PutTypeOptions,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        self.execute_write("put_context_type", cancel, |tx| {
            types::put_type(tx, TypeKind::Context, context_type, options)
        })
    }

    /// Batch-insert types of all three kinds in one transaction. Duplicate
    /// entries within the batch collapse to the same id.
    ///
    /// # Errors
    ///
    /// Any per-type failure rolls the whole batch back.
    pub fn put_types(
        &mut self,
        artifact_types: &[Type],
        execution_types: &[Type],
        context_types: &[Type],
        options: &PutTypeOptions,
        cancel: &CancellationToken,
    ) -> Result<PutTypesResult> {
        self.execute_write("put_types", cancel, |tx| {
            let mut result = PutTypesResult::default();
            for t in artifact_types {
                result
                    .artifact_type_ids
                    .push(types::put_type(tx, TypeKind::Artifact, t, options)?);
            }
            for t in execution_types {
                result
                    .execution_type_ids
                    .push(types::put_type(tx, TypeKind::Execution, t, options)?);
            }
            for t in context_types {
                result
                    .context_type_ids
                    .push(types::put_type(tx, TypeKind::Context, t, options)?);
            }
            Ok(result)
        })
    }

    /// Get an artifact type by name.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such type exists.
    pub fn get_artifact_type(&self, name: &str, cancel: &CancellationToken) -> Result<Type> {
        self.get_type(TypeKind::Artifact, name, cancel)
    }

    /// Get an execution type by name.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such type exists.
    pub fn get_execution_type(&self, name: &str, cancel: &CancellationToken) -> Result<Type> {
        self.get_type(TypeKind::Execution, name, cancel)
    }

    /// Get a context type by name.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such type exists.
    pub fn get_context_type(&self, name: &str, cancel: &CancellationToken) -> Result<Type> {
        self.get_type(TypeKind::Context, name, cancel)
    }

    fn get_type(&self, kind: TypeKind, name: &str, cancel: &CancellationToken) -> Result<Type> {
        self.execute_read(cancel, |conn| {
            types::get_type_by_name(conn, kind, name)?.ok_or_else(|| {
                Error::NotFound(format!("no {} named {name:?}", kind.label()))
            })
        })
    }

    /// All artifact types, in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates driver errors; an empty catalog is a success.
    pub fn get_artifact_types(&self, cancel: &CancellationToken) -> Result<Vec<Type>> {
        self.execute_read(cancel, |conn| types::get_types(conn, TypeKind::Artifact))
    }

    /// All execution types, in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_execution_types(&self, cancel: &CancellationToken) -> Result<Vec<Type>> {
        self.execute_read(cancel, |conn| types::get_types(conn, TypeKind::Execution))
    }

    /// All context types, in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_context_types(&self, cancel: &CancellationToken) -> Result<Vec<Type>> {
        self.execute_read(cancel, |conn| types::get_types(conn, TypeKind::Context))
    }

    /// The subset of the given artifact type ids that exist.
    ///
    /// # Errors
    ///
    /// Propagates driver errors; missing ids are dropped, not an error.
    pub fn get_artifact_types_by_id(
        &self,
        type_ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Type>> {
        self.execute_read(cancel, |conn| {
            types::get_types_by_id(conn, TypeKind::Artifact, type_ids)
        })
    }

    /// The subset of the given execution type ids that exist.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_execution_types_by_id(
        &self,
        type_ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Type>> {
        self.execute_read(cancel, |conn| {
            types::get_types_by_id(conn, TypeKind::Execution, type_ids)
        })
    }

    /// The subset of the given context type ids that exist.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_context_types_by_id(
        &self,
        type_ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Type>> {
        self.execute_read(cancel, |conn| {
            types::get_types_by_id(conn, TypeKind::Context, type_ids)
        })
    }

    // ===============
    // Instance Store
    // ===============

    /// Insert or update artifacts; returns ids in input order.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for unknown ids on update, type changes, or
    /// non-conforming properties. Any failure rolls the whole list back.
    pub fn put_artifacts(
        &mut self,
        artifacts: &[Artifact],
        cancel: &CancellationToken,
    ) -> Result<Vec<i64>> {
        self.execute_write("put_artifacts", cancel, |tx| {
            artifacts.iter().map(|a| node::put_node(tx, a)).collect()
        })
    }

    /// Insert or update executions; returns ids in input order.
    ///
    /// # Errors
    ///
    /// See [`MetadataStore::put_artifacts`].
    pub fn put_executions(
        &mut self,
        executions: &[Execution],
        cancel: &CancellationToken,
    ) -> Result<Vec<i64>> {
        self.execute_write("put_executions", cancel, |tx| {
            executions.iter().map(|e| node::put_node(tx, e)).collect()
        })
    }

    /// Insert or update contexts; returns ids in input order.
    ///
    /// # Errors
    ///
    /// In addition to the conditions of [`MetadataStore::put_artifacts`]:
    /// `InvalidArgument` for an empty name, `AlreadyExists` when inserting a
    /// context whose `(type_id, name)` is taken.
    pub fn put_contexts(
        &mut self,
        contexts: &[Context],
        cancel: &CancellationToken,
    ) -> Result<Vec<i64>> {
        self.execute_write("put_contexts", cancel, |tx| {
            contexts.iter().map(|c| node::put_node(tx, c)).collect()
        })
    }

    /// The subset of the given artifact ids that exist.
    ///
    /// # Errors
    ///
    /// Propagates driver errors; missing ids are dropped.
    pub fn get_artifacts_by_id(
        &self,
        artifact_ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        self.execute_read(cancel, |conn| node::get_nodes_by_id(conn, artifact_ids))
    }

    /// The subset of the given execution ids that exist.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_executions_by_id(
        &self,
        execution_ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Execution>> {
        self.execute_read(cancel, |conn| node::get_nodes_by_id(conn, execution_ids))
    }

    /// The subset of the given context ids that exist.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_contexts_by_id(
        &self,
        context_ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Context>> {
        self.execute_read(cancel, |conn| node::get_nodes_by_id(conn, context_ids))
    }

    /// All artifacts.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_artifacts(&self, cancel: &CancellationToken) -> Result<Vec<Artifact>> {
        self.execute_read(cancel, node::get_all_nodes)
    }

    /// All executions.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_executions(&self, cancel: &CancellationToken) -> Result<Vec<Execution>> {
        self.execute_read(cancel, node::get_all_nodes)
    }

    /// All contexts.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_contexts(&self, cancel: &CancellationToken) -> Result<Vec<Context>> {
        self.execute_read(cancel, node::get_all_nodes)
    }

    /// All artifacts of the named type; empty when the type is unknown.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_artifacts_by_type(
        &self,
        type_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        self.get_nodes_by_type(TypeKind::Artifact, type_name, cancel)
    }

    /// All executions of the named type; empty when the type is unknown.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_executions_by_type(
        &self,
        type_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Execution>> {
        self.get_nodes_by_type(TypeKind::Execution, type_name, cancel)
    }

    /// All contexts of the named type; empty when the type is unknown.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_contexts_by_type(
        &self,
        type_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Context>> {
        self.get_nodes_by_type(TypeKind::Context, type_name, cancel)
    }

    fn get_nodes_by_type<N: Node>(
        &self,
        kind: TypeKind,
        type_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<N>> {
        self.execute_read(cancel, |conn| {
            match types::get_type_by_name(conn, kind, type_name)? {
                Some(t) => node::get_nodes_by_type_id(conn, t.id.unwrap_or_default()),
                None => Ok(Vec::new()),
            }
        })
    }

    /// All artifacts whose uri equals the parameter. An absent uri is
    /// treated as empty, so `None` returns every artifact with an empty uri.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_artifacts_by_uri(
        &self,
        uri: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        self.execute_read(cancel, |conn| {
            node::get_artifacts_by_uri(conn, uri.unwrap_or(""))
        })
    }

    // ===============
    // Event Log
    // ===============

    /// Append events to the log.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when an endpoint does not resolve or the event type
    /// is unknown. Any failure rolls the whole list back.
    pub fn put_events(&mut self, new_events: &[Event], cancel: &CancellationToken) -> Result<()> {
        self.execute_write("put_events", cancel, |tx| events::put_events(tx, new_events))
    }

    /// All events whose artifact endpoint is in the id set.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_events_by_artifact_ids(
        &self,
        artifact_ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>> {
        self.execute_read(cancel, |conn| {
            events::get_events_by_artifact_ids(conn, artifact_ids)
        })
    }

    /// All events whose execution endpoint is in the id set.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_events_by_execution_ids(
        &self,
        execution_ids: &[i64],
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>> {
        self.execute_read(cancel, |conn| {
            events::get_events_by_execution_ids(conn, execution_ids)
        })
    }

    // ===============
    // Graph Linker
    // ===============

    /// Insert attribution and association edges in one transaction;
    /// duplicate edges are silently accepted.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when any endpoint id does not resolve.
    pub fn put_attributions_and_associations(
        &mut self,
        attributions: &[Attribution],
        associations: &[Association],
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.execute_write("put_attributions_and_associations", cancel, |tx| {
            links::put_attributions_and_associations(tx, attributions, associations)
        })
    }

    /// All contexts an artifact is attributed to.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_contexts_by_artifact(
        &self,
        artifact_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Context>> {
        self.execute_read(cancel, |conn| links::get_contexts_by_artifact(conn, artifact_id))
    }

    /// All artifacts attributed to a context.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_artifacts_by_context(
        &self,
        context_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Artifact>> {
        self.execute_read(cancel, |conn| links::get_artifacts_by_context(conn, context_id))
    }

    /// All contexts an execution is associated with.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_contexts_by_execution(
        &self,
        execution_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Context>> {
        self.execute_read(cancel, |conn| {
            links::get_contexts_by_execution(conn, execution_id)
        })
    }

    /// All executions associated with a context.
    ///
    /// # Errors
    ///
    /// Propagates driver errors.
    pub fn get_executions_by_context(
        &self,
        context_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Execution>> {
        self.execute_read(cancel, |conn| {
            links::get_executions_by_context(conn, context_id)
        })
    }

    // ===============
    // Composite Writer
    // ===============

    /// Atomically upsert an execution together with its artifact/event
    /// pairs.
    ///
    /// Each pair's artifact is upserted; a pair that carries an event has
    /// the event's endpoint ids overridden with the just-resolved ids before
    /// insertion. Returns the execution id and the artifact ids in input
    /// order.
    ///
    /// # Errors
    ///
    /// Any failure in any step rolls back the execution, artifact, and
    /// event writes together.
    pub fn put_execution(
        &mut self,
        execution: &Execution,
        pairs: &[ArtifactAndEvent],
        cancel: &CancellationToken,
    ) -> Result<(i64, Vec<i64>)> {
        self.execute_write("put_execution", cancel, |tx| {
            let execution_id = node::put_node(tx, execution)?;
            let mut artifact_ids = Vec::with_capacity(pairs.len());
            for pair in pairs {
                let artifact_id = node::put_node(tx, &pair.artifact)?;
                if let Some(event) = &pair.event {
                    let mut resolved = event.clone();
                    resolved.artifact_id = artifact_id;
                    resolved.execution_id = execution_id;
                    events::put_events(tx, &[resolved])?;
                }
                artifact_ids.push(artifact_id);
            }
            Ok((execution_id, artifact_ids))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use crate::model::{EventType, PropertyType, PropertyValue};
    use crate::query::LIBRARY_SCHEMA_VERSION;
    use tempfile::TempDir;

    fn store() -> MetadataStore {
        MetadataStore::open_in_memory().unwrap()
    }

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn test_put_type_then_get_round_trips() {
        let mut store = store();
        let cancel = cancel();
        let t = Type::new("dataset").with_property("split", PropertyType::String);
        let id = store
            .put_artifact_type(&t, &PutTypeOptions::default(), &cancel)
            .unwrap();

        let stored = store.get_artifact_type("dataset", &cancel).unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.properties, t.properties);

        let by_id = store.get_artifact_types_by_id(&[id], &cancel).unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].name, "dataset");
    }

    #[test]
    fn test_get_type_missing_is_not_found() {
        let store = store();
        let err = store.get_execution_type("absent", &cancel()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotFound);
    }

    #[test]
    fn test_type_add_property_update_keeps_id() {
        let mut store = store();
        let cancel = cancel();
        let v1 = Type::new("t").with_property("p1", PropertyType::String);
        let id = store
            .put_artifact_type(&v1, &PutTypeOptions::default(), &cancel)
            .unwrap();

        let v2 = v1.clone().with_property("p2", PropertyType::Int);
        let options = PutTypeOptions {
            can_add_fields: true,
            ..Default::default()
        };
        assert_eq!(store.put_artifact_type(&v2, &options, &cancel).unwrap(), id);

        let stored = store.get_artifact_type("t", &cancel).unwrap();
        assert_eq!(stored.properties.len(), 2);
    }

    #[test]
    fn test_type_remove_property_is_rejected_and_type_kept() {
        let mut store = store();
        let cancel = cancel();
        let both = Type::new("t")
            .with_property("p1", PropertyType::String)
            .with_property("p2", PropertyType::Int);
        store
            .put_artifact_type(&both, &PutTypeOptions::default(), &cancel)
            .unwrap();

        let shrunk = Type::new("t").with_property("p1", PropertyType::String);
        let err = store
            .put_artifact_type(&shrunk, &PutTypeOptions::default(), &cancel)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);

        let stored = store.get_artifact_type("t", &cancel).unwrap();
        assert_eq!(stored.properties.len(), 2);
    }

    #[test]
    fn test_put_types_batch_collapses_duplicates() {
        let mut store = store();
        let cancel = cancel();
        let dataset = Type::new("dataset").with_property("rows", PropertyType::Int);
        let result = store
            .put_types(
                &[dataset.clone(), dataset],
                &[Type::new("trainer")],
                &[Type::new("experiment")],
                &PutTypeOptions::default(),
                &cancel,
            )
            .unwrap();
        assert_eq!(result.artifact_type_ids.len(), 2);
        assert_eq!(result.artifact_type_ids[0], result.artifact_type_ids[1]);
        assert_eq!(result.execution_type_ids.len(), 1);
        assert_eq!(result.context_type_ids.len(), 1);
    }

    #[test]
    fn test_put_types_batch_is_atomic() {
        let mut store = store();
        let cancel = cancel();
        store
            .put_artifact_type(
                &Type::new("dataset").with_property("rows", PropertyType::Int),
                &PutTypeOptions::default(),
                &cancel,
            )
            .unwrap();

        // The second artifact type conflicts, so the fresh execution type
        // must not survive either.
        let err = store
            .put_types(
                &[Type::new("dataset").with_property("rows", PropertyType::String)],
                &[Type::new("trainer")],
                &[],
                &PutTypeOptions::default(),
                &cancel,
            )
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);
        assert!(store.get_execution_types(&cancel).unwrap().is_empty());
    }

    #[test]
    fn test_put_artifact_then_update_round_trips() {
        let mut store = store();
        let cancel = cancel();
        let type_id = store
            .put_artifact_type(
                &Type::new("dataset").with_property("property", PropertyType::String),
                &PutTypeOptions::default(),
                &cancel,
            )
            .unwrap();

        let mut artifact = Artifact::new(type_id);
        artifact
            .properties
            .insert("property".to_string(), PropertyValue::String("3".into()));
        let ids = store.put_artifacts(&[artifact.clone()], &cancel).unwrap();
        assert_eq!(ids.len(), 1);

        artifact.id = Some(ids[0]);
        artifact
            .properties
            .insert("property".to_string(), PropertyValue::String("2".into()));
        let updated = store.put_artifacts(&[artifact], &cancel).unwrap();
        assert_eq!(updated, ids);

        let fetched = store.get_artifacts_by_id(&ids, &cancel).unwrap();
        assert_eq!(
            fetched[0].properties["property"],
            PropertyValue::String("2".into())
        );
    }

    #[test]
    fn test_get_artifacts_by_uri_counts() {
        let mut store = store();
        let cancel = cancel();
        let type_id = store
            .put_artifact_type(&Type::new("file"), &PutTypeOptions::default(), &cancel)
            .unwrap();
        let artifacts: Vec<Artifact> = ["u1", "u2", "u2", "", "", ""]
            .iter()
            .map(|uri| Artifact::new(type_id).with_uri(uri))
            .collect();
        store.put_artifacts(&artifacts, &cancel).unwrap();

        assert_eq!(store.get_artifacts_by_uri(Some("u1"), &cancel).unwrap().len(), 1);
        assert_eq!(store.get_artifacts_by_uri(Some("u2"), &cancel).unwrap().len(), 2);
        assert_eq!(store.get_artifacts_by_uri(Some(""), &cancel).unwrap().len(), 3);
        assert_eq!(store.get_artifacts_by_uri(None, &cancel).unwrap().len(), 3);
        assert_eq!(store.get_artifacts_by_uri(Some("none"), &cancel).unwrap().len(), 0);
    }

    #[test]
    fn test_get_instances_by_type_unknown_type_is_empty() {
        let store = store();
        let cancel = cancel();
        assert!(store.get_artifacts_by_type("absent", &cancel).unwrap().is_empty());
        assert!(store.get_executions_by_type("absent", &cancel).unwrap().is_empty());
        assert!(store.get_contexts_by_type("absent", &cancel).unwrap().is_empty());
    }

    #[test]
    fn test_contexts_require_fresh_names() {
        let mut store = store();
        let cancel = cancel();
        let type_id = store
            .put_context_type(&Type::new("experiment"), &PutTypeOptions::default(), &cancel)
            .unwrap();
        store
            .put_contexts(&[Context::new(type_id, "exp-1")], &cancel)
            .unwrap();

        let err = store
            .put_contexts(&[Context::new(type_id, "exp-1")], &cancel)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);

        let contexts = store.get_contexts_by_type("experiment", &cancel).unwrap();
        assert_eq!(contexts.len(), 1);
    }

    #[test]
    fn test_put_execution_upsert_sequence() {
        let mut store = store();
        let cancel = cancel();
        let execution_type = store
            .put_execution_type(&Type::new("trainer"), &PutTypeOptions::default(), &cancel)
            .unwrap();
        let artifact_type = store
            .put_artifact_type(&Type::new("dataset"), &PutTypeOptions::default(), &cancel)
            .unwrap();

        // (a) execution only, no pairs.
        let (execution_id, artifact_ids) = store
            .put_execution(&Execution::new(execution_type), &[], &cancel)
            .unwrap();
        assert!(artifact_ids.is_empty());

        // (b) same execution, one new artifact, no event.
        let mut execution = Execution::new(execution_type);
        execution.id = Some(execution_id);
        let (updated_id, artifact_ids) = store
            .put_execution(
                &execution,
                &[ArtifactAndEvent {
                    artifact: Artifact::new(artifact_type),
                    event: None,
                }],
                &cancel,
            )
            .unwrap();
        assert_eq!(updated_id, execution_id);
        assert_eq!(artifact_ids.len(), 1);
        let first_artifact = artifact_ids[0];

        // (c) the prior artifact with an input event, plus a new artifact
        // with an output event. Stale endpoint ids in the request are
        // overridden with the resolved ones.
        let mut existing = Artifact::new(artifact_type);
        existing.id = Some(first_artifact);
        let (_, artifact_ids) = store
            .put_execution(
                &execution,
                &[
                    ArtifactAndEvent {
                        artifact: existing,
                        event: Some(Event::new(0, 0, EventType::Input)),
                    },
                    ArtifactAndEvent {
                        artifact: Artifact::new(artifact_type),
                        event: Some(Event::new(0, 0, EventType::Output)),
                    },
                ],
                &cancel,
            )
            .unwrap();
        assert_eq!(artifact_ids.len(), 2);
        assert_eq!(artifact_ids[0], first_artifact);

        let events = store
            .get_events_by_execution_ids(&[execution_id], &cancel)
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.execution_id == execution_id));
        assert_eq!(store.get_executions(&cancel).unwrap().len(), 1);
        assert_eq!(store.get_artifacts(&cancel).unwrap().len(), 2);
    }

    #[test]
    fn test_put_execution_is_atomic() {
        let mut store = store();
        let cancel = cancel();
        let execution_type = store
            .put_execution_type(&Type::new("trainer"), &PutTypeOptions::default(), &cancel)
            .unwrap();
        let artifact_type = store
            .put_artifact_type(&Type::new("dataset"), &PutTypeOptions::default(), &cancel)
            .unwrap();

        // The artifact step fails on an undeclared property; the execution
        // write must not survive.
        let mut bad_artifact = Artifact::new(artifact_type);
        bad_artifact
            .properties
            .insert("undeclared".to_string(), PropertyValue::Int(1));
        let err = store
            .put_execution(
                &Execution::new(execution_type),
                &[ArtifactAndEvent {
                    artifact: bad_artifact,
                    event: Some(Event::new(0, 0, EventType::Output)),
                }],
                &cancel,
            )
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);

        assert!(store.get_executions(&cancel).unwrap().is_empty());
        assert!(store.get_artifacts(&cancel).unwrap().is_empty());
        assert!(store
            .get_events_by_execution_ids(&[1, 2, 3], &cancel)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_attribution_idempotence_end_to_end() {
        let mut store = store();
        let cancel = cancel();
        let artifact_type = store
            .put_artifact_type(&Type::new("model"), &PutTypeOptions::default(), &cancel)
            .unwrap();
        let context_type = store
            .put_context_type(&Type::new("experiment"), &PutTypeOptions::default(), &cancel)
            .unwrap();
        let artifact_id = store
            .put_artifacts(&[Artifact::new(artifact_type)], &cancel)
            .unwrap()[0];
        let context_id = store
            .put_contexts(&[Context::new(context_type, "exp-1")], &cancel)
            .unwrap()[0];

        let edge = Attribution {
            artifact_id,
            context_id,
        };
        store
            .put_attributions_and_associations(&[edge], &[], &cancel)
            .unwrap();
        store
            .put_attributions_and_associations(&[edge], &[], &cancel)
            .unwrap();

        let contexts = store.get_contexts_by_artifact(artifact_id, &cancel).unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].id, Some(context_id));
    }

    #[test]
    fn test_cancelled_token_aborts_without_writing() {
        let mut store = store();
        let cancel = cancel();
        let type_id = store
            .put_artifact_type(&Type::new("dataset"), &PutTypeOptions::default(), &cancel)
            .unwrap();

        let fired = CancellationToken::new();
        fired.cancel();
        let err = store
            .put_artifacts(&[Artifact::new(type_id)], &fired)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Cancelled);
        assert!(store.get_artifacts(&cancel).unwrap().is_empty());

        let err = store.get_artifacts(&fired).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::Cancelled);
    }

    #[test]
    fn test_reopen_preserves_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.db");
        let cancel = cancel();

        let type_id = {
            let mut store = MetadataStore::open(&path, &MigrationOptions::default()).unwrap();
            store
                .put_artifact_type(&Type::new("dataset"), &PutTypeOptions::default(), &cancel)
                .unwrap()
        };

        let store = MetadataStore::open(&path, &MigrationOptions::default()).unwrap();
        let stored = store.get_artifact_type("dataset", &cancel).unwrap();
        assert_eq!(stored.id, Some(type_id));
    }

    #[test]
    fn test_downgrade_is_a_one_shot_command() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.db");
        MetadataStore::open(&path, &MigrationOptions::default()).unwrap();

        // Above the library version: rejected, no store returned.
        let options = MigrationOptions {
            downgrade_to_schema_version: Some(LIBRARY_SCHEMA_VERSION + 1),
            ..Default::default()
        };
        let err = MetadataStore::open(&path, &options).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);

        // To zero: the downgrade runs, and the sentinel comes back instead
        // of a handle.
        let options = MigrationOptions {
            downgrade_to_schema_version: Some(0),
            ..Default::default()
        };
        let err = MetadataStore::open(&path, &options).unwrap_err();
        assert!(matches!(err, Error::DowngradeCompleted { version: 0 }));

        // A normal open finds the legacy store and upgrades it back.
        let cancel = cancel();
        let mut store = MetadataStore::open(&path, &MigrationOptions::default()).unwrap();
        store
            .put_artifact_type(&Type::new("dataset"), &PutTypeOptions::default(), &cancel)
            .unwrap();
    }

    #[test]
    fn test_open_with_disable_upgrade_on_current_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.db");
        MetadataStore::open(&path, &MigrationOptions::default()).unwrap();

        let options = MigrationOptions {
            disable_upgrade: true,
            ..Default::default()
        };
        assert!(MetadataStore::open(&path, &options).is_ok());
    }

    #[test]
    fn test_init_if_not_exists_on_open_store_is_ok() {
        let mut store = store();
        store
            .init_metadata_store_if_not_exists(&MigrationOptions::default())
            .unwrap();
    }

    #[test]
    fn test_init_metadata_store_on_open_store_fails() {
        let mut store = store();
        assert!(store.init_metadata_store().is_err());
    }
}

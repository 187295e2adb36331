//! Query catalog: the declarative half of the storage layer.
//!
//! The catalog is the single source of truth for the library schema version
//! and for the DDL that creates, drops, and migrates the physical schema.
//! Migration scripts are a data-driven map from integer versions to step
//! scripts; the open-time loop in the schema manager walks the map and never
//! hard-codes version numbers.
//!
//! Schema history:
//! - v0 (legacy, pre-versioning): types, artifacts, executions, events, and
//!   their property/path tables; no `mlmd_env`.
//! - v1: adds `mlmd_env`, the single-row table holding `schema_version`.
//! - v2: adds contexts: `context`, `context_property`, `attribution`,
//!   `association`.
//! - v3: adds the unique index that makes event-triple re-insertion a no-op,
//!   and the artifact uri lookup index.

use std::collections::BTreeMap;

/// The schema version this build of the library reads and writes.
///
/// Never inferred from the stored schema; the env table is compared against
/// this constant at open time.
pub const LIBRARY_SCHEMA_VERSION: i64 = 3;

/// Step scripts for one schema version.
///
/// `upgrade_queries` migrate `v-1 -> v`; `downgrade_queries` migrate
/// `v -> v-1`. The schema manager maintains the `mlmd_env` version row
/// itself, so scripts only touch the entity tables.
#[derive(Debug, Clone, Copy)]
pub struct MigrationScheme {
    pub upgrade_queries: &'static [&'static str],
    pub downgrade_queries: &'static [&'static str],
}

/// Configuration mapping the schema lifecycle onto a target engine.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// The library schema version declared by this catalog.
    pub schema_version: i64,
    /// Step scripts keyed by the version they migrate up to.
    pub migration_schemes: BTreeMap<i64, MigrationScheme>,
    /// DDL creating the full schema at `schema_version`. Statements fail if
    /// the tables already exist; init-if-not-exists only runs them against
    /// an empty store.
    pub create_all_tables: &'static [&'static str],
    /// DDL tearing the full schema down.
    pub drop_all_tables: &'static [&'static str],
}

const CREATE_ALL_TABLES: &[&str] = &[
    "CREATE TABLE type (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        type_kind INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX idx_type_kind_name ON type (type_kind, name)",
    "CREATE TABLE type_property (
        type_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        data_type INTEGER NOT NULL,
        PRIMARY KEY (type_id, name)
    )",
    "CREATE TABLE artifact (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type_id INTEGER NOT NULL,
        uri TEXT
    )",
    "CREATE TABLE artifact_property (
        artifact_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        is_custom_property INTEGER NOT NULL,
        int_value INTEGER,
        double_value REAL,
        string_value TEXT,
        PRIMARY KEY (artifact_id, name, is_custom_property)
    )",
    "CREATE TABLE execution (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type_id INTEGER NOT NULL
    )",
    "CREATE TABLE execution_property (
        execution_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        is_custom_property INTEGER NOT NULL,
        int_value INTEGER,
        double_value REAL,
        string_value TEXT,
        PRIMARY KEY (execution_id, name, is_custom_property)
    )",
    "CREATE TABLE event (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        artifact_id INTEGER NOT NULL,
        execution_id INTEGER NOT NULL,
        event_type INTEGER NOT NULL,
        milliseconds_since_epoch INTEGER NOT NULL
    )",
    "CREATE TABLE event_path (
        event_id INTEGER NOT NULL,
        step_number INTEGER NOT NULL,
        is_index_step INTEGER NOT NULL,
        index_value INTEGER,
        key_value TEXT,
        PRIMARY KEY (event_id, step_number)
    )",
    // v1
    "CREATE TABLE mlmd_env (
        schema_version INTEGER NOT NULL
    )",
    // v2
    "CREATE TABLE context (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        UNIQUE (type_id, name)
    )",
    "CREATE TABLE context_property (
        context_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        is_custom_property INTEGER NOT NULL,
        int_value INTEGER,
        double_value REAL,
        string_value TEXT,
        PRIMARY KEY (context_id, name, is_custom_property)
    )",
    "CREATE TABLE attribution (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        context_id INTEGER NOT NULL,
        artifact_id INTEGER NOT NULL,
        UNIQUE (context_id, artifact_id)
    )",
    "CREATE TABLE association (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        context_id INTEGER NOT NULL,
        execution_id INTEGER NOT NULL,
        UNIQUE (context_id, execution_id)
    )",
    // v3
    "CREATE UNIQUE INDEX idx_event_triple ON event (artifact_id, execution_id, event_type)",
    "CREATE INDEX idx_artifact_uri ON artifact (uri)",
];

const DROP_ALL_TABLES: &[&str] = &[
    "DROP TABLE IF EXISTS type",
    "DROP TABLE IF EXISTS type_property",
    "DROP TABLE IF EXISTS artifact",
    "DROP TABLE IF EXISTS artifact_property",
    "DROP TABLE IF EXISTS execution",
    "DROP TABLE IF EXISTS execution_property",
    "DROP TABLE IF EXISTS event",
    "DROP TABLE IF EXISTS event_path",
    "DROP TABLE IF EXISTS mlmd_env",
    "DROP TABLE IF EXISTS context",
    "DROP TABLE IF EXISTS context_property",
    "DROP TABLE IF EXISTS attribution",
    "DROP TABLE IF EXISTS association",
];

const V1_UPGRADE: &[&str] = &["CREATE TABLE mlmd_env (
        schema_version INTEGER NOT NULL
    )"];
const V1_DOWNGRADE: &[&str] = &["DROP TABLE mlmd_env"];

const V2_UPGRADE: &[&str] = &[
    "CREATE TABLE context (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        UNIQUE (type_id, name)
    )",
    "CREATE TABLE context_property (
        context_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        is_custom_property INTEGER NOT NULL,
        int_value INTEGER,
        double_value REAL,
        string_value TEXT,
        PRIMARY KEY (context_id, name, is_custom_property)
    )",
    "CREATE TABLE attribution (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        context_id INTEGER NOT NULL,
        artifact_id INTEGER NOT NULL,
        UNIQUE (context_id, artifact_id)
    )",
    "CREATE TABLE association (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        context_id INTEGER NOT NULL,
        execution_id INTEGER NOT NULL,
        UNIQUE (context_id, execution_id)
    )",
];
const V2_DOWNGRADE: &[&str] = &[
    "DROP TABLE context",
    "DROP TABLE context_property",
    "DROP TABLE attribution",
    "DROP TABLE association",
];

const V3_UPGRADE: &[&str] = &[
    "CREATE UNIQUE INDEX idx_event_triple ON event (artifact_id, execution_id, event_type)",
    "CREATE INDEX idx_artifact_uri ON artifact (uri)",
];
const V3_DOWNGRADE: &[&str] = &[
    "DROP INDEX idx_event_triple",
    "DROP INDEX idx_artifact_uri",
];

impl QueryConfig {
    /// The catalog for the SQLite engine.
    #[must_use]
    pub fn sqlite() -> Self {
        let mut migration_schemes = BTreeMap::new();
        migration_schemes.insert(
            1,
            MigrationScheme {
                upgrade_queries: V1_UPGRADE,
                downgrade_queries: V1_DOWNGRADE,
            },
        );
        migration_schemes.insert(
            2,
            MigrationScheme {
                upgrade_queries: V2_UPGRADE,
                downgrade_queries: V2_DOWNGRADE,
            },
        );
        migration_schemes.insert(
            3,
            MigrationScheme {
                upgrade_queries: V3_UPGRADE,
                downgrade_queries: V3_DOWNGRADE,
            },
        );
        Self {
            schema_version: LIBRARY_SCHEMA_VERSION,
            migration_schemes,
            create_all_tables: CREATE_ALL_TABLES,
            drop_all_tables: DROP_ALL_TABLES,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::sqlite()
    }
}

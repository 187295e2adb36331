//! Schema manager: initializes, verifies, upgrades, or downgrades the
//! physical schema at store open.
//!
//! The manager runs exactly once per open, before any operation is accepted.
//! Upgrades walk the catalog's migration map one version at a time, each
//! step in its own transaction, updating the `mlmd_env` version row after
//! every step. Downgrade is a one-shot operational command: it runs the
//! backward scripts and then fails with the `DowngradeCompleted` sentinel so
//! no store handle escapes.

use crate::error::{Error, Result};
use crate::query::QueryConfig;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Open-time migration directive.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// When set, run backward migrations down to this version and fail with
    /// `DowngradeCompleted` instead of returning a store.
    pub downgrade_to_schema_version: Option<i64>,
    /// When set, an older stored schema fails with `VersionMismatch`
    /// instead of being upgraded in place.
    pub disable_upgrade: bool,
}

/// What the physical store looks like before the manager touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    /// No schema tables at all.
    Empty,
    /// Pre-versioning tables present but no `mlmd_env`; treated as version 0.
    Legacy,
    /// `mlmd_env` reports this version.
    Versioned(i64),
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let exists = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
        .exists([name])?;
    Ok(exists)
}

/// Inspect the store and classify it.
///
/// # Errors
///
/// Returns `DataLoss` if `mlmd_env` exists but holds no version row, and
/// propagates driver errors.
pub fn detect_schema_state(conn: &Connection) -> Result<SchemaState> {
    if table_exists(conn, "mlmd_env")? {
        let version: Option<i64> = conn
            .query_row("SELECT schema_version FROM mlmd_env", [], |row| row.get(0))
            .optional()?;
        return match version {
            Some(v) => Ok(SchemaState::Versioned(v)),
            None => Err(Error::DataLoss(
                "mlmd_env exists but holds no schema_version row".to_string(),
            )),
        };
    }
    if table_exists(conn, "type")? {
        return Ok(SchemaState::Legacy);
    }
    Ok(SchemaState::Empty)
}

/// Replace the single version row in `mlmd_env`.
fn write_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute("DELETE FROM mlmd_env", [])?;
    conn.execute(
        "INSERT INTO mlmd_env (schema_version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Create the full schema at the library version. Fails if tables exist.
fn create_schema(conn: &mut Connection, config: &QueryConfig) -> Result<()> {
    let tx = conn.transaction()?;
    for stmt in config.create_all_tables {
        tx.execute(stmt, []).map_err(Error::Database)?;
    }
    write_schema_version(&tx, config.schema_version)?;
    tx.commit()?;
    info!(version = config.schema_version, "Initialized metadata schema");
    Ok(())
}

/// Apply forward migrations `(from, to]`, one transaction per step.
fn upgrade_schema(conn: &mut Connection, config: &QueryConfig, from: i64, to: i64) -> Result<()> {
    for version in (from + 1)..=to {
        let scheme = config.migration_schemes.get(&version).ok_or_else(|| {
            Error::Internal(format!("no migration scheme for schema version {version}"))
        })?;
        let tx = conn.transaction()?;
        for stmt in scheme.upgrade_queries {
            tx.execute(stmt, []).map_err(Error::Database)?;
        }
        write_schema_version(&tx, version)?;
        tx.commit()?;
        info!(version, "Applied schema upgrade step");
    }
    Ok(())
}

/// Apply backward migrations `[to, from)`, one transaction per step,
/// walking downward.
fn downgrade_schema(conn: &mut Connection, config: &QueryConfig, from: i64, to: i64) -> Result<()> {
    for version in ((to + 1)..=from).rev() {
        let scheme = config.migration_schemes.get(&version).ok_or_else(|| {
            Error::Internal(format!("no migration scheme for schema version {version}"))
        })?;
        let tx = conn.transaction()?;
        for stmt in scheme.downgrade_queries {
            tx.execute(stmt, []).map_err(Error::Database)?;
        }
        // The v1 downgrade drops mlmd_env itself; below that point there is
        // no version row to maintain.
        if version > 1 {
            write_schema_version(&tx, version - 1)?;
        }
        tx.commit()?;
        info!(version = version - 1, "Applied schema downgrade step");
    }
    Ok(())
}

/// The open protocol: bring the store to the library schema version or fail.
///
/// # Errors
///
/// - `InvalidArgument` for an out-of-range or inapplicable downgrade target.
/// - `VersionMismatch` when the stored version differs from the library's
///   and no directive authorizes migration.
/// - `DowngradeCompleted` after a successful downgrade; the caller must not
///   hand out a store.
pub fn prepare_schema(
    conn: &mut Connection,
    config: &QueryConfig,
    options: &MigrationOptions,
) -> Result<()> {
    if let Some(target) = options.downgrade_to_schema_version {
        return run_downgrade(conn, config, target);
    }

    match detect_schema_state(conn)? {
        SchemaState::Empty => create_schema(conn, config),
        SchemaState::Legacy => reconcile_version(conn, config, 0, options),
        SchemaState::Versioned(stored) => reconcile_version(conn, config, stored, options),
    }
}

fn reconcile_version(
    conn: &mut Connection,
    config: &QueryConfig,
    stored: i64,
    options: &MigrationOptions,
) -> Result<()> {
    let library = config.schema_version;
    if stored == library {
        return Ok(());
    }
    if stored > library || options.disable_upgrade {
        return Err(Error::VersionMismatch { stored, library });
    }
    info!(stored, library, "Upgrading metadata schema");
    upgrade_schema(conn, config, stored, library)
}

fn run_downgrade(conn: &mut Connection, config: &QueryConfig, target: i64) -> Result<()> {
    if target < 0 || target > config.schema_version {
        return Err(Error::InvalidArgument(format!(
            "downgrade target {target} is outside [0, {}]",
            config.schema_version
        )));
    }
    let stored = match detect_schema_state(conn)? {
        SchemaState::Empty => {
            return Err(Error::InvalidArgument(
                "cannot downgrade an empty database".to_string(),
            ))
        }
        SchemaState::Legacy => 0,
        SchemaState::Versioned(v) => v,
    };
    if stored < target {
        return Err(Error::InvalidArgument(format!(
            "database at schema version {stored} cannot be downgraded to {target}"
        )));
    }
    downgrade_schema(conn, config, stored, target)?;
    info!(target, "Downgrade migration finished; store stays closed");
    Err(Error::DowngradeCompleted { version: target })
}

/// One-shot schema creation. Fails if any schema table already exists.
///
/// # Errors
///
/// Surfaces the driver's "table already exists" failure untouched; also
/// propagates any other driver error.
pub fn init_metadata_store(conn: &mut Connection, config: &QueryConfig) -> Result<()> {
    create_schema(conn, config)
}

/// Idempotent schema creation.
///
/// # Errors
///
/// - Ok on an empty store (creates the schema) or a store already at the
///   library version.
/// - `DataLoss` on a legacy unversioned store: the operator must migrate it
///   through the open protocol explicitly.
/// - `VersionMismatch` when the stored version differs and upgrades are
///   disabled (the version check itself always runs).
pub fn init_metadata_store_if_not_exists(
    conn: &mut Connection,
    config: &QueryConfig,
    options: &MigrationOptions,
) -> Result<()> {
    match detect_schema_state(conn)? {
        SchemaState::Empty => create_schema(conn, config),
        SchemaState::Legacy => Err(Error::DataLoss(
            "store has a legacy unversioned schema; migrate it explicitly".to_string(),
        )),
        SchemaState::Versioned(stored) => reconcile_version(conn, config, stored, options),
    }
}

//! Graph linker: attribution (artifact-context) and association
//! (execution-context) edges.
//!
//! Edges are unordered and idempotent; once added they are never modified.

use crate::error::{Error, Result};
use crate::model::{Artifact, Association, Attribution, Context, Execution};
use crate::storage::node::{self, Node};
use rusqlite::{params, Connection, Transaction};

fn require_node<N: Node>(tx: &Transaction, id: i64) -> Result<()> {
    if node::node_exists::<N>(tx, id)? {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "no {} found with id {id}",
            N::SCHEMA.label
        )))
    }
}

/// Insert attribution and association edges; duplicates are no-ops.
///
/// # Errors
///
/// Returns `InvalidArgument` when any referenced artifact, execution, or
/// context id does not resolve.
pub fn put_attributions_and_associations(
    tx: &Transaction,
    attributions: &[Attribution],
    associations: &[Association],
) -> Result<()> {
    for attribution in attributions {
        require_node::<Artifact>(tx, attribution.artifact_id)?;
        require_node::<Context>(tx, attribution.context_id)?;
        tx.execute(
            "INSERT OR IGNORE INTO attribution (context_id, artifact_id) VALUES (?1, ?2)",
            params![attribution.context_id, attribution.artifact_id],
        )?;
    }
    for association in associations {
        require_node::<Execution>(tx, association.execution_id)?;
        require_node::<Context>(tx, association.context_id)?;
        tx.execute(
            "INSERT OR IGNORE INTO association (context_id, execution_id) VALUES (?1, ?2)",
            params![association.context_id, association.execution_id],
        )?;
    }
    Ok(())
}

fn edge_endpoints(
    conn: &Connection,
    edge_table: &str,
    select_column: &str,
    where_column: &str,
    id: i64,
) -> Result<Vec<i64>> {
    let sql = format!(
        "SELECT {select_column} FROM {edge_table} WHERE {where_column} = ?1 ORDER BY {select_column}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// All contexts an artifact is attributed to.
pub fn get_contexts_by_artifact(conn: &Connection, artifact_id: i64) -> Result<Vec<Context>> {
    let ids = edge_endpoints(conn, "attribution", "context_id", "artifact_id", artifact_id)?;
    node::get_nodes_by_id(conn, &ids)
}

/// All artifacts attributed to a context.
pub fn get_artifacts_by_context(conn: &Connection, context_id: i64) -> Result<Vec<Artifact>> {
    let ids = edge_endpoints(conn, "attribution", "artifact_id", "context_id", context_id)?;
    node::get_nodes_by_id(conn, &ids)
}

/// All contexts an execution is associated with.
pub fn get_contexts_by_execution(conn: &Connection, execution_id: i64) -> Result<Vec<Context>> {
    let ids = edge_endpoints(conn, "association", "context_id", "execution_id", execution_id)?;
    node::get_nodes_by_id(conn, &ids)
}

/// All executions associated with a context.
pub fn get_executions_by_context(conn: &Connection, context_id: i64) -> Result<Vec<Execution>> {
    let ids = edge_endpoints(conn, "association", "execution_id", "context_id", context_id)?;
    node::get_nodes_by_id(conn, &ids)
}

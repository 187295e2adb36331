//! Generic instance store.
//!
//! Artifacts, executions, and contexts share their storage and validation
//! logic; the differences are captured by a static [`NodeSchema`] descriptor
//! (table names, whether the node carries a uri, whether its name is unique
//! per type) rather than by three copies of the code.

use crate::error::{Error, Result};
use crate::model::{
    Artifact, Context, Execution, PropertyMap, PropertyValue, TypeKind,
};
#[cfg(test)]
use crate::model::PropertyType;
use crate::storage::types;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};

/// Storage descriptor for one node kind.
#[derive(Debug, Clone, Copy)]
pub struct NodeSchema {
    pub label: &'static str,
    pub table: &'static str,
    pub property_table: &'static str,
    /// Foreign-key column naming this node in its property table.
    pub id_column: &'static str,
    pub type_kind: TypeKind,
    pub has_uri: bool,
    pub has_unique_name: bool,
}

/// A storable catalog instance.
pub trait Node: Sized {
    const SCHEMA: NodeSchema;

    fn id(&self) -> Option<i64>;
    fn type_id(&self) -> i64;
    /// Context name; `None` for kinds without one.
    fn name(&self) -> Option<&str>;
    /// Artifact uri; `None` for kinds without one.
    fn uri(&self) -> Option<&str>;
    fn properties(&self) -> &PropertyMap;
    fn custom_properties(&self) -> &PropertyMap;

    fn from_parts(
        id: i64,
        type_id: i64,
        uri: Option<String>,
        name: Option<String>,
        properties: PropertyMap,
        custom_properties: PropertyMap,
    ) -> Self;
}

impl Node for Artifact {
    const SCHEMA: NodeSchema = NodeSchema {
        label: "artifact",
        table: "artifact",
        property_table: "artifact_property",
        id_column: "artifact_id",
        type_kind: TypeKind::Artifact,
        has_uri: true,
        has_unique_name: false,
    };

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn type_id(&self) -> i64 {
        self.type_id
    }
    fn name(&self) -> Option<&str> {
        None
    }
    fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }
    fn properties(&self) -> &PropertyMap {
        &self.properties
    }
    fn custom_properties(&self) -> &PropertyMap {
        &self.custom_properties
    }

    fn from_parts(
        id: i64,
        type_id: i64,
        uri: Option<String>,
        _name: Option<String>,
        properties: PropertyMap,
        custom_properties: PropertyMap,
    ) -> Self {
        Self {
            id: Some(id),
            type_id,
            uri,
            properties,
            custom_properties,
        }
    }
}

impl Node for Execution {
    const SCHEMA: NodeSchema = NodeSchema {
        label: "execution",
        table: "execution",
        property_table: "execution_property",
        id_column: "execution_id",
        type_kind: TypeKind::Execution,
        has_uri: false,
        has_unique_name: false,
    };

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn type_id(&self) -> i64 {
        self.type_id
    }
    fn name(&self) -> Option<&str> {
        None
    }
    fn uri(&self) -> Option<&str> {
        None
    }
    fn properties(&self) -> &PropertyMap {
        &self.properties
    }
    fn custom_properties(&self) -> &PropertyMap {
        &self.custom_properties
    }

    fn from_parts(
        id: i64,
        type_id: i64,
        _uri: Option<String>,
        _name: Option<String>,
        properties: PropertyMap,
        custom_properties: PropertyMap,
    ) -> Self {
        Self {
            id: Some(id),
            type_id,
            properties,
            custom_properties,
        }
    }
}

impl Node for Context {
    const SCHEMA: NodeSchema = NodeSchema {
        label: "context",
        table: "context",
        property_table: "context_property",
        id_column: "context_id",
        type_kind: TypeKind::Context,
        has_uri: false,
        has_unique_name: true,
    };

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn type_id(&self) -> i64 {
        self.type_id
    }
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn uri(&self) -> Option<&str> {
        None
    }
    fn properties(&self) -> &PropertyMap {
        &self.properties
    }
    fn custom_properties(&self) -> &PropertyMap {
        &self.custom_properties
    }

    fn from_parts(
        id: i64,
        type_id: i64,
        _uri: Option<String>,
        name: Option<String>,
        properties: PropertyMap,
        custom_properties: PropertyMap,
    ) -> Self {
        Self {
            id: Some(id),
            type_id,
            name: name.unwrap_or_default(),
            properties,
            custom_properties,
        }
    }
}

/// Check that every declared property conforms to the node's type.
///
/// Custom properties bypass validation entirely.
fn validate_against_type<N: Node>(conn: &Connection, node: &N) -> Result<()> {
    let schema = N::SCHEMA;
    let node_type = types::get_type_by_id(conn, schema.type_kind, node.type_id())?.ok_or_else(
        || {
            Error::InvalidArgument(format!(
                "no {} with id {} exists",
                schema.type_kind.label(),
                node.type_id()
            ))
        },
    )?;
    for (name, value) in node.properties() {
        match node_type.properties.get(name) {
            None => {
                return Err(Error::InvalidArgument(format!(
                    "property {name} is not declared by type {}",
                    node_type.name
                )))
            }
            Some(declared) if *declared != value.property_type() => {
                return Err(Error::InvalidArgument(format!(
                    "property {name} of type {} expects a {declared:?} value",
                    node_type.name
                )))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Decompose a value into the three typed columns.
fn value_columns(value: &PropertyValue) -> (Option<i64>, Option<f64>, Option<&str>) {
    match value {
        PropertyValue::Int(v) => (Some(*v), None, None),
        PropertyValue::Double(v) => (None, Some(*v), None),
        PropertyValue::String(v) => (None, None, Some(v.as_str())),
    }
}

fn recompose_value(
    int_value: Option<i64>,
    double_value: Option<f64>,
    string_value: Option<String>,
) -> Result<PropertyValue> {
    match (int_value, double_value, string_value) {
        (Some(v), None, None) => Ok(PropertyValue::Int(v)),
        (None, Some(v), None) => Ok(PropertyValue::Double(v)),
        (None, None, Some(v)) => Ok(PropertyValue::String(v)),
        _ => Err(Error::Internal(
            "property row does not carry exactly one typed value".to_string(),
        )),
    }
}

fn write_properties<N: Node>(
    tx: &Transaction,
    node_id: i64,
    properties: &PropertyMap,
    is_custom: bool,
) -> Result<()> {
    let schema = N::SCHEMA;
    let sql = format!(
        "INSERT INTO {} ({}, name, is_custom_property, int_value, double_value, string_value)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        schema.property_table, schema.id_column
    );
    let mut stmt = tx.prepare(&sql)?;
    for (name, value) in properties {
        let (int_value, double_value, string_value) = value_columns(value);
        stmt.execute(params![
            node_id,
            name,
            i64::from(is_custom),
            int_value,
            double_value,
            string_value
        ])?;
    }
    Ok(())
}

fn insert_node<N: Node>(tx: &Transaction, node: &N) -> Result<i64> {
    let schema = N::SCHEMA;
    if schema.has_uri {
        // Absent uri is treated as empty so the by-uri query can match it.
        tx.execute(
            &format!("INSERT INTO {} (type_id, uri) VALUES (?1, ?2)", schema.table),
            params![node.type_id(), node.uri().unwrap_or("")],
        )?;
    } else if schema.has_unique_name {
        tx.execute(
            &format!(
                "INSERT INTO {} (type_id, name) VALUES (?1, ?2)",
                schema.table
            ),
            params![node.type_id(), node.name()],
        )?;
    } else {
        tx.execute(
            &format!("INSERT INTO {} (type_id) VALUES (?1)", schema.table),
            params![node.type_id()],
        )?;
    }
    Ok(tx.last_insert_rowid())
}

fn update_node<N: Node>(tx: &Transaction, id: i64, node: &N) -> Result<()> {
    let schema = N::SCHEMA;
    let stored_type_id: Option<i64> = tx
        .query_row(
            &format!("SELECT type_id FROM {} WHERE id = ?1", schema.table),
            [id],
            |row| row.get(0),
        )
        .optional()?;
    let stored_type_id = stored_type_id.ok_or_else(|| {
        Error::InvalidArgument(format!("no {} found with id {id}", schema.label))
    })?;
    if stored_type_id != node.type_id() {
        return Err(Error::InvalidArgument(format!(
            "{} {id} is of type {stored_type_id}, not {}",
            schema.label,
            node.type_id()
        )));
    }
    if schema.has_uri {
        tx.execute(
            &format!("UPDATE {} SET uri = ?1 WHERE id = ?2", schema.table),
            params![node.uri().unwrap_or(""), id],
        )?;
    } else if schema.has_unique_name {
        tx.execute(
            &format!("UPDATE {} SET name = ?1 WHERE id = ?2", schema.table),
            params![node.name(), id],
        )?;
    }
    tx.execute(
        &format!(
            "DELETE FROM {} WHERE {} = ?1",
            schema.property_table, schema.id_column
        ),
        [id],
    )?;
    Ok(())
}

/// Insert or update one instance; returns its id.
///
/// # Errors
///
/// - `InvalidArgument` for an unknown type, a non-conforming property, an
///   update against a missing id, a type change on update, or an empty
///   context name.
/// - `AlreadyExists` when inserting a context whose `(type_id, name)` is
///   taken.
pub fn put_node<N: Node>(tx: &Transaction, node: &N) -> Result<i64> {
    let schema = N::SCHEMA;
    if schema.has_unique_name {
        match node.name() {
            Some(name) if !name.is_empty() => {}
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "{} name must be non-empty",
                    schema.label
                )))
            }
        }
    }
    validate_against_type(tx, node)?;

    let id = match node.id() {
        None => {
            if schema.has_unique_name {
                let taken = tx
                    .prepare(&format!(
                        "SELECT 1 FROM {} WHERE type_id = ?1 AND name = ?2",
                        schema.table
                    ))?
                    .exists(params![node.type_id(), node.name()])?;
                if taken {
                    return Err(Error::AlreadyExists(format!(
                        "{} named {:?} already exists for type {}",
                        schema.label,
                        node.name().unwrap_or_default(),
                        node.type_id()
                    )));
                }
            }
            insert_node(tx, node)?
        }
        Some(id) => {
            update_node(tx, id, node)?;
            id
        }
    };
    write_properties::<N>(tx, id, node.properties(), false)?;
    write_properties::<N>(tx, id, node.custom_properties(), true)?;
    Ok(id)
}

fn select_columns(schema: &NodeSchema) -> String {
    let mut columns = String::from("id, type_id");
    if schema.has_uri {
        columns.push_str(", uri");
    }
    if schema.has_unique_name {
        columns.push_str(", name");
    }
    columns
}

/// Load nodes matching a filter, ordered by id, with their properties.
fn load_nodes<N: Node, P: rusqlite::Params>(
    conn: &Connection,
    where_clause: &str,
    params: P,
) -> Result<Vec<N>> {
    let schema = N::SCHEMA;
    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY id",
        select_columns(&schema),
        schema.table,
        where_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut nodes: Vec<(i64, i64, Option<String>, Option<String>)> = Vec::new();
    let rows = stmt.query_map(params, |row| {
        let id: i64 = row.get(0)?;
        let type_id: i64 = row.get(1)?;
        let uri: Option<String> = if schema.has_uri { row.get(2)? } else { None };
        let name: Option<String> = if schema.has_unique_name {
            row.get(2)?
        } else {
            None
        };
        Ok((id, type_id, uri, name))
    })?;
    for row in rows {
        nodes.push(row?);
    }

    let mut declared: Vec<PropertyMap> = vec![PropertyMap::new(); nodes.len()];
    let mut custom: Vec<PropertyMap> = vec![PropertyMap::new(); nodes.len()];
    if !nodes.is_empty() {
        let placeholders = vec!["?"; nodes.len()].join(", ");
        let sql = format!(
            "SELECT {}, name, is_custom_property, int_value, double_value, string_value
             FROM {} WHERE {} IN ({placeholders})",
            schema.id_column, schema.property_table, schema.id_column
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(nodes.iter().map(|(id, ..)| *id)),
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            },
        )?;
        for row in rows {
            let (node_id, name, is_custom, int_value, double_value, string_value) = row?;
            let value = recompose_value(int_value, double_value, string_value)?;
            let position = nodes
                .binary_search_by_key(&node_id, |(id, ..)| *id)
                .map_err(|_| {
                    Error::Internal(format!(
                        "orphaned property row for {} {node_id}",
                        schema.label
                    ))
                })?;
            if is_custom == 0 {
                declared[position].insert(name, value);
            } else {
                custom[position].insert(name, value);
            }
        }
    }

    Ok(nodes
        .into_iter()
        .zip(declared.into_iter().zip(custom))
        .map(|((id, type_id, uri, name), (properties, custom_properties))| {
            N::from_parts(id, type_id, uri, name, properties, custom_properties)
        })
        .collect())
}

/// Fetch the subset of the given ids that exist; missing ids are dropped.
pub fn get_nodes_by_id<N: Node>(conn: &Connection, ids: &[i64]) -> Result<Vec<N>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    load_nodes(
        conn,
        &format!("id IN ({placeholders})"),
        params_from_iter(ids.iter().copied()),
    )
}

/// Fetch every node of the kind, in insertion order.
pub fn get_all_nodes<N: Node>(conn: &Connection) -> Result<Vec<N>> {
    load_nodes(conn, "1 = 1", [])
}

/// Fetch every node with the given type id.
pub fn get_nodes_by_type_id<N: Node>(conn: &Connection, type_id: i64) -> Result<Vec<N>> {
    load_nodes(conn, "type_id = ?1", [type_id])
}

/// Fetch every artifact whose uri equals the parameter (empty included).
pub fn get_artifacts_by_uri(conn: &Connection, uri: &str) -> Result<Vec<Artifact>> {
    load_nodes(conn, "uri = ?1", [uri])
}

/// Whether a row with this id exists in the node's table.
pub fn node_exists<N: Node>(conn: &Connection, id: i64) -> Result<bool> {
    let exists = conn
        .prepare(&format!("SELECT 1 FROM {} WHERE id = ?1", N::SCHEMA.table))?
        .exists([id])?;
    Ok(exists)
}

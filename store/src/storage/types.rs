//! Type registry: named property schemas with evolution rules.
//!
//! Additive evolution is the common case (pipelines grow new properties over
//! time); destructive or tag-changing edits are refused so existing
//! instances are never silently invalidated.

use crate::error::{Error, Result};
use crate::model::{PropertyType, Type, TypeKind};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};

/// Evolution flags for a put-type request.
///
/// `all_fields_match` selects the comparison domain; the registry always
/// compares the full property set, which is exactly the domain this flag
/// names, so it is accepted for request compatibility and defaults to true.
#[derive(Debug, Clone, Copy)]
pub struct PutTypeOptions {
    pub all_fields_match: bool,
    pub can_add_fields: bool,
    pub can_omit_fields: bool,
}

impl Default for PutTypeOptions {
    fn default() -> Self {
        Self {
            all_fields_match: true,
            can_add_fields: false,
            can_omit_fields: false,
        }
    }
}

fn load_properties(conn: &Connection, type_id: i64) -> Result<Type> {
    let name: String = conn.query_row("SELECT name FROM type WHERE id = ?1", [type_id], |row| {
        row.get(0)
    })?;
    let mut result = Type::new(&name);
    result.id = Some(type_id);
    let mut stmt =
        conn.prepare("SELECT name, data_type FROM type_property WHERE type_id = ?1")?;
    let rows = stmt.query_map([type_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (property_name, code) = row?;
        let property_type = PropertyType::from_code(code).ok_or_else(|| {
            Error::Internal(format!(
                "type {name} stores property {property_name} with unknown tag {code}"
            ))
        })?;
        result.properties.insert(property_name, property_type);
    }
    Ok(result)
}

/// Look a type up by name within a kind.
pub fn get_type_by_name(conn: &Connection, kind: TypeKind, name: &str) -> Result<Option<Type>> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM type WHERE type_kind = ?1 AND name = ?2",
            params![kind.code(), name],
            |row| row.get(0),
        )
        .optional()?;
    match id {
        Some(id) => Ok(Some(load_properties(conn, id)?)),
        None => Ok(None),
    }
}

/// Look a type up by id within a kind. A matching id of the wrong kind
/// resolves to `None`.
pub fn get_type_by_id(conn: &Connection, kind: TypeKind, id: i64) -> Result<Option<Type>> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM type WHERE id = ?1 AND type_kind = ?2",
            params![id, kind.code()],
            |row| row.get(0),
        )
        .optional()?;
    match found {
        Some(id) => Ok(Some(load_properties(conn, id)?)),
        None => Ok(None),
    }
}

/// All types of a kind, in insertion order. Empty is a success.
pub fn get_types(conn: &Connection, kind: TypeKind) -> Result<Vec<Type>> {
    let mut stmt = conn.prepare("SELECT id FROM type WHERE type_kind = ?1 ORDER BY id")?;
    let ids: Vec<i64> = stmt
        .query_map([kind.code()], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    ids.into_iter().map(|id| load_properties(conn, id)).collect()
}

/// The subset of the given type ids that exist; missing ids are dropped.
pub fn get_types_by_id(conn: &Connection, kind: TypeKind, ids: &[i64]) -> Result<Vec<Type>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id FROM type WHERE type_kind = ? AND id IN ({placeholders}) ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let found: Vec<i64> = stmt
        .query_map(
            params_from_iter(std::iter::once(kind.code()).chain(ids.iter().copied())),
            |row| row.get(0),
        )?
        .collect::<rusqlite::Result<_>>()?;
    found
        .into_iter()
        .map(|id| load_properties(conn, id))
        .collect()
}

fn insert_type(tx: &Transaction, kind: TypeKind, t: &Type) -> Result<i64> {
    tx.execute(
        "INSERT INTO type (name, type_kind) VALUES (?1, ?2)",
        params![t.name, kind.code()],
    )?;
    let id = tx.last_insert_rowid();
    let mut stmt =
        tx.prepare("INSERT INTO type_property (type_id, name, data_type) VALUES (?1, ?2, ?3)")?;
    for (name, property_type) in &t.properties {
        stmt.execute(params![id, name, property_type.code()])?;
    }
    Ok(id)
}

/// Insert a type or evolve the stored one; returns the type id.
///
/// # Errors
///
/// - `InvalidArgument` when the name is empty.
/// - `AlreadyExists` when an overlapping property changes its tag, when the
///   request adds properties without `can_add_fields`, or omits stored
///   properties without `can_omit_fields`.
pub fn put_type(
    tx: &Transaction,
    kind: TypeKind,
    t: &Type,
    options: &PutTypeOptions,
) -> Result<i64> {
    if t.name.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "{} name must be non-empty",
            kind.label()
        )));
    }

    let Some(stored) = get_type_by_name(tx, kind, &t.name)? else {
        return insert_type(tx, kind, t);
    };
    let stored_id = stored.id.unwrap_or_default();

    // Tag changes on overlapping properties are refused unconditionally.
    for (name, property_type) in &t.properties {
        if let Some(stored_type) = stored.properties.get(name) {
            if stored_type != property_type {
                return Err(Error::AlreadyExists(format!(
                    "{} {} already declares property {name} as {stored_type:?}",
                    kind.label(),
                    t.name
                )));
            }
        }
    }

    let added: Vec<(&String, PropertyType)> = t
        .properties
        .iter()
        .filter(|(name, _)| !stored.properties.contains_key(*name))
        .map(|(name, property_type)| (name, *property_type))
        .collect();
    let omitted = stored
        .properties
        .keys()
        .any(|name| !t.properties.contains_key(name));

    if !added.is_empty() && !options.can_add_fields {
        return Err(Error::AlreadyExists(format!(
            "{} {} exists with a different property set; set can_add_fields to append",
            kind.label(),
            t.name
        )));
    }
    if omitted && !options.can_omit_fields {
        return Err(Error::AlreadyExists(format!(
            "{} {} declares properties the request omits; set can_omit_fields to accept",
            kind.label(),
            t.name
        )));
    }

    // Omitted properties stay on the stored type; additions are appended
    // with the id preserved.
    let mut stmt =
        tx.prepare("INSERT INTO type_property (type_id, name, data_type) VALUES (?1, ?2, ?3)")?;
    for (name, property_type) in added {
        stmt.execute(params![stored_id, name, property_type.code()])?;
    }
    Ok(stored_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use crate::query::QueryConfig;
    use crate::storage::schema::{prepare_schema, MigrationOptions};

    fn store() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        prepare_schema(&mut conn, &QueryConfig::sqlite(), &MigrationOptions::default()).unwrap();
        conn
    }

    fn trainer() -> Type {
        Type::new("trainer")
            .with_property("steps", PropertyType::Int)
            .with_property("optimizer", PropertyType::String)
    }

    #[test]
    fn test_identical_puts_return_the_same_id() {
        let mut conn = store();
        let tx = conn.transaction().unwrap();
        let options = PutTypeOptions::default();
        let first = put_type(&tx, TypeKind::Execution, &trainer(), &options).unwrap();
        let second = put_type(&tx, TypeKind::Execution, &trainer(), &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_same_name_different_kind_are_distinct() {
        let mut conn = store();
        let tx = conn.transaction().unwrap();
        let options = PutTypeOptions::default();
        let as_execution = put_type(&tx, TypeKind::Execution, &trainer(), &options).unwrap();
        let as_artifact = put_type(&tx, TypeKind::Artifact, &trainer(), &options).unwrap();
        assert_ne!(as_execution, as_artifact);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let mut conn = store();
        let tx = conn.transaction().unwrap();
        let err =
            put_type(&tx, TypeKind::Artifact, &Type::new(""), &PutTypeOptions::default())
                .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_adding_a_property_requires_the_flag() {
        let mut conn = store();
        let tx = conn.transaction().unwrap();
        let id = put_type(&tx, TypeKind::Execution, &trainer(), &PutTypeOptions::default())
            .unwrap();

        let grown = trainer().with_property("warmup", PropertyType::Double);
        let err = put_type(&tx, TypeKind::Execution, &grown, &PutTypeOptions::default())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);

        let options = PutTypeOptions {
            can_add_fields: true,
            ..Default::default()
        };
        assert_eq!(put_type(&tx, TypeKind::Execution, &grown, &options).unwrap(), id);
        let stored = get_type_by_name(&tx, TypeKind::Execution, "trainer")
            .unwrap()
            .unwrap();
        assert_eq!(stored.properties.len(), 3);
        assert_eq!(stored.properties["warmup"], PropertyType::Double);
    }

    #[test]
    fn test_omitting_a_property_requires_the_flag_and_keeps_it() {
        let mut conn = store();
        let tx = conn.transaction().unwrap();
        let id = put_type(&tx, TypeKind::Execution, &trainer(), &PutTypeOptions::default())
            .unwrap();

        let shrunk = Type::new("trainer").with_property("steps", PropertyType::Int);
        let err = put_type(&tx, TypeKind::Execution, &shrunk, &PutTypeOptions::default())
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);
        // The failed request leaves the stored type untouched.
        let stored = get_type_by_name(&tx, TypeKind::Execution, "trainer")
            .unwrap()
            .unwrap();
        assert_eq!(stored.properties.len(), 2);

        let options = PutTypeOptions {
            can_omit_fields: true,
            ..Default::default()
        };
        assert_eq!(put_type(&tx, TypeKind::Execution, &shrunk, &options).unwrap(), id);
        // Omitted properties are retained, not dropped.
        let stored = get_type_by_name(&tx, TypeKind::Execution, "trainer")
            .unwrap()
            .unwrap();
        assert_eq!(stored.properties.len(), 2);
    }

    #[test]
    fn test_changing_a_property_tag_is_always_rejected() {
        let mut conn = store();
        let tx = conn.transaction().unwrap();
        put_type(&tx, TypeKind::Execution, &trainer(), &PutTypeOptions::default()).unwrap();

        let mutated = Type::new("trainer")
            .with_property("steps", PropertyType::String)
            .with_property("optimizer", PropertyType::String);
        let options = PutTypeOptions {
            can_add_fields: true,
            can_omit_fields: true,
            ..Default::default()
        };
        let err = put_type(&tx, TypeKind::Execution, &mutated, &options).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);
    }

    #[test]
    fn test_get_types_in_insertion_order() {
        let mut conn = store();
        let tx = conn.transaction().unwrap();
        let options = PutTypeOptions::default();
        put_type(&tx, TypeKind::Artifact, &Type::new("dataset"), &options).unwrap();
        put_type(&tx, TypeKind::Artifact, &Type::new("model"), &options).unwrap();
        put_type(&tx, TypeKind::Execution, &Type::new("trainer"), &options).unwrap();
        tx.commit().unwrap();

        let names: Vec<String> = get_types(&conn, TypeKind::Artifact)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["dataset", "model"]);
        assert!(get_types(&conn, TypeKind::Context).unwrap().is_empty());
    }

    #[test]
    fn test_get_types_by_id_drops_missing_ids() {
        let mut conn = store();
        let tx = conn.transaction().unwrap();
        let id = put_type(
            &tx,
            TypeKind::Artifact,
            &Type::new("dataset"),
            &PutTypeOptions::default(),
        )
        .unwrap();
        tx.commit().unwrap();

        let found = get_types_by_id(&conn, TypeKind::Artifact, &[id, id + 17]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "dataset");
        // Wrong kind drops too.
        assert!(get_types_by_id(&conn, TypeKind::Execution, &[id]).unwrap().is_empty());
    }

    #[test]
    fn test_get_type_by_name_missing_is_none() {
        let conn = store();
        assert!(get_type_by_name(&conn, TypeKind::Artifact, "absent")
            .unwrap()
            .is_none());
    }
}

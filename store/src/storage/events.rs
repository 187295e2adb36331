//! Append-only lineage event log.
//!
//! Events are never modified once written; re-inserting an existing
//! `(artifact, execution, kind)` triple is a no-op enforced by the unique
//! index over the triple.

use crate::error::{Error, Result};
use crate::model::{Artifact, Event, EventType, Execution, PathStep};
use crate::storage::node;
use rusqlite::{params, params_from_iter, Connection, Transaction};

/// Append events to the log.
///
/// Unset timestamps are filled with the server clock. Both endpoints must
/// resolve; the event type must not be `Unknown`.
///
/// # Errors
///
/// Returns `InvalidArgument` for an unresolvable endpoint or an `Unknown`
/// event type.
pub fn put_events(tx: &Transaction, events: &[Event]) -> Result<()> {
    for event in events {
        if event.event_type == EventType::Unknown {
            return Err(Error::InvalidArgument(
                "event type must not be unknown".to_string(),
            ));
        }
        if !node::node_exists::<Artifact>(tx, event.artifact_id)? {
            return Err(Error::InvalidArgument(format!(
                "no artifact found with id {}",
                event.artifact_id
            )));
        }
        if !node::node_exists::<Execution>(tx, event.execution_id)? {
            return Err(Error::InvalidArgument(format!(
                "no execution found with id {}",
                event.execution_id
            )));
        }
        let timestamp = event
            .milliseconds_since_epoch
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO event
                 (artifact_id, execution_id, event_type, milliseconds_since_epoch)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.artifact_id,
                event.execution_id,
                event.event_type.code(),
                timestamp
            ],
        )?;
        // An ignored insert is a duplicate triple; its stored path stands.
        if inserted == 0 {
            continue;
        }
        let event_id = tx.last_insert_rowid();
        let mut stmt = tx.prepare(
            "INSERT INTO event_path
                 (event_id, step_number, is_index_step, index_value, key_value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (step_number, step) in event.path.iter().enumerate() {
            let (index_value, key_value) = match step {
                PathStep::Index(index) => (Some(*index), None),
                PathStep::Key(key) => (None, Some(key.as_str())),
            };
            stmt.execute(params![
                event_id,
                step_number as i64,
                i64::from(index_value.is_some()),
                index_value,
                key_value
            ])?;
        }
    }
    Ok(())
}

fn load_events(conn: &Connection, endpoint_column: &str, ids: &[i64]) -> Result<Vec<Event>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT id, artifact_id, execution_id, event_type, milliseconds_since_epoch
         FROM event WHERE {endpoint_column} IN ({placeholders}) ORDER BY id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter().copied()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            Event {
                artifact_id: row.get(1)?,
                execution_id: row.get(2)?,
                event_type: EventType::from_code(row.get(3)?),
                milliseconds_since_epoch: Some(row.get(4)?),
                path: Vec::new(),
            },
        ))
    })?;
    let mut event_ids = Vec::new();
    let mut events = Vec::new();
    for row in rows {
        let (event_id, event) = row?;
        event_ids.push(event_id);
        events.push(event);
    }
    if events.is_empty() {
        return Ok(events);
    }

    let placeholders = vec!["?"; event_ids.len()].join(", ");
    let sql = format!(
        "SELECT event_id, is_index_step, index_value, key_value
         FROM event_path WHERE event_id IN ({placeholders})
         ORDER BY event_id, step_number"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(event_ids.iter().copied()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, Option<i64>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;
    for row in rows {
        let (event_id, is_index_step, index_value, key_value) = row?;
        let step = if is_index_step == 1 {
            PathStep::Index(index_value.ok_or_else(|| {
                Error::Internal("index path step carries no index".to_string())
            })?)
        } else {
            PathStep::Key(key_value.ok_or_else(|| {
                Error::Internal("key path step carries no key".to_string())
            })?)
        };
        let position = event_ids
            .binary_search(&event_id)
            .map_err(|_| Error::Internal(format!("orphaned path row for event {event_id}")))?;
        events[position].path.push(step);
    }
    Ok(events)
}

/// All events whose artifact endpoint is in the id set.
pub fn get_events_by_artifact_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Event>> {
    load_events(conn, "artifact_id", ids)
}

/// All events whose execution endpoint is in the id set.
pub fn get_events_by_execution_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Event>> {
    load_events(conn, "execution_id", ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use crate::model::{Context, Type, TypeKind};
    use crate::query::QueryConfig;
    use crate::storage::node::put_node;
    use crate::storage::schema::{prepare_schema, MigrationOptions};
    use crate::storage::types::{put_type, PutTypeOptions};

    fn store_with_instances() -> (Connection, i64, i64) {
        let mut conn = Connection::open_in_memory().unwrap();
        prepare_schema(&mut conn, &QueryConfig::sqlite(), &MigrationOptions::default()).unwrap();
        let tx = conn.transaction().unwrap();
        let artifact_type =
            put_type(&tx, TypeKind::Artifact, &Type::new("dataset"), &PutTypeOptions::default())
                .unwrap();
        let execution_type =
            put_type(&tx, TypeKind::Execution, &Type::new("trainer"), &PutTypeOptions::default())
                .unwrap();
        let artifact_id = put_node(&tx, &Artifact::new(artifact_type)).unwrap();
        let execution_id = put_node(&tx, &Execution::new(execution_type)).unwrap();
        tx.commit().unwrap();
        (conn, artifact_id, execution_id)
    }

    #[test]
    fn test_events_round_trip_with_paths() {
        let (mut conn, artifact_id, execution_id) = store_with_instances();
        let event = Event::new(artifact_id, execution_id, EventType::Input).with_path(vec![
            PathStep::Index(0),
            PathStep::Key("examples".to_string()),
        ]);
        let tx = conn.transaction().unwrap();
        put_events(&tx, &[event.clone()]).unwrap();
        tx.commit().unwrap();

        let by_artifact = get_events_by_artifact_ids(&conn, &[artifact_id]).unwrap();
        assert_eq!(by_artifact.len(), 1);
        assert_eq!(by_artifact[0].event_type, EventType::Input);
        assert_eq!(by_artifact[0].path, event.path);
        assert!(by_artifact[0].milliseconds_since_epoch.unwrap() > 0);

        let by_execution = get_events_by_execution_ids(&conn, &[execution_id]).unwrap();
        assert_eq!(by_execution.len(), 1);
    }

    #[test]
    fn test_explicit_timestamp_is_kept() {
        let (mut conn, artifact_id, execution_id) = store_with_instances();
        let mut event = Event::new(artifact_id, execution_id, EventType::Output);
        event.milliseconds_since_epoch = Some(12_345);
        let tx = conn.transaction().unwrap();
        put_events(&tx, &[event]).unwrap();
        tx.commit().unwrap();

        let events = get_events_by_artifact_ids(&conn, &[artifact_id]).unwrap();
        assert_eq!(events[0].milliseconds_since_epoch, Some(12_345));
    }

    #[test]
    fn test_duplicate_triple_is_a_noop() {
        let (mut conn, artifact_id, execution_id) = store_with_instances();
        let event = Event::new(artifact_id, execution_id, EventType::Input);
        let tx = conn.transaction().unwrap();
        put_events(&tx, &[event.clone()]).unwrap();
        put_events(&tx, &[event.clone()]).unwrap();
        // A different kind for the same endpoints is a fresh row.
        put_events(&tx, &[Event::new(artifact_id, execution_id, EventType::Output)]).unwrap();
        tx.commit().unwrap();

        let events = get_events_by_artifact_ids(&conn, &[artifact_id]).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_unresolved_endpoints_are_rejected() {
        let (mut conn, artifact_id, execution_id) = store_with_instances();
        let tx = conn.transaction().unwrap();
        let err = put_events(&tx, &[Event::new(artifact_id + 99, execution_id, EventType::Input)])
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
        let err = put_events(&tx, &[Event::new(artifact_id, execution_id + 99, EventType::Input)])
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let (mut conn, artifact_id, execution_id) = store_with_instances();
        let tx = conn.transaction().unwrap();
        let err = put_events(&tx, &[Event::new(artifact_id, execution_id, EventType::Unknown)])
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    }

    #[test]
    fn test_context_instances_do_not_satisfy_event_endpoints() {
        let (mut conn, _, execution_id) = store_with_instances();
        let tx = conn.transaction().unwrap();
        let context_type =
            put_type(&tx, TypeKind::Context, &Type::new("run"), &PutTypeOptions::default())
                .unwrap();
        let context_id = put_node(&tx, &Context::new(context_type, "run-1")).unwrap();
        // A context id is not an artifact id, even if the integers collide;
        // here it is guaranteed fresh in the artifact table.
        let missing = context_id + 1_000;
        let err = put_events(&tx, &[Event::new(missing, execution_id, EventType::Input)])
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidArgument);
    }
}

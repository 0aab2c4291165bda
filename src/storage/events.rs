//! Audit event storage and retrieval.
//!
//! Every merge, render, and delete leaves an event row so the history of a
//! model can be reconstructed when a render/extract cycle goes wrong.

use rusqlite::{Connection, Result};
use serde::Serialize;

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProjectCreated,
    ProjectRendered,
    ProjectExtracted,

    FileCreated,
    FileUpdated,
    FileDeleted,

    FunctionCreated,
    FunctionUpdated,

    ImportAdded,

    TypeDefinitionCreated,
    TypeDefinitionUpdated,

    ConstantCreated,
    ConstantUpdated,
}

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project_created",
            Self::ProjectRendered => "project_rendered",
            Self::ProjectExtracted => "project_extracted",
            Self::FileCreated => "file_created",
            Self::FileUpdated => "file_updated",
            Self::FileDeleted => "file_deleted",
            Self::FunctionCreated => "function_created",
            Self::FunctionUpdated => "function_updated",
            Self::ImportAdded => "import_added",
            Self::TypeDefinitionCreated => "type_definition_created",
            Self::TypeDefinitionUpdated => "type_definition_updated",
            Self::ConstantCreated => "constant_created",
            Self::ConstantUpdated => "constant_updated",
        }
    }

    /// Pick the created/updated variant for a merge outcome.
    #[must_use]
    pub fn for_merge(entity_type: &str, created: bool) -> Option<Self> {
        match (entity_type, created) {
            ("file", true) => Some(Self::FileCreated),
            ("file", false) => Some(Self::FileUpdated),
            ("function", true) => Some(Self::FunctionCreated),
            ("function", false) => Some(Self::FunctionUpdated),
            ("type_definition", true) => Some(Self::TypeDefinitionCreated),
            ("type_definition", false) => Some(Self::TypeDefinitionUpdated),
            ("constant", true) => Some(Self::ConstantCreated),
            ("constant", false) => Some(Self::ConstantUpdated),
            _ => None,
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "project_created" => Self::ProjectCreated,
            "project_rendered" => Self::ProjectRendered,
            "project_extracted" => Self::ProjectExtracted,
            "file_created" => Self::FileCreated,
            "file_updated" => Self::FileUpdated,
            "file_deleted" => Self::FileDeleted,
            "function_created" => Self::FunctionCreated,
            "function_updated" => Self::FunctionUpdated,
            "import_added" => Self::ImportAdded,
            "type_definition_created" => Self::TypeDefinitionCreated,
            "type_definition_updated" => Self::TypeDefinitionUpdated,
            "constant_created" => Self::ConstantCreated,
            "constant_updated" => Self::ConstantUpdated,
            other => return Err(format!("Unknown event type: {other}")),
        })
    }
}

/// An audit event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    /// Natural key of the entity (`helpers.py::helper_one`, `MAX_USERS`, ...)
    pub entity_key: String,
    pub event_type: EventType,
    pub actor: String,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_key: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_key: entity_key.to_string(),
            event_type,
            actor: actor.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_key, event_type, actor, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            event.entity_type,
            event.entity_key,
            event.event_type.as_str(),
            event.actor,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get the most recent events, newest first.
///
/// Rows with an event type this build does not know are skipped.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn recent_events(conn: &Connection, limit: Option<u32>) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_key, event_type, actor, created_at
         FROM events
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let rows = stmt.query_map([limit], |row| {
        let event_type: String = row.get(3)?;
        let Ok(event_type) = event_type.parse::<EventType>() else {
            return Ok(None);
        };
        Ok(Some(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_key: row.get(2)?,
            event_type,
            actor: row.get(4)?,
            created_at: row.get(5)?,
        }))
    })?;

    let mut events = Vec::new();
    for row in rows {
        if let Some(event) = row? {
            events.push(event);
        }
    }
    Ok(events)
}

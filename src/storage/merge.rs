//! Natural-key merge primitives.
//!
//! Every model entity has a natural key (a `name`, a `filename`, or the
//! `(file_id, name)` pair for functions). The functions here look a record up
//! by that key and then either leave it alone (`get_or_create`), overwrite the
//! supplied columns (`upsert`), or refuse a collision (`insert`).
//!
//! All of them take a plain `&Connection`, so they run equally inside a
//! `SqliteStorage::mutate` closure or on a long-lived extraction transaction.

use crate::error::{Error, Result};
use crate::model::{Constant, Function, Language, Project, SourceFile, TypeDefinition};
use crate::storage::events::EventType;
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use tracing::warn;

/// A table whose rows can be merged by natural key.
pub trait Record: Sized {
    /// Entity name used in errors and audit events.
    const ENTITY: &'static str;
    const TABLE: &'static str;
    /// Selected columns, in the order `from_row` reads them.
    const COLUMNS: &'static [&'static str];
    const NATURAL_KEY: &'static [&'static str];

    /// Build a record from a row selected with `COLUMNS`.
    ///
    /// # Errors
    ///
    /// Returns an error if a column cannot be converted.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Column/value pairs supplied to a merge.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(&'static str, Value)>,
}

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(self, column: &'static str, value: impl Into<String>) -> Self {
        self.set(column, Value::Text(value.into()))
    }

    #[must_use]
    pub fn opt_text(self, column: &'static str, value: Option<&str>) -> Self {
        let value = value.map_or(Value::Null, |v| Value::Text(v.to_string()));
        self.set(column, value)
    }

    #[must_use]
    pub fn int(self, column: &'static str, value: i64) -> Self {
        self.set(column, Value::Integer(value))
    }

    fn set(mut self, column: &'static str, value: Value) -> Self {
        if let Some(slot) = self.entries.iter_mut().find(|(c, _)| *c == column) {
            slot.1 = value;
        } else {
            self.entries.push((column, value));
        }
        self
    }

    /// Value supplied for `column`, if any.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }

    /// First key column that is absent, NULL, or blank text.
    fn missing_key(&self, key: &[&'static str]) -> Option<&'static str> {
        key.iter().copied().find(|column| match self.get(column) {
            None | Some(Value::Null) => true,
            Some(Value::Text(text)) => text.trim().is_empty(),
            Some(_) => false,
        })
    }

    /// Key values joined for messages (`3::helper_one`).
    fn key_display(&self, key: &[&'static str]) -> String {
        key.iter()
            .map(|column| match self.get(column) {
                Some(Value::Text(text)) => text.clone(),
                Some(Value::Integer(n)) => n.to_string(),
                _ => String::new(),
            })
            .collect::<Vec<_>>()
            .join("::")
    }

    /// Blank key columns become NULL so a blind insert never stores a fake key.
    fn with_blank_keys_cleared(&self, key: &[&'static str]) -> Self {
        let mut cleared = self.clone();
        for (column, value) in &mut cleared.entries {
            if key.contains(&*column) && matches!(value, Value::Text(t) if t.trim().is_empty()) {
                *value = Value::Null;
            }
        }
        cleared
    }
}

/// Outcome of a merge: the stored record and whether it was just inserted.
#[derive(Debug, Clone)]
pub struct Merged<R> {
    pub record: R,
    pub created: bool,
}

impl<R: Record> Merged<R> {
    /// Audit event matching this outcome.
    #[must_use]
    pub fn event_type(&self) -> Option<EventType> {
        EventType::for_merge(R::ENTITY, self.created)
    }

    /// `created` or `updated`.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        if self.created { "created" } else { "updated" }
    }
}

fn select_sql<R: Record>(filter: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {filter} ORDER BY id LIMIT 1",
        R::COLUMNS.join(", "),
        R::TABLE
    )
}

/// Look a record up by its natural key values, in `NATURAL_KEY` order.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_key<R: Record>(conn: &Connection, key: &[Value]) -> Result<Option<R>> {
    let record = conn
        .query_row(
            &select_sql::<R>(&key_filter::<R>()),
            params_from_iter(key.iter()),
            R::from_row,
        )
        .optional()?;
    Ok(record)
}

/// `a = ?1 AND b = ?2` over the natural key.
fn key_filter<R: Record>() -> String {
    R::NATURAL_KEY
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn key_values<R: Record>(fields: &Fields) -> Vec<Value> {
    R::NATURAL_KEY
        .iter()
        .map(|column| fields.get(column).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Look a record up by primary key.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_by_id<R: Record>(conn: &Connection, id: i64) -> Result<Option<R>> {
    let record = conn
        .query_row(&select_sql::<R>("id = ?1"), [id], R::from_row)
        .optional()?;
    Ok(record)
}

fn find_existing<R: Record>(conn: &Connection, fields: &Fields) -> Result<Option<R>> {
    find_by_key(conn, &key_values::<R>(fields))
}

/// Insert a new record, refusing natural-key collisions.
///
/// # Errors
///
/// Returns `UniquenessViolation` if a unique constraint rejects the row,
/// `Identity` if a natural-key column is NULL, or the database error.
pub fn insert<R: Record>(conn: &Connection, fields: &Fields) -> Result<R> {
    let now = chrono::Utc::now().timestamp_millis();
    let fields = fields.clone().int("created_at", now).int("updated_at", now);

    let columns: Vec<&str> = fields.entries.iter().map(|(c, _)| *c).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        R::TABLE,
        columns.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, params_from_iter(fields.entries.iter().map(|(_, v)| v)))
        .map_err(|err| constraint_error::<R>(err, &fields))?;

    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| Error::Other(format!("{} {id} vanished after insert", R::ENTITY)))
}

/// Map SQLite constraint failures on an insert to model errors.
fn constraint_error<R: Record>(err: rusqlite::Error, fields: &Fields) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        match failure.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                return Error::UniquenessViolation {
                    entity: R::ENTITY,
                    key: fields.key_display(R::NATURAL_KEY),
                };
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL => {
                if let Some(field) = fields.missing_key(R::NATURAL_KEY) {
                    return Error::Identity {
                        entity: R::ENTITY,
                        field,
                    };
                }
            }
            _ => {}
        }
    }
    Error::Database(err)
}

/// Insert without a key lookup when the natural key was not supplied.
fn blind_insert<R: Record>(conn: &Connection, fields: &Fields, field: &str) -> Result<Merged<R>> {
    warn!(
        entity = R::ENTITY,
        field, "Natural key missing, inserting without a merge lookup"
    );
    let record = insert::<R>(conn, &fields.with_blank_keys_cleared(R::NATURAL_KEY))?;
    Ok(Merged {
        record,
        created: true,
    })
}

/// Return the record matching the natural key unchanged, or insert it.
///
/// # Errors
///
/// Returns `Identity` when the key is missing and the blind insert is
/// rejected, or any database error.
pub fn get_or_create<R: Record>(conn: &Connection, fields: &Fields) -> Result<Merged<R>> {
    if let Some(field) = fields.missing_key(R::NATURAL_KEY) {
        return blind_insert(conn, fields, field);
    }

    if let Some(record) = find_existing(conn, fields)? {
        return Ok(Merged {
            record,
            created: false,
        });
    }

    Ok(Merged {
        record: insert(conn, fields)?,
        created: true,
    })
}

/// Overwrite the supplied columns of the record matching the natural key,
/// or insert it.
///
/// Columns not present in `fields` keep their stored values, and
/// `updated_at` only moves when a supplied value actually differs.
///
/// # Errors
///
/// Returns `Identity` when the key is missing and the blind insert is
/// rejected, or any database error.
pub fn upsert<R: Record>(conn: &Connection, fields: &Fields) -> Result<Merged<R>> {
    if let Some(field) = fields.missing_key(R::NATURAL_KEY) {
        return blind_insert(conn, fields, field);
    }

    let Some(existing_id) = key_row_id::<R>(conn, fields)? else {
        return Ok(Merged {
            record: insert(conn, fields)?,
            created: true,
        });
    };

    let changes: Vec<&(&'static str, Value)> = fields
        .entries
        .iter()
        .filter(|(column, _)| !R::NATURAL_KEY.contains(column))
        .collect();

    if !changes.is_empty() {
        let n = changes.len();
        let assignments: Vec<String> = changes
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect();
        let differs: Vec<String> = changes
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} IS NOT ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}, updated_at = ?{} WHERE id = ?{} AND ({})",
            R::TABLE,
            assignments.join(", "),
            n + 1,
            n + 2,
            differs.join(" OR ")
        );

        let mut params: Vec<Value> = changes.iter().map(|(_, v)| v.clone()).collect();
        params.push(Value::Integer(chrono::Utc::now().timestamp_millis()));
        params.push(Value::Integer(existing_id));
        conn.execute(&sql, params_from_iter(params.iter()))?;
    }

    let record = find_by_id(conn, existing_id)?
        .ok_or_else(|| Error::Other(format!("{} {existing_id} vanished during upsert", R::ENTITY)))?;
    Ok(Merged {
        record,
        created: false,
    })
}

fn key_row_id<R: Record>(conn: &Connection, fields: &Fields) -> Result<Option<i64>> {
    let sql = format!(
        "SELECT id FROM {} WHERE {} ORDER BY id LIMIT 1",
        R::TABLE,
        key_filter::<R>()
    );
    let id = conn
        .query_row(&sql, params_from_iter(key_values::<R>(fields).iter()), |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

// ====================
// Record implementations
// ====================

impl Record for Project {
    const ENTITY: &'static str = "project";
    const TABLE: &'static str = "projects";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "description",
        "primary_language",
        "architectural_description",
        "current_state",
        "last_rendered_at",
        "created_at",
        "updated_at",
    ];
    const NATURAL_KEY: &'static [&'static str] = &["name"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let language: String = row.get(3)?;
        let primary_language = language.parse::<Language>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
        })?;

        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            primary_language,
            architectural_description: row.get(4)?,
            current_state: row.get(5)?,
            last_rendered_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

impl Record for SourceFile {
    const ENTITY: &'static str = "file";
    const TABLE: &'static str = "files";
    const COLUMNS: &'static [&'static str] =
        &["id", "filename", "description", "created_at", "updated_at"];
    const NATURAL_KEY: &'static [&'static str] = &["filename"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filename: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }
}

impl Record for Function {
    const ENTITY: &'static str = "function";
    const TABLE: &'static str = "functions";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "file_id",
        "name",
        "description",
        "body",
        "return_type",
        "created_at",
        "updated_at",
    ];
    const NATURAL_KEY: &'static [&'static str] = &["file_id", "name"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            body: row.get(4)?,
            return_type: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl Record for TypeDefinition {
    const ENTITY: &'static str = "type_definition";
    const TABLE: &'static str = "type_definitions";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "description", "body", "created_at", "updated_at"];
    const NATURAL_KEY: &'static [&'static str] = &["name"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl Record for Constant {
    const ENTITY: &'static str = "constant";
    const TABLE: &'static str = "constants";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "description", "value", "created_at", "updated_at"];
    const NATURAL_KEY: &'static [&'static str] = &["name"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            value: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn
    }

    fn constant(name: &str, value: &str) -> Fields {
        Fields::new().text("name", name).text("value", value)
    }

    #[test]
    fn test_get_or_create_returns_existing_unchanged() {
        let conn = conn();
        let first = get_or_create::<Constant>(&conn, &constant("MAX_USERS", "100")).unwrap();
        assert!(first.created);

        let second = get_or_create::<Constant>(&conn, &constant("MAX_USERS", "200")).unwrap();
        assert!(!second.created);
        assert_eq!(second.record.id, first.record.id);
        assert_eq!(second.record.value, "100");
    }

    #[test]
    fn test_upsert_overwrites_supplied_fields_only() {
        let conn = conn();
        let fields = constant("MAX_USERS", "100").text("description", "Seat limit");
        let created = upsert::<Constant>(&conn, &fields).unwrap();
        assert!(created.created);
        assert_eq!(created.verb(), "created");

        let updated = upsert::<Constant>(&conn, &constant("MAX_USERS", "250")).unwrap();
        assert!(!updated.created);
        assert_eq!(updated.verb(), "updated");
        assert_eq!(updated.record.id, created.record.id);
        assert_eq!(updated.record.value, "250");
        assert_eq!(updated.record.description.as_deref(), Some("Seat limit"));
    }

    #[test]
    fn test_upsert_with_identical_fields_is_idempotent() {
        let conn = conn();
        let first = upsert::<Constant>(&conn, &constant("DEBUG", "False")).unwrap();
        conn.execute("UPDATE constants SET updated_at = 1", []).unwrap();

        let again = upsert::<Constant>(&conn, &constant("DEBUG", "False")).unwrap();
        assert_eq!(again.record.id, first.record.id);
        assert_eq!(again.record.updated_at, 1);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM constants", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_function_identity_is_file_and_name() {
        let conn = conn();
        let a = insert::<SourceFile>(&conn, &Fields::new().text("filename", "a.py")).unwrap();
        let b = insert::<SourceFile>(&conn, &Fields::new().text("filename", "b.py")).unwrap();

        let function = |file_id: i64, body: &str| {
            Fields::new()
                .int("file_id", file_id)
                .text("name", "main")
                .text("body", body)
                .text("return_type", "None")
        };

        assert!(upsert::<Function>(&conn, &function(a.id, "def main(): pass")).unwrap().created);
        assert!(upsert::<Function>(&conn, &function(b.id, "def main(): pass")).unwrap().created);

        let merged = upsert::<Function>(&conn, &function(a.id, "def main(): return")).unwrap();
        assert!(!merged.created);
        assert_eq!(merged.record.file_id, a.id);
        assert_eq!(merged.record.body, "def main(): return");
    }

    #[test]
    fn test_insert_collision_is_uniqueness_violation() {
        let conn = conn();
        insert::<Constant>(&conn, &constant("MAX_USERS", "100")).unwrap();

        let err = insert::<Constant>(&conn, &constant("MAX_USERS", "100")).unwrap_err();
        assert!(matches!(
            err,
            Error::UniquenessViolation { entity: "constant", ref key } if key == "MAX_USERS"
        ));

        insert::<SourceFile>(&conn, &Fields::new().text("filename", "main.py")).unwrap();
        let err = insert::<SourceFile>(&conn, &Fields::new().text("filename", "main.py")).unwrap_err();
        assert!(matches!(err, Error::UniquenessViolation { entity: "file", .. }));
    }

    #[test]
    fn test_missing_key_is_identity_error() {
        let conn = conn();
        let err = get_or_create::<Constant>(&conn, &Fields::new().text("value", "1")).unwrap_err();
        assert!(matches!(
            err,
            Error::Identity { entity: "constant", field: "name" }
        ));

        let err = upsert::<TypeDefinition>(&conn, &Fields::new().text("name", "  ").text("body", "x"))
            .unwrap_err();
        assert!(matches!(err, Error::Identity { field: "name", .. }));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM type_definitions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_find_by_key() {
        let conn = conn();
        insert::<TypeDefinition>(
            &conn,
            &Fields::new().text("name", "User").text("body", "class User(TypedDict): ..."),
        )
        .unwrap();

        let found = find_by_key::<TypeDefinition>(&conn, &[Value::Text("User".into())]).unwrap();
        assert_eq!(found.unwrap().body, "class User(TypedDict): ...");
        assert!(
            find_by_key::<TypeDefinition>(&conn, &[Value::Text("Order".into())])
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_merged_event_type() {
        let conn = conn();
        let merged = get_or_create::<SourceFile>(&conn, &Fields::new().text("filename", "x.py")).unwrap();
        assert_eq!(merged.event_type(), Some(EventType::FileCreated));
    }
}

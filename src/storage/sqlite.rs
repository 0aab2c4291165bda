//! SQLite storage implementation.
//!
//! This module provides the storage backend for the project model using SQLite.
//! It follows the MutationContext pattern for transaction discipline and audit logging.

use crate::error::{Error, Result};
use crate::model::{Constant, Function, Import, ImportSpec, NewProject, Project, SourceFile, TypeDefinition};
use crate::storage::events::{insert_event, recent_events, Event, EventType};
use crate::storage::merge::{self, Fields, Merged, Record};
use crate::storage::schema::apply_schema;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, Transaction, TransactionBehavior};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Mutation closures record audit events here; they are written in the
/// same transaction right before commit.
#[derive(Debug)]
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (user name, tool, etc.).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_key: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_key, event_type, &self.actor));
    }

    /// Record the created/updated event for a merge outcome.
    pub fn record_merge<R: Record>(&mut self, entity_key: &str, merged: &Merged<R>) {
        if let Some(event_type) = merged.event_type() {
            self.record_event(R::ENTITY, entity_key, event_type);
        }
    }

    /// Write the recorded events and clear them.
    ///
    /// # Errors
    ///
    /// Returns an error if an insert fails.
    pub fn flush(&mut self, conn: &Connection) -> Result<()> {
        for event in self.events.drain(..) {
            insert_event(conn, &event)?;
        }
        Ok(())
    }
}

/// Number of rows per entity table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModelCounts {
    pub files: usize,
    pub functions: usize,
    pub imports: usize,
    pub type_definitions: usize,
    pub constants: usize,
}

impl ModelCounts {
    /// Returns total number of records.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.files + self.functions + self.imports + self.type_definitions + self.constants
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin an IMMEDIATE transaction for a writer that outlives one call.
    ///
    /// Extraction holds this across its whole walk; callers are responsible
    /// for flushing their own `MutationContext` before commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the write lock cannot be taken.
    pub fn begin(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self.begin()?;

        let mut ctx = MutationContext::new(op, actor);

        // Execute the mutation
        let result = f(&tx, &mut ctx)?;

        // Write audit events
        ctx.flush(&tx)?;

        tx.commit()?;

        Ok(result)
    }

    // ======================
    // Project Operations
    // ======================

    /// Create the store's project, or return it if it already exists.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` if the store holds a project with a
    /// different name, or a database error.
    pub fn initialize_project(&mut self, new: &NewProject, actor: &str) -> Result<Merged<Project>> {
        self.mutate("initialize_project", actor, |tx, ctx| {
            if let Some(existing) = first_project(tx)? {
                if existing.name != new.name {
                    return Err(Error::AlreadyInitialized {
                        name: existing.name,
                    });
                }
            }

            let fields = Fields::new()
                .text("name", new.name.as_str())
                .text("primary_language", new.primary_language.as_str())
                .opt_text("description", new.description.as_deref())
                .opt_text(
                    "architectural_description",
                    new.architectural_description.as_deref(),
                )
                .opt_text("current_state", new.current_state.as_deref());
            let merged = merge::get_or_create::<Project>(tx, &fields)?;

            if merged.created {
                ctx.record_event("project", &new.name, EventType::ProjectCreated);
            }
            Ok(merged)
        })
    }

    /// Get the store's project, if initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_project(&self) -> Result<Option<Project>> {
        first_project(&self.conn)
    }

    /// Get a project by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_project_by_id(&self, id: i64) -> Result<Option<Project>> {
        merge::find_by_id(&self.conn, id)
    }

    /// Record a completed render at `at` (Unix milliseconds).
    ///
    /// The stored timestamp never moves backwards.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the project is gone, or a database error.
    pub fn mark_rendered(&mut self, project_id: i64, at: i64, actor: &str) -> Result<Project> {
        self.mutate("mark_rendered", actor, |tx, ctx| {
            let project = advance_last_rendered(tx, project_id, at)?;
            ctx.record_event("project", &project.name, EventType::ProjectRendered);
            Ok(project)
        })
    }

    // ======================
    // File Operations
    // ======================

    /// List all files, ordered by filename.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_files(&self) -> Result<Vec<SourceFile>> {
        query_records(&self.conn, "1 = 1", &[], "filename")
    }

    /// Get a file by its path relative to the source root.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_file(&self, filename: &str) -> Result<Option<SourceFile>> {
        merge::find_by_key(&self.conn, &[Value::Text(filename.to_string())])
    }

    /// Create a file outside the merge primitives.
    ///
    /// # Errors
    ///
    /// Returns `UniquenessViolation` if the filename is taken.
    pub fn create_file(
        &mut self,
        filename: &str,
        description: Option<&str>,
        actor: &str,
    ) -> Result<SourceFile> {
        self.mutate("create_file", actor, |tx, ctx| {
            let fields = Fields::new()
                .text("filename", filename)
                .opt_text("description", description);
            let file = merge::insert::<SourceFile>(tx, &fields)?;
            ctx.record_event("file", filename, EventType::FileCreated);
            Ok(file)
        })
    }

    /// Delete a file together with its functions and imports.
    ///
    /// Returns `false` if no such file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_file(&mut self, filename: &str, actor: &str) -> Result<bool> {
        self.mutate("delete_file", actor, |tx, ctx| {
            let deleted = tx.execute("DELETE FROM files WHERE filename = ?1", [filename])?;
            if deleted > 0 {
                ctx.record_event("file", filename, EventType::FileDeleted);
            }
            Ok(deleted > 0)
        })
    }

    // ======================
    // Function & Import Operations
    // ======================

    /// List a file's functions in declaration (insertion) order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_functions(&self, file_id: i64) -> Result<Vec<Function>> {
        query_records(&self.conn, "file_id = ?1", &[&file_id], "id")
    }

    /// List a file's imports in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_imports(&self, file_id: i64) -> Result<Vec<Import>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_id, imported, from_path, alias, created_at, updated_at
             FROM imports WHERE file_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([file_id], map_import_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Add an import to a file; an exact duplicate is absorbed.
    ///
    /// Returns `None` when the import already existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails for any reason other than a duplicate.
    pub fn add_import(&mut self, file_id: i64, spec: &ImportSpec, actor: &str) -> Result<Option<Import>> {
        self.mutate("add_import", actor, |tx, ctx| {
            let import = insert_import(tx, file_id, spec)?;
            if import.is_some() {
                ctx.record_event("import", &spec.statement(), EventType::ImportAdded);
            }
            Ok(import)
        })
    }

    // ======================
    // Type Definition & Constant Operations
    // ======================

    /// List type definitions by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_type_definitions(&self) -> Result<Vec<TypeDefinition>> {
        query_records(&self.conn, "1 = 1", &[], "id")
    }

    /// List constants by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_constants(&self) -> Result<Vec<Constant>> {
        query_records(&self.conn, "1 = 1", &[], "id")
    }

    /// Create a type definition outside the merge primitives.
    ///
    /// # Errors
    ///
    /// Returns `UniquenessViolation` if the name is taken.
    pub fn create_type_definition(
        &mut self,
        name: &str,
        description: Option<&str>,
        body: &str,
        actor: &str,
    ) -> Result<TypeDefinition> {
        self.mutate("create_type_definition", actor, |tx, ctx| {
            let fields = Fields::new()
                .text("name", name)
                .opt_text("description", description)
                .text("body", body);
            let typedef = merge::insert::<TypeDefinition>(tx, &fields)?;
            ctx.record_event("type_definition", name, EventType::TypeDefinitionCreated);
            Ok(typedef)
        })
    }

    /// Create a constant outside the merge primitives. The name is stored
    /// upper-cased.
    ///
    /// # Errors
    ///
    /// Returns `UniquenessViolation` if the name is taken.
    pub fn create_constant(
        &mut self,
        name: &str,
        description: Option<&str>,
        value: &str,
        actor: &str,
    ) -> Result<Constant> {
        let name = Constant::normalize_name(name);
        self.mutate("create_constant", actor, |tx, ctx| {
            let fields = Fields::new()
                .text("name", name.as_str())
                .opt_text("description", description)
                .text("value", value);
            let constant = merge::insert::<Constant>(tx, &fields)?;
            ctx.record_event("constant", &name, EventType::ConstantCreated);
            Ok(constant)
        })
    }

    // ======================
    // Summary Operations
    // ======================

    /// Count rows in every entity table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counts(&self) -> Result<ModelCounts> {
        let counts = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM files),
                (SELECT COUNT(*) FROM functions),
                (SELECT COUNT(*) FROM imports),
                (SELECT COUNT(*) FROM type_definitions),
                (SELECT COUNT(*) FROM constants)",
            [],
            |row| {
                let count = |idx: usize| -> rusqlite::Result<usize> {
                    let n: i64 = row.get(idx)?;
                    Ok(usize::try_from(n).unwrap_or(0))
                };
                Ok(ModelCounts {
                    files: count(0)?,
                    functions: count(1)?,
                    imports: count(2)?,
                    type_definitions: count(3)?,
                    constants: count(4)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// Most recent audit events, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_events(&self, limit: Option<u32>) -> Result<Vec<Event>> {
        Ok(recent_events(&self.conn, limit)?)
    }
}

// ======================
// Transaction-scoped helpers
// ======================

/// Insert an import unless the identical 4-tuple already exists.
///
/// # Errors
///
/// Returns an error if the insert fails for any reason other than a duplicate.
pub fn insert_import(conn: &Connection, file_id: i64, spec: &ImportSpec) -> Result<Option<Import>> {
    let now = chrono::Utc::now().timestamp_millis();
    let inserted = conn.execute(
        "INSERT INTO imports (file_id, imported, from_path, alias, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT DO NOTHING",
        rusqlite::params![file_id, spec.imported, spec.from_path, spec.alias, now],
    )?;
    if inserted == 0 {
        return Ok(None);
    }

    let import = conn.query_row(
        "SELECT id, file_id, imported, from_path, alias, created_at, updated_at
         FROM imports WHERE id = ?1",
        [conn.last_insert_rowid()],
        map_import_row,
    )?;
    Ok(Some(import))
}

/// Move `last_rendered_at` forward to `at`, never backwards.
///
/// # Errors
///
/// Returns `NotInitialized` if the project does not exist.
pub fn advance_last_rendered(conn: &Connection, project_id: i64, at: i64) -> Result<Project> {
    conn.execute(
        "UPDATE projects
         SET last_rendered_at = MAX(COALESCE(last_rendered_at, 0), ?1), updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![at, chrono::Utc::now().timestamp_millis(), project_id],
    )?;
    merge::find_by_id(conn, project_id)?.ok_or(Error::NotInitialized)
}

fn first_project(conn: &Connection) -> Result<Option<Project>> {
    let sql = format!(
        "SELECT {} FROM projects ORDER BY id LIMIT 1",
        Project::COLUMNS.join(", ")
    );
    Ok(conn.query_row(&sql, [], Project::from_row).optional()?)
}

fn query_records<R: Record>(
    conn: &Connection,
    filter: &str,
    params: &[&dyn ToSql],
    order_by: &str,
) -> Result<Vec<R>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {filter} ORDER BY {order_by}",
        R::COLUMNS.join(", "),
        R::TABLE
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params, R::from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn map_import_row(row: &Row<'_>) -> rusqlite::Result<Import> {
    Ok(Import {
        id: row.get(0)?,
        file_id: row.get(1)?,
        imported: row.get(2)?,
        from_path: row.get(3)?,
        alias: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

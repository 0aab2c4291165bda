//! The project aggregate: one store, one project, render and extract.
//!
//! A [`Workspace`] owns the [`SqliteStorage`] handle for the lifetime of a
//! command and drives every model-level operation through it:
//!
//! - [`Workspace::render`] writes the model out and then records the render
//! - [`Workspace::extract`] merges changed files back, lazily
//! - [`Workspace::upsert_function`] / [`Workspace::upsert_module`] are the
//!   write surface for code generators
//!
//! Render and extract of one root are serialized by the sync lock.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::lang::canonical_code;
use crate::model::{Function, ImportSpec, NewProject, Project, SourceFile};
use crate::storage::events::{Event, EventType};
use crate::storage::merge::{self, Fields};
use crate::storage::sqlite::insert_import;
use crate::storage::{ModelCounts, MutationContext, SqliteStorage};
use crate::sync::extract::pending_files;
use crate::sync::{Extraction, RenderStats, SyncLock, build_tree, normalize_model_path, render_tree};

/// Audit events included in a status snapshot.
const STATUS_EVENT_LIMIT: u32 = 10;

/// Snapshot of a project and its render state.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub project: Project,
    pub counts: ModelCounts,
    /// Source files modified after the last render, waiting for extraction
    pub pending: Vec<String>,
    /// Latest audit events, newest first
    pub recent_events: Vec<Event>,
}

/// An opened project and the store it lives in.
#[derive(Debug)]
pub struct Workspace {
    storage: SqliteStorage,
    project_id: i64,
    config: Config,
    actor: String,
}

impl Workspace {
    /// Create the store's project, or open it if it already exists.
    ///
    /// Returns the workspace and whether the project was created.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyInitialized` if the store holds a different project.
    pub fn initialize(
        mut storage: SqliteStorage,
        new: &NewProject,
        config: Config,
        actor: &str,
    ) -> Result<(Self, bool)> {
        let merged = storage.initialize_project(new, actor)?;
        if merged.created {
            info!(project = %merged.record.name, "Initialized project");
        }

        let workspace = Self {
            storage,
            project_id: merged.record.id,
            config,
            actor: actor.to_string(),
        };
        Ok((workspace, merged.created))
    }

    /// Open the store's project.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the store has no project.
    pub fn open(storage: SqliteStorage, config: Config, actor: &str) -> Result<Self> {
        let project = storage.get_project()?.ok_or(Error::NotInitialized)?;
        Ok(Self {
            storage,
            project_id: project.id,
            config,
            actor: actor.to_string(),
        })
    }

    /// Current project row.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the project was removed underneath us.
    pub fn project(&self) -> Result<Project> {
        self.storage
            .get_project_by_id(self.project_id)?
            .ok_or(Error::NotInitialized)
    }

    #[must_use]
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ======================
    // Render / Extract
    // ======================

    /// Write the whole model below `root`, then record the render.
    ///
    /// The last-rendered timestamp is taken after the final write, so a
    /// failed render leaves it untouched.
    ///
    /// # Errors
    ///
    /// Returns the first storage or I/O error.
    pub fn render(&mut self, root: &Path) -> Result<RenderStats> {
        let _lock = SyncLock::acquire(root)?;
        let project = self.project()?;

        let stats = render_tree(&self.storage, project.primary_language, root)?;
        let rendered_at = chrono::Utc::now().timestamp_millis();
        let project = self
            .storage
            .mark_rendered(self.project_id, rendered_at, &self.actor)?;
        debug!(last_rendered_at = ?project.last_rendered_at, "Recorded render");
        Ok(stats)
    }

    /// Start a lazy extraction of `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock, transaction, or parser cannot be set up.
    pub fn extract(&mut self, root: &Path) -> Result<Extraction<'_>> {
        Extraction::start(
            &mut self.storage,
            self.project_id,
            root,
            &self.config,
            &self.actor,
        )
    }

    /// Hierarchical view of files and their functions.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn tree(&self) -> Result<String> {
        let project = self.project()?;
        let files = self
            .storage
            .list_files()?
            .into_iter()
            .map(|file| {
                let functions = self.storage.list_functions(file.id)?;
                Ok((file, functions))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(build_tree(&project.name, &files))
    }

    /// Project, counts, recent events, and files awaiting extraction
    /// under `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query or the directory walk fails.
    pub fn status(&self, root: &Path) -> Result<ProjectStatus> {
        let project = self.project()?;
        let pending = pending_files(root, &project)?;
        Ok(ProjectStatus {
            counts: self.storage.counts()?,
            project,
            pending,
            recent_events: self.storage.list_events(Some(STATUS_EVENT_LIMIT))?,
        })
    }

    // ======================
    // Generator Surface
    // ======================

    /// Create or replace a function, creating its file if needed.
    ///
    /// `file_path` gets the language suffix if it lacks one. `imports` are
    /// whole import statements; duplicates of existing imports are ignored.
    /// A `None` description leaves an existing description alone.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a bad path or import statement, or
    /// `Identity` if `name` is blank.
    pub fn upsert_function(
        &mut self,
        file_path: &str,
        name: &str,
        imports: &[&str],
        description: Option<&str>,
        return_type: &str,
        body: &str,
    ) -> Result<Function> {
        let language = self.project()?.primary_language;
        let filename = normalize_model_path(file_path, language)?;
        let specs = parse_imports(imports)?;
        let body = canonical_code(language, body)?;

        self.storage.mutate("upsert_function", &self.actor, |tx, ctx| {
            let file = file_for_merge(tx, ctx, &filename, None)?;
            add_imports(tx, ctx, &file, &specs)?;

            let mut fields = Fields::new()
                .int("file_id", file.id)
                .text("name", name)
                .text("body", body.as_str())
                .text("return_type", return_type);
            if let Some(description) = description {
                fields = fields.text("description", description);
            }
            let merged = merge::upsert::<Function>(tx, &fields)?;
            ctx.record_merge(&format!("{filename}::{name}"), &merged);
            debug!(file = %filename, function = name, "Function {}", merged.verb());
            Ok(merged.record)
        })
    }

    /// Create or update a file's description and add imports to it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a bad path or import statement.
    pub fn upsert_module(
        &mut self,
        file_path: &str,
        imports: &[&str],
        description: Option<&str>,
    ) -> Result<SourceFile> {
        let filename = normalize_model_path(file_path, self.project()?.primary_language)?;
        let specs = parse_imports(imports)?;

        self.storage.mutate("upsert_module", &self.actor, |tx, ctx| {
            let file = file_for_merge(tx, ctx, &filename, description)?;
            add_imports(tx, ctx, &file, &specs)?;
            Ok(file)
        })
    }

    /// Delete a file with its functions and imports.
    ///
    /// # Errors
    ///
    /// Returns `FileNotFound` if the model has no such file.
    pub fn remove_file(&mut self, file_path: &str) -> Result<()> {
        let filename = normalize_model_path(file_path, self.project()?.primary_language)?;
        if self.storage.delete_file(&filename, &self.actor)? {
            Ok(())
        } else {
            Err(Error::FileNotFound { filename })
        }
    }
}

fn parse_imports(statements: &[&str]) -> Result<Vec<ImportSpec>> {
    let mut specs = Vec::new();
    for statement in statements {
        specs.extend(ImportSpec::parse_statement(statement)?);
    }
    Ok(specs)
}

/// Merge the file row; with a description this is an upsert, otherwise a
/// get-or-create that leaves the stored description alone.
fn file_for_merge(
    tx: &rusqlite::Transaction<'_>,
    ctx: &mut MutationContext,
    filename: &str,
    description: Option<&str>,
) -> Result<SourceFile> {
    let merged = match description {
        Some(description) => merge::upsert::<SourceFile>(
            tx,
            &Fields::new()
                .text("filename", filename)
                .text("description", description),
        )?,
        None => merge::get_or_create::<SourceFile>(tx, &Fields::new().text("filename", filename))?,
    };
    if merged.created || description.is_some() {
        ctx.record_merge(filename, &merged);
    }
    Ok(merged.record)
}

fn add_imports(
    tx: &rusqlite::Transaction<'_>,
    ctx: &mut MutationContext,
    file: &SourceFile,
    specs: &[ImportSpec],
) -> Result<()> {
    for spec in specs {
        if insert_import(tx, file.id, spec)?.is_some() {
            ctx.record_event(
                "import",
                &format!("{}::{}", file.filename, spec.statement()),
                EventType::ImportAdded,
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ParseErrorPolicy;
    use crate::model::Language;
    use crate::sync::ChangeKind;
    use filetime::FileTime;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn workspace() -> Workspace {
        workspace_with(Config::default())
    }

    fn workspace_with(config: Config) -> Workspace {
        let storage = SqliteStorage::open_memory().unwrap();
        let (workspace, created) = Workspace::initialize(
            storage,
            &NewProject::new("myproject", Language::Python),
            config,
            "tester",
        )
        .unwrap();
        assert!(created);
        workspace
    }

    fn write(root: &Path, relative: &str, content: &str) -> std::path::PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn set_mtime_millis(path: &Path, millis: i64) {
        let secs = millis.div_euclid(1000);
        let nanos = u32::try_from(millis.rem_euclid(1000) * 1_000_000).unwrap();
        filetime::set_file_mtime(path, FileTime::from_unix_time(secs, nanos)).unwrap();
    }

    fn changes(workspace: &mut Workspace, root: &Path) -> Vec<String> {
        workspace
            .extract(root)
            .unwrap()
            .map(|change| change.unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_initialize_is_get_or_create() {
        let storage = SqliteStorage::open_memory().unwrap();
        let new = NewProject::new("myproject", Language::Python);
        let (workspace, created) =
            Workspace::initialize(storage, &new, Config::default(), "tester").unwrap();
        assert!(created);

        let storage = workspace.storage;
        let (workspace, created) =
            Workspace::initialize(storage, &new, Config::default(), "tester").unwrap();
        assert!(!created);
        assert_eq!(workspace.project().unwrap().name, "myproject");
    }

    #[test]
    fn test_open_requires_project() {
        let storage = SqliteStorage::open_memory().unwrap();
        let err = Workspace::open(storage, Config::default(), "tester").unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[test]
    fn test_upsert_function_normalizes_path_and_dedups_imports() {
        let mut ws = workspace();
        let first = ws
            .upsert_function(
                "utils/helpers",
                "helper_one",
                &["import os", "from typing import Any"],
                Some("First helper"),
                "str",
                "def helper_one() -> str:\n    return os.sep  \n",
            )
            .unwrap();
        assert_eq!(first.body, "def helper_one() -> str:\n    return os.sep");

        let second = ws
            .upsert_function(
                "utils/helpers.py",
                "helper_one",
                &["import os"],
                None,
                "str",
                "def helper_one() -> str:\n    return '/'",
            )
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.body, "def helper_one() -> str:\n    return '/'");
        assert_eq!(second.description.as_deref(), Some("First helper"));

        let file = ws.storage().get_file("utils/helpers.py").unwrap().unwrap();
        let imports: Vec<String> = ws
            .storage()
            .list_imports(file.id)
            .unwrap()
            .iter()
            .map(crate::model::Import::statement)
            .collect();
        assert_eq!(imports, vec!["import os", "from typing import Any"]);
    }

    #[test]
    fn test_upsert_function_rejects_bad_input() {
        let mut ws = workspace();
        let err = ws
            .upsert_function("../outside", "f", &[], None, "None", "def f(): pass")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = ws
            .upsert_function("main", "f", &["include <stdio.h>"], None, "None", "def f(): pass")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = ws
            .upsert_function("main", " ", &[], None, "None", "def f(): pass")
            .unwrap_err();
        assert!(matches!(err, Error::Identity { .. }));
        assert!(ws.storage().get_file("main.py").unwrap().is_none());
    }

    #[test]
    fn test_upsert_module_sets_description() {
        let mut ws = workspace();
        let file = ws.upsert_module("main", &["import sys"], None).unwrap();
        assert_eq!(file.filename, "main.py");
        assert_eq!(file.description, None);

        let file = ws.upsert_module("main.py", &[], Some("Entry point")).unwrap();
        assert_eq!(file.description.as_deref(), Some("Entry point"));
        assert_eq!(ws.storage().list_imports(file.id).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_file_cascades() {
        let mut ws = workspace();
        ws.upsert_function("main", "main", &["import os"], None, "None", "def main(): pass")
            .unwrap();
        ws.remove_file("main").unwrap();
        assert_eq!(ws.storage().counts().unwrap(), ModelCounts::default());

        let err = ws.remove_file("main").unwrap_err();
        assert!(matches!(err, Error::FileNotFound { filename } if filename == "main.py"));
    }

    #[test]
    fn test_tree_matches_model() {
        let mut ws = workspace();
        ws.upsert_function("src/main", "main", &[], None, "None", "def main(): pass")
            .unwrap();
        ws.upsert_function("src/utils/helpers", "helper_one", &[], None, "None", "def helper_one(): pass")
            .unwrap();
        ws.upsert_function("src/utils/helpers", "helper_two", &[], None, "None", "def helper_two(): pass")
            .unwrap();
        ws.upsert_function("tests/test_main", "test_main_function", &[], None, "None", "def test_main_function(): pass")
            .unwrap();

        let expected = "\
myproject/
├── src/
│   ├── main.py
│   │   └── main()
│   └── utils/
│       └── helpers.py
│           ├── helper_one()
│           └── helper_two()
└── tests/
    └── test_main.py
        └── test_main_function()";
        assert_eq!(ws.tree().unwrap(), expected);
    }

    #[test]
    fn test_render_records_timestamp_monotonically() {
        let temp = TempDir::new().unwrap();
        let mut ws = workspace();
        assert_eq!(ws.project().unwrap().last_rendered_at, None);

        ws.render(temp.path()).unwrap();
        let first = ws.project().unwrap().last_rendered_at.unwrap();
        ws.render(temp.path()).unwrap();
        let second = ws.project().unwrap().last_rendered_at.unwrap();
        assert!(second >= first);
    }

    #[test]
    fn test_extract_reports_created_then_updated() {
        let temp = TempDir::new().unwrap();
        let source = "\
MAX_USERS = 100


class User(TypedDict):
    name: str


def helper_one() -> str:
    return 'one'
";
        let path = write(temp.path(), "src/utils/helpers.py", source);

        let mut ws = workspace();
        assert_eq!(
            changes(&mut ws, temp.path()),
            vec![
                "constant MAX_USERS was created",
                "typing User was created",
                "function helpers.helper_one was created",
            ]
        );

        let rendered_at = ws.project().unwrap().last_rendered_at.unwrap();
        set_mtime_millis(&path, rendered_at + 5_000);
        assert_eq!(
            changes(&mut ws, temp.path()),
            vec![
                "constant MAX_USERS was updated",
                "typing User was updated",
                "function helpers.helper_one was updated",
            ]
        );
    }

    #[test]
    fn test_extract_skips_files_not_modified_after_render() {
        let temp = TempDir::new().unwrap();
        let mut ws = workspace();
        ws.upsert_function("main", "main", &[], None, "None", "def main():\n    pass")
            .unwrap();
        ws.render(temp.path()).unwrap();
        let rendered_at = ws.project().unwrap().last_rendered_at.unwrap();

        let path = temp.path().join("src").join("main.py");
        std::fs::write(&path, "def main():\n    return 42\n").unwrap();
        set_mtime_millis(&path, rendered_at);

        let mut extraction = ws.extract(temp.path()).unwrap();
        assert!(extraction.next().is_none());
        assert_eq!(extraction.report().files_scanned, 1);
        assert_eq!(extraction.report().files_unchanged, 1);
        drop(extraction);

        let file = ws.storage().get_file("main.py").unwrap().unwrap();
        let functions = ws.storage().list_functions(file.id).unwrap();
        assert_eq!(functions[0].body, "def main():\n    pass");

        let extracted_at = ws.project().unwrap().last_rendered_at.unwrap();
        assert!(extracted_at >= rendered_at);
        set_mtime_millis(&path, extracted_at + 1);
        assert_eq!(changes(&mut ws, temp.path()), vec!["function main.main was updated"]);
        let functions = ws.storage().list_functions(file.id).unwrap();
        assert_eq!(functions[0].body, "def main():\n    return 42");
    }

    #[test]
    fn test_extract_keeps_descriptions() {
        let temp = TempDir::new().unwrap();
        let mut ws = workspace();
        ws.upsert_function("main", "main", &[], Some("Entry point"), "None", "def main() -> None:\n    pass")
            .unwrap();
        ws.render(temp.path()).unwrap();

        let path = temp.path().join("src").join("main.py");
        let rendered_at = ws.project().unwrap().last_rendered_at.unwrap();
        set_mtime_millis(&path, rendered_at + 1_000);
        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert_eq!(report.updated, 1);

        let file = ws.storage().get_file("main.py").unwrap().unwrap();
        let function = &ws.storage().list_functions(file.id).unwrap()[0];
        assert_eq!(function.description.as_deref(), Some("Entry point"));
        assert_eq!(function.return_type, "None");
    }

    #[test]
    fn test_extract_advances_timestamp_after_full_walk() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/main.py", "def main():\n    pass\n");

        let mut ws = workspace();
        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert_eq!(report.files_parsed, 1);
        assert_eq!(report.created, 1);
        assert!(ws.project().unwrap().last_rendered_at.is_some());

        assert!(changes(&mut ws, temp.path()).is_empty());
    }

    #[test]
    fn test_extract_without_source_dir_yields_nothing() {
        let temp = TempDir::new().unwrap();
        let mut ws = workspace();
        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert_eq!(report, crate::sync::ExtractReport::default());
        assert_eq!(ws.project().unwrap().last_rendered_at, None);
    }

    #[test]
    fn test_extract_skips_unparseable_file_by_default() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/a_broken.py", "def broken(:\n    pass\n");
        write(temp.path(), "src/b_fine.py", "def fine():\n    pass\n");

        let mut ws = workspace();
        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert_eq!(report.files_parsed, 1);
        assert_eq!(report.unparseable, vec![temp.path().join("src").join("a_broken.py")]);
        assert!(ws.storage().get_file("b_fine.py").unwrap().is_some());
        assert!(ws.storage().get_file("a_broken.py").unwrap().is_none());
    }

    #[test]
    fn test_extract_abort_policy_keeps_earlier_merges() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/a_fine.py", "def fine():\n    pass\n");
        write(temp.path(), "src/b_broken.py", "def broken(:\n    pass\n");

        let mut ws = workspace_with(Config {
            on_parse_error: ParseErrorPolicy::Abort,
            ..Config::default()
        });
        let results: Vec<Result<crate::sync::Change>> = ws.extract(temp.path()).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().kind, ChangeKind::Function);
        assert!(matches!(results[1], Err(Error::Parse { .. })));

        assert!(ws.storage().get_file("a_fine.py").unwrap().is_some());
        assert_eq!(ws.project().unwrap().last_rendered_at, None);
    }

    #[test]
    fn test_dropped_extraction_commits_consumed_changes() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/main.py", "def one():\n    pass\n\n\ndef two():\n    pass\n");

        let mut ws = workspace();
        {
            let mut extraction = ws.extract(temp.path()).unwrap();
            let first = extraction.next().unwrap().unwrap();
            assert_eq!(first.to_string(), "function main.one was created");
        }

        let file = ws.storage().get_file("main.py").unwrap().unwrap();
        assert_eq!(ws.storage().list_functions(file.id).unwrap().len(), 2);
        assert_eq!(ws.project().unwrap().last_rendered_at, None);
    }

    #[test]
    fn test_render_extract_render_is_stable() {
        let temp = TempDir::new().unwrap();
        let mut ws = workspace();
        ws.upsert_module("utils/helpers", &["import os"], Some("Helper functions"))
            .unwrap();
        ws.upsert_function(
            "utils/helpers",
            "helper_one",
            &["from typing import Any"],
            Some("First helper"),
            "str",
            "def helper_one(x: int) -> str:\n    return str(x)",
        )
        .unwrap();
        ws.upsert_function(
            "main",
            "main",
            &["from utils.helpers import helper_one"],
            None,
            "Any",
            "@staticmethod\ndef main():\n    print(helper_one(1))",
        )
        .unwrap();
        ws.render(temp.path()).unwrap();

        let helpers = temp.path().join("src/utils/helpers.py");
        let main = temp.path().join("src/main.py");
        let before_helpers = std::fs::read_to_string(&helpers).unwrap();
        let before_main = std::fs::read_to_string(&main).unwrap();
        let counts = ws.storage().counts().unwrap();

        let rendered_at = ws.project().unwrap().last_rendered_at.unwrap();
        set_mtime_millis(&helpers, rendered_at + 1_000);
        set_mtime_millis(&main, rendered_at + 1_000);
        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert_eq!((report.created, report.updated), (0, 2));
        assert_eq!(ws.storage().counts().unwrap(), counts);

        ws.render(temp.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&helpers).unwrap(), before_helpers);
        assert_eq!(std::fs::read_to_string(&main).unwrap(), before_main);
    }

    #[test]
    fn test_quoted_module_description_survives_extract() {
        let temp = TempDir::new().unwrap();
        let mut ws = workspace();
        ws.upsert_module("main", &[], Some("Says \"hi\"")).unwrap();
        ws.upsert_function("main", "main", &[], None, "None", "def main():\n    pass")
            .unwrap();
        ws.render(temp.path()).unwrap();

        let path = temp.path().join("src/main.py");
        let rendered_at = ws.project().unwrap().last_rendered_at.unwrap();
        set_mtime_millis(&path, rendered_at + 1_000);
        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert!(report.unparseable.is_empty());
        assert_eq!(report.files_parsed, 1);
    }

    #[test]
    fn test_hand_written_import_survives_render() {
        let temp = TempDir::new().unwrap();
        let mut ws = workspace();
        ws.upsert_function("main", "main", &[], None, "None", "def main():\n    pass")
            .unwrap();
        ws.render(temp.path()).unwrap();

        let path = temp.path().join("src/main.py");
        std::fs::write(&path, "import json\n\ndef main():\n    return json.dumps(1)\n").unwrap();
        let rendered_at = ws.project().unwrap().last_rendered_at.unwrap();
        set_mtime_millis(&path, rendered_at + 1_000);

        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert_eq!(report.imports_added, 1);
        assert_eq!(report.updated, 1);

        ws.render(temp.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "import json\n\ndef main():\n    return json.dumps(1)\n"
        );

        let rendered_at = ws.project().unwrap().last_rendered_at.unwrap();
        set_mtime_millis(&path, rendered_at + 1_000);
        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert_eq!(report.imports_added, 0);
        assert_eq!(ws.storage().counts().unwrap().imports, 1);
    }

    #[test]
    fn test_extract_skips_non_utf8_file() {
        let temp = TempDir::new().unwrap();
        let latin = temp.path().join("src").join("a_latin.py");
        std::fs::create_dir_all(latin.parent().unwrap()).unwrap();
        std::fs::write(&latin, b"X = '\xe9'\n").unwrap();
        write(temp.path(), "src/b_ok.py", "def ok():\n    pass\n");

        let mut ws = workspace();
        let report = ws.extract(temp.path()).unwrap().finish().unwrap();
        assert_eq!(report.unparseable, vec![latin.clone()]);
        assert_eq!(report.files_parsed, 1);
        assert!(ws.storage().get_file("b_ok.py").unwrap().is_some());

        let mut ws = workspace_with(Config {
            on_parse_error: ParseErrorPolicy::Abort,
            ..Config::default()
        });
        let err = ws.extract(temp.path()).unwrap().finish().unwrap_err();
        assert!(matches!(err, Error::Parse { path, line: 1 } if path == latin));
    }

    #[test]
    fn test_string_literal_whitespace_survives_extract() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/main.py", "def f():\n    return \"\"\"a   \nb\"\"\"\n");

        let mut ws = workspace();
        ws.extract(temp.path()).unwrap().finish().unwrap();
        let file = ws.storage().get_file("main.py").unwrap().unwrap();
        let function = &ws.storage().list_functions(file.id).unwrap()[0];
        assert_eq!(function.body, "def f():\n    return \"\"\"a   \nb\"\"\"");

        let body = "def g():  \n    return '''x  \ny'''\n";
        let function = ws.upsert_function("main", "g", &[], None, "Any", body).unwrap();
        assert_eq!(function.body, "def g():\n    return '''x  \ny'''");
    }

    #[test]
    fn test_status_lists_pending_files() {
        let temp = TempDir::new().unwrap();
        let mut ws = workspace();
        ws.upsert_function("main", "main", &[], None, "None", "def main(): pass")
            .unwrap();
        ws.render(temp.path()).unwrap();

        let status = ws.status(temp.path()).unwrap();
        assert!(status.pending.is_empty());
        assert_eq!(status.counts.functions, 1);
        assert_eq!(status.recent_events[0].event_type, EventType::ProjectRendered);

        let rendered_at = status.project.last_rendered_at.unwrap();
        let path = write(temp.path(), "src/extra.py", "X = 1\n");
        set_mtime_millis(&path, rendered_at + 1_000);
        assert_eq!(ws.status(temp.path()).unwrap().pending, vec!["extra.py"]);
    }
}

//! Source tree to model.
//!
//! [`Extraction`] walks `<root>/src` lazily. Every source file modified
//! strictly after the project's last-rendered timestamp is parsed, and each
//! recognized top-level declaration is merged into the model and yielded as
//! a [`Change`] before the next file is read.
//!
//! All merges share one IMMEDIATE transaction. It is committed by
//! [`Extraction::finish`], or by drop if the caller stops early or the walk
//! fails, so merges completed before a failure are kept.

use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

use rusqlite::Transaction;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, FilterEntry, WalkDir};

use crate::config::{Config, ParseErrorPolicy};
use crate::error::{Error, Result};
use crate::lang::{Declaration, PythonParser};
use crate::model::{Constant, Function, Project, SourceFile, TypeDefinition};
use crate::storage::events::EventType;
use crate::storage::merge::{self, Fields};
use crate::storage::sqlite::{advance_last_rendered, insert_import};
use crate::storage::{MutationContext, SqliteStorage};
use crate::sync::file::{model_path, modified_millis};
use crate::sync::lock::SyncLock;
use crate::sync::render::SOURCE_DIR;

/// Kind of declaration a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Function,
    Constant,
    Typing,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Function => "function",
            Self::Constant => "constant",
            Self::Typing => "typing",
        })
    }
}

/// One merged declaration.
///
/// Displays as `function helpers.helper_one was created`,
/// `constant MAX_USERS was updated` or `typing User was created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub kind: ChangeKind,
    /// `{file stem}.{name}` for functions, the bare name otherwise
    pub name: String,
    pub created: bool,
    /// Model path of the file the declaration came from
    pub file: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.created { "created" } else { "updated" };
        write!(f, "{} {} was {verb}", self.kind, self.name)
    }
}

/// Summary of an extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    /// Source files found under `src`
    pub files_scanned: usize,
    /// Files modified since the last render and parsed cleanly
    pub files_parsed: usize,
    /// Files skipped because they were not modified since the last render
    pub files_unchanged: usize,
    /// Files skipped because they failed to parse or were not UTF-8
    pub unparseable: Vec<PathBuf>,
    pub created: usize,
    pub updated: usize,
    /// Import statements found in source but not yet in the model
    pub imports_added: usize,
}

type SourceWalk = FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>;

/// A lazy, transactional walk over changed source files.
pub struct Extraction<'w> {
    tx: Option<Transaction<'w>>,
    _lock: SyncLock,
    project: Project,
    src: PathBuf,
    walk: Option<SourceWalk>,
    parser: PythonParser,
    policy: ParseErrorPolicy,
    pending: VecDeque<Change>,
    ctx: MutationContext,
    report: ExtractReport,
    started_at: i64,
    done: bool,
    error: Option<Error>,
}

impl fmt::Debug for Extraction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extraction")
            .field("project", &self.project.name)
            .field("src", &self.src)
            .field("pending", &self.pending.len())
            .field("report", &self.report)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<'w> Extraction<'w> {
    /// Start extracting `root` into the project with id `project_id`.
    ///
    /// Takes the sync lock for `root` first, then the write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock, the transaction, or the parser cannot
    /// be set up, or `NotInitialized` if the project does not exist.
    pub fn start(
        storage: &'w mut SqliteStorage,
        project_id: i64,
        root: &Path,
        config: &Config,
        actor: &str,
    ) -> Result<Self> {
        let lock = SyncLock::acquire(root)?;
        let started_at = chrono::Utc::now().timestamp_millis();
        let project = storage
            .get_project_by_id(project_id)?
            .ok_or(Error::NotInitialized)?;
        let parser = PythonParser::new(&config.typing_markers)?;

        let src = root.join(SOURCE_DIR);
        let walk = if src.is_dir() {
            Some(source_walk(&src))
        } else {
            warn!(src = %src.display(), "No source directory, nothing to extract");
            None
        };

        let tx = storage.begin()?;
        debug!(
            src = %src.display(),
            last_rendered_at = ?project.last_rendered_at,
            "Started extraction"
        );

        Ok(Self {
            tx: Some(tx),
            _lock: lock,
            project,
            src,
            done: walk.is_none(),
            walk,
            parser,
            policy: config.on_parse_error,
            pending: VecDeque::new(),
            ctx: MutationContext::new("extract", actor),
            report: ExtractReport::default(),
            started_at,
            error: None,
        })
    }

    /// The summary so far.
    #[must_use]
    pub fn report(&self) -> &ExtractReport {
        &self.report
    }

    /// Drain the remaining changes, commit, and return the summary.
    ///
    /// # Errors
    ///
    /// Returns the first error of the walk (merges before it are still
    /// committed) or a commit failure.
    pub fn finish(mut self) -> Result<ExtractReport> {
        for change in self.by_ref() {
            change?;
        }
        self.commit()?;
        Ok(std::mem::take(&mut self.report))
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            self.ctx.flush(&tx)?;
            tx.commit()?;
            info!(
                parsed = self.report.files_parsed,
                created = self.report.created,
                updated = self.report.updated,
                unparseable = self.report.unparseable.len(),
                "Committed extraction"
            );
        }
        Ok(())
    }

    /// Next source file modified since the last render.
    fn next_changed_file(&mut self) -> Option<Result<PathBuf>> {
        let walk = self.walk.as_mut()?;
        let suffix = self.project.primary_language.suffix();

        for entry in walk.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err.into())),
            };
            let is_source = entry.file_type().is_file()
                && entry.file_name().to_str().is_some_and(|n| n.ends_with(suffix));
            if !is_source {
                continue;
            }

            self.report.files_scanned += 1;
            let mtime = match modified_millis(entry.path()) {
                Ok(mtime) => mtime,
                Err(err) => return Some(Err(err)),
            };
            if self.project.is_modified_since_render(mtime) {
                return Some(Ok(entry.into_path()));
            }

            debug!(path = %entry.path().display(), "Unchanged since last render");
            self.report.files_unchanged += 1;
        }
        None
    }

    /// Parse one file and queue a change per recognized declaration.
    fn process(&mut self, path: &Path) -> Result<()> {
        let Some(filename) = model_path(&self.src, path) else {
            warn!(path = %path.display(), "Skipping file with a non UTF-8 path");
            return Ok(());
        };

        let source = match String::from_utf8(std::fs::read(path)?) {
            Ok(source) => source,
            Err(err) => {
                let valid = &err.as_bytes()[..err.utf8_error().valid_up_to()];
                let line = valid.iter().filter(|&&b| b == b'\n').count() + 1;
                return self.reject(Error::Parse {
                    path: path.to_path_buf(),
                    line,
                });
            }
        };
        let declarations = match self.parser.declarations(path, &source) {
            Ok(declarations) => declarations,
            Err(err) => return self.reject(err),
        };
        debug!(file = %filename, declarations = declarations.len(), "Parsed file");
        self.report.files_parsed += 1;

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Other("extraction already committed".to_string()))?;

        let file = merge::get_or_create::<SourceFile>(tx, &Fields::new().text("filename", filename.as_str()))?;
        if file.created {
            self.ctx.record_event("file", &filename, EventType::FileCreated);
        }
        let file = file.record;

        for declaration in declarations {
            let change = match declaration {
                Declaration::Function {
                    name,
                    body,
                    return_type,
                } => {
                    let fields = Fields::new()
                        .int("file_id", file.id)
                        .text("name", name.as_str())
                        .text("body", body)
                        .text("return_type", return_type);
                    let merged = merge::upsert::<Function>(tx, &fields)?;
                    self.ctx.record_merge(&format!("{filename}::{name}"), &merged);
                    Change {
                        kind: ChangeKind::Function,
                        name: format!("{}.{name}", file.stem()),
                        created: merged.created,
                        file: filename.clone(),
                    }
                }
                Declaration::Assignment { name, value } => {
                    let name = Constant::normalize_name(&name);
                    let fields = Fields::new().text("name", name.as_str()).text("value", value);
                    let merged = merge::upsert::<Constant>(tx, &fields)?;
                    self.ctx.record_merge(&name, &merged);
                    Change {
                        kind: ChangeKind::Constant,
                        name,
                        created: merged.created,
                        file: filename.clone(),
                    }
                }
                Declaration::TypeDeclaration { name, body } => {
                    let fields = Fields::new().text("name", name.as_str()).text("body", body);
                    let merged = merge::upsert::<TypeDefinition>(tx, &fields)?;
                    self.ctx.record_merge(&name, &merged);
                    Change {
                        kind: ChangeKind::Typing,
                        name,
                        created: merged.created,
                        file: filename.clone(),
                    }
                }
                Declaration::Import(specs) => {
                    for spec in specs {
                        if insert_import(tx, file.id, &spec)?.is_some() {
                            let statement = spec.statement();
                            debug!(file = %filename, import = %statement, "Import added");
                            self.ctx.record_event(
                                "import",
                                &format!("{filename}::{statement}"),
                                EventType::ImportAdded,
                            );
                            self.report.imports_added += 1;
                        }
                    }
                    continue;
                }
                Declaration::Other => continue,
            };

            if change.created {
                self.report.created += 1;
            } else {
                self.report.updated += 1;
            }
            self.pending.push_back(change);
        }
        Ok(())
    }

    /// Apply the parse-error policy to a file that could not be read as
    /// source: skipped files are reported, anything else stops the walk.
    fn reject(&mut self, err: Error) -> Result<()> {
        match err {
            Error::Parse { path, line } if self.policy == ParseErrorPolicy::Skip => {
                warn!(path = %path.display(), line, "Skipping unparseable file");
                self.report.unparseable.push(path);
                Ok(())
            }
            err => Err(err),
        }
    }

    /// Advance the project's timestamp to the scan start.
    fn complete_walk(&mut self) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Ok(());
        };
        let project = advance_last_rendered(tx, self.project.id, self.started_at)?;
        self.ctx
            .record_event("project", &project.name, EventType::ProjectExtracted);
        debug!(last_rendered_at = ?project.last_rendered_at, "Extraction walk complete");
        self.project = project;
        Ok(())
    }

    /// Stop the walk; queued changes are still yielded before `err`.
    fn fail(&mut self, err: Error) {
        self.done = true;
        self.error = Some(err);
    }
}

impl Iterator for Extraction<'_> {
    type Item = Result<Change>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(change) = self.pending.pop_front() {
                return Some(Ok(change));
            }
            if let Some(err) = self.error.take() {
                return Some(Err(err));
            }
            if self.done {
                return None;
            }

            match self.next_changed_file() {
                Some(Ok(path)) => {
                    if let Err(err) = self.process(&path) {
                        self.fail(err);
                    }
                }
                Some(Err(err)) => self.fail(err),
                None => {
                    self.done = true;
                    if let Err(err) = self.complete_walk() {
                        self.fail(err);
                    }
                }
            }
        }
    }
}

impl Drop for Extraction<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.commit() {
            warn!(error = %err, "Failed to commit extraction");
        }
    }
}

/// Model paths of the source files below `<root>/src` modified after the
/// project's last render, in walk order.
///
/// # Errors
///
/// Returns an error if the directory walk or a metadata read fails.
pub fn pending_files(root: &Path, project: &Project) -> Result<Vec<String>> {
    let src = root.join(SOURCE_DIR);
    if !src.is_dir() {
        return Ok(Vec::new());
    }

    let suffix = project.primary_language.suffix();
    let mut pending = Vec::new();
    for entry in source_walk(&src) {
        let entry = entry?;
        if !entry.file_type().is_file() || !entry.file_name().to_str().is_some_and(|n| n.ends_with(suffix)) {
            continue;
        }
        if project.is_modified_since_render(modified_millis(entry.path())?) {
            if let Some(path) = model_path(&src, entry.path()) {
                pending.push(path);
            }
        }
    }
    Ok(pending)
}

fn source_walk(src: &Path) -> SourceWalk {
    let filter: fn(&DirEntry) -> bool = is_visible;
    WalkDir::new(src)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(filter)
}

/// Skip hidden directories and bytecode caches below the walk root.
fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || entry
            .file_name()
            .to_str()
            .is_some_and(|name| !name.starts_with('.') && name != "__pycache__")
}

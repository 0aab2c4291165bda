//! Model to source tree.
//!
//! Rendering is a clean rewrite: every output file is replaced in full from
//! the stored model. Layout under the render root:
//!
//! - `constants.py`: one `NAME = value` line per constant (only if any exist)
//! - `typings.py`: every type definition, description as comment lines
//! - `src/<filename>`: imports, module docstring, then functions
//!
//! The last-rendered timestamp is not touched here; the caller records it
//! once every write has succeeded.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{Constant, Function, Import, Language, SourceFile, TypeDefinition};
use crate::storage::SqliteStorage;
use crate::sync::file::{atomic_write, disk_path};

/// Directory under the render root holding the file tree.
pub const SOURCE_DIR: &str = "src";

/// Counts of what a render wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub files: usize,
    pub constants: usize,
    pub type_definitions: usize,
}

/// Write the whole model below `root`.
///
/// # Errors
///
/// Returns the first storage or I/O error; files written before it stay.
pub fn render_tree(storage: &SqliteStorage, language: Language, root: &Path) -> Result<RenderStats> {
    std::fs::create_dir_all(root)?;
    let mut stats = RenderStats::default();

    let constants = storage.list_constants()?;
    if !constants.is_empty() {
        let path = root.join(language.with_suffix("constants"));
        atomic_write(&path, &render_constants(&constants))?;
        debug!(path = %path.display(), count = constants.len(), "Wrote constants");
        stats.constants = constants.len();
    }

    let typedefs = storage.list_type_definitions()?;
    if !typedefs.is_empty() {
        let path = root.join(language.with_suffix("typings"));
        atomic_write(&path, &render_typings(&typedefs, language))?;
        debug!(path = %path.display(), count = typedefs.len(), "Wrote type definitions");
        stats.type_definitions = typedefs.len();
    }

    let src = root.join(SOURCE_DIR);
    for file in storage.list_files()? {
        let imports = storage.list_imports(file.id)?;
        let functions = storage.list_functions(file.id)?;
        let path = disk_path(&src, &file.filename);
        atomic_write(&path, &render_module(&file, &imports, &functions, language))?;
        debug!(path = %path.display(), functions = functions.len(), "Wrote file");
        stats.files += 1;
    }

    info!(
        root = %root.display(),
        files = stats.files,
        constants = stats.constants,
        type_definitions = stats.type_definitions,
        "Rendered model"
    );
    Ok(stats)
}

/// `NAME = value` lines in the given order.
#[must_use]
pub fn render_constants(constants: &[Constant]) -> String {
    let mut out = String::new();
    for constant in constants {
        out.push_str(&constant.assignment());
        out.push('\n');
    }
    out
}

/// Type definitions, each preceded by its description, blank-line separated.
#[must_use]
pub fn render_typings(typedefs: &[TypeDefinition], language: Language) -> String {
    let blocks: Vec<String> = typedefs
        .iter()
        .map(|typedef| with_comment(typedef.description.as_deref(), &typedef.body, language))
        .collect();
    finish(&blocks)
}

/// Source for one file: imports, module docstring, functions.
#[must_use]
pub fn render_module(
    file: &SourceFile,
    imports: &[Import],
    functions: &[Function],
    language: Language,
) -> String {
    let mut parts = Vec::new();

    if !imports.is_empty() {
        let lines: Vec<String> = imports.iter().map(Import::statement).collect();
        parts.push(lines.join("\n"));
    }

    if let Some(description) = file.description.as_deref().filter(|d| !d.trim().is_empty()) {
        parts.push(docstring(description));
    }

    for function in functions {
        parts.push(with_comment(function.description.as_deref(), &function.body, language));
    }

    finish(&parts)
}

/// Join blocks with a blank line and end with a single newline.
fn finish(parts: &[String]) -> String {
    if parts.is_empty() {
        String::new()
    } else {
        format!("{}\n", parts.join("\n\n"))
    }
}

fn with_comment(description: Option<&str>, body: &str, language: Language) -> String {
    match description.filter(|d| !d.trim().is_empty()) {
        Some(description) => format!("{}\n{body}", comment_lines(description, language)),
        None => body.to_string(),
    }
}

fn comment_lines(text: &str, language: Language) -> String {
    let prefix = language.comment_prefix();
    text.trim_end()
        .lines()
        .map(|line| {
            let line = line.trim_end();
            if line.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix} {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Triple-quoted module docstring. Backslashes and quotes are escaped so
/// the literal always closes where it should.
fn docstring(text: &str) -> String {
    let escaped = text.trim().replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"\"\"{escaped}\"\"\"")
}

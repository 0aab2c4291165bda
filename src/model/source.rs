//! Source file models: files, their functions, and their imports.
//!
//! Functions and imports carry their owning file's id; navigation from a
//! child to its file is a lookup by that id, never a stored back-reference.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A file in the project's codebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: i64,

    /// Path relative to the source root, `/`-separated
    pub filename: String,

    /// Purpose and contents of the file
    pub description: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl SourceFile {
    /// Final path segment without its suffix (`utils/helpers.py` -> `helpers`).
    #[must_use]
    pub fn stem(&self) -> &str {
        let name = self.filename.rsplit('/').next().unwrap_or(&self.filename);
        name.rsplit_once('.').map_or(name, |(stem, _)| stem)
    }
}

/// A top-level function declared in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub description: Option<String>,

    /// Canonical source of the whole declaration
    pub body: String,

    /// Declared return annotation
    pub return_type: String,

    pub created_at: i64,
    pub updated_at: i64,
}

/// An import statement belonging to a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub id: i64,
    pub file_id: i64,

    /// Imported symbol or module name
    pub imported: String,

    /// Module the symbol is imported from
    pub from_path: Option<String>,

    /// Local alias
    pub alias: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Import {
    /// The identity-bearing part of this import.
    #[must_use]
    pub fn spec(&self) -> ImportSpec {
        ImportSpec {
            imported: self.imported.clone(),
            from_path: self.from_path.clone(),
            alias: self.alias.clone(),
        }
    }

    /// Re-serialize as a single import statement.
    #[must_use]
    pub fn statement(&self) -> String {
        self.spec().statement()
    }
}

/// An import without storage identity: what to import, from where, as what.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportSpec {
    pub imported: String,
    pub from_path: Option<String>,
    pub alias: Option<String>,
}

impl ImportSpec {
    #[must_use]
    pub fn new(imported: impl Into<String>) -> Self {
        Self {
            imported: imported.into(),
            from_path: None,
            alias: None,
        }
    }

    #[must_use]
    pub fn from_module(mut self, from_path: impl Into<String>) -> Self {
        self.from_path = Some(from_path.into());
        self
    }

    #[must_use]
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Re-serialize as a single import statement.
    #[must_use]
    pub fn statement(&self) -> String {
        match (&self.from_path, &self.alias) {
            (Some(from), Some(alias)) => format!("from {from} import {} as {alias}", self.imported),
            (Some(from), None) => format!("from {from} import {}", self.imported),
            (None, Some(alias)) => format!("import {} as {alias}", self.imported),
            (None, None) => format!("import {}", self.imported),
        }
    }

    /// Parse one import statement into one spec per imported name.
    ///
    /// Accepts `import a, b as c` and `from m import x as y, z`, including
    /// parenthesized name lists and trailing commas.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the text is not an import statement.
    pub fn parse_statement(text: &str) -> Result<Vec<Self>> {
        let statement = text.trim().trim_end_matches(';').trim();
        let invalid = || Error::InvalidArgument(format!("not an import statement: {text}"));

        if let Some(rest) = statement.strip_prefix("from ") {
            let (module, names) = rest.split_once(" import ").ok_or_else(invalid)?;
            let module = module.trim();
            if module.is_empty() || module.contains(char::is_whitespace) {
                return Err(invalid());
            }
            let names = names.trim();
            let names = names
                .strip_prefix('(')
                .and_then(|n| n.strip_suffix(')'))
                .unwrap_or(names);

            parse_names(names)
                .ok_or_else(invalid)?
                .into_iter()
                .map(|spec| Ok(spec.from_module(module)))
                .collect()
        } else if let Some(names) = statement.strip_prefix("import ") {
            let specs = parse_names(names).ok_or_else(invalid)?;
            if specs.iter().any(|s| s.imported == "*") {
                return Err(invalid());
            }
            Ok(specs)
        } else {
            Err(invalid())
        }
    }
}

/// Parse `a as b, c` into specs; `None` on any malformed entry.
fn parse_names(names: &str) -> Option<Vec<ImportSpec>> {
    let mut specs = Vec::new();
    for entry in names.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split_whitespace().collect();
        let spec = match parts.as_slice() {
            [name] => ImportSpec::new(*name),
            [name, "as", alias] => ImportSpec::new(*name).aliased(*alias),
            _ => return None,
        };
        specs.push(spec);
    }
    if specs.is_empty() { None } else { Some(specs) }
}

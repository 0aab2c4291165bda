//! Source-language front ends.
//!
//! Each supported [`Language`] has a tree-sitter grammar and a parser that
//! reduces a file to its top-level [`Declaration`]s. Extraction only ever
//! sees declarations, never syntax nodes.

pub mod python;

use std::ops::Range;

use crate::error::Result;
use crate::model::{ImportSpec, Language};

pub use python::PythonParser;

/// A top-level construct recognized by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// `def name(...) -> return_type: ...`, including any decorators.
    Function {
        name: String,
        body: String,
        return_type: String,
    },
    /// A single-target module-level assignment.
    Assignment { name: String, value: String },
    /// A class deriving from one of the configured typing markers.
    TypeDeclaration { name: String, body: String },
    /// An import statement, one spec per imported name.
    Import(Vec<ImportSpec>),
    /// Anything else (plain classes, expressions, ...).
    Other,
}

/// Tree-sitter grammar for a language.
#[must_use]
pub fn grammar(language: Language) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
    }
}

/// Canonical form of a declaration's source text.
///
/// `\r\n` becomes `\n`, trailing whitespace is stripped from every
/// line and trailing blank lines are dropped. Applying it twice changes
/// nothing.
#[must_use]
pub fn canonical_source(text: &str) -> String {
    canonical_with_literals(text, &[])
}

/// [`canonical_source`], except that a line whose end falls inside one of
/// the `literals` byte ranges keeps its trailing whitespace.
#[must_use]
pub fn canonical_with_literals(text: &str, literals: &[Range<usize>]) -> String {
    let mut lines = Vec::new();
    let mut start = 0;
    for segment in text.split('\n') {
        let end = start + segment.len();
        let line = segment.strip_suffix('\r').unwrap_or(segment);
        if literals.iter().any(|range| range.start < end && end < range.end) {
            lines.push(line);
        } else {
            lines.push(line.trim_end());
        }
        start = end + 1;
    }

    let end = lines.iter().rposition(|line| !line.is_empty()).map_or(0, |i| i + 1);
    lines[..end].join("\n")
}

/// Canonical form of a standalone code fragment in `language`.
///
/// # Errors
///
/// Returns an error if the grammar cannot be loaded.
pub fn canonical_code(language: Language, text: &str) -> Result<String> {
    match language {
        Language::Python => python::canonical_fragment(text),
    }
}

//! Python declaration parser.

use crate::error::{Error, Result};
use crate::lang::{canonical_source, canonical_with_literals, grammar, Declaration};
use crate::model::{ImportSpec, Language};
use std::ops::Range;
use std::path::Path;
use tree_sitter::{Node, Parser};

/// Return type recorded for functions without a `->` annotation.
pub const DEFAULT_RETURN_TYPE: &str = "Any";

/// Reduces Python modules to their top-level declarations.
pub struct PythonParser {
    parser: Parser,
    typing_markers: Vec<String>,
}

impl std::fmt::Debug for PythonParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PythonParser")
            .field("typing_markers", &self.typing_markers)
            .finish_non_exhaustive()
    }
}

impl PythonParser {
    /// Create a parser; classes deriving from any of `typing_markers`
    /// become type declarations.
    ///
    /// # Errors
    ///
    /// Returns an error if the grammar cannot be loaded.
    pub fn new(typing_markers: &[String]) -> Result<Self> {
        Ok(Self {
            parser: python_parser()?,
            typing_markers: typing_markers.to_vec(),
        })
    }

    /// Parse `source` and classify its top-level statements in source order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Parse` carrying `path` and the line of the first
    /// syntax error if the module does not parse cleanly.
    pub fn declarations(&mut self, path: &Path, source: &str) -> Result<Vec<Declaration>> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| Error::Other(format!("Parser produced no tree for {}", path.display())))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(Error::Parse {
                path: path.to_path_buf(),
                line: first_error_line(root),
            });
        }

        let mut cursor = root.walk();
        let declarations = root
            .named_children(&mut cursor)
            .map(|node| self.classify(node, source))
            .collect();
        Ok(declarations)
    }

    fn classify(&self, node: Node<'_>, source: &str) -> Declaration {
        match node.kind() {
            "function_definition" => function(node, node, source),
            "class_definition" => self.type_declaration(node, node, source),
            "decorated_definition" => match node.child_by_field_name("definition") {
                Some(inner) if inner.kind() == "function_definition" => function(node, inner, source),
                Some(inner) if inner.kind() == "class_definition" => {
                    self.type_declaration(node, inner, source)
                }
                _ => Declaration::Other,
            },
            "expression_statement" => assignment(node, source),
            "import_statement" | "import_from_statement" | "future_import_statement" => {
                import(node, source)
            }
            _ => Declaration::Other,
        }
    }

    /// `outer` spans decorators, `class` is the bare definition.
    fn type_declaration(&self, outer: Node<'_>, class: Node<'_>, source: &str) -> Declaration {
        let Some(bases) = class.child_by_field_name("superclasses") else {
            return Declaration::Other;
        };

        let mut cursor = bases.walk();
        let marked = bases.named_children(&mut cursor).any(|base| {
            matches!(base.kind(), "identifier" | "attribute")
                && text(base, source)
                    .rsplit('.')
                    .next()
                    .is_some_and(|last| self.typing_markers.iter().any(|m| m == last.trim()))
        });
        if !marked {
            return Declaration::Other;
        }

        match class.child_by_field_name("name") {
            Some(name) => Declaration::TypeDeclaration {
                name: text(name, source).to_string(),
                body: canonical_node(outer, source),
            },
            None => Declaration::Other,
        }
    }
}

fn python_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&grammar(Language::Python))
        .map_err(|e| Error::Other(format!("Failed to set language: {e}")))?;
    Ok(parser)
}

/// Canonical form of a code fragment that was not read from a file.
///
/// A fragment that does not parse cleanly still has its recognizable
/// string literals preserved.
///
/// # Errors
///
/// Returns an error if the grammar cannot be loaded.
pub fn canonical_fragment(text: &str) -> Result<String> {
    let literals = python_parser()?
        .parse(text, None)
        .map(|tree| string_ranges(tree.root_node()))
        .unwrap_or_default();
    Ok(canonical_with_literals(text, &literals))
}

fn canonical_node(node: Node<'_>, source: &str) -> String {
    let base = node.start_byte();
    let literals: Vec<Range<usize>> = string_ranges(node)
        .into_iter()
        .map(|range| range.start.saturating_sub(base)..range.end.saturating_sub(base))
        .collect();
    canonical_with_literals(text(node, source), &literals)
}

/// Byte ranges of every string literal at or below `node`.
fn string_ranges(node: Node<'_>) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if node.kind() == "string" {
            ranges.push(node.byte_range());
            continue;
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    ranges
}

fn function(outer: Node<'_>, def: Node<'_>, source: &str) -> Declaration {
    let Some(name) = def.child_by_field_name("name") else {
        return Declaration::Other;
    };
    let return_type = def
        .child_by_field_name("return_type")
        .map_or_else(|| DEFAULT_RETURN_TYPE.to_string(), |t| canonical_source(text(t, source)));

    Declaration::Function {
        name: text(name, source).to_string(),
        body: canonical_node(outer, source),
        return_type,
    }
}

/// `NAME = value` with exactly one identifier target and no annotation.
fn assignment(statement: Node<'_>, source: &str) -> Declaration {
    if statement.named_child_count() != 1 {
        return Declaration::Other;
    }
    let Some(node) = statement.named_child(0).filter(|n| n.kind() == "assignment") else {
        return Declaration::Other;
    };
    if node.child_by_field_name("type").is_some() {
        return Declaration::Other;
    }

    match (node.child_by_field_name("left"), node.child_by_field_name("right")) {
        (Some(left), Some(right)) if left.kind() == "identifier" && right.kind() != "assignment" => {
            Declaration::Assignment {
                name: text(left, source).to_string(),
                value: canonical_node(right, source),
            }
        }
        _ => Declaration::Other,
    }
}

/// `import a, b as c`, `from m import x as y` and `from m import *`.
fn import(statement: Node<'_>, source: &str) -> Declaration {
    let from_path = match statement.kind() {
        "import_statement" => None,
        "future_import_statement" => Some("__future__".to_string()),
        _ => match statement.child_by_field_name("module_name") {
            Some(module) => Some(text(module, source).to_string()),
            None => return Declaration::Other,
        },
    };

    let mut cursor = statement.walk();
    let names: Vec<Node<'_>> = statement.children_by_field_name("name", &mut cursor).collect();
    let mut specs: Vec<ImportSpec> = names
        .into_iter()
        .filter_map(|name| {
            let spec = if name.kind() == "aliased_import" {
                let imported = name.child_by_field_name("name")?;
                let alias = name.child_by_field_name("alias")?;
                ImportSpec::new(text(imported, source)).aliased(text(alias, source))
            } else {
                ImportSpec::new(text(name, source))
            };
            Some(match &from_path {
                Some(from) => spec.from_module(from.as_str()),
                None => spec,
            })
        })
        .collect();

    let mut cursor = statement.walk();
    let wildcard = statement
        .named_children(&mut cursor)
        .any(|child| child.kind() == "wildcard_import");
    if let (true, Some(from)) = (wildcard, &from_path) {
        specs.push(ImportSpec::new("*").from_module(from.as_str()));
    }

    if specs.is_empty() {
        Declaration::Other
    } else {
        Declaration::Import(specs)
    }
}

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or_default()
}

/// 1-based line of the first ERROR or MISSING node, depth first.
fn first_error_line(root: Node<'_>) -> usize {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return node.start_position().row + 1;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    root.start_position().row + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MODULE: &str = "\
import os
from typing import TypedDict

MAX_USERS = 100
a = b = 1
TIMEOUT: int = 30


class User(TypedDict):
    name: str
    age: int


class Service:
    pass


def helper_one(x: int) -> str:
    return str(x)


@cache
def helper_two(y):
    return y
";

    fn parser() -> PythonParser {
        PythonParser::new(&["TypedDict".to_string()]).unwrap()
    }

    fn recognized(source: &str) -> Vec<Declaration> {
        parser()
            .declarations(Path::new("module.py"), source)
            .unwrap()
            .into_iter()
            .filter(|d| *d != Declaration::Other)
            .collect()
    }

    #[test]
    fn test_classifies_top_level_declarations_in_order() {
        assert_eq!(
            recognized(MODULE),
            vec![
                Declaration::Import(vec![ImportSpec::new("os")]),
                Declaration::Import(vec![ImportSpec::new("TypedDict").from_module("typing")]),
                Declaration::Assignment {
                    name: "MAX_USERS".to_string(),
                    value: "100".to_string(),
                },
                Declaration::TypeDeclaration {
                    name: "User".to_string(),
                    body: "class User(TypedDict):\n    name: str\n    age: int".to_string(),
                },
                Declaration::Function {
                    name: "helper_one".to_string(),
                    body: "def helper_one(x: int) -> str:\n    return str(x)".to_string(),
                    return_type: "str".to_string(),
                },
                Declaration::Function {
                    name: "helper_two".to_string(),
                    body: "@cache\ndef helper_two(y):\n    return y".to_string(),
                    return_type: DEFAULT_RETURN_TYPE.to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_nested_definitions_are_not_top_level() {
        let source = "class Service:\n    def run(self) -> None:\n        pass\n";
        assert!(recognized(source).is_empty());
    }

    #[test]
    fn test_dotted_typing_marker() {
        let source = "import typing\n\nclass Order(typing.TypedDict, total=False):\n    id: int\n";
        let declarations = recognized(source);
        assert_eq!(declarations.len(), 2);
        assert!(matches!(
            &declarations[1],
            Declaration::TypeDeclaration { name, .. } if name == "Order"
        ));
    }

    #[test]
    fn test_custom_typing_markers() {
        let mut parser = PythonParser::new(&["BaseModel".to_string()]).unwrap();
        let source = "class User(BaseModel):\n    name: str\n\nclass Row(TypedDict):\n    id: int\n";
        let declarations = parser.declarations(Path::new("models.py"), source).unwrap();
        assert!(matches!(
            &declarations[0],
            Declaration::TypeDeclaration { name, .. } if name == "User"
        ));
        assert_eq!(declarations[1], Declaration::Other);
    }

    #[test]
    fn test_multiline_constant_value() {
        let source = "ROLES = [\n    \"admin\",  \n    \"user\",\n]\n";
        assert_eq!(
            recognized(source),
            vec![Declaration::Assignment {
                name: "ROLES".to_string(),
                value: "[\n    \"admin\",\n    \"user\",\n]".to_string(),
            }]
        );
    }

    #[test]
    fn test_import_statements() {
        let source = "\
from __future__ import annotations
import os.path as osp, sys
from . import (models,
    views,)  # local
from ..core import *
";
        assert_eq!(
            recognized(source),
            vec![
                Declaration::Import(vec![ImportSpec::new("annotations").from_module("__future__")]),
                Declaration::Import(vec![
                    ImportSpec::new("os.path").aliased("osp"),
                    ImportSpec::new("sys"),
                ]),
                Declaration::Import(vec![
                    ImportSpec::new("models").from_module("."),
                    ImportSpec::new("views").from_module("."),
                ]),
                Declaration::Import(vec![ImportSpec::new("*").from_module("..core")]),
            ]
        );
    }

    #[test]
    fn test_string_literals_keep_trailing_whitespace() {
        let source = "def f():  \n    return \"\"\"a   \nb\"\"\"\n\n\nBANNER = '''\n  hi  \n'''\n";
        assert_eq!(
            recognized(source),
            vec![
                Declaration::Function {
                    name: "f".to_string(),
                    body: "def f():\n    return \"\"\"a   \nb\"\"\"".to_string(),
                    return_type: DEFAULT_RETURN_TYPE.to_string(),
                },
                Declaration::Assignment {
                    name: "BANNER".to_string(),
                    value: "'''\n  hi  \n'''".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_canonical_fragment_keeps_literal_whitespace() {
        let body = "def f():\n    return \"\"\"a   \nb\"\"\"   \n";
        let canonical = canonical_fragment(body).unwrap();
        assert_eq!(canonical, "def f():\n    return \"\"\"a   \nb\"\"\"");
        assert_eq!(canonical_fragment(&canonical).unwrap(), canonical);
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let source = "import os\n\ndef broken(:\n    pass\n";
        let err = parser()
            .declarations(Path::new("src/broken.py"), source)
            .unwrap_err();
        match err {
            Error::Parse { path, line } => {
                assert_eq!(path, Path::new("src/broken.py"));
                assert_eq!(line, 3);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}

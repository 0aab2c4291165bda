//! Project model for Stuart.
//!
//! A project is the root aggregate of the model. One database holds exactly
//! one project; files, functions, imports, type definitions and constants
//! all belong to it implicitly.

use serde::{Deserialize, Serialize};

/// Source languages the model can render and extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
}

impl Language {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
        }
    }

    /// Canonical file suffix, including the leading dot.
    #[must_use]
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Python => ".py",
        }
    }

    /// Line comment prefix used for rendered descriptions.
    #[must_use]
    pub const fn comment_prefix(&self) -> &'static str {
        match self {
            Self::Python => "#",
        }
    }

    /// Append the canonical suffix to `path` unless it already carries it.
    #[must_use]
    pub fn with_suffix(&self, path: &str) -> String {
        if path.ends_with(self.suffix()) {
            path.to_string()
        } else {
            format!("{path}{}", self.suffix())
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" => Ok(Self::Python),
            _ => Err(format!("Unsupported language: {s}")),
        }
    }
}

/// The software project that is being generated or maintained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,

    /// Unique project name
    pub name: String,

    /// General description of the project's purpose and goals
    pub description: Option<String>,

    pub primary_language: Language,

    /// Architectural design and patterns
    pub architectural_description: Option<String>,

    /// Current development state (e.g. "planning")
    pub current_state: Option<String>,

    /// When the model was last rendered or reconciled (Unix milliseconds)
    pub last_rendered_at: Option<i64>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Project {
    /// Whether a file modified at `mtime_ms` changed after the last render.
    ///
    /// A project that was never rendered treats every file as modified.
    #[must_use]
    pub fn is_modified_since_render(&self, mtime_ms: i64) -> bool {
        self.last_rendered_at.is_none_or(|rendered| mtime_ms > rendered)
    }
}

/// Arguments for initializing a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub primary_language: Language,
    pub description: Option<String>,
    pub architectural_description: Option<String>,
    pub current_state: Option<String>,
}

impl NewProject {
    #[must_use]
    pub fn new(name: impl Into<String>, primary_language: Language) -> Self {
        Self {
            name: name.into(),
            primary_language,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

//! Project-wide declarations: type definitions and constants.

use serde::{Deserialize, Serialize};

/// A type definition that can be used across the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub id: i64,

    /// Unique type name
    pub name: String,

    /// What this type represents and how it should be used
    pub description: Option<String>,

    /// The type definition source, rendered verbatim
    pub body: String,

    pub created_at: i64,
    pub updated_at: i64,
}

/// A named module-level value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    pub id: i64,

    /// Unique constant name, stored upper-cased
    pub name: String,

    pub description: Option<String>,

    /// Source-level value expression
    pub value: String,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Constant {
    /// Stored form of a constant name. `max_users` and `MAX_USERS` are the
    /// same constant.
    #[must_use]
    pub fn normalize_name(name: &str) -> String {
        name.trim().to_uppercase()
    }

    /// Render as a `NAME = value` line.
    #[must_use]
    pub fn assignment(&self) -> String {
        format!("{} = {}", self.name.to_uppercase(), self.value)
    }
}

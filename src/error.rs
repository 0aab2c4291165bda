//! Error types for Stuart.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Retryability flags for callers that can correct their input
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stuart operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Tools match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    FileNotFound,

    // Validation (exit 4)
    IdentityError,
    UniquenessViolation,
    InvalidArgument,

    // Sync (exit 6)
    ParseFailure,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::IdentityError => "IDENTITY_ERROR",
            Self::UniquenessViolation => "UNIQUENESS_VIOLATION",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ParseFailure => "PARSE_FAILURE",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::FileNotFound => 3,
            Self::IdentityError | Self::UniquenessViolation | Self::InvalidArgument => 4,
            Self::ParseFailure => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether a caller should retry with corrected input.
    ///
    /// Merge operations are never retried automatically; this flag only
    /// tells the caller that fixing its arguments can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IdentityError | Self::InvalidArgument | Self::ParseFailure
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Stuart operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `stuart init <name>` first")]
    NotInitialized,

    #[error("Store already holds project '{name}'")]
    AlreadyInitialized { name: String },

    #[error("File not found in model: {filename}")]
    FileNotFound { filename: String },

    /// A merge was attempted without its natural-key field.
    #[error("Cannot merge {entity}: natural key field '{field}' is missing")]
    Identity {
        entity: &'static str,
        field: &'static str,
    },

    /// A direct insert collided with an existing unique key.
    #[error("{entity} '{key}' already exists")]
    UniquenessViolation { entity: &'static str, key: String },

    #[error("Failed to parse {} (first syntax error on line {line})", path.display())]
    Parse { path: PathBuf, line: usize },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Self::Io(err.into())
    }
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::FileNotFound { .. } => ErrorCode::FileNotFound,
            Self::Identity { .. } => ErrorCode::IdentityError,
            Self::UniquenessViolation { .. } => ErrorCode::UniquenessViolation,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Parse { .. } => ErrorCode::ParseFailure,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `stuart init <name>` in the project root".to_string())
            }

            Self::AlreadyInitialized { name } => Some(format!(
                "This store belongs to '{name}'. Use `--db` to point at another database."
            )),

            Self::FileNotFound { filename } => Some(format!(
                "No file '{filename}' in the model. Use `stuart tree` to list known files."
            )),

            Self::Identity { field, .. } => Some(format!(
                "Supply a non-empty '{field}' so the record can be matched across runs."
            )),

            Self::UniquenessViolation { .. } => Some(
                "Use an upsert (or `stuart extract`) to update the existing record instead."
                    .to_string(),
            ),

            Self::Parse { path, .. } => Some(format!(
                "Fix the syntax in {} or set \"on_parse_error\": \"skip\" in .stuart/config.json",
                path.display()
            )),

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::NotInitialized.exit_code(), 2);
        assert_eq!(
            Error::FileNotFound { filename: "a.py".into() }.exit_code(),
            3
        );
        assert_eq!(
            Error::UniquenessViolation { entity: "constant", key: "X".into() }.exit_code(),
            4
        );
        assert_eq!(
            Error::Parse { path: PathBuf::from("a.py"), line: 3 }.exit_code(),
            6
        );
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::Identity { entity: "function", field: "name" };
        let json = err.to_structured_json();

        assert_eq!(json["error"]["code"], "IDENTITY_ERROR");
        assert_eq!(json["error"]["retryable"], true);
        assert!(json["error"]["hint"].as_str().unwrap().contains("'name'"));
    }

    #[test]
    fn test_io_error_has_no_hint() {
        let err = Error::Io(std::io::Error::other("disk full"));
        assert!(err.hint().is_none());
        assert_eq!(err.to_structured_json()["error"]["code"], "IO_ERROR");
    }
}

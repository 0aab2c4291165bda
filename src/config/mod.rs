//! Configuration management.
//!
//! This module provides functions for discovering the Stuart project
//! directory, resolving the database path, and loading configuration.
//!
//! # Layout
//!
//! Every project keeps its state in a `.stuart/` directory at its root:
//! - **Database**: `.stuart/stuart.db`
//! - **Configuration**: `.stuart/config.json`
//! - **Sync lock**: `.stuart/sync.lock`, held by render and extract

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".stuart";

/// Database file name inside the state directory.
pub const DB_FILE: &str = "stuart.db";

/// Config file name inside the state directory.
pub const CONFIG_FILE: &str = "config.json";

/// What extraction does with a file that fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorPolicy {
    /// Log a warning, record the file in the report, keep walking.
    #[default]
    Skip,
    /// Stop the walk with `Error::Parse`.
    Abort,
}

/// Project configuration from `.stuart/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base classes marking a class as a type definition.
    pub typing_markers: Vec<String>,
    pub on_parse_error: ParseErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            typing_markers: vec!["TypedDict".to_string()],
            on_parse_error: ParseErrorPolicy::default(),
        }
    }
}

impl Config {
    /// Load `config.json` from a state directory; defaults if absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file exists but is not valid.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Write this config as pretty JSON into a state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let payload = serde_json::to_string_pretty(self)?;
        crate::sync::file::atomic_write(&state_dir.join(CONFIG_FILE), &format!("{payload}\n"))
    }
}

/// Discover the project root: the nearest ancestor of `start` (inclusive)
/// that contains a `.stuart/` directory.
#[must_use]
pub fn discover_project_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        if dir.join(STATE_DIR).is_dir() {
            return Some(dir.to_path_buf());
        }

        match dir.parent() {
            Some(parent) => dir = parent,
            None => return None,
        }
    }
}

/// Discover the project root from the current directory.
#[must_use]
pub fn current_project_root() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| discover_project_root(&cwd))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `STUART_DB` environment variable
/// 3. `<project root>/.stuart/stuart.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no project was found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>, project_root: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: STUART_DB environment variable
    if let Ok(db_path) = std::env::var("STUART_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    // Priority 3: Per-project database
    project_root.map(|root| root.join(STATE_DIR).join(DB_FILE))
}

/// Get the default actor name.
///
/// Priority:
/// 1. `STUART_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "stuart"
#[must_use]
pub fn default_actor() -> String {
    // Check environment variable
    if let Ok(actor) = std::env::var("STUART_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    // Try git user name
    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    // Try system username
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }

    "stuart".to_string()
}

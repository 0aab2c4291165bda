//! Command implementations.

pub mod extract;
pub mod init;
pub mod render;
pub mod status;
pub mod tree;

use crate::config::{Config, STATE_DIR, current_project_root, default_actor, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};

/// Open the workspace for the current directory.
///
/// Returns the workspace and the project root (or the current directory
/// when the database was given explicitly and no `.stuart/` was found).
pub(crate) fn open_workspace(
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
) -> Result<(Workspace, PathBuf)> {
    let project_root = current_project_root();
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path), project_root.as_deref())
        .ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let root = match project_root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let config = load_config(&root)?;
    let actor = actor.map_or_else(default_actor, str::to_string);

    let storage = SqliteStorage::open(&db_path)?;
    let workspace = Workspace::open(storage, config, &actor)?;
    Ok((workspace, root))
}

fn load_config(root: &Path) -> Result<Config> {
    let state_dir = root.join(STATE_DIR);
    if state_dir.is_dir() {
        Config::load(&state_dir)
    } else {
        Ok(Config::default())
    }
}

//! Initialize a Stuart project.
//!
//! Creates `.stuart/` in the current directory with a `config.json`
//! template and the database, then creates the project row. Running it
//! again with the same name is a no-op.

use crate::config::{Config, CONFIG_FILE, STATE_DIR, default_actor, resolve_db_path};
use crate::error::{Error, Result};
use crate::model::{Language, NewProject, Project};
use crate::storage::SqliteStorage;
use crate::workspace::Workspace;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    project: Project,
    created: bool,
    path: PathBuf,
    database: PathBuf,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created, or
/// `AlreadyInitialized` if the database holds another project.
pub fn execute(
    name: &str,
    language: Language,
    description: Option<&str>,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let root = std::env::current_dir()?;
    let state_dir = root.join(STATE_DIR);
    fs::create_dir_all(&state_dir)?;

    let config = if state_dir.join(CONFIG_FILE).exists() {
        Config::load(&state_dir)?
    } else {
        let config = Config::default();
        config.save(&state_dir)?;
        config
    };

    let database = resolve_db_path(db_path.map(PathBuf::as_path), Some(&root))
        .ok_or_else(|| Error::Config("Could not resolve database path".to_string()))?;
    if let Some(parent) = database.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut new = NewProject::new(name, language);
    if let Some(description) = description {
        new = new.with_description(description);
    }

    let actor = actor.map_or_else(default_actor, str::to_string);
    let storage = SqliteStorage::open(&database)?;
    let (workspace, created) = Workspace::initialize(storage, &new, config, &actor)?;
    let project = workspace.project()?;

    if json {
        let output = InitOutput {
            project,
            created,
            path: state_dir,
            database,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if created {
        println!("Initialized project '{}' in {}", project.name, state_dir.display());
        println!("  Database: {}", database.display());
        println!();
        println!("Next: stuart render");
    } else {
        println!("Project '{}' already initialized", project.name);
    }

    Ok(())
}

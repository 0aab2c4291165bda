//! Tree command implementation.

use crate::cli::commands::open_workspace;
use crate::error::Result;
use std::path::PathBuf;

/// Execute the tree command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or a query fails.
pub fn execute(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (workspace, _) = open_workspace(db_path, None)?;
    let tree = workspace.tree()?;

    if json {
        println!("{}", serde_json::json!({ "tree": tree }));
    } else {
        println!("{tree}");
    }

    Ok(())
}

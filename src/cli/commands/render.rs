//! Render command implementation.

use crate::cli::commands::open_workspace;
use crate::error::Result;
use crate::sync::RenderStats;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct RenderOutput {
    root: PathBuf,
    stats: RenderStats,
    last_rendered_at: Option<i64>,
}

/// Execute the render command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or a write fails.
pub fn execute(
    root: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let (mut workspace, project_root) = open_workspace(db_path, actor)?;
    let root = root.cloned().unwrap_or(project_root);

    let stats = workspace.render(&root)?;

    if json {
        let output = RenderOutput {
            last_rendered_at: workspace.project()?.last_rendered_at,
            root,
            stats,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("{} {}", "Rendered".green().bold(), root.display());
        println!("  Files:            {}", stats.files);
        println!("  Constants:        {}", stats.constants);
        println!("  Type definitions: {}", stats.type_definitions);
    }

    Ok(())
}

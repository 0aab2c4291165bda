//! Extract command implementation.
//!
//! Changes are printed as extraction produces them, so a long walk shows
//! progress file by file.

use crate::cli::commands::open_workspace;
use crate::error::Result;
use crate::sync::{Change, ExtractReport};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ExtractOutput {
    root: PathBuf,
    changes: Vec<Change>,
    report: ExtractReport,
}

/// Execute the extract command.
///
/// # Errors
///
/// Returns the first extraction error; merges before it are committed.
pub fn execute(
    root: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let (mut workspace, project_root) = open_workspace(db_path, actor)?;
    let root = root.cloned().unwrap_or(project_root);

    let mut extraction = workspace.extract(&root)?;
    let mut changes = Vec::new();
    for change in extraction.by_ref() {
        let change = change?;
        if !json {
            let line = change.to_string();
            if change.created {
                println!("{}", line.green());
            } else {
                println!("{}", line.yellow());
            }
        }
        changes.push(change);
    }
    let report = extraction.finish()?;

    if json {
        let output = ExtractOutput {
            root,
            changes,
            report,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if changes.is_empty() && report.imports_added == 0 {
        println!("No changes since last render.");
    } else {
        println!();
        println!(
            "{} created, {} updated, {} import(s) added from {} file(s)",
            report.created, report.updated, report.imports_added, report.files_parsed
        );
    }
    for path in &report.unparseable {
        println!("{} {}", "Skipped (unparseable):".red(), path.display());
    }

    Ok(())
}

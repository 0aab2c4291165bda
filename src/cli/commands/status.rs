//! Status command implementation.

use crate::cli::commands::open_workspace;
use crate::error::Result;
use chrono::{TimeZone, Utc};
use colored::Colorize;
use std::path::PathBuf;

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the workspace cannot be opened or the walk fails.
pub fn execute(root: Option<&PathBuf>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let (workspace, project_root) = open_workspace(db_path, None)?;
    let root = root.cloned().unwrap_or(project_root);
    let status = workspace.status(&root)?;

    if json {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(());
    }

    let project = &status.project;
    println!("{}", format!("Project: {}", project.name).bold());
    if let Some(description) = &project.description {
        println!("  {description}");
    }
    println!("  Language: {}", project.primary_language);

    let rendered = project
        .last_rendered_at
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map_or_else(
            || "never".to_string(),
            |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        );
    println!("  Last rendered: {rendered}");
    println!();

    let counts = &status.counts;
    println!("Model:");
    println!("  Files:            {}", counts.files);
    println!("  Functions:        {}", counts.functions);
    println!("  Imports:          {}", counts.imports);
    println!("  Type definitions: {}", counts.type_definitions);
    println!("  Constants:        {}", counts.constants);
    println!();

    if !status.recent_events.is_empty() {
        println!("Recent activity:");
        for event in &status.recent_events {
            let at = Utc
                .timestamp_millis_opt(event.created_at)
                .single()
                .map_or_else(String::new, |at| at.format("%Y-%m-%d %H:%M:%S").to_string());
            println!(
                "  {at}  {:<24} {} ({})",
                event.event_type.as_str(),
                event.entity_key,
                event.actor.dimmed()
            );
        }
        println!();
    }

    if status.pending.is_empty() {
        println!("No files modified since last render.");
    } else {
        println!("{}", "Modified since last render:".yellow());
        for path in &status.pending {
            println!("  {path}");
        }
        println!();
        println!("Run `stuart extract` to merge them into the model.");
    }

    Ok(())
}

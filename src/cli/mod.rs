//! CLI definitions using clap.

use crate::model::Language;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// Stuart - keeps a relational model of a Python project in sync with its source tree
#[derive(Parser, Debug)]
#[command(name = "stuart", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: <project root>/.stuart/stuart.db)
    #[arg(long, global = true, env = "STUART_DB")]
    pub db: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "STUART_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create `.stuart/` and the project in the current directory
    Init {
        /// Project name
        name: String,

        /// Primary source language
        #[arg(long, default_value = "python")]
        language: Language,

        /// What the project is for
        #[arg(long)]
        description: Option<String>,
    },

    /// Write the model out as a source tree
    Render {
        /// Render root (default: project root)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Merge files changed since the last render back into the model
    Extract {
        /// Tree root (default: project root)
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Show files and functions as a tree
    Tree,

    /// Show model counts and files awaiting extraction
    Status {
        /// Tree root (default: project root)
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

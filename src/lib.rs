//! Stuart - a relational model of a Python project, kept in sync with its
//! source tree.
//!
//! The model (files, functions, imports, type definitions, constants) lives
//! in SQLite. Rendering writes it out as source files; extraction parses the
//! files changed since the last render and merges what it finds back in.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Project, SourceFile, Function, Import, ...)
//! - [`storage`] - SQLite database layer and merge primitives
//! - [`lang`] - Tree-sitter front end classifying top-level declarations
//! - [`sync`] - Render, extract, and tree view
//! - [`workspace`] - The project aggregate tying them together
//! - [`config`] - Project discovery and configuration
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod lang;
pub mod model;
pub mod storage;
pub mod sync;
pub mod workspace;

pub use error::{Error, Result};
pub use workspace::{ProjectStatus, Workspace};

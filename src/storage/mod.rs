//! SQLite storage layer for Stuart.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Natural-key merges (get-or-create, upsert)
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`merge`] - Generic merge primitives over `Record` tables
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod merge;
pub mod schema;
pub mod sqlite;

pub use merge::{Fields, Merged, Record};
pub use sqlite::{ModelCounts, MutationContext, SqliteStorage};

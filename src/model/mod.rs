//! Data models for Stuart.
//!
//! This module contains the entities of the project model:
//! - Project (root aggregate)
//! - SourceFile, Function, Import
//! - TypeDefinition, Constant

pub mod definition;
pub mod project;
pub mod source;

pub use definition::{Constant, TypeDefinition};
pub use project::{Language, NewProject, Project};
pub use source::{Function, Import, ImportSpec, SourceFile};

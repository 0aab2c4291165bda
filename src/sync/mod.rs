//! Render and extract between the model and a source tree.
//!
//! - **Render**: model → files under the render root (clean rewrite)
//! - **Extract**: files modified since the last render → model merges
//! - **Tree**: hierarchical text view of files and their functions
//!
//! Render and extract of the same root are serialized by [`SyncLock`].

pub mod extract;
pub mod file;
pub mod lock;
pub mod render;
pub mod tree;

pub use extract::{Change, ChangeKind, ExtractReport, Extraction};
pub use file::{atomic_write, normalize_model_path};
pub use lock::SyncLock;
pub use render::{RenderStats, SOURCE_DIR, render_tree};
pub use tree::{Tree, build_tree};

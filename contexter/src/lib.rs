//! # Contexter
//!
//! Incrementally builds and maintains an in-memory tree (the "context")
//! mirroring a source directory, indexed both by path and by a pluggable
//! classification of each file's type. The context is the data backbone a
//! static-content generator or similar file-driven pipeline builds on.
//!
//! A watch session scans the source directory, classifies every file
//! through priority-ordered plugins, extracts type-specific content, and
//! keeps the tree converged as filesystem events arrive.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Watch Session                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  notify/walkdir ──► PluginRegistry ──► FileEntity               │
//! │        │                  │                │                    │
//! │        ▼                  ▼                ▼                    │
//! │   WatchFilter      FileTypeBehavior     Recipe ──► ContextTree  │
//! │                                            │                    │
//! │                                            ▼                    │
//! │              SessionEvent stream ◄── settling poll              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use contexter::{Contexter, SessionEvent, WatchOptions};
//!
//! # async fn run() -> contexter::Result<()> {
//! let ctxr = Contexter::new();
//! let mut session = ctxr.watch("./content", WatchOptions::new())?;
//!
//! let tree = session.wait_ready().await?;
//! let tree = tree.read().await;
//! if let Some(datafiles) = tree.collection("datafiles") {
//!     println!("{} data files tracked", datafiles.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod file;
pub mod filetype;
pub mod plugin;
pub mod plugins;
pub mod recipe;
pub mod tree;
pub mod watcher;

pub use config::{ContexterConfig, WatchOptions};
pub use error::{ContexterError, Result};
pub use event::{FileEvent, FileEventKind, SessionEvent};
pub use file::{FileEntity, FilePath, FileRef, FileStats};
pub use filetype::{
    pluralize, DatafileBehavior, FileTypeBehavior, GenericBehavior, LayeredBehavior,
    COMMON_BEHAVIOR_KEY,
};
pub use plugin::{CheckOutcome, Plugin, PluginRegistry, WatchFilter, CATCH_ALL_FILETYPE};
pub use plugins::{DatafilePlugin, UnknownPlugin};
pub use recipe::{contextualize_do, contextualize_undo, Recipe, RecipeStep, StepKind};
pub use tree::{ContextTree, SharedTree, TreeNode, TypeCollection};
pub use watcher::{Contexter, WatchSession};

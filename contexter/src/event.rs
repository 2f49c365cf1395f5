//! Events flowing through a watch session.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::file::FileRef;
use crate::tree::SharedTree;

/// A filesystem event delivered by the watch backend.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// The kind of event.
    pub kind: FileEventKind,

    /// Path to the affected file.
    pub path: PathBuf,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
}

impl FileEvent {
    /// Create a new file event.
    pub fn new(kind: FileEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Kind of filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// File was created.
    Created,

    /// File was modified.
    Modified,

    /// File was deleted.
    Deleted,

    /// File was renamed (old path).
    RenamedFrom,

    /// File was renamed (new path).
    RenamedTo,

    /// Event kind the session does not act on.
    Other,
}

impl From<notify::EventKind> for FileEventKind {
    fn from(kind: notify::EventKind) -> Self {
        match kind {
            notify::EventKind::Create(_) => Self::Created,
            notify::EventKind::Modify(modify_kind) => match modify_kind {
                notify::event::ModifyKind::Name(rename) => match rename {
                    notify::event::RenameMode::From => Self::RenamedFrom,
                    notify::event::RenameMode::To => Self::RenamedTo,
                    _ => Self::Modified,
                },
                _ => Self::Modified,
            },
            notify::EventKind::Remove(_) => Self::Deleted,
            _ => Self::Other,
        }
    }
}

/// Lifecycle events emitted by a watch session.
///
/// A single typed stream subsumes the per-name channels of callback-style
/// emitters; consumers match on the variant they care about.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Emitted once when the session starts, carrying the shared tree.
    Started(SharedTree),

    /// A file was classified and linked into the context.
    Adding(FileRef),

    /// A tracked file was re-squeezed after a change event.
    Updating(FileRef),

    /// A tracked file was unlinked from the context.
    Deleting(FileRef),

    /// Progress during settling, carrying the files still extracting.
    Contexting(Vec<FileRef>),

    /// The context is quiescent. Emitted exactly once per settling cycle.
    Ready(SharedTree),
}

impl SessionEvent {
    /// Short name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::Adding(_) => "adding",
            Self::Updating(_) => "updating",
            Self::Deleting(_) => "deleting",
            Self::Contexting(_) => "contexting",
            Self::Ready(_) => "ready",
        }
    }
}

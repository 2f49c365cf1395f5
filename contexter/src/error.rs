//! Error types for the contexter core.

use thiserror::Error;

/// Result type alias for contexter operations.
pub type Result<T> = std::result::Result<T, ContexterError>;

/// Errors that can occur while building or maintaining a context.
#[derive(Error, Debug)]
pub enum ContexterError {
    /// Source directory not found.
    #[error("source directory not found: {0}")]
    SourceNotFound(String),

    /// Source path is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// No plugin affirmed a file. Unreachable while a catch-all is registered.
    #[error("no plugin matched file: {0}")]
    NoPluginMatched(String),

    /// Content parsing failed.
    #[error("parse error in {path}: {message}")]
    Parse {
        /// Path of the file that failed to parse.
        path: String,
        /// Human-readable failure description.
        message: String,
    },

    /// Plugin does not provide a render capability.
    #[error("filetype '{0}' is not renderable")]
    RenderUnsupported(String),

    /// Invalid glob pattern.
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Notify error.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The session ended before the context settled.
    #[error("session closed before readiness")]
    SessionClosed,
}

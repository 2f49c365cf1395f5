//! Configuration types for a watch session.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration for a [`crate::Contexter`] session.
#[derive(Debug, Clone, Default)]
pub struct ContexterConfig {
    /// Arbitrary pass-through map made available to every plugin.
    ///
    /// A `root` string entry overrides the default tree-mirror root key
    /// (the source directory's basename).
    pub plugin_config: serde_json::Map<String, Value>,

    /// Interval between `Contexting` progress emissions while settling.
    ///
    /// `None` reports the pending set once, silently, before declaring
    /// readiness.
    pub report_interval: Option<Duration>,

    /// Force unfiltered watching, disabling the watch filter optimizer.
    pub watch_all: bool,
}

impl ContexterConfig {
    /// Create a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the plugin pass-through configuration.
    pub fn with_plugin_config(mut self, plugin_config: serde_json::Map<String, Value>) -> Self {
        self.plugin_config = plugin_config;
        self
    }

    /// Enable periodic progress reporting at the given interval.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = Some(interval);
        self
    }

    /// Watch everything, bypassing the extension-based watch filter.
    pub fn with_watch_all(mut self) -> Self {
        self.watch_all = true;
        self
    }

    /// The configured tree-mirror root key override, if any.
    pub fn root_override(&self) -> Option<&str> {
        self.plugin_config.get("root").and_then(Value::as_str)
    }
}

/// Options controlling which paths a watch session sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchOptions {
    /// Patterns to ignore (glob patterns).
    pub ignored: Vec<String>,

    /// Whether to follow symbolic links during the initial scan.
    pub follow_symlinks: bool,
}

impl WatchOptions {
    /// Create options with the default ignore set.
    pub fn new() -> Self {
        Self {
            ignored: Self::default_ignores(),
            follow_symlinks: false,
        }
    }

    /// Add an ignore pattern.
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignored.push(pattern.into());
        self
    }

    /// Replace the ignore set entirely.
    pub fn with_ignored(mut self, patterns: Vec<String>) -> Self {
        self.ignored = patterns;
        self
    }

    /// Enable following symbolic links.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    /// Get default ignore patterns.
    fn default_ignores() -> Vec<String> {
        vec![
            // Version control
            "**/.git/**".to_string(),
            "**/.svn/**".to_string(),
            "**/.hg/**".to_string(),
            // Dependencies
            "**/node_modules/**".to_string(),
            "**/target/**".to_string(),
            // Editor droppings
            "**/*.swp".to_string(),
            "**/*~".to_string(),
            // System files
            "**/.DS_Store".to_string(),
            "**/Thumbs.db".to_string(),
            // Temporary files
            "**/*.tmp".to_string(),
        ]
    }

    /// Check if a path should be ignored.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        for pattern in &self.ignored {
            if let Ok(glob) = glob::Pattern::new(pattern) {
                if glob.matches(&path_str) {
                    return true;
                }
            }
        }

        false
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::new()
    }
}

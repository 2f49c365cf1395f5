//! Plugins: classification and extraction capabilities for one file type,
//! and the priority-ordered registry that resolves them.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{ContexterError, Result};
use crate::file::{FileEntity, FileRef};

/// File type of the mandatory catch-all plugin.
///
/// The catch-all accepts every file, guaranteeing classification never
/// fails, and is exempt from the watch-extension declaration rule.
pub const CATCH_ALL_FILETYPE: &str = "unknown";

/// Outcome of a plugin's `check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The plugin does not own this file.
    Reject,

    /// The plugin owns this file; target extension defaults to the
    /// filename's own extension.
    Accept,

    /// The plugin owns this file and supplies the target extension used
    /// downstream.
    AcceptWith(String),
}

/// A capability bundle for one file type.
///
/// Plugins classify files (`check`) and optionally extract content
/// (`parse`) or render it (`render`). They cannot override core file
/// behavior; that is the domain of [`crate::FileTypeBehavior`].
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Check precedence: higher checked first. Defaults to 0.
    fn priority(&self) -> i32 {
        0
    }

    /// The file type this plugin serves.
    fn filetype(&self) -> &str;

    /// Extensions this plugin watches, used for watch-filter optimization.
    ///
    /// Every non-catch-all plugin must declare its extensions to keep the
    /// optimization valid for the session.
    fn watch_extensions(&self) -> Option<Vec<String>> {
        None
    }

    /// Decide whether this plugin owns the given filename.
    fn check(&self, filename: &Path) -> Result<CheckOutcome>;

    /// Whether this plugin supplies a parse step.
    fn provides_parse(&self) -> bool {
        false
    }

    /// Whether the parse step completes asynchronously.
    ///
    /// An asynchronous plugin's completion is responsible for the
    /// entity's extraction flag; the core does not wait for it.
    fn is_async(&self) -> bool {
        false
    }

    /// Extract content for a file. Only called when `provides_parse`.
    async fn parse(&self, file: &FileRef) -> Result<Option<Value>> {
        let _ = file;
        Ok(None)
    }

    /// Whether this plugin supplies a render capability.
    fn provides_render(&self) -> bool {
        false
    }

    /// Render a file. Only meaningful when `provides_render`.
    fn render(&self, file: &FileEntity) -> Result<String> {
        let _ = file;
        Err(ContexterError::RenderUnsupported(self.filetype().to_string()))
    }
}

/// Ordered collection of plugins with watch-filter bookkeeping.
///
/// All registry state is instance-owned so independent sessions can
/// coexist.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn Plugin>>,
    watch_extensions: BTreeSet<String>,
    opted_out: bool,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin.
    ///
    /// Declared watch extensions are unioned into the aggregate set. A
    /// non-catch-all plugin that omits its extensions disables watch
    /// optimization for the whole session.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        match plugin.watch_extensions() {
            Some(extensions) => {
                self.watch_extensions
                    .extend(extensions.iter().map(|e| normalize_extension(e)));
            }
            None if plugin.filetype() != CATCH_ALL_FILETYPE => {
                debug!(
                    filetype = plugin.filetype(),
                    "plugin declares no watch extensions; disabling watch optimization"
                );
                self.opted_out = true;
            }
            None => {}
        }

        self.plugins.push(plugin);
    }

    /// Resolve the owning plugin for a filename.
    ///
    /// Candidates are checked by priority descending; ties are broken by
    /// registration order reversed, so later-registered plugins shadow
    /// earlier defaults of the same priority. Returns the plugin and the
    /// resolved target extension.
    pub fn resolve(&self, filename: &Path) -> Result<(Arc<dyn Plugin>, String)> {
        let mut candidates: Vec<&Arc<dyn Plugin>> = self.plugins.iter().rev().collect();
        candidates.sort_by_key(|p| std::cmp::Reverse(p.priority()));

        for plugin in candidates {
            match plugin.check(filename)? {
                CheckOutcome::Reject => continue,
                CheckOutcome::Accept => {
                    let ext = filename
                        .extension()
                        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                        .unwrap_or_default();
                    return Ok((plugin.clone(), ext));
                }
                CheckOutcome::AcceptWith(ext) => {
                    return Ok((plugin.clone(), normalize_extension(&ext)));
                }
            }
        }

        Err(ContexterError::NoPluginMatched(
            filename.display().to_string(),
        ))
    }

    /// Distinct file type names in registration order.
    pub fn filetypes(&self) -> Vec<String> {
        let mut names = Vec::new();
        for plugin in &self.plugins {
            let name = plugin.filetype().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Whether every non-catch-all plugin declared its watch extensions.
    pub fn is_optimizable(&self) -> bool {
        !self.opted_out
    }

    /// The union of all declared watch extensions.
    pub fn aggregate_extensions(&self) -> &BTreeSet<String> {
        &self.watch_extensions
    }

    /// Build the optimized watch filter, if optimization applies.
    ///
    /// `None` means the session watches everything: the caller forced it,
    /// a plugin omitted its extensions, or nothing was declared.
    pub fn watch_filter(&self, watch_all: bool) -> Result<Option<WatchFilter>> {
        if watch_all || self.opted_out || self.watch_extensions.is_empty() {
            return Ok(None);
        }

        WatchFilter::from_extensions(self.watch_extensions.iter()).map(Some)
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.filetypes())
            .field("watch_extensions", &self.watch_extensions)
            .field("opted_out", &self.opted_out)
            .finish()
    }
}

/// Glob filter restricting the realtime event subscription to the
/// extensions declared by registered plugins.
#[derive(Debug, Clone)]
pub struct WatchFilter {
    patterns: Vec<glob::Pattern>,
}

impl WatchFilter {
    /// Build a filter unioning the given extensions.
    pub fn from_extensions<'a>(extensions: impl Iterator<Item = &'a String>) -> Result<Self> {
        let mut patterns = Vec::new();
        for ext in extensions {
            patterns.push(glob::Pattern::new(&format!("**/*{ext}"))?);
        }

        Ok(Self { patterns })
    }

    /// Whether a path matches any declared extension.
    pub fn matches(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.patterns.iter().any(|p| p.matches(&path_str))
    }
}

fn normalize_extension(ext: &str) -> String {
    let lower = ext.to_lowercase();
    if lower.starts_with('.') {
        lower
    } else {
        format!(".{lower}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct FixedPlugin {
        priority: i32,
        filetype: &'static str,
        extensions: Option<Vec<String>>,
        accepts: &'static str,
    }

    #[async_trait]
    impl Plugin for FixedPlugin {
        fn priority(&self) -> i32 {
            self.priority
        }

        fn filetype(&self) -> &str {
            self.filetype
        }

        fn watch_extensions(&self) -> Option<Vec<String>> {
            self.extensions.clone()
        }

        fn check(&self, filename: &Path) -> Result<CheckOutcome> {
            if self.accepts == "*" || filename.to_string_lossy().ends_with(self.accepts) {
                Ok(CheckOutcome::Accept)
            } else {
                Ok(CheckOutcome::Reject)
            }
        }
    }

    fn plugin(
        priority: i32,
        filetype: &'static str,
        extensions: Option<Vec<String>>,
        accepts: &'static str,
    ) -> Arc<dyn Plugin> {
        Arc::new(FixedPlugin {
            priority,
            filetype,
            extensions,
            accepts,
        })
    }

    #[test]
    fn test_priority_order() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin(0, "low", Some(vec![".md".into()]), ".md"));
        registry.register(plugin(10, "high", Some(vec![".md".into()]), ".md"));

        let (resolved, ext) = registry.resolve(Path::new("/src/readme.md")).unwrap();
        assert_eq!(resolved.filetype(), "high");
        assert_eq!(ext, ".md");
    }

    #[test]
    fn test_tie_broken_by_later_registration() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin(5, "first", Some(vec![".md".into()]), ".md"));
        registry.register(plugin(5, "second", Some(vec![".md".into()]), ".md"));

        let (resolved, _) = registry.resolve(Path::new("/src/readme.md")).unwrap();
        assert_eq!(resolved.filetype(), "second");
    }

    #[test]
    fn test_resolution_deterministic() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin(10, "data", Some(vec![".yml".into()]), ".yml"));
        registry.register(plugin(0, "unknown", None, "*"));

        for _ in 0..3 {
            let (resolved, _) = registry.resolve(Path::new("/a.yml")).unwrap();
            assert_eq!(resolved.filetype(), "data");
            let (resolved, _) = registry.resolve(Path::new("/b.png")).unwrap();
            assert_eq!(resolved.filetype(), "unknown");
        }
    }

    #[test]
    fn test_no_match_fails() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin(10, "data", Some(vec![".yml".into()]), ".yml"));

        let result = registry.resolve(Path::new("/b.png"));
        assert!(matches!(result, Err(ContexterError::NoPluginMatched(_))));
    }

    #[test]
    fn test_catch_all_exempt_from_extension_rule() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin(10, "data", Some(vec![".yml".into()]), ".yml"));
        registry.register(plugin(10, "image", Some(vec![".png".into()]), ".png"));
        registry.register(plugin(0, "unknown", None, "*"));

        assert!(registry.is_optimizable());
        let filter = registry.watch_filter(false).unwrap().unwrap();
        assert!(filter.matches(Path::new("/src/a.yml")));
        assert!(filter.matches(Path::new("/src/deep/nested/b.png")));
        assert!(!filter.matches(Path::new("/src/c.md")));
    }

    #[test]
    fn test_undeclared_extensions_disable_optimization() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin(10, "data", Some(vec![".yml".into()]), ".yml"));
        registry.register(plugin(10, "mystery", None, ".bin"));

        assert!(!registry.is_optimizable());
        assert!(registry.watch_filter(false).unwrap().is_none());
    }

    #[test]
    fn test_watch_all_disables_filter() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin(10, "data", Some(vec![".yml".into()]), ".yml"));

        assert!(registry.watch_filter(true).unwrap().is_none());
    }

    struct ExtensionRewriter;

    #[async_trait]
    impl Plugin for ExtensionRewriter {
        fn filetype(&self) -> &str {
            "page"
        }

        fn watch_extensions(&self) -> Option<Vec<String>> {
            Some(vec![".md".to_string()])
        }

        fn check(&self, filename: &Path) -> Result<CheckOutcome> {
            if filename.extension().is_some_and(|e| e == "md") {
                Ok(CheckOutcome::AcceptWith(".html".to_string()))
            } else {
                Ok(CheckOutcome::Reject)
            }
        }
    }

    #[test]
    fn test_check_string_supplies_target_extension() {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(ExtensionRewriter));

        let (_, ext) = registry.resolve(Path::new("/src/about.md")).unwrap();
        assert_eq!(ext, ".html");
    }

    #[test]
    fn test_filetypes_in_registration_order() {
        let mut registry = PluginRegistry::new();
        registry.register(plugin(10, "data", Some(vec![".yml".into()]), ".yml"));
        registry.register(plugin(10, "data", Some(vec![".json".into()]), ".json"));
        registry.register(plugin(0, "unknown", None, "*"));

        assert_eq!(registry.filetypes(), vec!["data", "unknown"]);
    }
}

//! Watch sessions: filesystem events in, context lifecycle events out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::config::{ContexterConfig, WatchOptions};
use crate::error::{ContexterError, Result};
use crate::event::{FileEvent, FileEventKind, SessionEvent};
use crate::file::{FileEntity, FileRef};
use crate::filetype::{
    DatafileBehavior, FileTypeBehavior, GenericBehavior, LayeredBehavior, COMMON_BEHAVIOR_KEY,
};
use crate::plugin::{Plugin, PluginRegistry, WatchFilter};
use crate::plugins::{DatafilePlugin, UnknownPlugin};
use crate::recipe;
use crate::tree::{ContextTree, SharedTree};

/// Floor for the settling poll interval, to avoid a busy loop.
const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(10);

/// Channel capacity for both filesystem and session events.
const CHANNEL_CAPACITY: usize = 1024;

/// Builds and maintains context trees over watched directories.
///
/// Register custom plugins with [`Contexter::use_plugin`] and custom
/// file-type behaviors with [`Contexter::extend`] before starting a
/// session with [`Contexter::watch`].
pub struct Contexter {
    config: ContexterConfig,
    registry: PluginRegistry,
    behaviors: BTreeMap<String, Arc<dyn FileTypeBehavior>>,
}

impl Contexter {
    /// Create a contexter with default configuration.
    pub fn new() -> Self {
        Self::with_config(ContexterConfig::default())
    }

    /// Create a contexter with the given configuration.
    ///
    /// The default data-file plugin and the mandatory catch-all are
    /// pre-registered, along with their file-type behaviors.
    pub fn with_config(config: ContexterConfig) -> Self {
        let mut registry = PluginRegistry::new();
        registry.register(Arc::new(DatafilePlugin));
        registry.register(Arc::new(UnknownPlugin));

        let mut behaviors: BTreeMap<String, Arc<dyn FileTypeBehavior>> = BTreeMap::new();
        behaviors.insert("datafile".to_string(), Arc::new(DatafileBehavior));
        behaviors.insert("unknown".to_string(), Arc::new(GenericBehavior));

        Self {
            config,
            registry,
            behaviors,
        }
    }

    /// Register a behavior for a file type.
    ///
    /// The special `"file"` key supplies a behavior common to all custom
    /// types, used when a type has no behavior of its own.
    pub fn extend(&mut self, filetype: impl Into<String>, behavior: Arc<dyn FileTypeBehavior>) {
        self.behaviors.insert(filetype.into(), behavior);
    }

    /// Register a custom plugin.
    ///
    /// Later registrations shadow earlier ones of the same priority, so
    /// the built-in defaults act as fallbacks.
    pub fn use_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        self.registry.register(plugin);
    }

    /// The plugin registry for this contexter.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Start watching a source directory.
    ///
    /// Spawns the session task: an initial scan of existing files, a
    /// settling phase that ends with a single `Ready` emission, then
    /// realtime event processing until the session is dropped.
    pub fn watch(&self, source_dir: impl AsRef<Path>, options: WatchOptions) -> Result<WatchSession> {
        let source_dir = source_dir.as_ref();

        if !source_dir.exists() {
            return Err(ContexterError::SourceNotFound(
                source_dir.display().to_string(),
            ));
        }
        if !source_dir.is_dir() {
            return Err(ContexterError::NotADirectory(
                source_dir.display().to_string(),
            ));
        }

        let source_dir = std::fs::canonicalize(source_dir)?;

        let root_key = match self.config.root_override() {
            Some(root) => root.to_string(),
            None => source_dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "root".to_string()),
        };

        // Every declared type exposes a collection before any file of
        // that type exists.
        let mut filetypes = self.registry.filetypes();
        for name in self.behaviors.keys() {
            if name != COMMON_BEHAVIOR_KEY && !filetypes.contains(name) {
                filetypes.push(name.clone());
            }
        }

        let tree: SharedTree = Arc::new(RwLock::new(ContextTree::new(root_key, filetypes)));
        let filter = self.registry.watch_filter(self.config.watch_all)?;

        let (fs_tx, fs_rx) = mpsc::channel::<FileEvent>(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let kind = FileEventKind::from(event.kind);

                    for path in event.paths {
                        let file_event = FileEvent::new(kind, &path);
                        if fs_tx.blocking_send(file_event).is_err() {
                            debug!("session closed; dropping watch event");
                        }
                    }
                }
                Err(e) => {
                    error!("watch error: {e}");
                }
            },
        )?;
        watcher.watch(&source_dir, RecursiveMode::Recursive)?;
        info!("watching {}", source_dir.display());

        let worker = SessionWorker {
            source_dir,
            registry: self.registry.clone(),
            behaviors: self.behaviors.clone(),
            config: self.config.clone(),
            options,
            filter,
            plugin_config: Arc::new(self.config.plugin_config.clone()),
            tree: tree.clone(),
            files: Vec::new(),
            emitter: event_tx,
            fs_rx,
        };

        let handle = tokio::spawn(worker.run());

        Ok(WatchSession {
            events: event_rx,
            tree,
            handle,
            _watcher: watcher,
        })
    }
}

impl Default for Contexter {
    fn default() -> Self {
        Self::new()
    }
}

/// A running watch session.
///
/// Dropping the session stops the underlying filesystem watcher; the
/// session task then drains and exits.
pub struct WatchSession {
    events: mpsc::Receiver<SessionEvent>,
    tree: SharedTree,
    handle: JoinHandle<Result<()>>,
    _watcher: RecommendedWatcher,
}

impl WatchSession {
    /// Receive the next lifecycle event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Drain events until the context settles, returning the tree.
    pub async fn wait_ready(&mut self) -> Result<SharedTree> {
        while let Some(event) = self.next_event().await {
            if let SessionEvent::Ready(tree) = event {
                return Ok(tree);
            }
        }

        Err(ContexterError::SessionClosed)
    }

    /// The shared context tree.
    pub fn tree(&self) -> SharedTree {
        self.tree.clone()
    }

    /// Stop the session.
    pub fn stop(self) {
        self.handle.abort();
    }
}

/// The single event-processing task of a session.
///
/// All tree mutation happens here; the notify callback thread only
/// forwards events into the channel.
struct SessionWorker {
    source_dir: PathBuf,
    registry: PluginRegistry,
    behaviors: BTreeMap<String, Arc<dyn FileTypeBehavior>>,
    config: ContexterConfig,
    options: WatchOptions,
    filter: Option<WatchFilter>,
    plugin_config: Arc<serde_json::Map<String, Value>>,
    tree: SharedTree,
    files: Vec<FileRef>,
    emitter: mpsc::Sender<SessionEvent>,
    fs_rx: mpsc::Receiver<FileEvent>,
}

impl SessionWorker {
    async fn run(mut self) -> Result<()> {
        if !self.emit(SessionEvent::Started(self.tree.clone())).await {
            return Ok(());
        }

        self.scan().await?;
        self.settle().await;

        while let Some(event) = self.fs_rx.recv().await {
            if let Err(err) = self.dispatch(event).await {
                error!("watch event handling failed: {err}");
                return Err(err);
            }
            if self.emitter.is_closed() {
                break;
            }
        }

        Ok(())
    }

    /// Enumerate existing files under the source directory.
    async fn scan(&mut self) -> Result<()> {
        let walker = WalkDir::new(&self.source_dir).follow_links(self.options.follow_symlinks);
        let mut added = 0usize;

        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path().to_path_buf();
            if self.options.should_ignore(&path) {
                continue;
            }

            self.add_file(path).await?;
            added += 1;
        }

        info!(
            "initial scan complete: {added} files under {}",
            self.source_dir.display()
        );
        Ok(())
    }

    async fn dispatch(&mut self, event: FileEvent) -> Result<()> {
        match event.kind {
            FileEventKind::Created | FileEventKind::RenamedTo => {
                if !self.accepts(&event.path) {
                    return Ok(());
                }
                match self.find_file(&event.path).await {
                    Some(file) => self.update_file(file).await,
                    None => self.add_file(event.path).await,
                }
            }
            FileEventKind::Modified => {
                match self.find_file(&event.path).await {
                    // A modify can race ahead of the unlink event for the
                    // same path; let the pending delete handle it.
                    Some(_) if !event.path.exists() => Ok(()),
                    Some(file) => self.update_file(file).await,
                    // A change for an untracked file, e.g. created while
                    // the initial scan was still running.
                    None if self.accepts(&event.path) => self.add_file(event.path).await,
                    None => Ok(()),
                }
            }
            FileEventKind::Deleted | FileEventKind::RenamedFrom => {
                self.delete_file(&event.path).await
            }
            FileEventKind::Other => Ok(()),
        }
    }

    /// Whether a path is eligible for tracking.
    ///
    /// The watch filter restricts which new files the realtime
    /// subscription picks up; already-tracked files bypass it so updates
    /// and deletes stay consistent with the initial scan.
    fn accepts(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        if self.options.should_ignore(path) {
            return false;
        }
        if let Some(ref filter) = self.filter {
            if !filter.matches(path) {
                return false;
            }
        }
        true
    }

    async fn add_file(&mut self, path: PathBuf) -> Result<()> {
        let (plugin, target_ext) = self.registry.resolve(&path)?;
        let behavior = self.behavior_for(plugin.filetype());

        let file = {
            let tree = self.tree.read().await;
            tree.new_entity(
                &path,
                &self.source_dir,
                plugin,
                behavior,
                target_ext,
                self.plugin_config.clone(),
            )
            .await?
        };

        {
            let mut tree = self.tree.write().await;
            recipe::contextualize_do(&file, &mut tree).await;
        }

        self.files.push(file.clone());
        debug!(path = %path.display(), "adding file");
        self.emit(SessionEvent::Adding(file)).await;
        Ok(())
    }

    async fn update_file(&mut self, file: FileRef) -> Result<()> {
        FileEntity::squeeze(&file).await?;
        self.emit(SessionEvent::Updating(file)).await;
        Ok(())
    }

    async fn delete_file(&mut self, path: &Path) -> Result<()> {
        let Some(index) = self.find_index(path).await else {
            return Ok(());
        };
        let file = self.files.remove(index);

        {
            let mut tree = self.tree.write().await;
            recipe::contextualize_undo(&file, &mut tree).await;
        }

        debug!(path = %path.display(), "deleting file");
        self.emit(SessionEvent::Deleting(file)).await;
        Ok(())
    }

    /// Poll until every tracked file has finished extracting, then emit
    /// a single `Ready`.
    ///
    /// Polling, not event counting: asynchronous plugin completion is a
    /// black box with no cross-entity coordination primitive.
    async fn settle(&mut self) {
        let reporting = self.config.report_interval.is_some();
        let delay = self
            .config
            .report_interval
            .unwrap_or(MIN_REPORT_INTERVAL)
            .max(MIN_REPORT_INTERVAL);

        if !reporting {
            // Report the full set at least once before polling silently.
            if !self
                .emit(SessionEvent::Contexting(self.files.clone()))
                .await
            {
                return;
            }
        }

        let mut ticker = tokio::time::interval(delay);
        loop {
            ticker.tick().await;

            let mut pending = Vec::new();
            for file in &self.files {
                if !file.read().await.squeezed {
                    pending.push(file.clone());
                }
            }

            if reporting && !self.emit(SessionEvent::Contexting(pending.clone())).await {
                return;
            }
            if pending.is_empty() {
                break;
            }
        }

        // Reset flags so the next settling cycle re-observes completion
        // instead of trusting stale state.
        for file in &self.files {
            file.write().await.squeezed = false;
        }

        info!("context ready: {} files tracked", self.files.len());
        self.emit(SessionEvent::Ready(self.tree.clone())).await;
    }

    /// Compose the behavior layers for a file type: the specific type's
    /// overrides over the common `"file"` bundle, each seam resolved
    /// independently.
    fn behavior_for(&self, filetype: &str) -> Arc<dyn FileTypeBehavior> {
        Arc::new(LayeredBehavior::new(
            self.behaviors.get(filetype).cloned(),
            self.behaviors.get(COMMON_BEHAVIOR_KEY).cloned(),
        ))
    }

    async fn find_file(&self, path: &Path) -> Option<FileRef> {
        let index = self.find_index(path).await?;
        Some(self.files[index].clone())
    }

    async fn find_index(&self, path: &Path) -> Option<usize> {
        for (index, file) in self.files.iter().enumerate() {
            if file.read().await.path.full == path {
                return Some(index);
            }
        }
        None
    }

    async fn emit(&self, event: SessionEvent) -> bool {
        debug!(event = event.name(), "emitting session event");
        self.emitter.send(event).await.is_ok()
    }
}

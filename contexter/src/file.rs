//! File entities: the per-path tracked objects of a context.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::error;

use crate::error::Result;
use crate::filetype::{pluralize, FileTypeBehavior};
use crate::plugin::Plugin;
use crate::recipe::Recipe;

/// Shared handle to a file entity.
///
/// The session owns the entity; the context tree and its type collections
/// hold references to the same allocation.
pub type FileRef = Arc<RwLock<FileEntity>>;

/// Decomposition of a file's path relative to its source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePath {
    /// Absolute path to the file.
    pub full: PathBuf,

    /// Path relative to the source root, with a leading slash
    /// (e.g. `/assets/posts.yml`).
    pub relative: String,

    /// Path relative to the process working directory.
    pub process_relative: PathBuf,

    /// Directory component of the relative path (`/assets`, or `/` for
    /// files directly under the root).
    pub dir: String,

    /// Base filename including extension.
    pub base: String,

    /// Extension with leading dot, empty for extensionless files.
    pub ext: String,

    /// Filename without extension.
    pub stem: String,
}

impl FilePath {
    /// Decompose a path against its source directory.
    pub fn new(full: impl Into<PathBuf>, source_dir: &Path) -> Self {
        let full: PathBuf = full.into();

        let relative = match full.strip_prefix(source_dir) {
            Ok(rel) => format!("/{}", rel.to_string_lossy().replace('\\', "/")),
            Err(_) => full.to_string_lossy().replace('\\', "/"),
        };

        let (dir, base) = match relative.rfind('/') {
            Some(0) => ("/".to_string(), relative[1..].to_string()),
            Some(idx) => (relative[..idx].to_string(), relative[idx + 1..].to_string()),
            None => (String::new(), relative.clone()),
        };

        let ext = Path::new(&base)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let stem = Path::new(&base)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| base.clone());

        let process_relative = std::env::current_dir()
            .ok()
            .and_then(|cwd| pathdiff::diff_paths(&full, &cwd))
            .unwrap_or_else(|| full.clone());

        Self {
            full,
            relative,
            process_relative,
            dir,
            base,
            ext,
            stem,
        }
    }

    /// Directory segments for the tree mirror, with the first (empty)
    /// segment of the relative dir replaced by the root key.
    pub fn dir_segments(&self, root_key: &str) -> Vec<String> {
        let mut segments = vec![root_key.to_string()];
        segments.extend(self.dir.split('/').filter(|s| !s.is_empty()).map(String::from));
        segments
    }
}

/// Filesystem metadata gathered at squeeze time.
#[derive(Debug, Clone)]
pub struct FileStats {
    /// File size in bytes.
    pub size: u64,

    /// When the file was last modified.
    pub modified: Option<DateTime<Utc>>,

    /// When the metadata was gathered.
    pub gathered_at: DateTime<Utc>,
}

impl FileStats {
    /// Gather metadata for a path.
    pub fn gather(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;

        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            gathered_at: Utc::now(),
        })
    }
}

/// One tracked file of a watch session.
///
/// Constructed on an add event, re-squeezed on change events, and unlinked
/// through its recipe on delete events.
pub struct FileEntity {
    /// Path decomposition.
    pub path: FilePath,

    /// The source directory this file was found under.
    pub source_dir: PathBuf,

    /// Tree-mirror root key (source dir basename or configured override).
    pub root: String,

    /// Resolved file type name.
    pub filetype: String,

    /// Pluralized type-collection name.
    pub collection: String,

    /// Target extension resolved by the owning plugin's check.
    pub target_ext: String,

    /// Raw input, filled by behaviors that read the file up front.
    pub input: Option<String>,

    /// Generic parse output slot.
    pub output: Option<Value>,

    /// Type-specific data slot (used by data-file types).
    pub data: Option<Value>,

    /// Filesystem metadata from the last squeeze.
    pub stats: Option<FileStats>,

    /// Whether content extraction has completed.
    pub squeezed: bool,

    /// Whether the owning plugin completes its parse asynchronously.
    pub plugin_async: bool,

    /// Whether the owning plugin supplies a render capability. Advisory.
    pub renderable: bool,

    /// Pass-through plugin configuration for this session.
    pub plugin_config: Arc<serde_json::Map<String, Value>>,

    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) behavior: Arc<dyn FileTypeBehavior>,
    pub(crate) recipe: Recipe,
}

impl FileEntity {
    /// Construct and initialize an entity for a resolved plugin.
    ///
    /// Builds the contextualization recipe but does not run it; the first
    /// squeeze is performed separately by [`FileEntity::squeeze`].
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        filename: &Path,
        source_dir: &Path,
        root: String,
        plugin: Arc<dyn Plugin>,
        behavior: Arc<dyn FileTypeBehavior>,
        target_ext: String,
        plugin_config: Arc<serde_json::Map<String, Value>>,
    ) -> Self {
        let filetype = plugin.filetype().to_string();
        let collection = pluralize(&filetype);
        let renderable = plugin.provides_render();
        let plugin_async = plugin.is_async();

        Self {
            path: FilePath::new(filename, source_dir),
            source_dir: source_dir.to_path_buf(),
            root,
            filetype,
            collection,
            target_ext,
            input: None,
            output: None,
            data: None,
            stats: None,
            squeezed: false,
            plugin_async,
            renderable,
            plugin_config,
            plugin,
            behavior,
            recipe: Recipe::standard(),
        }
    }

    /// Key under which this entity is indexed in its type collection.
    pub fn key_name(&self) -> &str {
        &self.path.relative
    }

    /// (Re)run content extraction for a tracked file.
    ///
    /// Clears the completion flag, gathers filesystem metadata, runs the
    /// behavior's read step, then the plugin's parse if it provides one.
    /// The flag is set before returning unless the plugin is asynchronous,
    /// in which case the spawned completion task sets it. A change event
    /// arriving while an asynchronous parse is still in flight re-enters
    /// here; whichever completion lands last wins the flag.
    pub(crate) async fn squeeze(file: &FileRef) -> Result<()> {
        let (plugin, behavior) = {
            let mut entity = file.write().await;
            entity.squeezed = false;
            entity.stats = Some(FileStats::gather(&entity.path.full)?);
            (entity.plugin.clone(), entity.behavior.clone())
        };

        {
            let mut entity = file.write().await;
            behavior.read(&mut entity)?;
        }

        if !plugin.provides_parse() {
            file.write().await.squeezed = true;
            return Ok(());
        }

        if plugin.is_async() {
            let file = file.clone();
            tokio::spawn(async move {
                let result = plugin.parse(&file).await;
                let mut entity = file.write().await;
                match behavior.parse_complete(&mut entity, result) {
                    Ok(()) => entity.squeezed = true,
                    Err(err) => {
                        // The entity never completes; settling will stall.
                        error!(path = %entity.path.relative, "asynchronous parse failed: {err}");
                    }
                }
            });
        } else {
            let result = plugin.parse(file).await;
            let mut entity = file.write().await;
            behavior.parse_complete(&mut entity, result)?;
            entity.squeezed = true;
        }

        Ok(())
    }
}

impl fmt::Debug for FileEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntity")
            .field("path", &self.path.relative)
            .field("filetype", &self.filetype)
            .field("collection", &self.collection)
            .field("squeezed", &self.squeezed)
            .field("renderable", &self.renderable)
            .finish_non_exhaustive()
    }
}

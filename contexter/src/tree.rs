//! The context tree: a nested mirror of the source directory plus
//! per-type collections of file entities.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::file::{FileEntity, FileRef};
use crate::filetype::{pluralize, FileTypeBehavior};
use crate::plugin::Plugin;

/// Shared handle to a session's context tree.
pub type SharedTree = Arc<RwLock<ContextTree>>;

/// One node of the tree mirror: a nested directory mapping or a file.
#[derive(Debug, Clone)]
pub enum TreeNode {
    /// A directory, keyed by child name.
    Directory(BTreeMap<String, TreeNode>),

    /// A tracked file.
    File(FileRef),
}

impl TreeNode {
    /// Create an empty directory node.
    pub fn directory() -> Self {
        Self::Directory(BTreeMap::new())
    }

    /// The file reference, if this node is a file.
    pub fn as_file(&self) -> Option<&FileRef> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }

    /// The children mapping, if this node is a directory.
    pub fn as_directory(&self) -> Option<&BTreeMap<String, TreeNode>> {
        match self {
            Self::Directory(children) => Some(children),
            Self::File(_) => None,
        }
    }
}

/// A per-type collection of file entities.
///
/// Simultaneously an ordered sequence (insertion order) and a lookup from
/// each file's path-relative key to the same entity.
#[derive(Debug, Clone, Default)]
pub struct TypeCollection {
    entries: Vec<FileRef>,
    by_key: HashMap<String, FileRef>,
}

impl TypeCollection {
    /// Append an entity and index it under its key.
    pub(crate) fn insert(&mut self, key: String, file: FileRef) {
        self.entries.push(file.clone());
        self.by_key.insert(key, file);
    }

    /// Remove the entity indexed under `key` from both views.
    pub(crate) fn remove(&mut self, key: &str) {
        if let Some(removed) = self.by_key.remove(key) {
            self.entries.retain(|f| !Arc::ptr_eq(f, &removed));
        }
    }

    /// Look up an entity by its path-relative key.
    pub fn get(&self, key: &str) -> Option<&FileRef> {
        self.by_key.get(key)
    }

    /// Iterate entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRef> {
        self.entries.iter()
    }

    /// Number of entities in the collection.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The root aggregate of a watch session.
///
/// Mutated only through recipe apply/revert; created once per session.
#[derive(Debug)]
pub struct ContextTree {
    root_key: String,
    nodes: BTreeMap<String, TreeNode>,
    collections: BTreeMap<String, TypeCollection>,
}

impl ContextTree {
    /// Create a tree for the given root key, pre-seeding an empty
    /// collection for every known file type so each declared type exposes
    /// a collection before any file of that type exists.
    pub fn new(root_key: impl Into<String>, filetypes: impl IntoIterator<Item = String>) -> Self {
        let mut collections = BTreeMap::new();
        for filetype in filetypes {
            collections.insert(pluralize(&filetype), TypeCollection::default());
        }

        Self {
            root_key: root_key.into(),
            nodes: BTreeMap::new(),
            collections,
        }
    }

    /// The tree-mirror root key.
    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    /// Construct and initialize a file entity against this tree.
    ///
    /// Builds the entity's recipe and performs its first squeeze. The
    /// recipe is not applied here; that is the caller's next move.
    #[allow(clippy::too_many_arguments)]
    pub async fn new_entity(
        &self,
        filename: &Path,
        source_dir: &Path,
        plugin: Arc<dyn Plugin>,
        behavior: Arc<dyn FileTypeBehavior>,
        target_ext: String,
        plugin_config: Arc<serde_json::Map<String, Value>>,
    ) -> Result<FileRef> {
        let entity = FileEntity::new(
            filename,
            source_dir,
            self.root_key.clone(),
            plugin,
            behavior,
            target_ext,
            plugin_config,
        );

        let file: FileRef = Arc::new(RwLock::new(entity));
        FileEntity::squeeze(&file).await?;

        Ok(file)
    }

    /// Walk the tree mirror to a node.
    pub fn node_at(&self, segments: &[&str]) -> Option<&TreeNode> {
        let (first, rest) = segments.split_first()?;
        let mut node = self.nodes.get(*first)?;

        for segment in rest {
            node = node.as_directory()?.get(*segment)?;
        }

        Some(node)
    }

    /// Walk the tree mirror to a file entity.
    pub fn file_at(&self, segments: &[&str]) -> Option<FileRef> {
        self.node_at(segments)?.as_file().cloned()
    }

    /// A type collection by its pluralized name.
    pub fn collection(&self, name: &str) -> Option<&TypeCollection> {
        self.collections.get(name)
    }

    /// Names of all type collections.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut BTreeMap<String, TreeNode> {
        &mut self.nodes
    }

    pub(crate) fn collection_entry(&mut self, name: &str) -> &mut TypeCollection {
        self.collections.entry(name.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collections_pre_seeded() {
        let tree = ContextTree::new(
            "site",
            vec!["datafile".to_string(), "unknown".to_string(), "image".to_string()],
        );

        assert!(tree.collection("datafiles").is_some());
        assert!(tree.collection("unknowns").is_some());
        assert!(tree.collection("images").is_some());
        assert!(tree.collection("datafiles").is_some_and(TypeCollection::is_empty));
        assert!(tree.collection("stylesheets").is_none());
    }

    #[test]
    fn test_empty_tree_lookup() {
        let tree = ContextTree::new("site", vec![]);

        assert!(tree.node_at(&["site"]).is_none());
        assert!(tree.file_at(&["site", "a.yml"]).is_none());
        assert_eq!(tree.root_key(), "site");
    }
}

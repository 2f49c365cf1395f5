//! Default plugin for structured data files (JSON and YAML).

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ContexterError, Result};
use crate::file::FileRef;
use crate::plugin::{CheckOutcome, Plugin};

const WATCH_EXTENSIONS: [&str; 3] = [".json", ".yml", ".yaml"];

/// Classifies and parses structured data files.
///
/// Parsing happens straight from disk; the datafile behavior skips the
/// read step and routes the parsed value into the entity's `data` slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatafilePlugin;

#[async_trait]
impl Plugin for DatafilePlugin {
    fn priority(&self) -> i32 {
        10
    }

    fn filetype(&self) -> &str {
        "datafile"
    }

    fn watch_extensions(&self) -> Option<Vec<String>> {
        Some(WATCH_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }

    fn check(&self, filename: &Path) -> Result<CheckOutcome> {
        let extension = filename
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        if WATCH_EXTENSIONS.contains(&extension.as_str()) {
            Ok(CheckOutcome::Accept)
        } else {
            Ok(CheckOutcome::Reject)
        }
    }

    fn provides_parse(&self) -> bool {
        true
    }

    async fn parse(&self, file: &FileRef) -> Result<Option<Value>> {
        let (path, ext) = {
            let entity = file.read().await;
            (entity.path.full.clone(), entity.path.ext.to_lowercase())
        };

        let text = tokio::fs::read_to_string(&path).await?;

        let value = match ext.as_str() {
            ".json" => serde_json::from_str(&text).map_err(|err| ContexterError::Parse {
                path: path.display().to_string(),
                message: err.to_string(),
            })?,
            ".yml" | ".yaml" => serde_yaml::from_str(&text).map_err(|err| ContexterError::Parse {
                path: path.display().to_string(),
                message: err.to_string(),
            })?,
            _ => return Ok(None),
        };

        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::RwLock;

    use crate::file::FileEntity;
    use crate::filetype::DatafileBehavior;

    fn entity_for(path: &Path, dir: &Path) -> FileRef {
        Arc::new(RwLock::new(FileEntity::new(
            path,
            dir,
            "root".to_string(),
            Arc::new(DatafilePlugin),
            Arc::new(DatafileBehavior),
            ".yml".to_string(),
            Arc::new(serde_json::Map::new()),
        )))
    }

    #[test]
    fn test_check_by_extension() {
        let plugin = DatafilePlugin;

        assert_eq!(
            plugin.check(Path::new("/a/posts.yml")).unwrap(),
            CheckOutcome::Accept
        );
        assert_eq!(
            plugin.check(Path::new("/a/config.JSON")).unwrap(),
            CheckOutcome::Accept
        );
        assert_eq!(
            plugin.check(Path::new("/a/photo.png")).unwrap(),
            CheckOutcome::Reject
        );
        assert_eq!(
            plugin.check(Path::new("/a/CNAME")).unwrap(),
            CheckOutcome::Reject
        );
    }

    #[tokio::test]
    async fn test_parse_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("posts.yml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "foo: bar").unwrap();

        let file = entity_for(&path, temp_dir.path());
        let value = DatafilePlugin.parse(&file).await.unwrap().unwrap();

        assert_eq!(value["foo"], Value::String("bar".to_string()));
    }

    #[tokio::test]
    async fn test_parse_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{"count": 3}"#).unwrap();

        let file = entity_for(&path, temp_dir.path());
        let value = DatafilePlugin.parse(&file).await.unwrap().unwrap();

        assert_eq!(value["count"], Value::from(3));
    }

    #[tokio::test]
    async fn test_parse_invalid_yaml_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yml");
        std::fs::write(&path, "foo: [unclosed").unwrap();

        let file = entity_for(&path, temp_dir.path());
        let result = DatafilePlugin.parse(&file).await;

        assert!(matches!(result, Err(ContexterError::Parse { .. })));
    }
}

//! File-type behaviors: type-wide specializations of the generic file
//! lifecycle, resolved once at entity construction time.

use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::file::FileEntity;

/// Key under which a behavior common to all custom types is registered.
///
/// When a type has no behavior of its own, the `"file"` behavior (if
/// registered) is used before falling back to the generic default.
pub const COMMON_BEHAVIOR_KEY: &str = "file";

/// Type-wide overrides of the generic file behavior.
///
/// The two seams mirror the generic lifecycle: `read` runs during squeeze
/// before the plugin's parse, and `parse_complete` receives the parse
/// result (or error) and decides where it lands on the entity.
///
/// Each seam comes with a `provides_*` declaration so behaviors compose:
/// a behavior that only declares one seam leaves the other to the layer
/// beneath it (see [`LayeredBehavior`]).
pub trait FileTypeBehavior: Send + Sync {
    /// Whether this behavior overrides the read step.
    fn provides_read(&self) -> bool {
        false
    }

    /// Fill the entity's raw input before parsing.
    ///
    /// The default reads nothing. Types that parse straight from disk
    /// inside their plugin (data files, binary assets) keep the default;
    /// text-oriented types override this to populate `input`.
    fn read(&self, file: &mut FileEntity) -> Result<()> {
        let _ = file;
        Ok(())
    }

    /// Whether this behavior overrides parse completion.
    fn provides_parse_complete(&self) -> bool {
        false
    }

    /// Handle a completed parse.
    ///
    /// The default propagates errors (fatal for the affected operation)
    /// and assigns a successful payload to the generic `output` slot.
    /// Overrides may recover from errors or route the payload elsewhere.
    fn parse_complete(&self, file: &mut FileEntity, result: Result<Option<Value>>) -> Result<()> {
        file.output = result?;
        Ok(())
    }
}

/// Per-seam delegation through behavior layers.
///
/// The specific type's overrides sit on top of the common `"file"`
/// bundle, which sits on top of the generic defaults. Each seam is
/// resolved independently: a type that only overrides `parse_complete`
/// still inherits the common bundle's `read`.
pub struct LayeredBehavior {
    specific: Option<Arc<dyn FileTypeBehavior>>,
    common: Option<Arc<dyn FileTypeBehavior>>,
}

impl LayeredBehavior {
    /// Compose a specific type's behavior over the common bundle.
    pub fn new(
        specific: Option<Arc<dyn FileTypeBehavior>>,
        common: Option<Arc<dyn FileTypeBehavior>>,
    ) -> Self {
        Self { specific, common }
    }

    fn layers(&self) -> impl Iterator<Item = &dyn FileTypeBehavior> {
        self.specific.as_deref().into_iter().chain(self.common.as_deref())
    }
}

impl FileTypeBehavior for LayeredBehavior {
    fn provides_read(&self) -> bool {
        self.layers().any(FileTypeBehavior::provides_read)
    }

    fn read(&self, file: &mut FileEntity) -> Result<()> {
        match self.layers().find(|b| b.provides_read()) {
            Some(behavior) => behavior.read(file),
            None => Ok(()),
        }
    }

    fn provides_parse_complete(&self) -> bool {
        self.layers().any(FileTypeBehavior::provides_parse_complete)
    }

    fn parse_complete(&self, file: &mut FileEntity, result: Result<Option<Value>>) -> Result<()> {
        match self.layers().find(|b| b.provides_parse_complete()) {
            Some(behavior) => behavior.parse_complete(file, result),
            None => {
                file.output = result?;
                Ok(())
            }
        }
    }
}

/// The generic file behavior: no read, output slot, fatal errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericBehavior;

impl FileTypeBehavior for GenericBehavior {}

/// Behavior for data-file types.
///
/// Data files are not read up front; their plugin parses straight from
/// disk. Parse results land in the `data` slot instead of `output`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatafileBehavior;

impl FileTypeBehavior for DatafileBehavior {
    fn provides_parse_complete(&self) -> bool {
        true
    }

    fn parse_complete(&self, file: &mut FileEntity, result: Result<Option<Value>>) -> Result<()> {
        file.data = result?;
        Ok(())
    }
}

/// Pluralize a file type name into its collection name.
///
/// Covers the regular English forms type names actually take
/// (`datafile` -> `datafiles`, `entry` -> `entries`).
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();

    if lower.ends_with('s')
        || lower.ends_with('x')
        || lower.ends_with('z')
        || lower.ends_with("ch")
        || lower.ends_with("sh")
    {
        format!("{lower}es")
    } else if lower.ends_with('y')
        && !lower
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{lower}s")
    }
}

//! The mandatory catch-all plugin.

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::plugin::{CheckOutcome, Plugin, CATCH_ALL_FILETYPE};

/// Lowest-priority plugin that accepts every file.
///
/// Guarantees classification never fails. Performs no read and no parse;
/// matched files carry only path metadata and filesystem stats.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownPlugin;

#[async_trait]
impl Plugin for UnknownPlugin {
    fn filetype(&self) -> &str {
        CATCH_ALL_FILETYPE
    }

    fn check(&self, _filename: &Path) -> Result<CheckOutcome> {
        Ok(CheckOutcome::Accept)
    }
}

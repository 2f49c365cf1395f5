//! Built-in default plugins.
//!
//! Every session gets the data-file plugin and the mandatory catch-all
//! registered up front; custom plugins registered later shadow them.

mod datafile;
mod unknown;

pub use datafile::DatafilePlugin;
pub use unknown::UnknownPlugin;

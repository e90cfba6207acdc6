use std::fmt::Debug;
use std::path::Path;

use crate::kernel::error::Result;

/// Backing files of the persisted plugin config
pub trait StorageProvider: Send + Sync + Debug {
    fn exists(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Replace the file at `path` in one step, creating parent folders.
    /// Readers see either the old or the new content, never a partial write.
    fn write_string(&self, path: &Path, contents: &str) -> Result<()>;
}

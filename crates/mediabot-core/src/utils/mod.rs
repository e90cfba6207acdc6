//! Small filesystem helpers shared by the plugin loader and installer.
pub mod fs;

pub use fs::{copy_dir_all, find_file, find_files, move_dir};

#[cfg(test)]
mod tests;

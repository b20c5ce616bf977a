//! Configuration trees on disk and in memory.

use std::fs;
use std::path::{Path, PathBuf};

use cueconfig_fs::{DirFs, MemFs};
use tempfile::TempDir;

/// A temporary directory holding configuration sources.
///
/// # Example
///
/// ```rust
/// use cueconfig_test_utils::ConfigDir;
///
/// let dir = ConfigDir::new()
///     .with_file("app.cue", "port: 80")
///     .with_file("conf/extra.cue", "debug: true");
/// assert!(dir.path("conf/extra.cue").exists());
/// ```
pub struct ConfigDir {
    temp_dir: TempDir,
}

impl Default for ConfigDir {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigDir {
    /// Create an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    /// Copy every file below `fixture` into a new temporary directory.
    ///
    /// # Panics
    /// Panics if `fixture` cannot be read.
    pub fn from_fixture(fixture: &Path) -> Self {
        let dir = Self::new();
        copy_tree(fixture, dir.root());
        dir
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Absolute path of `relative` inside the directory.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Write `content` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!("ConfigDir::write: cannot create {}: {e}", parent.display())
            });
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("ConfigDir::write: cannot write {}: {e}", path.display()));
    }

    pub fn with_file(self, relative: &str, content: impl AsRef<[u8]>) -> Self {
        self.write(relative, content);
        self
    }

    /// The directory as a [`DirFs`].
    pub fn fs(&self) -> DirFs {
        DirFs::new(self.root())
    }
}

/// An in-memory filesystem holding `files`.
pub fn mem_fs(files: &[(&str, &str)]) -> MemFs {
    files.iter().copied().collect()
}

fn copy_tree(from: &Path, to: &Path) {
    let entries = fs::read_dir(from)
        .unwrap_or_else(|e| panic!("copy_tree: cannot read {}: {e}", from.display()));
    for entry in entries {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            fs::create_dir_all(&target).unwrap();
            copy_tree(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

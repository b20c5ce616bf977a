//! A [`FileSystem`] rooted at a directory on disk

use std::fs;
use std::path::{Path, PathBuf};

use crate::{DirEntry, Error, FileKind, FileSystem, NormalizedPath, Result};

/// An OS directory exposed as a [`FileSystem`].
///
/// Paths are interpreted relative to the root. Absolute paths are rejected
/// and `..` components are folded away by [`NormalizedPath`], so nothing
/// outside the root is reachable.
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    /// Expose `root` as-is. The directory does not need to exist yet;
    /// operations on a missing root report [`Error::NotFound`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Expose the canonical form of `root`, resolving symlinks in the root
    /// itself.
    pub fn canonical(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = dunce::canonicalize(root).map_err(|e| Error::io(root, e))?;
        Ok(Self { root })
    }

    /// The directory this filesystem is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &NormalizedPath) -> Result<PathBuf> {
        if path.is_absolute() {
            return Err(Error::invalid_path(
                path.as_str(),
                "paths must be relative to the filesystem root",
            ));
        }
        let mut native = self.root.clone();
        for component in path.components() {
            native.push(component);
        }
        Ok(native)
    }

    fn walk_dir(&self, dir: &Path, rel: &NormalizedPath, out: &mut Vec<DirEntry>) -> Result<()> {
        let mut entries = fs::read_dir(dir)
            .map_err(|e| Error::io(dir, e))?
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| Error::io(dir, e))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let entry_rel = rel.join(name.as_ref());
            // file_type() does not follow symlinks
            let kind = FileKind::from(entry.file_type().map_err(|e| Error::io(entry.path(), e))?);
            out.push(DirEntry::new(entry_rel.clone(), kind));
            if kind.is_dir() {
                self.walk_dir(&entry.path(), &entry_rel, out)?;
            }
        }
        Ok(())
    }
}

impl FileSystem for DirFs {
    fn stat(&self, path: &NormalizedPath) -> Result<FileKind> {
        let native = self.resolve(path)?;
        let metadata = fs::metadata(&native).map_err(|e| Error::io(&native, e))?;
        Ok(FileKind::from(metadata.file_type()))
    }

    fn walk(&self) -> Result<Vec<DirEntry>> {
        let mut out = Vec::new();
        self.walk_dir(&self.root, &NormalizedPath::current(), &mut out)?;
        tracing::trace!(root = ?self.root, entries = out.len(), "Walked directory");
        Ok(out)
    }

    fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        let native = self.resolve(path)?;
        fs::read(&native).map_err(|e| Error::io(&native, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_rejected() {
        let fs = DirFs::new(".");
        let err = fs.stat(&NormalizedPath::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[test]
    fn missing_root_reports_not_found() {
        let temp = tempfile::TempDir::new().unwrap();
        let fs = DirFs::new(temp.path().join("missing"));
        assert!(fs.walk().unwrap_err().is_not_found());
    }
}

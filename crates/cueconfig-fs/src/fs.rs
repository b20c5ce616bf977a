//! The filesystem capability consumed by source discovery

use crate::{NormalizedPath, Result};

/// The kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// A regular file
    File,
    /// A directory
    Dir,
    /// Anything else: symlinks, sockets, devices
    Other,
}

impl FileKind {
    pub fn is_file(self) -> bool {
        self == Self::File
    }

    pub fn is_dir(self) -> bool {
        self == Self::Dir
    }
}

impl From<std::fs::FileType> for FileKind {
    fn from(file_type: std::fs::FileType) -> Self {
        if file_type.is_file() {
            Self::File
        } else if file_type.is_dir() {
            Self::Dir
        } else {
            Self::Other
        }
    }
}

/// An entry yielded by [`FileSystem::walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Path relative to the filesystem root
    pub path: NormalizedPath,
    /// What the entry is; symlinks are reported as [`FileKind::Other`]
    pub kind: FileKind,
}

impl DirEntry {
    pub fn new(path: impl Into<NormalizedPath>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// A read-only tree of files addressed by paths relative to its root.
///
/// Implementations must report a missing path as
/// [`Error::NotFound`](crate::Error::NotFound) so callers can tell an absent
/// configuration apart from an unreadable one.
pub trait FileSystem {
    /// Report what lives at `path`.
    fn stat(&self, path: &NormalizedPath) -> Result<FileKind>;

    /// List every entry below the root, recursively, sorted by path.
    fn walk(&self) -> Result<Vec<DirEntry>>;

    /// Read the whole content of the file at `path`.
    fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>>;
}

impl<T: FileSystem + ?Sized> FileSystem for &T {
    fn stat(&self, path: &NormalizedPath) -> Result<FileKind> {
        (**self).stat(path)
    }

    fn walk(&self) -> Result<Vec<DirEntry>> {
        (**self).walk()
    }

    fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        (**self).read(path)
    }
}

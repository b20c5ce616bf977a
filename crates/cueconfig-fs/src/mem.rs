//! An in-memory [`FileSystem`]

use std::collections::{BTreeMap, BTreeSet};

use crate::{DirEntry, Error, FileKind, FileSystem, NormalizedPath, Result};

/// Files held in memory, keyed by normalized relative path.
///
/// Directories are implied by the files they contain; the root `.` always
/// exists. Useful for configuration embedded in a binary and for tests.
///
/// ```
/// use cueconfig_fs::{FileSystem, MemFs, NormalizedPath};
///
/// let fs = MemFs::new().with_file("cfg/app.cue", "foo: 1\n");
/// assert!(fs.stat(&NormalizedPath::new("cfg")).unwrap().is_dir());
/// assert_eq!(fs.read(&NormalizedPath::new("cfg/app.cue")).unwrap(), b"foo: 1\n");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemFs {
    files: BTreeMap<NormalizedPath, Vec<u8>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`MemFs::insert`].
    pub fn with_file(mut self, path: impl Into<NormalizedPath>, content: impl AsRef<[u8]>) -> Self {
        self.insert(path, content);
        self
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl Into<NormalizedPath>, content: impl AsRef<[u8]>) {
        self.files.insert(path.into(), content.as_ref().to_vec());
    }

    /// Remove a file, returning its content.
    pub fn remove(&mut self, path: &NormalizedPath) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn directories(&self) -> BTreeSet<NormalizedPath> {
        let mut dirs = BTreeSet::new();
        for path in self.files.keys() {
            let mut parent = path.parent();
            while let Some(dir) = parent {
                if dir.is_root() {
                    break;
                }
                parent = dir.parent();
                dirs.insert(dir);
            }
        }
        dirs
    }
}

impl<P, C> FromIterator<(P, C)> for MemFs
where
    P: Into<NormalizedPath>,
    C: AsRef<[u8]>,
{
    fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
        let mut fs = Self::new();
        for (path, content) in iter {
            fs.insert(path, content);
        }
        fs
    }
}

impl FileSystem for MemFs {
    fn stat(&self, path: &NormalizedPath) -> Result<FileKind> {
        if path.is_root() {
            return Ok(FileKind::Dir);
        }
        if self.files.contains_key(path) {
            return Ok(FileKind::File);
        }
        if self.files.keys().any(|file| file.strip_prefix(path).is_some()) {
            return Ok(FileKind::Dir);
        }
        Err(Error::NotFound {
            path: path.to_native(),
        })
    }

    fn walk(&self) -> Result<Vec<DirEntry>> {
        let mut entries: Vec<DirEntry> = self
            .directories()
            .into_iter()
            .map(|dir| DirEntry::new(dir, FileKind::Dir))
            .chain(
                self.files
                    .keys()
                    .map(|file| DirEntry::new(file.clone(), FileKind::File)),
            )
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&self, path: &NormalizedPath) -> Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| Error::NotFound {
            path: path.to_native(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_lists_implied_directories() {
        let fs: MemFs = [("a/b/c.cue", "x: 1"), ("top.cue", "y: 2")]
            .into_iter()
            .collect();
        let paths: Vec<_> = fs
            .walk()
            .unwrap()
            .into_iter()
            .map(|entry| (entry.path.as_str().to_string(), entry.kind))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("a".to_string(), FileKind::Dir),
                ("a/b".to_string(), FileKind::Dir),
                ("a/b/c.cue".to_string(), FileKind::File),
                ("top.cue".to_string(), FileKind::File),
            ]
        );
    }

    #[test]
    fn stat_missing_is_not_found() {
        let fs = MemFs::new().with_file("a.cue", "");
        assert!(fs.stat(&NormalizedPath::new("b.cue")).unwrap_err().is_not_found());
        assert!(fs.read(&NormalizedPath::new("b.cue")).unwrap_err().is_not_found());
    }

    #[test]
    fn root_always_exists() {
        let fs = MemFs::new();
        assert_eq!(fs.stat(&NormalizedPath::current()).unwrap(), FileKind::Dir);
    }
}

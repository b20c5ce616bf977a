//! Normalized path handling for source discovery and overlay keys

use std::path::{Path, PathBuf};

/// A lexically cleaned path using forward slashes internally.
///
/// Every path handed to a [`FileSystem`](crate::FileSystem) and every overlay
/// key goes through this type, so two spellings of the same location
/// (`a/./b.cue`, `a//b.cue`, `a\b.cue`) always compare equal.
///
/// Cleaning rules:
/// - backslashes become forward slashes
/// - empty and `.` components are dropped
/// - `..` removes the preceding component; at the start of a path it is
///   dropped, so a relative path can never climb above its base
/// - an empty relative path is `.`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedPath {
    /// Internal representation always uses forward slashes
    inner: String,
}

impl NormalizedPath {
    /// Create a new NormalizedPath from any path-like input.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path_str = path.as_ref().to_string_lossy();
        Self {
            inner: clean(&path_str.replace('\\', "/")),
        }
    }

    /// The `.` path, i.e. the root of a relative filesystem.
    pub fn current() -> Self {
        Self {
            inner: ".".to_string(),
        }
    }

    /// Get the internal normalized string representation.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to a platform-native PathBuf for I/O operations.
    pub fn to_native(&self) -> PathBuf {
        PathBuf::from(&self.inner)
    }

    /// Whether the path starts at the filesystem root.
    pub fn is_absolute(&self) -> bool {
        self.inner.starts_with('/')
    }

    /// Whether this is `.` or `/`.
    pub fn is_root(&self) -> bool {
        self.inner == "." || self.inner == "/"
    }

    /// Join this path with a segment. The segment is always treated as
    /// relative to `self`.
    pub fn join(&self, segment: impl AsRef<str>) -> Self {
        let segment = segment.as_ref().replace('\\', "/");
        let joined = if self.inner == "." {
            segment.trim_start_matches('/').to_string()
        } else {
            format!("{}/{}", self.inner, segment.trim_start_matches('/'))
        };
        Self {
            inner: clean(&joined),
        }
    }

    /// Get the parent directory. `a` has parent `.`; `.` and `/` have none.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.inner.rfind('/') {
            Some(0) => Some(Self {
                inner: "/".to_string(),
            }),
            Some(idx) => Some(Self {
                inner: self.inner[..idx].to_string(),
            }),
            None => Some(Self::current()),
        }
    }

    /// Get the file name component.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.inner.rsplit('/').next()
    }

    /// Get the extension if present.
    pub fn extension(&self) -> Option<&str> {
        self.file_name().and_then(|name| {
            let idx = name.rfind('.')?;
            if idx == 0 {
                None
            } else {
                Some(&name[idx + 1..])
            }
        })
    }

    /// Iterate over the path components, excluding the root.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.inner
            .split('/')
            .filter(|component| !component.is_empty() && *component != ".")
    }

    /// Strip `base` from the front of this path.
    ///
    /// Returns `.` when both paths are equal and `None` when `base` is not
    /// an ancestor of `self`.
    pub fn strip_prefix(&self, base: &NormalizedPath) -> Option<Self> {
        if base.inner == "." && !self.is_absolute() {
            return Some(self.clone());
        }
        if self.inner == base.inner {
            return Some(Self::current());
        }
        let prefix = if base.inner.ends_with('/') {
            base.inner.clone()
        } else {
            format!("{}/", base.inner)
        };
        self.inner.strip_prefix(&prefix).map(|rest| Self {
            inner: rest.to_string(),
        })
    }
}

fn clean(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        Path::new(&self.inner)
    }
}

impl std::fmt::Display for NormalizedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<&str> for NormalizedPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NormalizedPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<PathBuf> for NormalizedPath {
    fn from(p: PathBuf) -> Self {
        Self::new(p)
    }
}

impl From<&Path> for NormalizedPath {
    fn from(p: &Path) -> Self {
        Self::new(p)
    }
}

impl From<&NormalizedPath> for NormalizedPath {
    fn from(p: &NormalizedPath) -> Self {
        p.clone()
    }
}

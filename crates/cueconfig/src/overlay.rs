//! In-memory overlay of configuration sources
//!
//! The overlay is built once per load from a [`FileSystem`] walk. Every source
//! file is keyed as `OVERLAY_ROOT/<relative path>`, whichever entry mode the
//! load uses, so sibling files in one directory always land in one package.

use std::collections::BTreeMap;
use std::fmt;

use cueconfig_fs::checksum::{compute_content_checksum, compute_entries_checksum};
use cueconfig_fs::{FileKind, FileSystem, NormalizedPath, io};

use crate::options::LoadOptions;

/// Virtual root under which every overlay key lives.
pub const OVERLAY_ROOT: &str = "/$overlay";

/// The part of the overlay an entry path selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageTarget {
    /// Every source directly inside this directory (relative to the root)
    Directory(NormalizedPath),
    /// A single source file (relative to the root)
    File(NormalizedPath),
}

impl PackageTarget {
    pub fn path(&self) -> &NormalizedPath {
        match self {
            Self::Directory(path) | Self::File(path) => path,
        }
    }
}

impl fmt::Display for PackageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(path) => write!(f, "directory {path}"),
            Self::File(path) => write!(f, "file {path}"),
        }
    }
}

/// A source file selected from the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source<'a> {
    /// Overlay key
    pub key: &'a NormalizedPath,
    /// Path relative to the filesystem root, used in diagnostics
    pub name: &'a str,
    pub content: &'a [u8],
}

#[derive(Debug, Clone)]
struct Entry {
    relative: NormalizedPath,
    content: Vec<u8>,
}

/// Source files keyed by their overlay path.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    extension: String,
    files: BTreeMap<NormalizedPath, Entry>,
}

impl Overlay {
    /// Walk `fs` and collect every regular file carrying the configured
    /// extension.
    ///
    /// Any walk or read failure aborts the build. Dumping to
    /// [`LoadOptions::dump_dir`] never does.
    pub fn build<F>(fs: &F, options: &LoadOptions) -> cueconfig_fs::Result<Self>
    where
        F: FileSystem + ?Sized,
    {
        let mut overlay = Self {
            extension: options.extension.clone(),
            files: BTreeMap::new(),
        };

        for entry in fs.walk()? {
            match entry.kind {
                FileKind::File => {}
                FileKind::Dir => continue,
                FileKind::Other => {
                    tracing::trace!(path = %entry.path, "Skipping non-regular entry");
                    continue;
                }
            }
            if entry.path.extension() != Some(options.extension.as_str()) {
                tracing::trace!(path = %entry.path, "Skipping non-source file");
                continue;
            }

            let content = fs.read(&entry.path)?;
            let key = Self::key(&entry.path);
            tracing::trace!(
                path = %entry.path,
                %key,
                bytes = content.len(),
                checksum = %compute_content_checksum(&content),
                "Adding source to overlay"
            );

            if let Some(dir) = &options.dump_dir {
                dump(&NormalizedPath::new(dir).join(entry.path.as_str()), &content);
            }
            overlay.files.insert(
                key,
                Entry {
                    relative: entry.path,
                    content,
                },
            );
        }

        tracing::debug!(
            files = overlay.files.len(),
            fingerprint = %overlay.fingerprint(),
            "Built source overlay"
        );
        Ok(overlay)
    }

    /// The overlay key of a path relative to the filesystem root.
    pub fn key(relative: &NormalizedPath) -> NormalizedPath {
        NormalizedPath::new(OVERLAY_ROOT).join(relative.as_str())
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Content stored under an overlay key.
    pub fn get(&self, key: &NormalizedPath) -> Option<&[u8]> {
        self.files.get(key).map(|entry| entry.content.as_slice())
    }

    /// All sources, ordered by key.
    pub fn sources(&self) -> impl Iterator<Item = Source<'_>> {
        self.files.iter().map(|(key, entry)| Source {
            key,
            name: entry.relative.as_str(),
            content: &entry.content,
        })
    }

    /// The sources forming the package `target` names, ordered by key.
    ///
    /// Subdirectories of a directory target are not part of its package.
    pub fn package_files(&self, target: &PackageTarget) -> Vec<Source<'_>> {
        let wanted = Self::key(target.path());
        self.sources()
            .filter(|source| match target {
                PackageTarget::Directory(_) => source.key.parent().as_ref() == Some(&wanted),
                PackageTarget::File(_) => *source.key == wanted,
            })
            .collect()
    }

    /// Checksum over every key and content in the overlay.
    pub fn fingerprint(&self) -> String {
        compute_entries_checksum(
            self.files
                .iter()
                .map(|(key, entry)| (key.as_str(), entry.content.as_slice())),
        )
    }
}

fn dump(path: &NormalizedPath, content: &[u8]) {
    match io::write_atomic(path, content) {
        Ok(()) => tracing::trace!(%path, "Dumped overlay source"),
        Err(err) => tracing::warn!(%path, error = %err, "Failed to dump overlay source"),
    }
}

//! Atomic file writes

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::{Error, NormalizedPath, Result};

/// Write `content` to `path` atomically, creating missing parent directories.
///
/// The content goes to a uniquely named temporary file next to `path`, which
/// is synced and then renamed over it. The temporary file is removed when any
/// step fails, and concurrent writers never share one.
pub fn write_atomic(path: &NormalizedPath, content: &[u8]) -> Result<()> {
    let native_path = path.to_native();
    let parent = match native_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    let temp_path = temp.path().to_path_buf();
    temp.write_all(content).map_err(|e| Error::io(&temp_path, e))?;
    temp.as_file().sync_all().map_err(|e| Error::io(&temp_path, e))?;
    temp.persist(&native_path)
        .map_err(|e| Error::io(&native_path, e.error))?;

    tracing::trace!(%path, bytes = content.len(), "Wrote file atomically");
    Ok(())
}

//! Layered, schema-validated configuration for Rust programs
//!
//! Users write their configuration in CUE. The host program supplies a
//! schema, program-level defaults and optionally some runtime values (the
//! environment, the working directory); the loader merges them in a fixed
//! order and decodes the result with `serde`:
//!
//! ```text
//!   user config ──► & schema ──► & runtime ──► finalize ──► & defaults ──► T
//! ```
//!
//! # Architecture
//!
//! ```text
//!                 host program
//!                      |
//!                  cueconfig        (Loader, Overlay, Error)
//!                      |
//!            +---------+---------+
//!            |                   |
//!      cueconfig-fs       cueconfig-engine
//! ```
//!
//! The evaluator sits behind the [`Engine`] and [`EvalContext`] traits;
//! [`BuiltinEngine`] is the default.
//!
//! # Example
//!
//! ```
//! use cueconfig::{Loader, MemFs};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Config {
//!     port: u16,
//! }
//!
//! let fs = MemFs::new().with_file("app.cue", "port: 9000");
//! let config: Config = Loader::new()
//!     .load(&fs, "app.cue", b"port?: int", b"port: *80 | _", None::<&()>)
//!     .unwrap();
//! assert_eq!(config.port, 9000);
//! ```

pub mod engine;
pub mod error;
pub mod loader;
pub mod options;
pub mod overlay;

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use cueconfig_fs::{DirFs, FileSystem, MemFs, NormalizedPath};
pub use engine::{BuiltinEngine, Engine, EvalContext};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use loader::Loader;
pub use options::LoadOptions;
pub use overlay::{OVERLAY_ROOT, Overlay, PackageTarget};

/// Load the configuration at `entry` from the OS filesystem.
///
/// A relative `entry` is resolved against the current directory, which is
/// also the root sources are discovered under. An absolute `entry` is its
/// own root when it names a directory, and its parent is when it names a
/// file. Options come from [`LoadOptions::from_env`].
///
/// See [`Loader::load`] for the pipeline.
pub fn load<T, R>(
    entry: impl AsRef<Path>,
    schema: &[u8],
    defaults: &[u8],
    runtime: Option<&R>,
) -> Result<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
{
    let entry = entry.as_ref();
    let (fs, entry) = if entry.is_absolute() {
        absolute_root(entry)?
    } else {
        (DirFs::new("."), NormalizedPath::new(entry))
    };
    load_fs(&fs, entry, schema, defaults, runtime)
}

/// Load the configuration at `entry` from any [`FileSystem`].
///
/// Options come from [`LoadOptions::from_env`].
pub fn load_fs<T, R>(
    fs: &(impl FileSystem + ?Sized),
    entry: impl Into<NormalizedPath>,
    schema: &[u8],
    defaults: &[u8],
    runtime: Option<&R>,
) -> Result<T>
where
    T: DeserializeOwned,
    R: Serialize + ?Sized,
{
    Loader::new()
        .with_options(LoadOptions::from_env())
        .load(fs, entry, schema, defaults, runtime)
}

fn absolute_root(entry: &Path) -> Result<(DirFs, NormalizedPath)> {
    let metadata = std::fs::metadata(entry).map_err(|err| {
        match cueconfig_fs::Error::io(entry, err) {
            cueconfig_fs::Error::NotFound { .. } => Error::NotFound {
                path: entry.display().to_string(),
            },
            err => Error::Discovery(err),
        }
    })?;
    let (root, entry) = match (metadata.is_dir(), entry.parent(), entry.file_name()) {
        (false, Some(parent), Some(name)) => (parent, NormalizedPath::new(name)),
        _ => (entry, NormalizedPath::current()),
    };
    let fs = DirFs::canonical(root).map_err(Error::Discovery)?;
    tracing::debug!(root = ?fs.root(), %entry, "Resolved absolute entry");
    Ok((fs, entry))
}

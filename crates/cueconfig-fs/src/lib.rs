//! Filesystem abstraction for cueconfig
//!
//! Configuration sources can live on disk or be embedded in the host
//! program. Both are reached through the [`FileSystem`] trait, which offers
//! exactly what source discovery needs: a recursive walk, a stat that
//! distinguishes "not found" from other failures, and whole-file reads.

pub mod checksum;
pub mod dir;
pub mod error;
pub mod fs;
pub mod io;
pub mod mem;
pub mod path;

pub use dir::DirFs;
pub use error::{Error, Result};
pub use fs::{DirEntry, FileKind, FileSystem};
pub use mem::MemFs;
pub use path::NormalizedPath;

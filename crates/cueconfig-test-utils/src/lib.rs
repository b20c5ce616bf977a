//! Shared test utilities for the cueconfig workspace.
//!
//! A dev-dependency only, never published.
//!
//! # Modules
//!
//! - [`dir`]: [`ConfigDir`], a temporary on-disk configuration tree
//! - [`example`]: the example schema, defaults and host types used across
//!   crate test suites

pub mod dir;
pub mod example;

pub use dir::{ConfigDir, mem_fs};

//! Evaluator for configuration files written in a subset of the CUE
//! constraint language.
//!
//! Sources are compiled into [`Value`]s through a [`Context`]. Values are
//! combined with [`Value::unify`], then checked, finalized and exported:
//!
//! ```
//! use cueconfig_engine::{Context, ValidateOptions};
//!
//! let ctx = Context::new();
//! let schema = ctx.compile("schema.cue", b"port?: int & >0").unwrap();
//! let config = ctx.compile("config.cue", b"port: 8080").unwrap();
//! let merged = schema.unify(&config);
//! ctx.validate(&merged, ValidateOptions::default()).unwrap();
//! assert_eq!(ctx.export(&merged).unwrap(), serde_json::json!({"port": 8080}));
//! ```

pub mod ast;
pub mod context;
pub mod diagnostic;
mod encode;
mod eval;
mod export;
mod expr;
pub mod lexer;
pub mod parser;
mod resolve;
pub mod source;
pub mod token;
pub mod unify;
pub mod value;

pub use context::{Context, ValidateOptions, Value};
pub use diagnostic::{Diagnostic, Diagnostics};
pub use source::{Pos, SourceFile};
pub use value::Val;

//! Evaluation engine capability
//!
//! The loader drives evaluation through these two traits only. An [`Engine`]
//! hands out one fresh [`EvalContext`] per load; values produced by a
//! context are immutable and each operation returns a new one.
//!
//! [`BuiltinEngine`] implements them with `cueconfig-engine`.

use cueconfig_engine::{Context, Diagnostic, Diagnostics, ValidateOptions, Value};

use crate::overlay::{Overlay, PackageTarget};

/// Factory for evaluation contexts.
pub trait Engine {
    type Context: EvalContext;

    /// Create a context for a single load.
    fn new_context(&self) -> Self::Context;
}

/// The operations the loader pipeline needs from an evaluator.
pub trait EvalContext {
    type Value: Clone;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Compile one standalone document.
    fn compile(&self, name: &str, source: &[u8]) -> Result<Self::Value, Self::Error>;

    /// Compile the overlay sources that `target` selects as one package.
    fn load_package(
        &self,
        overlay: &Overlay,
        target: &PackageTarget,
    ) -> Result<Self::Value, Self::Error>;

    /// The meet of two values.
    fn unify(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;

    /// Report every error in `value`. Incomplete values are accepted.
    fn validate(&self, value: &Self::Value) -> Result<(), Self::Error>;

    /// Resolve references and select defaults.
    fn finalize(&self, value: &Self::Value) -> Result<Self::Value, Self::Error>;

    /// Convert host data into a value.
    fn encode(&self, data: &serde_json::Value) -> Result<Self::Value, Self::Error>;

    /// Export a concrete value as host data.
    fn decode(&self, value: &Self::Value) -> Result<serde_json::Value, Self::Error>;
}

/// The engine backed by `cueconfig-engine`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEngine;

impl Engine for BuiltinEngine {
    type Context = Context;

    fn new_context(&self) -> Context {
        Context::new()
    }
}

impl EvalContext for Context {
    type Value = Value;
    type Error = Diagnostics;

    fn compile(&self, name: &str, source: &[u8]) -> Result<Value, Diagnostics> {
        Context::compile(self, name, source)
    }

    fn load_package(
        &self,
        overlay: &Overlay,
        target: &PackageTarget,
    ) -> Result<Value, Diagnostics> {
        let sources = overlay.package_files(target);
        if sources.is_empty() {
            return Err(Diagnostic::new(
                "",
                format!("no .{} files found in {target}", overlay.extension()),
            )
            .into());
        }
        self.build_package(sources.iter().map(|source| (source.name, source.content)))
    }

    fn unify(&self, a: &Value, b: &Value) -> Value {
        a.unify(b)
    }

    fn validate(&self, value: &Value) -> Result<(), Diagnostics> {
        Context::validate(self, value, ValidateOptions::default())
    }

    fn finalize(&self, value: &Value) -> Result<Value, Diagnostics> {
        Context::finalize(self, value)
    }

    fn encode(&self, data: &serde_json::Value) -> Result<Value, Diagnostics> {
        Ok(Context::encode(self, data))
    }

    fn decode(&self, value: &Value) -> Result<serde_json::Value, Diagnostics> {
        self.export(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoadOptions;
    use cueconfig_fs::{MemFs, NormalizedPath};
    use serde_json::json;

    #[test]
    fn package_diagnostics_use_relative_names() {
        let fs = MemFs::new().with_file("conf/app.cue", "port: \"x\" & int");
        let overlay = Overlay::build(&fs, &LoadOptions::default()).unwrap();
        let ctx = BuiltinEngine.new_context();
        let value = ctx
            .load_package(&overlay, &PackageTarget::Directory(NormalizedPath::new("conf")))
            .unwrap();
        let err = EvalContext::validate(&ctx, &value).unwrap_err().to_string();
        assert!(err.contains("conf/app.cue:1:"), "{err}");
    }

    #[test]
    fn empty_package_is_an_error() {
        let overlay = Overlay::build(&MemFs::new(), &LoadOptions::default()).unwrap();
        let err = BuiltinEngine
            .new_context()
            .load_package(&overlay, &PackageTarget::Directory(NormalizedPath::current()))
            .unwrap_err();
        assert_eq!(err.to_string(), "no .cue files found in directory .");
    }

    #[test]
    fn encode_then_decode() {
        let ctx = BuiltinEngine.new_context();
        let data = json!({"env": {"HOME": "/root"}, "n": 3});
        let value = EvalContext::encode(&ctx, &data).unwrap();
        assert_eq!(EvalContext::decode(&ctx, &value).unwrap(), data);
    }
}

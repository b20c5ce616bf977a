//! Evaluation contexts and values.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;

use crate::ast::{Expr, ExprKind, StructLit};
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::eval::{Conjunct, Evaluator, MAX_DEPTH};
use crate::parser::parse_file;
use crate::resolve::check_references;
use crate::source::{Pos, SourceFile};
use crate::value::Val;
use crate::{encode, export};

/// Options for [`Context::validate`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidateOptions {
    /// Require every regular field to be concrete.
    pub concrete: bool,
}

/// A configuration value: the conjunction of everything unified into it.
///
/// Values are immutable and cheap to clone. Evaluation happens on first use
/// and is cached.
#[derive(Clone)]
pub struct Value {
    conjuncts: Arc<[Conjunct]>,
    evaluated: Arc<OnceLock<Val>>,
}

impl Value {
    fn new(conjuncts: Vec<Conjunct>) -> Self {
        Self {
            conjuncts: conjuncts.into(),
            evaluated: Arc::new(OnceLock::new()),
        }
    }

    fn from_val(val: Val) -> Self {
        let value = Self::new(vec![Conjunct::Val(val.clone())]);
        let _ = value.evaluated.set(val);
        value
    }

    /// The meet of two values. Nothing is evaluated until the result is used.
    pub fn unify(&self, other: &Value) -> Value {
        let conjuncts: Vec<Conjunct> = self
            .conjuncts
            .iter()
            .chain(other.conjuncts.iter())
            .cloned()
            .collect();
        Value::new(conjuncts)
    }

    /// The evaluated form of this value.
    pub fn val(&self) -> &Val {
        self.evaluated.get_or_init(|| evaluate(&self.conjuncts))
    }
}

/// Stack reserved for one evaluation. Recursion is bounded by
/// [`MAX_DEPTH`] levels of a few frames each, independent of the caller's
/// own stack.
const EVAL_STACK_SIZE: usize = 64 * 1024 * 1024;

fn evaluate(conjuncts: &[Conjunct]) -> Val {
    let run = || {
        let mut evaluator = Evaluator::new(conjuncts.to_vec());
        let val = evaluator.evaluate();
        tracing::trace!(
            conjuncts = conjuncts.len(),
            vertices = evaluator.vertex_count(),
            max_depth = MAX_DEPTH,
            "evaluated value"
        );
        val
    };
    // Events from the worker go to the caller's subscriber.
    let dispatch = tracing::dispatcher::get_default(|dispatch| dispatch.clone());
    std::thread::scope(|scope| {
        let worker = std::thread::Builder::new()
            .name("cueconfig-eval".to_string())
            .stack_size(EVAL_STACK_SIZE)
            .spawn_scoped(scope, || tracing::dispatcher::with_default(&dispatch, run));
        match worker {
            Ok(handle) => handle
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic)),
            Err(err) => {
                tracing::warn!(error = %err, "cannot spawn evaluation thread, evaluating in place");
                run()
            }
        }
    })
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("conjuncts", &self.conjuncts.len())
            .field("evaluated", &self.evaluated.get().is_some())
            .finish()
    }
}

/// Compiles sources and operates on the resulting values.
#[derive(Clone, Debug, Default)]
pub struct Context {
    _private: (),
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles a single source document.
    pub fn compile(&self, name: &str, source: &[u8]) -> Result<Value, Diagnostics> {
        self.build_package([(name, source)])
    }

    /// Compiles several files as one package sharing a top-level scope.
    ///
    /// Every file must declare the same package clause, or none, and every
    /// identifier must resolve within the package.
    pub fn build_package<'a>(
        &self,
        files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
    ) -> Result<Value, Diagnostics> {
        let mut errors = Vec::new();
        let mut parsed = Vec::new();
        for (name, bytes) in files {
            let Ok(text) = std::str::from_utf8(bytes) else {
                errors.push(Diagnostic::at(start_of(name), "invalid UTF-8 in source"));
                continue;
            };
            let source = SourceFile::new(name, text.to_string());
            match parse_file(&source) {
                Ok(file) => parsed.push(file),
                Err(err) => errors.push(err),
            }
        }
        if !errors.is_empty() {
            return Err(Diagnostics::new(errors));
        }

        let Some(first) = parsed.first() else {
            return Err(Diagnostic::new("", "no source files in package").into());
        };
        let package = first.package.clone();
        let pos = first.pos.clone();
        for file in &parsed[1..] {
            if file.package != package {
                return Err(Diagnostic::at(
                    file.pos.clone(),
                    format!(
                        "found packages {} ({}) and {} ({})",
                        describe_package(&package),
                        first.name,
                        describe_package(&file.package),
                        file.name
                    ),
                )
                .into());
            }
        }

        tracing::debug!(files = parsed.len(), package = ?package, "compiled package");
        let decls = parsed.into_iter().flat_map(|file| file.decls).collect();
        let root = StructLit {
            decls,
            pos: pos.clone(),
        };
        let unresolved = check_references(&root);
        if !unresolved.is_empty() {
            return Err(Diagnostics::new(unresolved));
        }
        let root = Expr::new(ExprKind::Struct(Arc::new(root)), pos);
        Ok(Value::new(vec![Conjunct::root(root)]))
    }

    /// Converts host data to a value.
    pub fn encode(&self, json: &serde_json::Value) -> Value {
        Value::from_val(encode::encode(json))
    }

    /// Reports every error in `value`.
    pub fn validate(&self, value: &Value, options: ValidateOptions) -> Result<(), Diagnostics> {
        export::validate(value.val(), options.concrete)
    }

    /// Resolves defaults and references into a self-contained value that
    /// still carries constraints and closedness.
    pub fn finalize(&self, value: &Value) -> Result<Value, Diagnostics> {
        export::finalize(value.val()).map(Value::from_val)
    }

    /// Exports the regular fields of a concrete value as JSON.
    pub fn export(&self, value: &Value) -> Result<serde_json::Value, Diagnostics> {
        export::export(value.val())
    }

    /// Exports a concrete value and deserializes it.
    pub fn decode<T: DeserializeOwned>(&self, value: &Value) -> Result<T, Diagnostics> {
        let json = self.export(value)?;
        serde_json::from_value(json)
            .map_err(|err| Diagnostic::new("", format!("cannot decode value: {err}")).into())
    }
}

fn start_of(name: &str) -> Pos {
    Pos {
        file: name.into(),
        line: 1,
        column: 1,
    }
}

fn describe_package(package: &Option<String>) -> &str {
    package.as_deref().unwrap_or("<none>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn unify_is_lazy_and_cached() {
        let ctx = Context::new();
        let a = ctx.compile("a.cue", b"x: int").unwrap();
        let b = ctx.compile("b.cue", b"x: 2").unwrap();
        let both = a.unify(&b);
        assert_eq!(format!("{both:?}"), "Value { conjuncts: 2, evaluated: false }");
        assert_eq!(ctx.export(&both).unwrap(), json!({"x": 2}));
        assert_eq!(format!("{both:?}"), "Value { conjuncts: 2, evaluated: true }");
    }

    #[test]
    fn package_files_share_a_scope() {
        let ctx = Context::new();
        let value = ctx
            .build_package([
                ("a.cue", b"package p\nx: y + 1".as_slice()),
                ("b.cue", b"package p\ny: 1".as_slice()),
            ])
            .unwrap();
        assert_eq!(ctx.export(&value).unwrap(), json!({"x": 2, "y": 1}));
    }

    #[test]
    fn unresolved_references_fail_compilation() {
        let ctx = Context::new();
        let err = ctx
            .build_package([
                ("a.cue", b"package p\nx: *nope | y".as_slice()),
                ("b.cue", b"package p\ny: 1\nz: \"\\(missing)\"".as_slice()),
            ])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "reference \"nope\" not found:\n    a.cue:2:5\n\
             reference \"missing\" not found:\n    b.cue:3:7"
        );
    }

    #[test]
    fn mismatched_packages() {
        let ctx = Context::new();
        let err = ctx
            .build_package([
                ("a.cue", b"package p".as_slice()),
                ("b.cue", b"package q".as_slice()),
            ])
            .unwrap_err();
        assert_eq!(err.to_string(), "found packages p (a.cue) and q (b.cue):\n    b.cue:1:1");
    }

    #[test]
    fn invalid_utf8() {
        let err = Context::new().compile("bad.cue", &[0xff, 0xfe]).unwrap_err();
        assert_eq!(err.to_string(), "invalid UTF-8 in source:\n    bad.cue:1:1");
    }

    #[test]
    fn empty_package() {
        let err = Context::new().build_package([]).unwrap_err();
        assert_eq!(err.to_string(), "no source files in package");
    }

    #[test]
    fn finalized_values_unify_further() {
        let ctx = Context::new();
        let user = ctx.compile("user.cue", b"a: *1 | int\nb: string").unwrap();
        let finalized = ctx.finalize(&user).unwrap();
        let defaults = ctx.compile("defaults.cue", b"a: *5 | _\nb: *\"x\" | _").unwrap();
        assert_eq!(
            ctx.export(&finalized.unify(&defaults)).unwrap(),
            json!({"a": 1, "b": "x"})
        );
    }

    #[test]
    fn decode_into_struct() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Config {
            name: String,
            port: u16,
        }
        let ctx = Context::new();
        let value = ctx.compile("c.cue", b"name: \"svc\"\nport: 8080").unwrap();
        let config: Config = ctx.decode(&value).unwrap();
        assert_eq!(config, Config { name: "svc".into(), port: 8080 });
    }
}

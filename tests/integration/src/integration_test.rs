//! End-to-end tests through the public entry points
//!
//! These exercise the complete flow: discovery -> overlay -> pipeline ->
//! decode, on disk and in memory, plus a custom engine behind the capability
//! traits.

use std::cell::RefCell;
use std::rc::Rc;

use cueconfig::{
    BuiltinEngine, Engine, EvalContext, LoadOptions, Loader, Overlay, PackageTarget,
};
use cueconfig_test_utils::example::{
    EXAMPLE_CONFIG, EXAMPLE_DEFAULTS, EXAMPLE_SCHEMA, ExampleConfig, RuntimeValues,
};
use cueconfig_test_utils::{ConfigDir, mem_fs};
use pretty_assertions::assert_eq;
use serde_json::{Value as Json, json};

#[test]
fn load_from_absolute_directory() {
    let dir = ConfigDir::new()
        .with_file("conf/example.cue", EXAMPLE_CONFIG)
        .with_file("conf/more.cue", "package example\nbar: b: something: true\n");
    let runtime = RuntimeValues::in_directory("/cwd");
    let config: ExampleConfig = cueconfig::load(
        dir.path("conf"),
        EXAMPLE_SCHEMA.as_bytes(),
        EXAMPLE_DEFAULTS.as_bytes(),
        Some(&runtime),
    )
    .unwrap();
    assert_eq!(config.foo, 1);
    assert!(config.bar["b"].something);
    assert_eq!(config.bar["b"].path, "/cwd");
}

#[test]
fn load_fs_from_memory() {
    let fs = mem_fs(&[("cfg/app.cue", "name: \"svc\"\nreplicas: 3\n")]);
    let out: Json = cueconfig::load_fs(
        &fs,
        "cfg/app.cue",
        b"name!: string\nreplicas?: int & >=1 & <=10\n",
        b"replicas: *1 | _\n",
        None::<&()>,
    )
    .unwrap();
    assert_eq!(out, json!({"name": "svc", "replicas": 3}));
}

#[test]
fn required_schema_fields_must_be_set() {
    let fs = mem_fs(&[("app.cue", "replicas: 2\n")]);
    let err = cueconfig::load_fs::<Json, ()>(&fs, "app.cue", b"name!: string\n", b"", None)
        .unwrap_err();
    assert_eq!(err.kind(), cueconfig::ErrorKind::Decode);
    assert!(err.to_string().contains("name: field is required but not present"), "{err}");
}

#[test]
fn sources_are_dumped_for_inspection() {
    let dir = ConfigDir::new()
        .with_file("example.cue", EXAMPLE_CONFIG)
        .with_file("notes.txt", "ignored");
    let dump = tempfile::tempdir().unwrap();
    let loader = Loader::new().with_options(LoadOptions::default().with_dump_dir(dump.path()));
    let _: ExampleConfig = loader
        .load(
            &dir.fs(),
            "example.cue",
            EXAMPLE_SCHEMA.as_bytes(),
            EXAMPLE_DEFAULTS.as_bytes(),
            Some(&RuntimeValues::in_directory("/cwd")),
        )
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(dump.path().join("example.cue")).unwrap(),
        EXAMPLE_CONFIG
    );
    assert!(!dump.path().join("notes.txt").exists());
}

/// Wraps the built-in engine and records every call in order.
#[derive(Default)]
struct RecordingEngine {
    calls: Rc<RefCell<Vec<String>>>,
}

struct RecordingContext {
    inner: <BuiltinEngine as Engine>::Context,
    calls: Rc<RefCell<Vec<String>>>,
}

impl RecordingContext {
    fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }
}

impl Engine for RecordingEngine {
    type Context = RecordingContext;

    fn new_context(&self) -> RecordingContext {
        self.calls.borrow_mut().push("new_context".into());
        RecordingContext {
            inner: BuiltinEngine.new_context(),
            calls: Rc::clone(&self.calls),
        }
    }
}

type Inner = <BuiltinEngine as Engine>::Context;
type InnerValue = <Inner as EvalContext>::Value;
type InnerError = <Inner as EvalContext>::Error;

impl EvalContext for RecordingContext {
    type Value = InnerValue;
    type Error = InnerError;

    fn compile(&self, name: &str, source: &[u8]) -> Result<InnerValue, InnerError> {
        self.record(format!("compile {name}"));
        self.inner.compile(name, source)
    }

    fn load_package(
        &self,
        overlay: &Overlay,
        target: &PackageTarget,
    ) -> Result<InnerValue, InnerError> {
        self.record(format!("load_package {target}"));
        EvalContext::load_package(&self.inner, overlay, target)
    }

    fn unify(&self, a: &InnerValue, b: &InnerValue) -> InnerValue {
        self.record("unify");
        EvalContext::unify(&self.inner, a, b)
    }

    fn validate(&self, value: &InnerValue) -> Result<(), InnerError> {
        self.record("validate");
        EvalContext::validate(&self.inner, value)
    }

    fn finalize(&self, value: &InnerValue) -> Result<InnerValue, InnerError> {
        self.record("finalize");
        EvalContext::finalize(&self.inner, value)
    }

    fn encode(&self, data: &Json) -> Result<InnerValue, InnerError> {
        self.record("encode");
        EvalContext::encode(&self.inner, data)
    }

    fn decode(&self, value: &InnerValue) -> Result<Json, InnerError> {
        self.record("decode");
        EvalContext::decode(&self.inner, value)
    }
}

#[test]
fn pipeline_runs_stages_in_order() {
    let engine = RecordingEngine::default();
    let calls = Rc::clone(&engine.calls);
    let fs = mem_fs(&[("example.cue", EXAMPLE_CONFIG)]);
    let _: ExampleConfig = Loader::with_engine(engine)
        .load(
            &fs,
            "example.cue",
            EXAMPLE_SCHEMA.as_bytes(),
            EXAMPLE_DEFAULTS.as_bytes(),
            Some(&RuntimeValues::in_directory("/cwd")),
        )
        .unwrap();

    assert_eq!(
        *calls.borrow(),
        vec![
            "new_context",
            "load_package file example.cue",
            "validate",
            "compile $schema.cue",
            "validate",
            "unify",
            "validate",
            "encode",
            "unify",
            "validate",
            "finalize",
            "compile $defaults.cue",
            "validate",
            "unify",
            "validate",
            "decode",
        ]
    );
}

#[test]
fn pipeline_stops_at_first_failure() {
    let engine = RecordingEngine::default();
    let calls = Rc::clone(&engine.calls);
    let fs = mem_fs(&[("app.cue", "foo: \"x\"")]);
    let err = Loader::with_engine(engine)
        .load::<Json, ()>(&fs, "app.cue", EXAMPLE_SCHEMA.as_bytes(), b"", None)
        .unwrap_err();
    assert_eq!(err.kind(), cueconfig::ErrorKind::Schema);
    assert_eq!(calls.borrow().last().map(String::as_str), Some("validate"));
    assert!(!calls.borrow().iter().any(|call| call == "finalize"));
}

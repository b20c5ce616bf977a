//! Golden-file tests using test-fixtures/
//!
//! Each directory under `test-fixtures/configs` is a user configuration tree;
//! `test-fixtures/programs` holds program schemas and defaults, and
//! `test-fixtures/expected` the decoded results.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use cueconfig::{DirFs, ErrorKind, Loader};
use cueconfig_test_utils::ConfigDir;
use cueconfig_test_utils::example::{
    EXAMPLE_DEFAULTS, EXAMPLE_SCHEMA, ExampleConfig, RuntimeValues,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

/// Path to the test-fixtures directory (relative to the workspace root).
fn fixtures_dir() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    // tests/integration -> ../../test-fixtures
    manifest_dir.join("../../test-fixtures")
}

fn config_fs(name: &str) -> DirFs {
    DirFs::new(fixtures_dir().join("configs").join(name))
}

fn read_fixture(relative: &str) -> Vec<u8> {
    let path = fixtures_dir().join(relative);
    fs::read(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture at {}: {}", path.display(), e))
}

fn load_example(name: &str, entry: &str) -> cueconfig::Result<ExampleConfig> {
    Loader::new().load(
        &config_fs(name),
        entry,
        EXAMPLE_SCHEMA.as_bytes(),
        EXAMPLE_DEFAULTS.as_bytes(),
        Some(&RuntimeValues::in_directory("/work")),
    )
}

#[test]
fn example_fixture() {
    let config = load_example("example", "example.cue").unwrap();
    let out = serde_json::to_value(config).unwrap();
    assert_eq!(
        out,
        json!({
            "foo": 1,
            "bar": {"a": {"amount": 1.5, "something": false, "path": "/work"}}
        })
    );
}

#[test]
fn multi_file_fixture_merges_siblings() {
    let config = load_example("multi-file", ".").unwrap();
    assert_eq!(config.foo, 10);
    let shared = &config.bar["shared"];
    assert_eq!((shared.amount, shared.something, shared.path.as_str()), (2.5, true, "/work"));
    let local = &config.bar["local"];
    assert_eq!((local.amount, local.something, local.path.as_str()), (1.5, false, "/var/lib/app"));
}

#[rstest]
#[case::invalid_syntax("invalid-syntax", ErrorKind::Load, "cannot load configuration from \"app.cue\"")]
#[case::schema_violation("schema-violation", ErrorKind::Schema, "bar.a.something: conflicting values")]
#[case::closed_violation("closed-violation", ErrorKind::Schema, "bar.a.colour: field not allowed")]
#[case::cycle("cycle", ErrorKind::Finalize, "reference cycle")]
fn failing_fixtures(#[case] name: &str, #[case] kind: ErrorKind, #[case] needle: &str) {
    let err = load_example(name, "app.cue").unwrap_err();
    assert_eq!(err.kind(), kind, "{err}");
    assert!(err.to_string().contains(needle), "{err}");
}

#[test]
fn schema_violation_reports_every_field() {
    let err = load_example("schema-violation", "app.cue").unwrap_err().to_string();
    let bar = err.find("bar.a.something:").unwrap();
    let foo = err.find("foo:").unwrap();
    assert!(bar < foo, "errors are sorted by path:\n{err}");
    assert!(err.contains("app.cue:1:"), "{err}");
    assert!(err.contains("$schema.cue:"), "{err}");
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct EnvConfig {
    foo: i64,
    bar: BTreeMap<String, Baz>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Baz {
    blah: String,
    foobie: Vec<i64>,
}

#[derive(Serialize)]
struct EnvRuntime {
    runtime: Environment,
}

#[derive(Serialize)]
struct Environment {
    env: BTreeMap<String, String>,
}

#[test]
fn env_fixture_matches_golden_output() {
    let runtime = EnvRuntime {
        runtime: Environment {
            env: BTreeMap::from([
                ("HOME".to_string(), "/home/tester".to_string()),
                ("USER".to_string(), "tester".to_string()),
            ]),
        },
    };
    let config: EnvConfig = Loader::new()
        .load(
            &config_fs("env"),
            ".exampleconfig",
            &read_fixture("programs/env/schema.cue"),
            &read_fixture("programs/env/defaults.cue"),
            Some(&runtime),
        )
        .unwrap();

    let expected: Json = serde_json::from_slice(&read_fixture("expected/env.json")).unwrap();
    assert_eq!(serde_json::to_value(&config).unwrap(), expected);
}

#[test]
fn copied_fixture_loads_like_the_original() {
    let copy = ConfigDir::from_fixture(&fixtures_dir().join("configs/multi-file"));
    let schema = EXAMPLE_SCHEMA.as_bytes();
    let defaults = EXAMPLE_DEFAULTS.as_bytes();
    let runtime = RuntimeValues::in_directory("/work");

    let original = load_example("multi-file", ".").unwrap();
    let copied: ExampleConfig = Loader::new()
        .load(&copy.fs(), ".", schema, defaults, Some(&runtime))
        .unwrap();
    assert_eq!(original, copied);
}

//! Loads a configuration file or directory and prints the decoded result.
//!
//! ```text
//! RUST_LOG=cueconfig=debug cargo run -p cueconfig --example show_config -- path/to/config
//! ```
//!
//! The environment is passed in as runtime values under `runtime.env`.

use std::collections::BTreeMap;
use std::process::ExitCode;

use serde::{Deserialize, Serialize};

const SCHEMA: &str = r#"
foo?: int
bar?: [string]: #Baz

#Baz: {
    blah?: string
    foobie?: [...int]
}

runtime?: env: [string]: string
"#;

const DEFAULTS: &str = r#"
runtime: _

foo: *42 | _
bar: [_]: {
    blah: *"unset" | _
    foobie: *[] | _
}
"#;

#[derive(Debug, Serialize, Deserialize)]
struct Config {
    foo: i64,
    #[serde(default)]
    bar: BTreeMap<String, Baz>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Baz {
    blah: String,
    foobie: Vec<i64>,
}

#[derive(Serialize)]
struct Runtime {
    env: BTreeMap<String, String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let entry = std::env::args()
        .nth(1)
        .unwrap_or_else(|| ".exampleconfig".to_string());
    let env = Runtime {
        env: std::env::vars().collect(),
    };
    let runtime = serde_json::json!({ "runtime": env });

    let loaded = cueconfig::load(&entry, SCHEMA.as_bytes(), DEFAULTS.as_bytes(), Some(&runtime));
    let config: Config = match loaded {
        Ok(config) => config,
        Err(err) => {
            tracing::debug!(kind = ?err.kind(), "Load failed");
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&config) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("cannot print configuration: {err}");
            ExitCode::FAILURE
        }
    }
}

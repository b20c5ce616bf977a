//! The example program configuration: a schema with a closed `#Bar`
//! definition, defaults that read the working directory from runtime values,
//! and matching host types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const EXAMPLE_SCHEMA: &str = r#"
package example

foo?: int
bar?: [string]: #Bar

#Bar: {
    amount?: number
    something?: bool
    path?: string
}

// supplied by the program, never by the user
runtime?: #Runtime

#Runtime: {
    currentDirectory: string
}
"#;

pub const EXAMPLE_DEFAULTS: &str = r#"
package example

runtime: _

foo: *100 | _
bar: [_]: {
    amount: *1.5 | _
    something: *false | _
    path: *runtime.currentDirectory | _
}
"#;

/// The user configuration of the example program.
pub const EXAMPLE_CONFIG: &str = r#"
package example

foo: 1
bar: a: {}
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleConfig {
    pub foo: i64,
    #[serde(default)]
    pub bar: BTreeMap<String, ExampleBar>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleBar {
    pub amount: f64,
    pub something: bool,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExampleRuntime {
    pub current_directory: String,
}

/// Runtime values as the example program passes them: under `runtime`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeValues {
    pub runtime: ExampleRuntime,
}

impl RuntimeValues {
    pub fn in_directory(dir: &str) -> Self {
        Self {
            runtime: ExampleRuntime {
                current_directory: dir.to_string(),
            },
        }
    }
}

//! The configuration loading pipeline

use serde::Serialize;
use serde::de::DeserializeOwned;

use cueconfig_fs::{FileKind, FileSystem, NormalizedPath};

use crate::engine::{BuiltinEngine, Engine, EvalContext};
use crate::options::LoadOptions;
use crate::overlay::{Overlay, PackageTarget};
use crate::{Error, Result};

/// File name the schema document is compiled under.
pub const SCHEMA_FILENAME: &str = "$schema.cue";

/// File name the defaults document is compiled under.
pub const DEFAULTS_FILENAME: &str = "$defaults.cue";

/// Loads user configuration, validates it against a program schema and
/// fills in program defaults.
///
/// A load runs these stages in order and stops at the first failure:
/// 1. Resolve the entry path: a directory loads every source directly in
///    it as one package, a file loads only that file
/// 2. Load the user configuration and check it is valid on its own
/// 3. Compile the schema
/// 4. Unify the configuration with the schema
/// 5. Unify runtime values, when the host supplies them
/// 6. Finalize: resolve references and lock in the user's defaults
/// 7. Compile the program defaults and unify them
/// 8. Decode into the destination type
///
/// Values set by the user always win over program defaults: step 6 turns the
/// user's choices into concrete values before step 7 adds the program's.
#[derive(Debug, Clone, Default)]
pub struct Loader<E = BuiltinEngine> {
    engine: E,
    options: LoadOptions,
}

impl Loader<BuiltinEngine> {
    /// A loader using the built-in engine and default options.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: Engine> Loader<E> {
    /// A loader using a custom evaluation engine.
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            options: LoadOptions::default(),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load the configuration at `entry` (relative to the root of `fs`).
    ///
    /// Pass `None::<&()>` when there are no runtime values.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when `entry` does not exist; otherwise the variant
    /// of the stage that failed.
    pub fn load<T, R>(
        &self,
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
        let entry = entry.into();
        let ctx = self.engine.new_context();

        // Stage 1: entry point and sources
        let target = match fs.stat(&entry) {
            Ok(FileKind::Dir) => PackageTarget::Directory(entry.clone()),
            Ok(_) => PackageTarget::File(entry.clone()),
            Err(err) if err.is_not_found() => {
                tracing::debug!(%entry, "Configuration not found");
                return Err(Error::NotFound {
                    path: entry.to_string(),
                });
            }
            Err(err) => return Err(Error::Discovery(err)),
        };
        let overlay = Overlay::build(fs, &self.options).map_err(Error::Discovery)?;
        tracing::debug!(%target, "Resolved configuration entry (stage 1)");

        // Stage 2: user configuration
        let config = ctx
            .load_package(&overlay, &target)
            .map_err(|err| Error::Load {
                path: entry.to_string(),
                source: err.into(),
            })?;
        ctx.validate(&config).map_err(|err| Error::Invalid {
            path: entry.to_string(),
            source: err.into(),
        })?;
        tracing::debug!(%entry, "Loaded user configuration (stage 2)");

        // Stage 3: schema
        let schema = ctx
            .compile(SCHEMA_FILENAME, schema)
            .and_then(|schema| ctx.validate(&schema).map(|()| schema))
            .map_err(|err| Error::SchemaCompile { source: err.into() })?;
        tracing::debug!("Compiled configuration schema (stage 3)");

        // Stage 4: configuration & schema
        let mut value = ctx.unify(&config, &schema);
        ctx.validate(&value)
            .map_err(|err| Error::Schema { source: err.into() })?;
        tracing::debug!("Unified configuration with schema (stage 4)");

        // Stage 5: runtime values
        if let Some(runtime) = runtime {
            let data = serde_json::to_value(runtime)
                .map_err(|err| Error::Runtime { source: err.into() })?;
            let runtime = ctx
                .encode(&data)
                .map_err(|err| Error::Runtime { source: err.into() })?;
            value = ctx.unify(&value, &runtime);
            ctx.validate(&value)
                .map_err(|err| Error::Runtime { source: err.into() })?;
            tracing::debug!("Unified runtime values (stage 5)");
        } else {
            tracing::debug!("No runtime values supplied (stage 5)");
        }

        // Stage 6: finalize
        let value = ctx
            .finalize(&value)
            .map_err(|err| Error::Finalize { source: err.into() })?;
        tracing::debug!("Finalized user layer (stage 6)");

        // Stage 7: program defaults
        let defaults = ctx
            .compile(DEFAULTS_FILENAME, defaults)
            .and_then(|defaults| ctx.validate(&defaults).map(|()| defaults))
            .map_err(|err| Error::DefaultsCompile { source: err.into() })?;
        let value = ctx.unify(&value, &defaults);
        ctx.validate(&value)
            .map_err(|err| Error::Defaults { source: err.into() })?;
        tracing::debug!("Applied program defaults (stage 7)");

        // Stage 8: decode
        let type_name = std::any::type_name::<T>();
        let data = ctx.decode(&value).map_err(|err| Error::Decode {
            type_name,
            source: err.into(),
        })?;
        let config = serde_json::from_value(data).map_err(|err| Error::Decode {
            type_name,
            source: err.into(),
        })?;
        tracing::debug!(type_name, "Decoded configuration (stage 8)");
        Ok(config)
    }

    /// Like [`Loader::load`], writing into `dest`.
    ///
    /// `dest` is only assigned once every stage has succeeded.
    pub fn load_into<T, R>(
        &self,
        fs: &(impl FileSystem + ?Sized),
        entry: impl Into<NormalizedPath>,
        schema: &[u8],
        defaults: &[u8],
        runtime: Option<&R>,
        dest: &mut T,
    ) -> Result<()>
    where
        T: DeserializeOwned,
        R: Serialize + ?Sized,
    {
        *dest = self.load(fs, entry, schema, defaults, runtime)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use cueconfig_fs::MemFs;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::{Value as Json, json};

    const SCHEMA: &str = "port?: int & >0\nname?: string\n";
    const DEFAULTS: &str = "port: *8080 | _\nname: *\"svc\" | _\n";

    #[derive(Debug, Deserialize, PartialEq)]
    struct Service {
        port: u16,
        name: String,
    }

    fn load(fs: &MemFs, entry: &str) -> Result<Service> {
        Loader::new().load(fs, entry, SCHEMA.as_bytes(), DEFAULTS.as_bytes(), None::<&()>)
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let fs = MemFs::new().with_file("app.cue", "name: \"api\"");
        assert_eq!(
            load(&fs, "app.cue").unwrap(),
            Service {
                port: 8080,
                name: "api".into()
            }
        );
    }

    #[test]
    fn missing_entry_is_not_found() {
        let err = load(&MemFs::new(), "app.cue").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "configuration not found at app.cue");
    }

    #[test]
    fn syntax_errors_are_load_errors() {
        let fs = MemFs::new().with_file("app.cue", "port: {");
        let err = load(&fs, "app.cue").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(
            err.to_string()
                .starts_with("cannot load configuration from \"app.cue\": "),
            "{err}"
        );
    }

    #[test]
    fn standalone_errors_are_invalid() {
        let fs = MemFs::new().with_file("app.cue", "port: 1 & 2");
        let err = load(&fs, "app.cue").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[test]
    fn schema_violations_are_user_errors() {
        let fs = MemFs::new().with_file("app.cue", "port: -1");
        let err = load(&fs, "app.cue").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.is_user_error());
        assert!(err.to_string().contains("port: invalid value -1 (out of bound >0)"), "{err}");
    }

    #[test]
    fn broken_schema_is_a_host_defect() {
        let fs = MemFs::new().with_file("app.cue", "port: 1");
        let err = Loader::new()
            .load::<Json, ()>(&fs, "app.cue", b"port: int &", b"", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaCompile);
        assert!(err.is_host_defect());

        let err = Loader::new()
            .load::<Json, ()>(&fs, "app.cue", b"", b"port: 1 & 2", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DefaultsCompile);
    }

    #[test]
    fn unresolved_user_reference_is_a_load_error() {
        let fs = MemFs::new().with_file("app.cue", "port: *undefinedname | 3");
        let err = load(&fs, "app.cue").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(err.is_user_error());
        assert!(
            err.to_string()
                .contains("reference \"undefinedname\" not found:\n    app.cue:1:8"),
            "{err}"
        );
    }

    #[test]
    fn unresolved_program_references_are_host_defects() {
        let fs = MemFs::new().with_file("app.cue", "port: 1");
        let err = Loader::new()
            .load::<Json, ()>(&fs, "app.cue", b"port?: nat", b"", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaCompile);
        assert!(err.is_host_defect());

        let schema = b"path?: string\nruntime?: _";
        for defaults in [
            "runtime: _\npath: *runtim.currentDirectory | _",
            "runtime: _\nx: *nope | 3",
        ] {
            let err = Loader::new()
                .load::<Json, ()>(&fs, "app.cue", schema, defaults.as_bytes(), None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DefaultsCompile, "{defaults}");
            assert!(err.is_host_defect());
        }
    }

    #[test]
    fn integers_span_both_64_bit_ranges() {
        let fs = MemFs::new().with_file("app.cue", "low: -9223372036854775808");
        let out: Json = Loader::new()
            .load(
                &fs,
                "app.cue",
                b"low?: int\nuid?: int",
                b"",
                Some(&json!({"uid": u64::MAX})),
            )
            .unwrap();
        assert_eq!(out, json!({"low": i64::MIN, "uid": u64::MAX}));
    }

    #[test]
    fn conflicting_defaults() {
        let fs = MemFs::new().with_file("app.cue", "port: 1");
        let err = Loader::new()
            .load::<Json, ()>(&fs, "app.cue", b"", b"port: 2", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Defaults);
    }

    #[test]
    fn runtime_conflicts_are_host_defects() {
        let fs = MemFs::new().with_file("app.cue", "port: 1");
        let err = Loader::new()
            .load::<Json, _>(&fs, "app.cue", b"", b"", Some(&json!({"port": 2})))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert!(err.is_host_defect());
    }

    #[test]
    fn decode_names_the_destination() {
        let fs = MemFs::new().with_file("app.cue", "port: 70000\nname: \"x\"");
        let err = Loader::new()
            .load::<Service, ()>(&fs, "app.cue", b"", b"", None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("Service"), "{err}");
    }

    #[test]
    fn load_into_keeps_destination_on_failure() {
        let fs = MemFs::new().with_file("app.cue", "port: \"eighty\"");
        let mut dest = Service {
            port: 1,
            name: "before".into(),
        };
        let err = Loader::new()
            .load_into(
                &fs,
                "app.cue",
                SCHEMA.as_bytes(),
                DEFAULTS.as_bytes(),
                None::<&()>,
                &mut dest,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert_eq!(dest.name, "before");

        let fs = MemFs::new().with_file("app.cue", "port: 80");
        Loader::new()
            .load_into(
                &fs,
                "app.cue",
                SCHEMA.as_bytes(),
                DEFAULTS.as_bytes(),
                None::<&()>,
                &mut dest,
            )
            .unwrap();
        assert_eq!(
            dest,
            Service {
                port: 80,
                name: "svc".into()
            }
        );
    }
}

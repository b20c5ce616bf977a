//! Error types for cueconfig
//!
//! Every pipeline stage has its own variant so callers can tell a broken user
//! configuration (fix the config) from a defect in the embedding program
//! (fix the schema, defaults or runtime wiring).

/// Result type for cueconfig operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed engine or decoder error carried by the stage variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while loading a configuration
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The entry path does not exist
    #[error("configuration not found at {path}")]
    NotFound { path: String },

    /// Walking or reading the source tree failed
    #[error("cannot discover configuration sources: {0}")]
    Discovery(#[source] cueconfig_fs::Error),

    /// The configuration package could not be loaded or parsed
    #[error("cannot load configuration from {path:?}: {source}")]
    Load { path: String, source: BoxError },

    /// The configuration is invalid on its own, before any schema applies
    #[error("invalid configuration from {path:?}: {source}")]
    Invalid { path: String, source: BoxError },

    /// The program-supplied schema does not compile
    #[error("unexpected error in configuration schema: {source}")]
    SchemaCompile { source: BoxError },

    /// The program-supplied defaults do not compile
    #[error("unexpected error in defaults: {source}")]
    DefaultsCompile { source: BoxError },

    /// The configuration does not satisfy the schema
    #[error("error in configuration: {source}")]
    Schema { source: BoxError },

    /// The runtime values conflict with the schema or the configuration
    #[error("config schema conflict on runtime values: {source}")]
    Runtime { source: BoxError },

    /// References or defaults could not be resolved
    #[error("internal error: cannot finalize configuration value: {source}")]
    Finalize { source: BoxError },

    /// The program-level defaults conflict with the finalized configuration
    #[error("config schema error applying program-level defaults: {source}")]
    Defaults { source: BoxError },

    /// The final value does not fit the destination type
    #[error("cannot decode final configuration into {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        source: BoxError,
    },
}

/// The stage that produced an [`Error`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Discovery,
    Load,
    Invalid,
    SchemaCompile,
    DefaultsCompile,
    Schema,
    Runtime,
    Finalize,
    Defaults,
    Decode,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Discovery(_) => ErrorKind::Discovery,
            Self::Load { .. } => ErrorKind::Load,
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::SchemaCompile { .. } => ErrorKind::SchemaCompile,
            Self::DefaultsCompile { .. } => ErrorKind::DefaultsCompile,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Runtime { .. } => ErrorKind::Runtime,
            Self::Finalize { .. } => ErrorKind::Finalize,
            Self::Defaults { .. } => ErrorKind::Defaults,
            Self::Decode { .. } => ErrorKind::Decode,
        }
    }

    /// Whether the entry path was absent. Hosts usually treat this as
    /// "no configuration" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether the end user's configuration is at fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Load | ErrorKind::Invalid | ErrorKind::Schema
        )
    }

    /// Whether the embedding program is at fault: its schema, defaults,
    /// runtime values or destination type.
    pub fn is_host_defect(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SchemaCompile
                | ErrorKind::DefaultsCompile
                | ErrorKind::Runtime
                | ErrorKind::Finalize
                | ErrorKind::Defaults
                | ErrorKind::Decode
        )
    }
}

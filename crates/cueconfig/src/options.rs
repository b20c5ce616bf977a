//! Loader options

use std::path::PathBuf;

/// Environment variable naming a directory to dump discovered sources into.
pub const DUMP_DIR_ENV: &str = "CUECONFIG_DUMP_DIR";

/// Default extension of configuration source files.
pub const DEFAULT_EXTENSION: &str = "cue";

/// Options controlling source discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Extension (without the dot) of files pulled into the overlay
    pub extension: String,

    /// When set, every discovered source is also copied here for inspection
    pub dump_dir: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            dump_dir: None,
        }
    }
}

impl LoadOptions {
    /// Default options, with `dump_dir` taken from `CUECONFIG_DUMP_DIR`.
    ///
    /// An empty variable counts as unset.
    pub fn from_env() -> Self {
        Self {
            dump_dir: std::env::var_os(DUMP_DIR_ENV)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_cue_sources() {
        let options = LoadOptions::default();
        assert_eq!(options.extension, "cue");
        assert!(options.dump_dir.is_none());
    }

    #[test]
    fn extension_drops_leading_dot() {
        assert_eq!(LoadOptions::default().with_extension(".conf").extension, "conf");
    }
}

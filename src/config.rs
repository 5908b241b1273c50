// Persistent defaults for the CLI
//
// Precedence, lowest first: built-in defaults, the TOML file, DEVPREP_*
// environment variables. Command line flags are applied on top by the binary.

use crate::probe::ProbeBackend;
use crate::{PrepFlags, PrepResult};
use ::config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "DEVPREP";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepConfig {
    /// TRIM the whole device before clearing metadata
    pub discard: bool,
    /// Also clear the last 2 MiB
    pub zero_end: bool,
    pub verbose: bool,
    pub probe: ProbeBackend,
    pub log_format: LogFormat,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            discard: true,
            zero_end: false,
            verbose: false,
            probe: ProbeBackend::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl PrepConfig {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> PrepResult<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                if let Some(default) = Self::default_path() {
                    builder = builder
                        .add_source(File::from(default.as_path()).format(FileFormat::Toml).required(false));
                }
            }
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let loaded: PrepConfig = config.try_deserialize()?;
        tracing::debug!(?loaded, "Configuration loaded");
        Ok(loaded)
    }

    /// `<config dir>/devprep/config.toml`, when a home directory is known
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "devprep").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Preparation flags implied by the configuration alone
    pub fn flags(&self) -> PrepFlags {
        PrepFlags {
            zoned: false,
            discard: self.discard,
            verbose: self.verbose,
            zero_end: self.zero_end,
        }
    }
}

//! Daemon configuration.
//!
//! A single document, `<config-dir>/veriprintd.toml`, with one
//! recognized section: `[sid_overrides]`, mapping OS user names to
//! explicit security-identifier strings. A missing file means an empty
//! mapping; a present file without the section is a startup error.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::Deserialize;
use veriprint_core::{Sid, SidParseError};

/// Config file name inside the configuration directory.
pub const CONFIG_FILE: &str = "veriprintd.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("bad identifier override for user {user:?}: {source}")]
    BadOverride {
        user: String,
        #[source]
        source: SidParseError,
    },
}

/// Parsed configuration document.
///
/// `sid_overrides` has no serde default on purpose: a present file must
/// carry the section, even if the table is empty.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    pub sid_overrides: BTreeMap<String, String>,
}

impl Config {
    /// Load from `<dir>/veriprintd.toml`. A missing file yields the
    /// default (empty) configuration.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read { path: path.display().to_string(), source })
            }
        };

        toml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
    }

    /// Validate and parse the override strings into identifiers.
    pub fn parsed_overrides(&self) -> Result<BTreeMap<String, Sid>, ConfigError> {
        self.sid_overrides
            .iter()
            .map(|(user, raw)| {
                raw.parse::<Sid>()
                    .map(|sid| (user.clone(), sid))
                    .map_err(|source| ConfigError::BadOverride { user: user.clone(), source })
            })
            .collect()
    }
}

pub mod defaults;
pub mod settings;
pub mod user;

use std::path::PathBuf;

use thiserror::Error;

pub use settings::{BackendKind, BackendSettings, BridgeSettings, ServerSettings, Settings};
pub use user::{load_settings, user_config_path};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`Settings`].
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Settings {
    /// Parse settings from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bridge = &self.bridge;
        if bridge.response_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "bridge.response_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if bridge.submit_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "bridge.submit_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if bridge.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "bridge.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.backend.kind == BackendKind::Process && self.backend.cmd.is_empty() {
            return Err(ConfigError::Invalid(
                "backend.cmd is required for the process backend".to_string(),
            ));
        }
        Ok(())
    }
}

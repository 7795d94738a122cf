//! User configuration loading.
//!
//! User config location: $XDG_CONFIG_HOME/koebashi/koebashi.toml
//! Fallback: the platform config directory (`dirs::config_dir()`).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::ConfigError;
use super::settings::Settings;

const APP_DIR: &str = "koebashi";
const FILE_NAME: &str = "koebashi.toml";

/// Returns the path to the user configuration file.
///
/// The path is determined by:
/// 1. If $XDG_CONFIG_HOME is set and non-empty: $XDG_CONFIG_HOME/koebashi/koebashi.toml
/// 2. Otherwise: `dirs::config_dir()`/koebashi/koebashi.toml
///
/// Returns None if no config directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    Some(base.join(APP_DIR).join(FILE_NAME))
}

/// Load settings from `explicit`, or from the user config path.
///
/// An explicitly named file must exist. A missing user config file yields
/// defaults. The result is not validated; callers apply their overrides
/// first and then call [`Settings::validate`].
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, ConfigError> {
    let settings = match explicit {
        Some(path) => read_settings(path)?,
        None => match user_config_path() {
            Some(path) => match read_settings(&path) {
                Err(ConfigError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                    debug!(
                        target: "koebashi::config",
                        "No user config at {}, using defaults",
                        path.display()
                    );
                    Settings::default()
                }
                other => other?,
            },
            None => Settings::default(),
        },
    };
    Ok(settings)
}

fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = Settings::from_toml_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        target: "koebashi::config",
        "Loaded configuration from {}",
        path.display()
    );
    Ok(settings)
}

//! Default configuration template.
//!
//! `config init` serializes [`default_settings`] so the generated file always
//! matches what an empty configuration would load.

use super::settings::Settings;

/// Settings used when no configuration file exists.
pub fn default_settings() -> Settings {
    Settings::default()
}

/// Render the default settings as a TOML document.
pub fn render_template() -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&default_settings())
}

mod settings;

use config::{Config, ConfigError, Environment, File};

use crate::config::settings::PartialSettings;

pub use settings::{LogSettings, RelaySettings, ServerSettings, Settings};

/// Loads the configuration from `config/default` and `VIZRELAY__*` environment
/// variables, then merges it over the defaults.
///
/// Nested keys use a double underscore, e.g. `VIZRELAY__RELAY__QUEUE_SIZE=4`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("VIZRELAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}

#[cfg(test)]
mod tests;

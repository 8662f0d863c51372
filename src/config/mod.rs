//! The `config` module loads node configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! `config/default.*` file, and `POPMESH__`-prefixed environment variables
//! (`POPMESH__NODE__REQUEST_TIMEOUT_MS=250`; lists are comma separated).

mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{LoggingSettings, NodeSettings, Settings};

const ENV_PREFIX: &str = "POPMESH";

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(environment());

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    Ok(Settings::merged(partial))
}

/// Like [`load_config`] but reads `path` instead of `config/default`.
pub fn load_config_from(path: &Path) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::from(path))
        .add_source(environment());

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    Ok(Settings::merged(partial))
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("node.subscribe_upstream_addresses")
}

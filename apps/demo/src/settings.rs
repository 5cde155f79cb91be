use config::{Config, Environment, File};
use evd_dispatch::DispatcherConfig;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::Path;
use tracing::info;

const ENV_PREFIX: &str = "EVD";
const DEFAULT_LEVEL: &str = "info";

#[evd_derive::evd_error]
pub(crate) enum ConfigError {
    #[error("Config error{}: {source}", format_context(context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct DemoConfig {
    pub(crate) dispatcher: DispatcherConfig,
    pub(crate) log: LogConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub(crate) struct LogConfig {
    /// Default level directive, e.g. `debug`.
    pub(crate) level: String,
    /// Explicit filter such as `evd_dispatch=trace`; replaces `RUST_LOG` when set.
    pub(crate) filter: Option<String>,
    pub(crate) json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: DEFAULT_LEVEL.to_owned(), filter: None, json: false }
    }
}

/// Loads [`DemoConfig`] from an optional TOML file overlaid with `EVD__*` environment variables.
///
/// Nested keys use double underscores: `EVD__DISPATCHER__TYPE_CAPACITY=64` sets
/// `dispatcher.type_capacity`.
///
/// # Errors
/// Fails when the given file is missing or unreadable, or when a value has the wrong shape.
pub(crate) fn load_config(path: Option<&Path>) -> Result<DemoConfig, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        info!(path = %path.display(), "Loading config file");
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .convert_case(config::Case::Snake),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<DemoConfig>()
        .context("Failed to deserialize config")?;

    Ok(config)
}

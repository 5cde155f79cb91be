//! # Logger
//!
//! Console logging bootstrap for the workspace binaries.
//!
//! Installs a global `tracing` subscriber made of an [`EnvFilter`] and a single console layer,
//! rendered either in the compact human format or as one JSON object per line.
//!
//! * The level set with [`LoggerBuilder::level`] is the default directive.
//! * Use [`LoggerBuilder::env_filter`] to set module-directed filters
//!   (e.g., `"evd_dispatch=trace,evd_demo=debug"`). Without it, `RUST_LOG` is honoured.
//!
//! ## Example
//!
//! ```rust
//! # use evd_logger::{Logger, LevelFilter};
//!
//! let _logger = Logger::builder()
//!     .name("my-app")
//!     .level(LevelFilter::DEBUG)
//!     .init()
//!     .unwrap();
//! ```

mod error;

pub use crate::error::{LoggerError, LoggerErrorExt};
pub use tracing::level_filters::LevelFilter;

use private::Sealed;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug)]
pub struct LoggerConfig {
    level: LevelFilter,
    json: bool,
    ansi: bool,
    env_filter: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { level: LevelFilter::INFO, json: false, ansi: true, env_filter: None }
    }
}

#[derive(Debug)]
pub struct NoName;
#[derive(Debug)]
pub struct WithName(String);

mod private {
    pub trait Sealed {}
}
impl Sealed for NoName {}
impl Sealed for WithName {}

/// A builder for configuring and initializing the global tracing subscriber.
///
/// A name is required before [`LoggerBuilder::init`] becomes available.
#[derive(Debug)]
pub struct LoggerBuilder<N: Sealed = NoName> {
    config: LoggerConfig,
    name: N,
}

impl LoggerBuilder<NoName> {
    /// Sets the name of the logger.
    pub fn name(self, name: impl Into<String>) -> LoggerBuilder<WithName> {
        LoggerBuilder { name: WithName(name.into()), config: self.config }
    }
}

impl LoggerBuilder<WithName> {
    /// Configures the minimum log level to be emitted.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn level(mut self, level: LevelFilter) -> Self {
        self.config.level = level;
        self
    }

    /// Adds an explicit env filter (e.g., `evd_dispatch=trace`).
    ///
    /// Replaces `RUST_LOG`. Invalid filters cause [`LoggerBuilder::init`] to return an error.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn env_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.env_filter = Some(filter.into());
        self
    }

    /// Emits one JSON object per event instead of the compact format.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn json(mut self) -> Self {
        self.config.json = true;
        self
    }

    /// Toggles ANSI colors for the compact format. JSON output is never colored.
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub const fn ansi(mut self, enabled: bool) -> Self {
        self.config.ansi = enabled;
        self
    }

    /// Consumes the builder and initializes the global tracing subscriber.
    ///
    /// # Errors
    /// Returns [`LoggerError::Subscriber`] if a global subscriber has already been set.
    /// Returns [`LoggerError::InvalidConfiguration`] for invalid builder settings.
    pub fn init(self) -> Result<Logger, LoggerError> {
        validate_name(&self.name.0)?;

        let env_filter = build_env_filter(&self.config)?;

        let console = if self.config.json {
            layer().json().with_ansi(false).boxed()
        } else {
            layer().compact().with_ansi(self.config.ansi).boxed()
        };

        tracing_subscriber::registry().with(env_filter).with(console).try_init()?;

        tracing::debug!(name = %self.name.0, json = self.config.json, "Logger initialized");
        Ok(Logger { name: self.name.0 })
    }
}

/// A handle to the initialized logging system.
#[must_use = "The handle identifies the installed subscriber; keep it for the program lifetime."]
#[derive(Debug)]
pub struct Logger {
    name: String,
}

impl Logger {
    /// Returns a new [`LoggerBuilder`] to configure the global tracing subscriber.
    ///
    /// # Example
    ///
    /// ```rust
    /// use evd_logger::{LevelFilter, Logger};
    ///
    /// let logger = Logger::builder()
    ///     .name("my-app")
    ///     .level(LevelFilter::DEBUG)
    ///     .init()
    ///     .unwrap();
    /// assert_eq!(logger.name(), "my-app");
    /// ```
    #[must_use = "The builder must be configured before it can be used to initialize the logger."]
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder { config: LoggerConfig::default(), name: NoName }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_name(name: &str) -> Result<(), LoggerError> {
    if name.trim().is_empty() {
        return Err(LoggerError::InvalidConfiguration {
            message: "Logger name cannot be empty".into(),
            context: None,
        });
    }
    Ok(())
}

fn build_env_filter(config: &LoggerConfig) -> Result<EnvFilter, LoggerError> {
    let builder = EnvFilter::builder().with_default_directive(config.level.into());
    config.env_filter.as_ref().map_or_else(
        || Ok(builder.from_env_lossy()),
        |filter| {
            builder.parse(filter).map_err(|e| LoggerError::InvalidConfiguration {
                message: format!("Invalid env filter '{filter}': {e}").into(),
                context: None,
            })
        },
    )
}

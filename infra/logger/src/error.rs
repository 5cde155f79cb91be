use std::borrow::Cow;

/// Why [`LoggerBuilder::init`](crate::LoggerBuilder::init) refused to install the subscriber.
#[evd_derive::evd_error]
pub enum LoggerError {
    /// Another subscriber already owns the process-wide default; the first install wins.
    #[error("Global subscriber already installed{}: {source}", format_context(context))]
    Subscriber {
        source: tracing_subscriber::util::TryInitError,
        context: Option<Cow<'static, str>>,
    },

    /// Blank name or an env filter directive that does not parse.
    #[error("Logger settings rejected{}: {message}", format_context(context))]
    InvalidConfiguration { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

use std::borrow::Cow;

/// Boxed error accepted by [`HandlerError::Failed`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a handler invocation other than success.
///
/// [`HandlerError::Unregister`] is a signal rather than a failure: the handler is removed after
/// the current invocation and the dispatch carries on. Every other variant halts the remaining
/// handlers of the dispatch and is returned verbatim to the caller.
#[evd_derive::evd_error]
pub enum HandlerError {
    /// Remove the handler after this invocation.
    #[error("Handler requested unregistration")]
    Unregister,

    /// The handler failed with an application error.
    #[error("Handler failed{}: {source}", format_context(context))]
    Failed { source: BoxError, context: Option<Cow<'static, str>> },

    /// The handler failed with a plain message.
    #[error("Handler fault{}: {message}", format_context(context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl HandlerError {
    /// Wraps any error as [`HandlerError::Failed`].
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed { source: err.into(), context: None }
    }

    #[must_use]
    pub const fn is_unregister(&self) -> bool {
        matches!(self, Self::Unregister)
    }
}

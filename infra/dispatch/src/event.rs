use std::any::Any;
use std::fmt;

/// Identifies "what happened": a coarse event kind plus a fine-grained value within it.
///
/// Handlers registered against the bare `kind` see every value of that kind; handlers
/// registered against the full identifier only see this exact value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId<T, V> {
    pub kind: T,
    pub value: V,
}

impl<T, V> EventId<T, V> {
    #[must_use]
    pub const fn new(kind: T, value: V) -> Self {
        Self { kind, value }
    }
}

impl<T, V> From<(T, V)> for EventId<T, V> {
    fn from((kind, value): (T, V)) -> Self {
        Self { kind, value }
    }
}

/// A dispatched occurrence as seen by handlers.
///
/// The generator and parameters are opaque to the dispatcher. They are handed through exactly
/// as the caller passed them to [`Dispatcher::dispatch`](crate::Dispatcher::dispatch) and can be
/// recovered with the typed accessors.
pub struct Event<'a, T, V> {
    id: &'a EventId<T, V>,
    generator: Option<&'a dyn Any>,
    params: &'a [&'a dyn Any],
}

impl<'a, T, V> Event<'a, T, V> {
    pub(crate) const fn new(
        id: &'a EventId<T, V>,
        generator: Option<&'a dyn Any>,
        params: &'a [&'a dyn Any],
    ) -> Self {
        Self { id, generator, params }
    }

    #[must_use]
    pub const fn id(&self) -> &'a EventId<T, V> {
        self.id
    }

    #[must_use]
    pub const fn kind(&self) -> &'a T {
        &self.id.kind
    }

    #[must_use]
    pub const fn value(&self) -> &'a V {
        &self.id.value
    }

    /// The producer of the event, if the caller supplied one.
    #[must_use]
    pub const fn generator(&self) -> Option<&'a dyn Any> {
        self.generator
    }

    /// Downcasts the generator to `G`. `None` when absent or of another type.
    #[must_use]
    pub fn generator_as<G: Any>(&self) -> Option<&'a G> {
        self.generator.and_then(|generator| generator.downcast_ref::<G>())
    }

    #[must_use]
    pub const fn params(&self) -> &'a [&'a dyn Any] {
        self.params
    }

    /// Downcasts the parameter at `index` to `P`.
    ///
    /// # Examples
    /// ```rust
    /// use evd_dispatch::{Dispatcher, EventId, HandlerError, handler_fn};
    ///
    /// let dispatcher = Dispatcher::<u8, u8, u8>::new();
    /// dispatcher.add_type_handler(
    ///     1,
    ///     0,
    ///     handler_fn(|event| {
    ///         assert_eq!(event.param::<&str>(0), Some(&"payload"));
    ///         assert_eq!(event.param::<u64>(0), None);
    ///         Ok::<(), HandlerError>(())
    ///     }),
    ///     false,
    /// );
    /// dispatcher.dispatch(&EventId::new(1, 7), None, &[&"payload"]).unwrap();
    /// ```
    #[must_use]
    pub fn param<P: Any>(&self, index: usize) -> Option<&'a P> {
        self.params.get(index).and_then(|param| param.downcast_ref::<P>())
    }
}

impl<T, V> Clone for Event<'_, T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Event<'_, T, V> {}

impl<T: fmt::Debug, V: fmt::Debug> fmt::Debug for Event<'_, T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", self.id)
            .field("generator", &self.generator.is_some())
            .field("params", &self.params.len())
            .finish()
    }
}

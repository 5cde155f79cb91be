use crate::error::HandlerError;
use crate::event::Event;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Something that reacts to dispatched events.
///
/// Returning [`HandlerError::Unregister`] removes the handler after this call without
/// affecting the other handlers. Any other error stops the dispatch and is handed back to the
/// caller of [`Dispatcher::dispatch`](crate::Dispatcher::dispatch).
pub trait EventHandler<T, V> {
    /// Handles one event.
    ///
    /// # Errors
    /// See the trait documentation for how each error is treated.
    fn handle_event(&mut self, event: &Event<'_, T, V>) -> Result<(), HandlerError>;
}

/// Adapter turning a closure into an [`EventHandler`]. Built with [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerFn").field("f", &std::any::type_name::<F>()).finish()
    }
}

/// Wraps a closure so it can be registered as a handler.
///
/// # Examples
/// ```rust
/// use evd_dispatch::{Dispatcher, EventId, HandlerError, handler_fn};
///
/// let dispatcher = Dispatcher::<&str, u32, &str>::new();
/// dispatcher.add_handler(
///     EventId::new("login", 7),
///     "audit",
///     handler_fn(|event| {
///         assert_eq!(*event.value(), 7);
///         Err(HandlerError::Unregister)
///     }),
///     false,
/// );
/// dispatcher.dispatch(&EventId::new("login", 7), None, &[]).unwrap();
/// assert!(dispatcher.is_empty());
/// ```
pub const fn handler_fn<T, V, F>(f: F) -> HandlerFn<F>
where
    F: FnMut(&Event<'_, T, V>) -> Result<(), HandlerError>,
{
    HandlerFn { f }
}

impl<T, V, F> EventHandler<T, V> for HandlerFn<F>
where
    F: FnMut(&Event<'_, T, V>) -> Result<(), HandlerError>,
{
    fn handle_event(&mut self, event: &Event<'_, T, V>) -> Result<(), HandlerError> {
        (self.f)(event)
    }
}

pub(crate) type SharedHandler<T, V> = Rc<RefCell<dyn EventHandler<T, V>>>;

/// One registration inside a handler list.
pub(crate) struct HandlerEntry<T, V, K> {
    pub(crate) key: K,
    pub(crate) handler: SharedHandler<T, V>,
    pub(crate) once: bool,
}

impl<T, V, K> HandlerEntry<T, V, K> {
    pub(crate) fn new<H>(key: K, handler: H, once: bool) -> Self
    where
        H: EventHandler<T, V> + 'static,
    {
        Self { key, handler: Rc::new(RefCell::new(handler)), once }
    }

    /// Swaps in a new handler and flag, keeping the key and therefore the position.
    ///
    /// Returns the displaced handler so the caller can drop it once its own borrows are released.
    pub(crate) fn replace<H>(&mut self, handler: H, once: bool) -> SharedHandler<T, V>
    where
        H: EventHandler<T, V> + 'static,
    {
        self.once = once;
        std::mem::replace(&mut self.handler, Rc::new(RefCell::new(handler)))
    }
}

pub(crate) fn invoke<T, V>(
    handler: &SharedHandler<T, V>,
    event: &Event<'_, T, V>,
) -> Result<(), HandlerError> {
    handler.borrow_mut().handle_event(event)
}

impl<T, V, K: fmt::Debug> fmt::Debug for HandlerEntry<T, V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry").field("key", &self.key).field("once", &self.once).finish()
    }
}

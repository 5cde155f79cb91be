use crate::bucket::TypeBucket;
use crate::config::DispatcherConfig;
use crate::error::HandlerError;
use crate::event::{Event, EventId};
use crate::handler::EventHandler;
use fxhash::FxHashMap;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use tracing::{debug, trace};

type SharedBucket<T, V, K> = Rc<TypeBucket<T, V, K>>;

/// A two-tier, single-threaded handler registry.
///
/// Handlers are registered either for a bare event kind (they see every value of that kind) or
/// for an exact [`EventId`]. [`Dispatcher::dispatch`] invokes the kind-level handlers first, then
/// the handlers of the exact identifier, each tier in registration order.
///
/// Every method takes `&self`, so handlers may hold an `Rc<Dispatcher>` (preferably a `Weak`)
/// and add or remove registrations while a dispatch is running. Removals requested that way
/// take effect once the running pass completes. Starting a second dispatch from inside a
/// handler is a bug and panics.
///
/// The dispatcher is neither `Send` nor `Sync`; use one instance per thread.
///
/// # Examples
/// ```rust
/// use evd_dispatch::{Dispatcher, EventId, HandlerError, handler_fn};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Conn { Opened, Closed }
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let dispatcher = Dispatcher::<Conn, u32, &str>::new();
///
/// let log = Rc::clone(&seen);
/// dispatcher.add_type_handler(Conn::Opened, "audit", handler_fn(move |event| {
///     log.borrow_mut().push(format!("audit {}", event.value()));
///     Ok::<(), HandlerError>(())
/// }), false);
///
/// let log = Rc::clone(&seen);
/// dispatcher.add_handler(EventId::new(Conn::Opened, 7), "greet", handler_fn(move |_| {
///     log.borrow_mut().push("greet 7".to_owned());
///     Ok::<(), HandlerError>(())
/// }), true);
///
/// dispatcher.dispatch(&EventId::new(Conn::Opened, 7), None, &[]).unwrap();
/// dispatcher.dispatch(&EventId::new(Conn::Opened, 7), None, &[]).unwrap();
/// dispatcher.dispatch(&EventId::new(Conn::Closed, 7), None, &[]).unwrap();
///
/// assert_eq!(*seen.borrow(), ["audit 7", "greet 7", "audit 7"]);
/// ```
pub struct Dispatcher<T, V, K> {
    buckets: RefCell<FxHashMap<T, SharedBucket<T, V, K>>>,
    calling: Cell<bool>,
    config: DispatcherConfig,
}

impl<T, V, K> Default for Dispatcher<T, V, K>
where
    T: Eq + Hash + fmt::Debug,
    V: Eq + Hash + fmt::Debug,
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::with_config(DispatcherConfig::default())
    }
}

impl<T, V, K> Dispatcher<T, V, K>
where
    T: Eq + Hash + fmt::Debug,
    V: Eq + Hash + fmt::Debug,
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Creates an empty dispatcher with default capacity hints.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            buckets: RefCell::new(FxHashMap::with_capacity_and_hasher(
                config.type_capacity,
                Default::default(),
            )),
            calling: Cell::new(false),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Registers `handler` for every value of `kind`.
    ///
    /// Re-registering an existing `key` for the same kind replaces the handler and the
    /// `once` flag while keeping its place in the invocation order.
    pub fn add_type_handler<H>(&self, kind: T, key: K, handler: H, once: bool)
    where
        H: EventHandler<T, V> + 'static,
    {
        trace!(kind = ?kind, key = ?key, once, "Registering kind-level handler");
        self.bucket_or_insert(kind).add_type_level(key, handler, once);
    }

    /// Registers `handler` for exactly `id`.
    ///
    /// Keys are scoped per identifier: the same key may be used under several values.
    pub fn add_handler<H>(&self, id: EventId<T, V>, key: K, handler: H, once: bool)
    where
        H: EventHandler<T, V> + 'static,
    {
        trace!(kind = ?id.kind, value = ?id.value, key = ?key, once, "Registering value-level handler");
        self.bucket_or_insert(id.kind).add_value_level(id.value, key, handler, once);
    }

    /// Unregisters the kind-level handler stored under `key`. Unknown keys are ignored.
    pub fn remove_type_handler(&self, kind: &T, key: &K) {
        let Some(bucket) = self.bucket(kind) else {
            return;
        };
        bucket.remove_type_level(key);
        self.prune(kind, &bucket);
    }

    /// Unregisters the handler stored under `key` for exactly `id`. Unknown keys are ignored.
    pub fn remove_handler(&self, id: &EventId<T, V>, key: &K) {
        let Some(bucket) = self.bucket(&id.kind) else {
            return;
        };
        bucket.remove_value_level(&id.value, key);
        self.prune(&id.kind, &bucket);
    }

    /// Invokes the handlers matching `id`.
    ///
    /// `generator` and `params` reach the handlers untouched through the [`Event`].
    ///
    /// # Errors
    /// Returns the first hard error raised by a handler. Handlers that had not run yet are
    /// skipped for this dispatch and stay registered.
    ///
    /// # Panics
    /// Panics when called while another dispatch on this instance is in progress, typically
    /// from inside a handler.
    pub fn dispatch(
        &self,
        id: &EventId<T, V>,
        generator: Option<&dyn Any>,
        params: &[&dyn Any],
    ) -> Result<(), HandlerError> {
        let Some(bucket) = self.bucket(&id.kind) else {
            trace!(kind = ?id.kind, "No handlers for kind; dispatch skipped");
            return Ok(());
        };

        assert!(
            !self.calling.get(),
            "nested dispatch of {id:?}: this Dispatcher is already dispatching"
        );
        let result = {
            let _calling = CallingGuard::engage(&self.calling);
            bucket.dispatch(&Event::new(id, generator, params))
        };
        self.prune(&id.kind, &bucket);

        if let Err(err) = &result {
            debug!(kind = ?id.kind, value = ?id.value, error = %err, "Dispatch halted by handler");
        }
        result
    }

    /// Drops every registration and resets the dispatching state.
    ///
    /// When called from inside a handler, the running dispatch invokes no further handlers.
    pub fn clear(&self) {
        let buckets = std::mem::take(&mut *self.buckets.borrow_mut());
        for bucket in buckets.values() {
            bucket.clear();
        }
        self.calling.set(false);
        debug!(kinds = buckets.len(), "Dispatcher cleared");
    }

    /// `true` when no handler is registered at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.borrow().is_empty()
    }

    /// Number of event kinds with at least one registered handler.
    #[must_use]
    pub fn type_count(&self) -> usize {
        self.buckets.borrow().len()
    }

    /// Total number of registrations across both tiers, including removals still pending.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.buckets.borrow().values().map(|bucket| bucket.handler_count()).sum()
    }

    #[must_use]
    pub fn contains_type(&self, kind: &T) -> bool {
        self.buckets.borrow().contains_key(kind)
    }

    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.calling.get()
    }

    fn bucket(&self, kind: &T) -> Option<SharedBucket<T, V, K>> {
        self.buckets.borrow().get(kind).cloned()
    }

    fn bucket_or_insert(&self, kind: T) -> SharedBucket<T, V, K> {
        let mut buckets = self.buckets.borrow_mut();
        Rc::clone(buckets.entry(kind).or_insert_with_key(|kind| {
            trace!(kind = ?kind, "Materializing bucket");
            Rc::new(TypeBucket::new(self.config))
        }))
    }

    /// Forgets `kind` once its bucket is empty, unless the entry now holds a newer bucket.
    fn prune(&self, kind: &T, bucket: &SharedBucket<T, V, K>) {
        if !bucket.is_empty() {
            return;
        }
        let mut buckets = self.buckets.borrow_mut();
        if buckets.get(kind).is_some_and(|current| Rc::ptr_eq(current, bucket)) {
            buckets.remove(kind);
            trace!(kind = ?kind, "Kind released");
        }
    }
}

impl<T, V, K> fmt::Debug for Dispatcher<T, V, K>
where
    T: fmt::Debug,
    V: fmt::Debug,
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("buckets", &*self.buckets.borrow())
            .field("dispatching", &self.calling.get())
            .field("config", &self.config)
            .finish()
    }
}

/// Holds the in-progress flag for the duration of one dispatch.
struct CallingGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> CallingGuard<'a> {
    fn engage(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for CallingGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

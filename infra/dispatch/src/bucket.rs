use crate::config::DispatcherConfig;
use crate::error::HandlerError;
use crate::event::Event;
use crate::handler::EventHandler;
use crate::list::HandlerList;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use tracing::trace;

type SharedList<T, V, K> = Rc<HandlerList<T, V, K>>;

/// All handlers registered for one event kind.
///
/// Holds the kind-level handlers (any value) and the per-value handlers. Containers exist only
/// while they hold at least one handler.
pub(crate) struct TypeBucket<T, V, K> {
    any_value: RefCell<Option<SharedList<T, V, K>>>,
    by_value: RefCell<Option<FxHashMap<V, SharedList<T, V, K>>>>,
    config: DispatcherConfig,
}

impl<T, V, K> TypeBucket<T, V, K>
where
    V: Eq + Hash + fmt::Debug,
    K: Eq + Hash + Clone + fmt::Debug,
{
    pub(crate) const fn new(config: DispatcherConfig) -> Self {
        Self { any_value: RefCell::new(None), by_value: RefCell::new(None), config }
    }

    pub(crate) fn add_type_level<H>(&self, key: K, handler: H, once: bool)
    where
        H: EventHandler<T, V> + 'static,
    {
        let list = Rc::clone(self.any_value.borrow_mut().get_or_insert_with(|| {
            trace!("Materializing kind-level handler list");
            Rc::new(HandlerList::with_capacity(self.config.handler_capacity))
        }));
        list.add(key, handler, once);
    }

    pub(crate) fn add_value_level<H>(&self, value: V, key: K, handler: H, once: bool)
    where
        H: EventHandler<T, V> + 'static,
    {
        let list = {
            let mut by_value = self.by_value.borrow_mut();
            let lists = by_value.get_or_insert_with(|| {
                FxHashMap::with_capacity_and_hasher(self.config.value_capacity, Default::default())
            });
            Rc::clone(lists.entry(value).or_insert_with_key(|value| {
                trace!(value = ?value, "Materializing value-level handler list");
                Rc::new(HandlerList::with_capacity(self.config.handler_capacity))
            }))
        };
        list.add(key, handler, once);
    }

    pub(crate) fn remove_type_level(&self, key: &K) {
        let Some(list) = self.any_value.borrow().clone() else {
            return;
        };
        list.remove(key);
        self.prune_type_level(&list);
    }

    pub(crate) fn remove_value_level(&self, value: &V, key: &K) {
        let Some(list) = self.value_list(value) else {
            return;
        };
        list.remove(key);
        self.prune_value_level(value, &list);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.any_value.borrow().is_none() && self.by_value.borrow().is_none()
    }

    pub(crate) fn handler_count(&self) -> usize {
        let any_value = self.any_value.borrow().as_ref().map_or(0, |list| list.len());
        let by_value = self
            .by_value
            .borrow()
            .as_ref()
            .map_or(0, |lists| lists.values().map(|list| list.len()).sum::<usize>());
        any_value + by_value
    }

    /// Runs the kind-level handlers, then the handlers of `event.value()`.
    ///
    /// # Errors
    /// A hard error from the kind-level handlers is returned before the value-level handlers
    /// run; otherwise the value-level result is returned.
    pub(crate) fn dispatch(&self, event: &Event<'_, T, V>) -> Result<(), HandlerError> {
        // Clone the lists out: handlers may add or remove registrations on this bucket.
        let any_value = self.any_value.borrow().clone();
        if let Some(list) = any_value {
            let result = list.dispatch(event);
            self.prune_type_level(&list);
            result?;
        }

        let Some(list) = self.value_list(event.value()) else {
            return Ok(());
        };
        let result = list.dispatch(event);
        self.prune_value_level(event.value(), &list);
        result
    }

    pub(crate) fn clear(&self) {
        let by_value = self.by_value.borrow_mut().take();
        let any_value = self.any_value.borrow_mut().take();
        if let Some(lists) = &by_value {
            lists.values().for_each(|list| list.clear());
        }
        if let Some(list) = &any_value {
            list.clear();
        }
    }

    fn value_list(&self, value: &V) -> Option<SharedList<T, V, K>> {
        self.by_value.borrow().as_ref().and_then(|lists| lists.get(value).cloned())
    }

    /// Drops the kind-level list once empty, unless it was replaced in the meantime.
    fn prune_type_level(&self, list: &SharedList<T, V, K>) {
        let mut any_value = self.any_value.borrow_mut();
        if list.is_empty() && any_value.as_ref().is_some_and(|current| Rc::ptr_eq(current, list))
        {
            *any_value = None;
            trace!("Kind-level handler list released");
        }
    }

    fn prune_value_level(&self, value: &V, list: &SharedList<T, V, K>) {
        if !list.is_empty() {
            return;
        }

        let mut by_value = self.by_value.borrow_mut();
        let Some(lists) = by_value.as_mut() else {
            return;
        };
        if lists.get(value).is_some_and(|current| Rc::ptr_eq(current, list)) {
            lists.remove(value);
            trace!(value = ?value, "Value-level handler list released");
        }
        if lists.is_empty() {
            *by_value = None;
        }
    }

    #[cfg(test)]
    fn has_value_list(&self, value: &V) -> bool {
        self.value_list(value).is_some()
    }
}

impl<T, V: fmt::Debug, K: fmt::Debug> fmt::Debug for TypeBucket<T, V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeBucket")
            .field("any_value", &*self.any_value.borrow())
            .field("by_value", &*self.by_value.borrow())
            .finish_non_exhaustive()
    }
}

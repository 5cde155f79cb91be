use crate::error::HandlerError;
use crate::event::Event;
use crate::handler::{EventHandler, HandlerEntry, SharedHandler, invoke};
use fxhash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use tracing::{debug, trace};

/// Below this many slots tombstones are cheaper to keep than to compact.
const COMPACT_MIN_SLOTS: usize = 32;

struct Slots<T, V, K> {
    /// Registration order. `None` marks an entry removed while its position had to stay stable.
    entries: Vec<Option<HandlerEntry<T, V, K>>>,
    /// Key → position in `entries`. Only live entries are indexed.
    index: FxHashMap<K, usize>,
    /// Keys removed during a pass, applied once the pass ends.
    pending: Vec<K>,
}

impl<T, V, K: Eq + Hash + Clone> Slots<T, V, K> {
    /// Detaches the entry for `key`, leaving a tombstone. The caller drops the returned entry
    /// after releasing the borrow on these slots.
    fn unlink(&mut self, key: &K) -> Option<HandlerEntry<T, V, K>> {
        let pos = self.index.remove(key)?;
        self.entries.get_mut(pos).and_then(Option::take)
    }

    /// Must not run while a pass is iterating: it moves entries.
    fn compact_if_sparse(&mut self) {
        let live = self.index.len();
        if live == 0 {
            self.entries.clear();
            return;
        }
        if self.entries.len() < COMPACT_MIN_SLOTS || self.entries.len() <= live * 2 {
            return;
        }

        self.entries.retain(Option::is_some);
        for (pos, entry) in self.entries.iter().enumerate() {
            if let Some(entry) = entry
                && let Some(slot) = self.index.get_mut(&entry.key)
            {
                *slot = pos;
            }
        }
    }
}

/// Ordered, keyed handlers for one event kind or one (kind, value) pair.
///
/// Mutation is allowed while [`HandlerList::dispatch`] is running: additions append and are
/// reached by the running pass, removals are queued and applied when the pass ends.
pub(crate) struct HandlerList<T, V, K> {
    slots: RefCell<Slots<T, V, K>>,
    calling: Cell<bool>,
}

impl<T, V, K> HandlerList<T, V, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: RefCell::new(Slots {
                entries: Vec::with_capacity(capacity),
                index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
                pending: Vec::new(),
            }),
            calling: Cell::new(false),
        }
    }

    /// Registers `handler` under `key`, replacing an existing registration in place.
    pub(crate) fn add<H>(&self, key: K, handler: H, once: bool)
    where
        H: EventHandler<T, V> + 'static,
    {
        let displaced = {
            let mut guard = self.slots.borrow_mut();
            let slots = &mut *guard;
            // A re-add supersedes a removal queued earlier in the running pass, whether the key
            // is still live or already retired by its own handler.
            slots.pending.retain(|pending| pending != &key);

            if let Some(&pos) = slots.index.get(&key)
                && let Some(Some(entry)) = slots.entries.get_mut(pos)
            {
                trace!(key = ?key, once, "Handler replaced in place");
                Some(entry.replace(handler, once))
            } else {
                trace!(key = ?key, once, "Handler appended");
                slots.index.insert(key.clone(), slots.entries.len());
                slots.entries.push(Some(HandlerEntry::new(key, handler, once)));
                None
            }
        };
        // Handlers are dropped outside the borrow; their destructors may touch the registry.
        drop(displaced);
    }

    pub(crate) fn remove(&self, key: &K) {
        let retired = {
            let mut guard = self.slots.borrow_mut();
            let slots = &mut *guard;
            if !slots.index.contains_key(key) {
                return;
            }

            if self.calling.get() {
                debug!(key = ?key, "Removal deferred until the running pass completes");
                slots.pending.push(key.clone());
                return;
            }

            let retired = slots.unlink(key);
            slots.compact_if_sparse();
            trace!(key = ?key, "Handler removed");
            retired
        };
        drop(retired);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.borrow().index.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().index.len()
    }

    /// Runs every handler in registration order.
    ///
    /// # Errors
    /// Returns the first error other than [`HandlerError::Unregister`]; handlers after it are
    /// neither invoked nor removed.
    pub(crate) fn dispatch(&self, event: &Event<'_, T, V>) -> Result<(), HandlerError> {
        let _pass = Pass::begin(self);
        let mut cursor = 0;

        while let Some((pos, handler)) = self.next_live(&mut cursor) {
            match invoke(&handler, event) {
                Ok(()) => self.settle(pos, false),
                Err(HandlerError::Unregister) => self.settle(pos, true),
                Err(err) => {
                    debug!(position = pos, error = %err, "Handler failed; halting pass");
                    return Err(err);
                },
            }
        }

        Ok(())
    }

    pub(crate) fn clear(&self) {
        self.calling.set(false);
        let retired = {
            let mut slots = self.slots.borrow_mut();
            slots.index.clear();
            slots.pending.clear();
            std::mem::take(&mut slots.entries)
        };
        // Handlers are dropped outside the borrow; their destructors may touch the registry.
        drop(retired);
    }

    /// Returns the next live entry at or after `cursor`, advancing it past that entry.
    fn next_live(&self, cursor: &mut usize) -> Option<(usize, SharedHandler<T, V>)> {
        let slots = self.slots.borrow();
        let found = slots
            .entries
            .iter()
            .enumerate()
            .skip(*cursor)
            .find_map(|(pos, slot)| slot.as_ref().map(|entry| (pos, Rc::clone(&entry.handler))));
        *cursor = found.as_ref().map_or(slots.entries.len(), |(pos, _)| pos + 1);
        found
    }

    /// Drops the entry at `pos` if it fired for the last time.
    fn settle(&self, pos: usize, unregister: bool) {
        let retired = {
            let mut guard = self.slots.borrow_mut();
            let slots = &mut *guard;
            // Gone when the list was cleared from inside the handler.
            let Some(Some(entry)) = slots.entries.get(pos) else {
                return;
            };
            if !unregister && !entry.once {
                return;
            }

            let key = entry.key.clone();
            trace!(key = ?key, unregister, "Handler retired after firing");
            slots.unlink(&key)
        };
        drop(retired);
    }

    fn finish_pass(&self) {
        self.calling.set(false);
        let retired: Vec<_> = {
            let mut guard = self.slots.borrow_mut();
            let slots = &mut *guard;
            let retired = std::mem::take(&mut slots.pending)
                .into_iter()
                .filter_map(|key| {
                    let entry = slots.unlink(&key)?;
                    trace!(key = ?key, "Deferred removal applied");
                    Some(entry)
                })
                .collect();
            slots.compact_if_sparse();
            retired
        };
        drop(retired);
    }

    #[cfg(test)]
    pub(crate) fn keys(&self) -> Vec<K> {
        self.slots.borrow().entries.iter().flatten().map(|entry| entry.key.clone()).collect()
    }
}

impl<T, V, K: fmt::Debug> fmt::Debug for HandlerList<T, V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.borrow();
        f.debug_struct("HandlerList")
            .field("handlers", &slots.index.len())
            .field("slots", &slots.entries.len())
            .field("pending", &slots.pending)
            .field("calling", &self.calling.get())
            .finish()
    }
}

/// Marks a list as iterating; settles deferred removals on every exit path, unwinding included.
struct Pass<'a, T, V, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    list: &'a HandlerList<T, V, K>,
}

impl<'a, T, V, K> Pass<'a, T, V, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn begin(list: &'a HandlerList<T, V, K>) -> Self {
        list.calling.set(true);
        Self { list }
    }
}

impl<T, V, K> Drop for Pass<'_, T, V, K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn drop(&mut self) {
        self.list.finish_pass();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventId;
    use crate::handler::handler_fn;

    type Log = Rc<RefCell<Vec<&'static str>>>;
    type List = HandlerList<u8, u8, &'static str>;

    fn recorder(log: &Log, name: &'static str) -> impl EventHandler<u8, u8> + 'static {
        let log = Rc::clone(log);
        handler_fn(move |_| {
            log.borrow_mut().push(name);
            Ok(())
        })
    }

    fn fire(list: &List) -> Result<(), HandlerError> {
        let id = EventId::new(1, 1);
        list.dispatch(&Event::new(&id, None, &[]))
    }

    #[test]
    fn dispatch_follows_insertion_order() {
        let log = Log::default();
        let list = List::with_capacity(2);
        list.add("a", recorder(&log, "a"), false);
        list.add("b", recorder(&log, "b"), false);
        list.add("c", recorder(&log, "c"), false);

        fire(&list).unwrap();
        assert_eq!(*log.borrow(), ["a", "b", "c"]);
    }

    #[test]
    fn readd_replaces_in_place() {
        let log = Log::default();
        let list = List::with_capacity(2);
        list.add("a", recorder(&log, "a"), false);
        list.add("b", recorder(&log, "b"), false);
        list.add("a", recorder(&log, "a2"), true);

        assert_eq!(list.keys(), ["a", "b"]);
        fire(&list).unwrap();
        fire(&list).unwrap();
        assert_eq!(*log.borrow(), ["a2", "b", "b"]);
    }

    #[test]
    fn removal_during_pass_is_deferred() {
        let log = Log::default();
        let list = Rc::new(List::with_capacity(2));

        let weak = Rc::downgrade(&list);
        let inner = Rc::clone(&log);
        list.add(
            "remover",
            handler_fn(move |_| {
                inner.borrow_mut().push("remover");
                if let Some(list) = weak.upgrade() {
                    list.remove(&"victim");
                }
                Ok(())
            }),
            false,
        );
        list.add("victim", recorder(&log, "victim"), false);

        fire(&list).unwrap();
        assert_eq!(*log.borrow(), ["remover", "victim"], "victim still runs in the same pass");
        assert_eq!(list.keys(), ["remover"]);

        fire(&list).unwrap();
        assert_eq!(*log.borrow(), ["remover", "victim", "remover"]);
    }

    #[test]
    fn readd_during_pass_cancels_pending_removal() {
        let log = Log::default();
        let list = Rc::new(List::with_capacity(2));

        let weak = Rc::downgrade(&list);
        let inner = Rc::clone(&log);
        list.add(
            "flip",
            handler_fn(move |_| {
                if let Some(list) = weak.upgrade() {
                    list.remove(&"kept");
                    list.add("kept", recorder(&inner, "kept2"), false);
                }
                Err(HandlerError::Unregister)
            }),
            false,
        );
        list.add("kept", recorder(&log, "kept1"), false);

        fire(&list).unwrap();
        fire(&list).unwrap();
        assert_eq!(*log.borrow(), ["kept2", "kept2"]);
        assert_eq!(list.keys(), ["kept"]);
    }

    #[test]
    fn readd_after_retirement_cancels_pending_removal() {
        let log = Log::default();
        let list = Rc::new(List::with_capacity(4));

        let weak = Rc::downgrade(&list);
        list.add(
            "remover",
            handler_fn(move |_| {
                if let Some(list) = weak.upgrade() {
                    list.remove(&"kept");
                }
                Err(HandlerError::Unregister)
            }),
            false,
        );
        let inner = Rc::clone(&log);
        list.add(
            "kept",
            handler_fn(move |_| {
                inner.borrow_mut().push("kept1");
                Err(HandlerError::Unregister)
            }),
            false,
        );
        let weak = Rc::downgrade(&list);
        let inner = Rc::clone(&log);
        list.add(
            "late",
            handler_fn(move |_| {
                if let Some(list) = weak.upgrade() {
                    list.add("kept", recorder(&inner, "kept2"), false);
                }
                Err(HandlerError::Unregister)
            }),
            false,
        );

        fire(&list).unwrap();
        assert_eq!(*log.borrow(), ["kept1", "kept2"], "the re-added handler joins the running pass");
        assert_eq!(list.keys(), ["kept"]);

        fire(&list).unwrap();
        assert_eq!(*log.borrow(), ["kept1", "kept2", "kept2"]);
    }

    #[test]
    fn removal_after_failed_pass_applies_immediately() {
        let log = Log::default();
        let list = List::with_capacity(2);
        list.add("bad", handler_fn(|_| Err(HandlerError::from("boom"))), false);
        list.add("later", recorder(&log, "later"), false);

        fire(&list).unwrap_err();
        list.remove(&"later");
        assert_eq!(list.keys(), ["bad"], "nothing is left queued behind the failed pass");
        assert!(list.slots.borrow().pending.is_empty());

        list.remove(&"bad");
        assert!(list.is_empty());
        fire(&list).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn hard_error_stops_pass_and_keeps_the_rest() {
        let log = Log::default();
        let list = List::with_capacity(2);
        list.add("ok", recorder(&log, "ok"), true);
        list.add("bad", handler_fn(|_| Err(HandlerError::from("boom"))), false);
        list.add("later", recorder(&log, "later"), true);

        let err = fire(&list).unwrap_err();
        assert!(matches!(err, HandlerError::Internal { ref message, .. } if message == "boom"));
        assert_eq!(*log.borrow(), ["ok"]);
        assert_eq!(list.keys(), ["bad", "later"]);
        assert!(!list.calling.get());
    }

    #[test]
    fn unregister_and_once_retire_entries() {
        let log = Log::default();
        let list = List::with_capacity(2);
        let inner = Rc::clone(&log);
        list.add(
            "quit",
            handler_fn(move |_| {
                inner.borrow_mut().push("quit");
                Err(HandlerError::Unregister)
            }),
            false,
        );
        list.add("once", recorder(&log, "once"), true);
        list.add("stay", recorder(&log, "stay"), false);

        fire(&list).unwrap();
        fire(&list).unwrap();
        assert_eq!(*log.borrow(), ["quit", "once", "stay", "stay"]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn tombstones_are_compacted() {
        let log = Log::default();
        let list = List::with_capacity(0);
        let keys: Vec<&'static str> =
            (0..64).map(|i| &*Box::leak(format!("k{i}").into_boxed_str())).collect();
        for key in &keys {
            list.add(*key, recorder(&log, "x"), false);
        }
        for key in keys.iter().take(60) {
            list.remove(key);
        }

        assert_eq!(list.len(), 4);
        assert!(list.slots.borrow().entries.len() < COMPACT_MIN_SLOTS);
        assert_eq!(list.keys(), ["k60", "k61", "k62", "k63"]);

        list.remove(&"k61");
        list.add("k61", recorder(&log, "x"), false);
        assert_eq!(list.keys(), ["k60", "k62", "k63", "k61"]);
    }

    #[test]
    fn clear_resets_everything() {
        let log = Log::default();
        let list = List::with_capacity(2);
        list.add("a", recorder(&log, "a"), false);
        list.clear();
        assert!(list.is_empty());
        fire(&list).unwrap();
        assert!(log.borrow().is_empty());
    }
}

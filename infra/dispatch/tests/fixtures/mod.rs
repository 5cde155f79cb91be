use evd_dispatch::*;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Connect,
    Disconnect,
}

pub type TestDispatcher = Dispatcher<Kind, u32, &'static str>;

/// Shared, ordered record of which handlers ran.
pub type Journal = Rc<RefCell<Vec<String>>>;

#[must_use]
pub fn journal() -> Journal {
    Journal::default()
}

/// A handler that appends `name` to the journal and succeeds.
pub fn recorder(journal: &Journal, name: &'static str) -> impl EventHandler<Kind, u32> + 'static {
    let journal = Rc::clone(journal);
    handler_fn(move |_| {
        journal.borrow_mut().push(name.to_owned());
        Ok(())
    })
}

/// A handler that appends `name` to the journal, then asks to be unregistered.
pub fn quitter(journal: &Journal, name: &'static str) -> impl EventHandler<Kind, u32> + 'static {
    let journal = Rc::clone(journal);
    handler_fn(move |_| {
        journal.borrow_mut().push(name.to_owned());
        Err(HandlerError::Unregister)
    })
}

/// A handler that appends `name` to the journal, then fails with `message`.
pub fn failing(
    journal: &Journal,
    name: &'static str,
    message: &'static str,
) -> impl EventHandler<Kind, u32> + 'static {
    let journal = Rc::clone(journal);
    handler_fn(move |_| {
        journal.borrow_mut().push(name.to_owned());
        Err(HandlerError::from(message))
    })
}

/// Dispatches `(kind, value)` without generator or parameters.
///
/// # Errors
/// Forwards the dispatch result.
pub fn fire(dispatcher: &TestDispatcher, kind: Kind, value: u32) -> Result<(), HandlerError> {
    dispatcher.dispatch(&EventId::new(kind, value), None, &[])
}

/// Drains the journal, returning what was recorded since the last call.
#[must_use]
pub fn take(journal: &Journal) -> Vec<String> {
    std::mem::take(&mut *journal.borrow_mut())
}

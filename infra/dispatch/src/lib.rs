//! # Event Dispatch
//!
//! An in-process, two-tier event handler registry.
//!
//! ## Overview
//!
//! Handlers are registered against an event kind (they observe every value of that kind) or
//! against an exact [`EventId`] (kind + value). Dispatching an identifier runs the kind-level
//! handlers first, then the value-level ones, each tier in registration order.
//!
//! ## Features
//!
//! * **Keyed registrations**: re-adding a key replaces the handler in place, removal is by key.
//! * **Fire-once**: a handler registered with `once = true` is dropped after its first success.
//! * **Self-unregistration**: returning [`HandlerError::Unregister`] removes the handler without
//!   interrupting the dispatch.
//! * **Safe mutation mid-dispatch**: handlers may add or remove registrations; removals apply
//!   once the running pass ends.
//! * **Non-reentrant**: a nested [`Dispatcher::dispatch`] on the same instance panics.
//! * **Self-pruning**: emptied containers are released immediately.
//!
//! # Example
//!
//! ```rust
//! use evd_dispatch::{Dispatcher, EventId, HandlerError, handler_fn};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let hits = Rc::new(Cell::new(0_u64));
//! let dispatcher = Dispatcher::<&str, u64, u32>::new();
//!
//! let counter = Rc::clone(&hits);
//! dispatcher.add_type_handler("tick", 1, handler_fn(move |event| {
//!     counter.set(counter.get() + event.value());
//!     Ok::<(), HandlerError>(())
//! }), false);
//!
//! dispatcher.dispatch(&EventId::new("tick", 2), None, &[])?;
//! dispatcher.dispatch(&EventId::new("tick", 3), None, &[])?;
//! assert_eq!(hits.get(), 5);
//! # Ok::<(), HandlerError>(())
//! ```

mod bucket;
mod config;
mod dispatcher;
mod error;
mod event;
mod handler;
mod list;

pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::{BoxError, HandlerError, HandlerErrorExt};
pub use event::{Event, EventId};
pub use handler::{EventHandler, HandlerFn, handler_fn};

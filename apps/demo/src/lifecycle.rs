use evd_dispatch::{Dispatcher, DispatcherConfig, Event, EventHandler, EventId, HandlerError, handler_fn};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

/// Connection lifecycle stages. The event value is the connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ConnEvent {
    Opened,
    Message,
    Closed,
}

impl ConnEvent {
    const ALL: [Self; 3] = [Self::Opened, Self::Message, Self::Closed];
}

pub(crate) type ConnDispatcher = Dispatcher<ConnEvent, u32, &'static str>;

/// The remote side of a connection; passed as the event generator.
#[derive(Debug)]
pub(crate) struct Peer {
    pub(crate) id: u32,
    pub(crate) addr: String,
}

/// One inbound message; passed as the first event parameter.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) seq: u32,
    pub(crate) body: String,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReplayPlan {
    pub(crate) connections: u32,
    pub(crate) messages: u32,
    pub(crate) watchdog_budget: u64,
}

/// What the handlers observed during a replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Report {
    pub(crate) audited: u64,
    pub(crate) greeted: u64,
    pub(crate) echoed_bytes: u64,
    pub(crate) rejected: u64,
    pub(crate) watchdog_ticks: u64,
    pub(crate) closed: u64,
    pub(crate) remaining_handlers: usize,
    pub(crate) remaining_kinds: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "events audited      {}", self.audited)?;
        writeln!(f, "connections greeted {}", self.greeted)?;
        writeln!(f, "bytes echoed        {}", self.echoed_bytes)?;
        writeln!(f, "frames rejected     {}", self.rejected)?;
        writeln!(f, "watchdog ticks      {}", self.watchdog_ticks)?;
        writeln!(f, "connections closed  {}", self.closed)?;
        write!(f, "left registered     {} handlers over {} kinds", self.remaining_handlers, self.remaining_kinds)
    }
}

type Tally = Rc<RefCell<Report>>;

/// Counts every event of the kind it is registered for.
struct Auditor {
    tally: Tally,
}

impl EventHandler<ConnEvent, u32> for Auditor {
    fn handle_event(&mut self, event: &Event<'_, ConnEvent, u32>) -> Result<(), HandlerError> {
        debug!(kind = ?event.kind(), conn = event.value(), "Audit");
        self.tally.borrow_mut().audited += 1;
        Ok(())
    }
}

/// Watches message traffic for a fixed number of events, then unregisters itself.
struct Watchdog {
    tally: Tally,
    budget: u64,
}

impl EventHandler<ConnEvent, u32> for Watchdog {
    fn handle_event(&mut self, event: &Event<'_, ConnEvent, u32>) -> Result<(), HandlerError> {
        self.tally.borrow_mut().watchdog_ticks += 1;
        self.budget = self.budget.saturating_sub(1);
        if self.budget > 0 {
            return Ok(());
        }
        info!(conn = event.value(), "Watchdog budget spent; unregistering");
        Err(HandlerError::Unregister)
    }
}

/// Drives a [`ConnDispatcher`] through open, message and close events.
pub(crate) struct Replay {
    dispatcher: Rc<ConnDispatcher>,
    tally: Tally,
}

impl Replay {
    /// Installs the kind-level auditors and, unless `watchdog_budget` is zero, the watchdog.
    pub(crate) fn new(config: DispatcherConfig, watchdog_budget: u64) -> Self {
        let dispatcher = Rc::new(ConnDispatcher::with_config(config));
        let tally = Tally::default();

        for kind in ConnEvent::ALL {
            dispatcher.add_type_handler(kind, "audit", Auditor { tally: Rc::clone(&tally) }, false);
        }
        if watchdog_budget > 0 {
            dispatcher.add_type_handler(
                ConnEvent::Message,
                "watchdog",
                Watchdog { tally: Rc::clone(&tally), budget: watchdog_budget },
                false,
            );
        }

        Self { dispatcher, tally }
    }

    /// Registers the per-connection handlers and announces the connection.
    ///
    /// # Errors
    /// Forwards a hard error from any handler.
    pub(crate) fn open(&self, peer: &Peer) -> Result<(), HandlerError> {
        let id = peer.id;

        let tally = Rc::clone(&self.tally);
        self.dispatcher.add_handler(
            EventId::new(ConnEvent::Opened, id),
            "greet",
            handler_fn(move |event| {
                let addr = event.generator_as::<Peer>().map_or("unknown", |peer| peer.addr.as_str());
                info!(conn = id, %addr, "Connection greeted");
                tally.borrow_mut().greeted += 1;
                Ok(())
            }),
            true,
        );

        let tally = Rc::clone(&self.tally);
        self.dispatcher.add_handler(
            EventId::new(ConnEvent::Message, id),
            "echo",
            handler_fn(move |event| {
                let Some(frame) = event.param::<Frame>(0) else {
                    return Err(HandlerError::from(format!("connection {id} delivered no frame")));
                };
                if frame.body.is_empty() {
                    return Err(HandlerError::from(format!(
                        "connection {id} sent empty frame #{}",
                        frame.seq
                    )));
                }
                tally.borrow_mut().echoed_bytes += frame.body.len() as u64;
                Ok(())
            }),
            false,
        );

        let tally = Rc::clone(&self.tally);
        let dispatcher: Weak<ConnDispatcher> = Rc::downgrade(&self.dispatcher);
        self.dispatcher.add_handler(
            EventId::new(ConnEvent::Closed, id),
            "farewell",
            handler_fn(move |_| {
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.remove_handler(&EventId::new(ConnEvent::Message, id), &"echo");
                }
                tally.borrow_mut().closed += 1;
                Ok(())
            }),
            true,
        );

        self.fire(ConnEvent::Opened, peer, &[])
    }

    /// # Errors
    /// Returns the error raised by the echo handler for an empty frame.
    pub(crate) fn message(&self, peer: &Peer, frame: &Frame) -> Result<(), HandlerError> {
        self.fire(ConnEvent::Message, peer, &[frame])
    }

    /// # Errors
    /// Forwards a hard error from any handler.
    pub(crate) fn close(&self, peer: &Peer) -> Result<(), HandlerError> {
        self.fire(ConnEvent::Closed, peer, &[])
    }

    pub(crate) fn report(&self) -> Report {
        let mut report = self.tally.borrow().clone();
        report.remaining_handlers = self.dispatcher.handler_count();
        report.remaining_kinds = self.dispatcher.type_count();
        report
    }

    fn fire(&self, kind: ConnEvent, peer: &Peer, params: &[&dyn Any]) -> Result<(), HandlerError> {
        self.dispatcher.dispatch(&EventId::new(kind, peer.id), Some(peer as &dyn Any), params)
    }
}

impl fmt::Debug for Replay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replay").field("dispatcher", &self.dispatcher).finish_non_exhaustive()
    }
}

/// Replays `plan.connections` connections, each sending `plan.messages` frames.
///
/// Every third connection ends with an empty frame, which its echo handler rejects.
pub(crate) fn replay(config: DispatcherConfig, plan: ReplayPlan) -> Report {
    let replay = Replay::new(config, plan.watchdog_budget);
    let mut rejected = 0;

    for id in 0..plan.connections {
        let peer = Peer { id, addr: format!("10.0.{}.{}", id / 250, id % 250 + 1) };
        if let Err(err) = replay.open(&peer) {
            warn!(conn = id, error = %err, "Open failed");
        }

        for seq in 0..plan.messages {
            let truncated = id % 3 == 2 && seq + 1 == plan.messages;
            let body = if truncated { String::new() } else { format!("frame-{seq}") };
            if let Err(err) = replay.message(&peer, &Frame { seq, body }) {
                warn!(conn = id, error = %err, "Frame rejected");
                rejected += 1;
            }
        }

        if let Err(err) = replay.close(&peer) {
            warn!(conn = id, error = %err, "Close failed");
        }
    }

    let mut report = replay.report();
    report.rejected = rejected;
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(connections: u32, messages: u32, watchdog_budget: u64) -> ReplayPlan {
        ReplayPlan { connections, messages, watchdog_budget }
    }

    #[test]
    fn replay_counts_every_stage() {
        let report = replay(DispatcherConfig::default(), plan(3, 2, 4));
        assert_eq!(
            report,
            Report {
                audited: 12,
                greeted: 3,
                echoed_bytes: 35,
                rejected: 1,
                watchdog_ticks: 4,
                closed: 3,
                remaining_handlers: 3,
                remaining_kinds: 3,
            }
        );
    }

    #[test]
    fn watchdog_outlives_short_traffic() {
        let report = replay(DispatcherConfig::default(), plan(1, 2, 10));
        assert_eq!(report.watchdog_ticks, 2);
        assert_eq!(report.remaining_handlers, 4, "auditors plus the watchdog");
    }

    #[test]
    fn closing_drops_the_connection_handlers() {
        let replay = Replay::new(DispatcherConfig::default(), 0);
        let peer = Peer { id: 7, addr: "10.0.0.7".to_owned() };

        replay.open(&peer).unwrap();
        assert_eq!(replay.report().remaining_handlers, 3 + 2, "greeter fired once");

        replay.close(&peer).unwrap();
        assert_eq!(replay.report().remaining_handlers, 3);

        replay.message(&peer, &Frame { seq: 0, body: String::new() }).unwrap();
        assert_eq!(replay.report().audited, 3);
    }

    #[test]
    fn empty_frame_is_rejected() {
        let replay = Replay::new(DispatcherConfig::default(), 0);
        let peer = Peer { id: 1, addr: "10.0.0.1".to_owned() };
        replay.open(&peer).unwrap();

        let err = replay.message(&peer, &Frame { seq: 4, body: String::new() }).unwrap_err();
        assert!(err.to_string().contains("empty frame #4"));
        assert_eq!(replay.report().echoed_bytes, 0);
    }
}

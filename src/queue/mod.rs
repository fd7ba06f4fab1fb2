//! Event queues: typed, subscription-filtered mailboxes.
//!
//! Every event loop owns exactly one queue. Producers hold cheap clones of the
//! [`EventQueue`] handle and call [`EventQueue::send_event`]; the single consumer
//! drains the matching [`Mailbox`] in FIFO order.
//!
//! Routing decisions are made *before* delivery: a router asks
//! [`EventQueue::can_process_event`] and only sends to queues whose
//! [`Subscription`] accepts the event. `send_event` itself does not filter, so a
//! direct send (e.g. the user manager forwarding an activation) always arrives.

mod event_loop;

pub use event_loop::{EventHandler, EventLoop, Flow, LoopExit, LoopState};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::events::{Event, EventGuard, EventRef, EventType};
use crate::types::{Error, Result};

// =============================================================================
// Subscription
// =============================================================================

/// What a loop accepts: exact type identifiers plus capability guards.
///
/// An event is accepted iff its type is in `types` OR any guard matches it.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    types: HashSet<EventType>,
    guards: Vec<EventGuard>,
    all: bool,
}

impl Subscription {
    pub fn new(
        types: impl IntoIterator<Item = EventType>,
        guards: impl IntoIterator<Item = EventGuard>,
    ) -> Self {
        Self {
            types: types.into_iter().collect(),
            guards: guards.into_iter().collect(),
            all: false,
        }
    }

    /// Accepts every event. Used by routers.
    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    pub fn accepts(&self, event: &dyn Event) -> bool {
        self.all
            || self.types.contains(&event.event_type())
            || self.guards.iter().any(|guard| guard.matches(event))
    }
}

// =============================================================================
// EventQueue
// =============================================================================

/// Sending half of a loop's mailbox plus its subscription.
///
/// Clones share the same mailbox. Sending never blocks.
#[derive(Clone)]
pub struct EventQueue {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<EventRef>,
    subscription: Arc<Subscription>,
}

impl EventQueue {
    /// Create a queue and the mailbox its consumer drains.
    pub fn new(name: impl Into<Arc<str>>, subscription: Subscription) -> (Self, Mailbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            name: name.into(),
            tx,
            subscription: Arc::new(subscription),
        };
        (queue, Mailbox { rx })
    }

    /// Append `event` to the mailbox tail.
    ///
    /// Fails with [`Error::QueueClosed`] once the consumer has exited.
    pub fn send_event(&self, event: EventRef) -> Result<()> {
        let event_type = event.event_type();
        self.tx
            .send(event)
            .map_err(|_| Error::queue_closed(format!("{} dropped {event_type}", self.name)))?;
        tracing::trace!(queue = %self.name, %event_type, "event queued");
        Ok(())
    }

    /// Would the owning loop's subscription accept `event`.
    pub fn can_process_event(&self, event: &dyn Event) -> bool {
        self.subscription.accepts(event)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the consumer has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// Mailbox
// =============================================================================

/// Receiving half of an [`EventQueue`]. Exactly one per queue.
#[derive(Debug)]
pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<EventRef>,
}

impl Mailbox {
    /// Wait for the next event. `None` once every sender is gone and the mailbox is empty.
    pub async fn recv(&mut self) -> Option<EventRef> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EventRef> {
        self.rx.try_recv().ok()
    }

    /// Refuse further sends. Already queued events stay readable.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

//! Event loops: one tokio task draining one queue.
//!
//! Lifecycle:
//!
//! ```text
//!   Created ──start()──► Running ──Flow::Stop / Err / mailbox closed──► Stopping ──► Joined
//! ```
//!
//! The queue exists from construction on, so producers can be wired to a loop
//! before it runs; events sent early wait in the mailbox. The handler is moved
//! into the task on `start()` and dropped there before the loop reports Joined.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use super::{EventQueue, Mailbox, Subscription};
use crate::events::EventRef;
use crate::types::{Error, Result};

/// Handler verdict after one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Per-event logic of a loop.
///
/// Branch on `event.event_type()` and ignore kinds you do not know. Returning
/// `Err` is fatal to the loop: convert recoverable failures into result events
/// before returning.
#[async_trait]
pub trait EventHandler: Send + 'static {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: FnMut(EventRef) -> Result<Flow> + Send + 'static,
{
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        self(event)
    }
}

/// Lifecycle state of an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Joined = 3,
}

impl LoopState {
    fn load(cell: &AtomicU8) -> Self {
        match cell.load(Ordering::Acquire) {
            0 => LoopState::Created,
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            _ => LoopState::Joined,
        }
    }

    fn store(self, cell: &AtomicU8) {
        cell.store(self as u8, Ordering::Release);
    }
}

/// How a loop's task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The handler returned [`Flow::Stop`].
    Stopped,
    /// Every sender was dropped and the mailbox drained.
    Closed,
    /// The handler returned an error.
    Faulted(String),
    /// The handler panicked.
    Panicked(String),
}

/// An actor: one queue, one handler, one tokio task.
pub struct EventLoop {
    name: Arc<str>,
    queue: EventQueue,
    state: Arc<AtomicU8>,
    pending: Option<(Box<dyn EventHandler>, Mailbox)>,
    join: Option<JoinHandle<LoopExit>>,
    exit: Option<LoopExit>,
}

impl EventLoop {
    /// Build a loop in the Created state.
    pub fn new(
        name: impl Into<Arc<str>>,
        subscription: Subscription,
        handler: impl EventHandler,
    ) -> Self {
        let (queue, mailbox) = EventQueue::new(name, subscription);
        Self::from_parts(queue, mailbox, handler)
    }

    /// Build a loop around a queue created up front, for handlers that need their
    /// own queue handle (e.g. to name it as a reply target).
    pub fn from_parts(queue: EventQueue, mailbox: Mailbox, handler: impl EventHandler) -> Self {
        let handler: Box<dyn EventHandler> = Box::new(handler);
        Self {
            name: Arc::from(queue.name()),
            queue,
            state: Arc::new(AtomicU8::new(LoopState::Created as u8)),
            pending: Some((handler, mailbox)),
            join: None,
            exit: None,
        }
    }

    /// Build and start a loop. Must be called within a tokio runtime.
    pub fn spawn(
        name: impl Into<Arc<str>>,
        subscription: Subscription,
        handler: impl EventHandler,
    ) -> Self {
        let mut event_loop = Self::new(name, subscription, handler);
        if let Some((handler, mailbox)) = event_loop.pending.take() {
            event_loop.launch(handler, mailbox);
        }
        event_loop
    }

    /// Created -> Running. Must be called within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        let (handler, mailbox) = self.pending.take().ok_or_else(|| {
            Error::state_transition(format!(
                "{} cannot start from {:?}",
                self.name,
                self.state()
            ))
        })?;
        self.launch(handler, mailbox);
        Ok(())
    }

    fn launch(&mut self, handler: Box<dyn EventHandler>, mailbox: Mailbox) {
        LoopState::Running.store(&self.state);
        let task = drive(
            Arc::clone(&self.name),
            handler,
            mailbox,
            Arc::clone(&self.state),
        );
        let span = tracing::info_span!("event_loop", actor = %self.name);
        self.join = Some(tokio::spawn(task.instrument(span)));
        tracing::debug!(actor = %self.name, "event loop started");
    }

    /// Handle producers use to reach this loop.
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LoopState {
        LoopState::load(&self.state)
    }

    /// Wait for the task to exit and report how it ended.
    ///
    /// Errors if the loop was never started. Calling it again returns the
    /// recorded exit. Cancel-safe: dropping the future leaves the loop joinable.
    pub async fn join(&mut self) -> Result<LoopExit> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }
        let handle = self.join.as_mut().ok_or_else(|| {
            Error::state_transition(format!("{} was never started", self.name))
        })?;

        let exit = match handle.await {
            Ok(exit) => exit,
            Err(err) => exit_from_join_error(err),
        };
        self.join = None;
        LoopState::Joined.store(&self.state);
        tracing::debug!(actor = %self.name, ?exit, "event loop joined");
        self.exit = Some(exit.clone());
        Ok(exit)
    }

    /// [`join`](Self::join) that logs a warning every `warn_after` while the loop
    /// has not exited. Never gives up. A zero interval disables the warning.
    pub async fn join_warn(&mut self, warn_after: Duration) -> Result<LoopExit> {
        if warn_after.is_zero() {
            return self.join().await;
        }
        let name = Arc::clone(&self.name);
        let started = Instant::now();
        let join = self.join();
        tokio::pin!(join);
        loop {
            match tokio::time::timeout(warn_after, &mut join).await {
                Ok(result) => return result,
                Err(_) => tracing::warn!(
                    actor = %name,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "still waiting for event loop to exit"
                ),
            }
        }
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("exit", &self.exit)
            .finish_non_exhaustive()
    }
}

async fn drive(
    name: Arc<str>,
    mut handler: Box<dyn EventHandler>,
    mut mailbox: Mailbox,
    state: Arc<AtomicU8>,
) -> LoopExit {
    let exit = loop {
        let Some(event) = mailbox.recv().await else {
            break LoopExit::Closed;
        };
        let event_type = event.event_type();
        match AssertUnwindSafe(handler.on_event(event)).catch_unwind().await {
            Ok(Ok(Flow::Continue)) => {}
            Ok(Ok(Flow::Stop)) => break LoopExit::Stopped,
            Ok(Err(err)) => {
                tracing::error!(
                    actor = %name,
                    %event_type,
                    kind = err.as_label(),
                    error = %err,
                    "handler failed, stopping event loop"
                );
                break LoopExit::Faulted(err.to_string());
            }
            Err(payload) => {
                let reason = panic_reason(&*payload);
                tracing::error!(
                    actor = %name,
                    %event_type,
                    %reason,
                    "handler panicked, stopping event loop"
                );
                break LoopExit::Panicked(reason);
            }
        }
    };

    LoopState::Stopping.store(&state);
    mailbox.close();
    drop(handler);
    drop(mailbox);
    LoopState::Joined.store(&state);
    exit
}

fn exit_from_join_error(err: JoinError) -> LoopExit {
    if err.is_cancelled() {
        return LoopExit::Faulted("task cancelled".to_string());
    }
    let payload = err.into_panic();
    LoopExit::Panicked(panic_reason(&*payload))
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

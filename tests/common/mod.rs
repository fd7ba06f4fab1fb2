//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use harpoon_core::events::ActivateService;
use harpoon_core::types::{ServiceKind, UserId};
use harpoon_core::{EventHandler, EventLoop, EventRef, EventType, Flow, Result, Subscription};
use tokio::sync::mpsc;

/// Records every event into a channel, stops on `Quit`, and appends its name to
/// `dropped` when the handler is released.
pub struct Recorder {
    name: String,
    events: mpsc::UnboundedSender<EventRef>,
    dropped: Arc<Mutex<Vec<String>>>,
    quit_delay: Duration,
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        let quit = event.event_type() == EventType::Quit;
        let _ = self.events.send(event);
        if quit {
            tokio::time::sleep(self.quit_delay).await;
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.dropped.lock().unwrap().push(self.name.clone());
    }
}

/// Everything the children built by [`Harness::activation`] report back.
#[derive(Clone, Default)]
pub struct Harness {
    pub built: Arc<Mutex<Vec<(UserId, ServiceKind, mpsc::UnboundedReceiver<EventRef>)>>>,
    pub dropped: Arc<Mutex<Vec<String>>>,
    pub quit_delay: Duration,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quit_delay(quit_delay: Duration) -> Self {
        Self {
            quit_delay,
            ..Self::default()
        }
    }

    /// An activation whose factory spawns a [`Recorder`] subscribed to `Quit`,
    /// `LoginResult` and every user-scoped event.
    pub fn activation(&self, user: u64, service: &'static str) -> EventRef {
        let harness = self.clone();
        Arc::new(ActivateService::new(
            UserId::new(user),
            ServiceKind::from_static(service),
            move |user_id, _app| {
                let (tx, rx) = mpsc::unbounded_channel();
                let name = format!("{service}-{user_id}");
                let recorder = Recorder {
                    name: name.clone(),
                    events: tx,
                    dropped: harness.dropped.clone(),
                    quit_delay: harness.quit_delay,
                };
                harness
                    .built
                    .lock()
                    .unwrap()
                    .push((user_id, ServiceKind::from_static(service), rx));
                EventLoop::spawn(
                    name,
                    Subscription::new(
                        [EventType::Quit, EventType::LoginResult],
                        [harpoon_core::EventGuard::user()],
                    ),
                    recorder,
                )
            },
        ))
    }

    pub fn built_count(&self) -> usize {
        self.built.lock().unwrap().len()
    }

    /// Take the receiver of the child built for (user, service).
    pub fn take(&self, user: u64, service: &'static str) -> mpsc::UnboundedReceiver<EventRef> {
        let mut built = self.built.lock().unwrap();
        let idx = built
            .iter()
            .position(|(u, s, _)| *u == UserId::new(user) && s.as_str() == service)
            .expect("child was never built");
        built.remove(idx).2
    }

    pub fn dropped(&self) -> Vec<String> {
        let mut names = self.dropped.lock().unwrap().clone();
        names.sort();
        names
    }
}

/// Wait until `n` children have been built.
pub async fn wait_built(harness: &Harness, n: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while harness.built_count() < n {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("children were not built in time");
}

/// Next event, failing after one second.
pub async fn next(rx: &mut mpsc::UnboundedReceiver<EventRef>) -> EventRef {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("recorder channel closed")
}

/// Drain what is already queued, after letting other tasks run.
pub async fn drain(rx: &mut mpsc::UnboundedReceiver<EventRef>) -> Vec<EventType> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event.event_type());
    }
    seen
}

//! Test helpers shared by unit tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::events::{EventRef, EventType};
use crate::queue::{EventLoop, Flow, Subscription};
use crate::types::Result;

/// A started loop that records every event it receives and stops on `Quit`.
pub(crate) fn probe(
    name: &str,
    subscription: Subscription,
) -> (EventLoop, mpsc::UnboundedReceiver<EventRef>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let event_loop = EventLoop::spawn(
        Arc::<str>::from(name),
        subscription,
        move |event: EventRef| -> Result<Flow> {
            let stop = event.event_type() == EventType::Quit;
            let _ = tx.send(event);
            Ok(if stop { Flow::Stop } else { Flow::Continue })
        },
    );
    (event_loop, rx)
}

/// Next recorded event, failing the test after one second.
pub(crate) async fn next(rx: &mut mpsc::UnboundedReceiver<EventRef>) -> EventRef {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("probe channel closed")
}

/// Give spawned tasks a chance to run, then assert nothing was recorded.
pub(crate) async fn assert_silent(rx: &mut mpsc::UnboundedReceiver<EventRef>) {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if let Ok(event) = rx.try_recv() {
        panic!("unexpected event {:?}", event);
    }
}

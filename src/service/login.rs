//! Static credential check.

use std::sync::Arc;

use async_trait::async_trait;

use crate::events::{EventRef, EventType, Login, LoginResult};
use crate::queue::{EventHandler, EventLoop, EventQueue, Flow, Subscription};
use crate::types::{Credentials, Result};

/// Answers every [`Login`] with a [`LoginResult`] on the application queue.
#[derive(Debug)]
pub struct StaticLoginStore {
    app_queue: EventQueue,
    users: Vec<Credentials>,
}

impl StaticLoginStore {
    pub const NAME: &'static str = "login";

    pub fn new(app_queue: EventQueue, users: Vec<Credentials>) -> Self {
        Self { app_queue, users }
    }

    pub fn subscription() -> Subscription {
        Subscription::new([EventType::Init, EventType::Quit, EventType::Login], [])
    }

    pub fn build(app_queue: EventQueue, users: Vec<Credentials>) -> EventLoop {
        EventLoop::new(Self::NAME, Self::subscription(), Self::new(app_queue, users))
    }

    fn check(&self, login: &Login) -> LoginResult {
        self.users
            .iter()
            .find(|c| c.username == login.username && c.password == login.password)
            .map(|c| LoginResult::success(login.client.clone(), c.user_id))
            .unwrap_or_else(|| LoginResult::failure(login.client.clone()))
    }
}

#[async_trait]
impl EventHandler for StaticLoginStore {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        match event.event_type() {
            EventType::Init => {
                tracing::debug!(users = self.users.len(), "login store ready");
            }
            EventType::Login => {
                if let Some(login) = event.downcast_ref::<Login>() {
                    let result = self.check(login);
                    tracing::info!(
                        username = %login.username,
                        client = %login.client,
                        success = result.is_success(),
                        "login checked"
                    );
                    if let Err(err) = self.app_queue.send_event(Arc::new(result)) {
                        tracing::warn!(
                            client = %login.client,
                            error = %err,
                            "login result not delivered"
                        );
                    }
                }
            }
            EventType::Quit => return Ok(Flow::Stop),
            _ => {}
        }
        Ok(Flow::Continue)
    }
}

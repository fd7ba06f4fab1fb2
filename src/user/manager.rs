//! The user manager: supervising loop for per-user services.

use std::sync::Arc;

use async_trait::async_trait;

use super::registry::{Activation, ServiceRegistry};
use crate::events::{EventGuard, EventRef, EventType, LoginResult, Quit};
use crate::queue::{EventHandler, EventLoop, EventQueue, Flow, Subscription};
use crate::types::{LogoutPolicy, Result, RuntimeConfig};

/// Handler of the `user-manager` loop.
///
/// Owns the [`ServiceRegistry`]. Activations create children lazily, a successful
/// login is broadcast to all of that user's children, `Quit` stops and joins
/// every child before the manager itself stops.
#[derive(Debug)]
pub struct UserManager {
    app_queue: EventQueue,
    services: ServiceRegistry,
    config: RuntimeConfig,
}

impl UserManager {
    pub const NAME: &'static str = "user-manager";

    pub fn new(app_queue: EventQueue, config: RuntimeConfig) -> Self {
        Self {
            app_queue,
            services: ServiceRegistry::new(),
            config,
        }
    }

    /// `Quit`, `LoginResult` and `Logout` exactly, plus anything that activates a
    /// service or is user-scoped.
    pub fn subscription() -> Subscription {
        Subscription::new(
            [EventType::Quit, EventType::LoginResult, EventType::Logout],
            [EventGuard::activate_service(), EventGuard::user()],
        )
    }

    /// Build the manager loop in the Created state.
    pub fn build(app_queue: EventQueue, config: RuntimeConfig) -> EventLoop {
        EventLoop::new(
            Self::NAME,
            Self::subscription(),
            Self::new(app_queue, config),
        )
    }

    /// Build and start the manager loop.
    pub fn spawn(app_queue: EventQueue, config: RuntimeConfig) -> Result<EventLoop> {
        let mut event_loop = Self::build(app_queue, config);
        event_loop.start()?;
        Ok(event_loop)
    }

    async fn on_quit(&mut self, quit: &EventRef) -> Flow {
        let users = self.services.user_count();
        let joined = self
            .services
            .shutdown(quit, self.config.join_warn_after)
            .await;
        tracing::info!(users, services = joined, "all user services joined");
        Flow::Stop
    }

    async fn on_logout(&mut self, event: &EventRef) {
        let Some(user_id) = event.user_id() else {
            return;
        };
        self.services.send_to_user(user_id, event, true);
        if self.config.logout_policy == LogoutPolicy::Teardown {
            let quit: EventRef = Arc::new(Quit);
            let stopped = self
                .services
                .remove_user(user_id, &quit, self.config.join_warn_after)
                .await;
            tracing::info!(%user_id, services = stopped, "user services torn down");
        }
    }
}

#[async_trait]
impl EventHandler for UserManager {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        let event_type = event.event_type();

        if let Some(user_id) = event.user_id() {
            self.services.touch(user_id);
        }

        if let Some(outcome) = self.services.activate(&event, &self.app_queue) {
            if outcome == Activation::Created {
                tracing::debug!(
                    services = self.services.service_count(),
                    "service registry grew"
                );
            }
            return Ok(Flow::Continue);
        }

        match event_type {
            EventType::Quit => return Ok(self.on_quit(&event).await),
            EventType::LoginResult => {
                let Some(result) = event.downcast_ref::<LoginResult>() else {
                    return Ok(Flow::Continue);
                };
                if let Some(user_id) = result.user_id {
                    let reached = self.services.send_to_user(user_id, &event, false);
                    tracing::debug!(%user_id, reached, "login broadcast to user services");
                }
            }
            EventType::Logout => self.on_logout(&event).await,
            _ => {
                if let Some(user_id) = event.user_id() {
                    self.services.send_to_user(user_id, &event, true);
                } else {
                    tracing::trace!(%event_type, "ignored by user manager");
                }
            }
        }
        Ok(Flow::Continue)
    }
}

impl Drop for UserManager {
    fn drop(&mut self) {
        let left = self.services.service_count();
        if left > 0 {
            tracing::warn!(services = left, "user manager dropped with running services");
        }
    }
}

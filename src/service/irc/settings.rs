//! IRC settings module: turns successful logins into IRC activations.

use std::sync::Arc;

use async_trait::async_trait;

use super::service::IrcService;
use crate::events::{ActivateService, EventRef, EventType, LoginResult};
use crate::queue::{EventHandler, EventLoop, EventQueue, Flow, Subscription};
use crate::types::{IrcConfig, Result, ServiceKind};

#[derive(Debug)]
pub struct IrcSettings {
    app_queue: EventQueue,
    config: Arc<IrcConfig>,
}

impl IrcSettings {
    pub const NAME: &'static str = "irc-settings";

    pub fn new(app_queue: EventQueue, config: IrcConfig) -> Self {
        Self {
            app_queue,
            config: Arc::new(config),
        }
    }

    pub fn subscription() -> Subscription {
        Subscription::new([EventType::Init, EventType::Quit, EventType::LoginResult], [])
    }

    pub fn build(app_queue: EventQueue, config: IrcConfig) -> EventLoop {
        EventLoop::new(Self::NAME, Self::subscription(), Self::new(app_queue, config))
    }
}

#[async_trait]
impl EventHandler for IrcSettings {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        match event.event_type() {
            EventType::LoginResult => {
                let Some(user_id) = event.downcast_ref::<LoginResult>().and_then(|r| r.user_id)
                else {
                    return Ok(Flow::Continue);
                };
                let config = Arc::clone(&self.config);
                let activate = ActivateService::new(user_id, ServiceKind::IRC, move |user, app| {
                    IrcService::build(user, app, &config)
                });
                tracing::debug!(%user_id, "requesting irc activation");
                if let Err(err) = self.app_queue.send_event(Arc::new(activate)) {
                    tracing::warn!(%user_id, error = %err, "irc activation not delivered");
                }
            }
            EventType::Init => {
                tracing::debug!(servers = self.config.servers.len(), "irc settings loaded");
            }
            EventType::Quit => return Ok(Flow::Stop),
            _ => {}
        }
        Ok(Flow::Continue)
    }
}

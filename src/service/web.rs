//! Bridge between user-scoped events and connected web clients.
//!
//! The bridge only decides *who* gets *what*; framing and the socket live behind
//! the [`Outbound`] channel.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::{EventGuard, EventRef, EventType, LoginResult, Logout};
use crate::queue::{EventHandler, EventLoop, Flow, Subscription};
use crate::types::{ClientId, Result, UserId};

/// Instruction for the web transport.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Send `event` to `client`.
    Deliver { client: ClientId, event: EventRef },
    /// Close the connection of `client`.
    Disconnect { client: ClientId },
}

#[derive(Debug)]
pub struct WebBridge {
    clients: HashMap<UserId, HashSet<ClientId>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl WebBridge {
    pub const NAME: &'static str = "webchat";

    pub fn new(outbound: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            clients: HashMap::new(),
            outbound,
        }
    }

    pub fn subscription() -> Subscription {
        Subscription::new(
            [EventType::Quit, EventType::LoginResult, EventType::Logout],
            [EventGuard::user()],
        )
    }

    /// Build the bridge loop and the receiving end of its outbound channel.
    pub fn build() -> (EventLoop, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_loop = EventLoop::new(Self::NAME, Self::subscription(), Self::new(tx));
        (event_loop, rx)
    }

    fn emit(&self, message: Outbound) {
        if self.outbound.send(message).is_err() {
            tracing::warn!("web transport is gone, dropping outbound message");
        }
    }

    fn on_login_result(&mut self, event: &EventRef, result: &LoginResult) {
        match result.user_id {
            Some(user_id) => {
                self.clients
                    .entry(user_id)
                    .or_default()
                    .insert(result.client.clone());
                tracing::info!(%user_id, client = %result.client, "web client logged in");
                self.emit(Outbound::Deliver {
                    client: result.client.clone(),
                    event: event.clone(),
                });
            }
            None => self.emit(Outbound::Disconnect {
                client: result.client.clone(),
            }),
        }
    }

    fn on_logout(&mut self, logout: &Logout) {
        if let Some(clients) = self.clients.get_mut(&logout.user_id) {
            clients.remove(&logout.client);
            if clients.is_empty() {
                self.clients.remove(&logout.user_id);
            }
        }
        tracing::info!(user_id = %logout.user_id, client = %logout.client, "web client logged out");
    }

    fn deliver_to_user(&self, user_id: UserId, event: &EventRef) {
        let Some(clients) = self.clients.get(&user_id) else {
            tracing::trace!(%user_id, "no web client for user");
            return;
        };
        for client in clients {
            self.emit(Outbound::Deliver {
                client: client.clone(),
                event: event.clone(),
            });
        }
    }
}

#[async_trait]
impl EventHandler for WebBridge {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        match event.event_type() {
            EventType::Quit => {
                for client in self.clients.values().flatten() {
                    self.emit(Outbound::Disconnect {
                        client: client.clone(),
                    });
                }
                return Ok(Flow::Stop);
            }
            EventType::LoginResult => {
                if let Some(result) = event.downcast_ref::<LoginResult>() {
                    self.on_login_result(&event, result);
                }
            }
            EventType::Logout => {
                if let Some(logout) = event.downcast_ref::<Logout>() {
                    self.on_logout(logout);
                }
            }
            // Activations and backend commands travel away from clients.
            EventType::ActivateService => {}
            _ if event.as_irc_command().is_some() => {}
            _ => {
                if let Some(user_id) = event.user_id() {
                    self.deliver_to_user(user_id, &event);
                }
            }
        }
        Ok(Flow::Continue)
    }
}

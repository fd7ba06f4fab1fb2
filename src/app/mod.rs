//! Application router.
//!
//! The `app` loop accepts every event on the application queue and forwards it to
//! each module whose queue accepts it:
//!
//! ```text
//!   producers ──► app ──┬──► login          (Login)
//!                       ├──► irc-settings   (LoginResult)
//!                       ├──► database       (database guard)
//!                       ├──► webchat        (user guard)
//!                       └──► user-manager   (user / activate-service guards)
//! ```
//!
//! Modules are started when `Init` reaches the hub. `Quit` is forwarded to every
//! module, all modules are joined, then the hub stops.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::mpsc;

use crate::events::{EventRef, EventType, Init, Quit};
use crate::queue::{
    EventHandler, EventLoop, EventQueue, Flow, LoopExit, LoopState, Subscription,
};
use crate::service::irc::IrcSettings;
use crate::service::{MemoryDatabase, Outbound, StaticLoginStore, WebBridge};
use crate::types::{Config, DatabaseBackend, Result};
use crate::user::UserManager;

const APP_QUEUE: &str = "app";

#[derive(Debug)]
struct Router {
    modules: Vec<EventLoop>,
    warn_after: Duration,
}

impl Router {
    fn start_modules(&mut self) -> Result<()> {
        for module in &mut self.modules {
            if module.state() == LoopState::Created {
                module.start()?;
            }
        }
        tracing::info!(modules = self.modules.len(), "modules started");
        Ok(())
    }

    fn route(&self, event: &EventRef) {
        let mut reached = 0;
        for module in &self.modules {
            if !module.queue().can_process_event(event.as_ref()) {
                continue;
            }
            match module.queue().send_event(Arc::clone(event)) {
                Ok(()) => reached += 1,
                Err(err) => {
                    tracing::warn!(module = module.name(), error = %err, "module unreachable");
                }
            }
        }
        tracing::trace!(event_type = %event.event_type(), reached, "event routed");
    }

    async fn stop_modules(&mut self, quit: &EventRef) {
        for module in &self.modules {
            if let Err(err) = module.queue().send_event(Arc::clone(quit)) {
                tracing::debug!(module = module.name(), error = %err, "module already gone");
            }
        }
        let warn_after = self.warn_after;
        let exits = join_all(self.modules.iter_mut().map(|m| m.join_warn(warn_after))).await;
        for (module, exit) in self.modules.iter().zip(exits) {
            match exit {
                Ok(LoopExit::Stopped) => tracing::debug!(module = module.name(), "module joined"),
                Ok(exit) => {
                    tracing::warn!(module = module.name(), ?exit, "module ended abnormally");
                }
                Err(err) => {
                    tracing::error!(module = module.name(), error = %err, "module join failed");
                }
            }
        }
    }
}

#[async_trait]
impl EventHandler for Router {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        match event.event_type() {
            EventType::Init => {
                self.start_modules()?;
                self.route(&event);
            }
            EventType::Quit => {
                self.stop_modules(&event).await;
                tracing::info!("application stopped");
                return Ok(Flow::Stop);
            }
            _ => self.route(&event),
        }
        Ok(Flow::Continue)
    }
}

/// The modules selected by a [`Config`], wired around the `app` hub.
#[derive(Debug)]
pub struct Application {
    hub: EventLoop,
    outbound: Option<mpsc::UnboundedReceiver<Outbound>>,
}

impl Application {
    pub fn new(config: &Config) -> Self {
        let (app, mailbox) = EventQueue::new(APP_QUEUE, Subscription::all());

        let mut modules = vec![StaticLoginStore::build(
            app.clone(),
            config.modules.login.clone(),
        )];
        if config.modules.database == DatabaseBackend::Memory {
            modules.push(MemoryDatabase::build());
        }
        if config.services.irc {
            let mut irc = config.irc.clone();
            if irc.backlog && config.modules.database == DatabaseBackend::None {
                tracing::warn!("irc backlog needs a database backend, backlog disabled");
                irc.backlog = false;
            }
            modules.push(IrcSettings::build(app.clone(), irc));
        }
        let outbound = if config.modules.webchat {
            let (bridge, outbound) = WebBridge::build();
            modules.push(bridge);
            Some(outbound)
        } else {
            None
        };
        modules.push(UserManager::build(app.clone(), config.runtime.clone()));

        let router = Router {
            modules,
            warn_after: config.runtime.join_warn_after,
        };
        Self {
            hub: EventLoop::from_parts(app, mailbox, router),
            outbound,
        }
    }

    /// Queue producers (web transport, tests) send into.
    pub fn queue(&self) -> &EventQueue {
        self.hub.queue()
    }

    /// Receiving end of the web bridge, if webchat is enabled. Yields once.
    pub fn take_outbound(&mut self) -> Option<mpsc::UnboundedReceiver<Outbound>> {
        self.outbound.take()
    }

    /// Start the hub and send `Init`, which starts every module.
    pub fn start(&mut self) -> Result<()> {
        self.hub.start()?;
        self.hub.queue().send_event(Arc::new(Init))
    }

    /// Send `Quit` and wait for every module and the hub to exit.
    pub async fn shutdown(&mut self) -> Result<LoopExit> {
        self.hub.queue().send_event(Arc::new(Quit))?;
        self.join().await
    }

    pub async fn join(&mut self) -> Result<LoopExit> {
        self.hub.join().await
    }
}

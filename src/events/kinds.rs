//! Core event kinds shared by every module.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::{ActivateServiceEvent, Event, EventType, UserEvent};
use crate::queue::{EventLoop, EventQueue};
use crate::types::{ClientId, ServiceKind, UserId};

/// Builds and starts a per-user service loop.
pub type ServiceFactory = Arc<dyn Fn(UserId, EventQueue) -> EventLoop + Send + Sync>;

/// Sent once by the application after every module is started.
#[derive(Debug, Clone, Copy, Default)]
pub struct Init;

impl Event for Init {
    fn event_type(&self) -> EventType {
        EventType::Init
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Process-wide termination.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quit;

impl Event for Quit {
    fn event_type(&self) -> EventType {
        EventType::Quit
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Authentication request from a web client.
#[derive(Clone)]
pub struct Login {
    pub username: String,
    pub password: String,
    pub client: ClientId,
}

impl Login {
    pub fn new(username: impl Into<String>, password: impl Into<String>, client: ClientId) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            client,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for Login {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Login")
            .field("username", &self.username)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl Event for Login {
    fn event_type(&self) -> EventType {
        EventType::Login
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Outcome of a [`Login`]. Only a successful result is user-scoped.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub client: ClientId,
    pub user_id: Option<UserId>,
}

impl LoginResult {
    pub fn success(client: ClientId, user_id: UserId) -> Self {
        Self {
            client,
            user_id: Some(user_id),
        }
    }

    pub fn failure(client: ClientId) -> Self {
        Self {
            client,
            user_id: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.user_id.is_some()
    }
}

impl Event for LoginResult {
    fn event_type(&self) -> EventType {
        EventType::LoginResult
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_user_event(&self) -> Option<&dyn UserEvent> {
        if self.is_success() {
            Some(self)
        } else {
            None
        }
    }
}

impl UserEvent for LoginResult {
    fn user_id(&self) -> UserId {
        self.user_id.unwrap_or_default()
    }
}

/// A web client of `user_id` went away.
#[derive(Debug, Clone)]
pub struct Logout {
    pub user_id: UserId,
    pub client: ClientId,
}

impl Event for Logout {
    fn event_type(&self) -> EventType {
        EventType::Logout
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_user_event(&self) -> Option<&dyn UserEvent> {
        Some(self)
    }
}

impl UserEvent for Logout {
    fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Asks the user manager to run `service` for `user_id`.
#[derive(Clone)]
pub struct ActivateService {
    pub user_id: UserId,
    pub service: ServiceKind,
    factory: ServiceFactory,
}

impl ActivateService {
    pub fn new<F>(user_id: UserId, service: ServiceKind, factory: F) -> Self
    where
        F: Fn(UserId, EventQueue) -> EventLoop + Send + Sync + 'static,
    {
        Self {
            user_id,
            service,
            factory: Arc::new(factory),
        }
    }
}

impl fmt::Debug for ActivateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivateService")
            .field("user_id", &self.user_id)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl Event for ActivateService {
    fn event_type(&self) -> EventType {
        EventType::ActivateService
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_user_event(&self) -> Option<&dyn UserEvent> {
        Some(self)
    }

    fn as_activate_service(&self) -> Option<&dyn ActivateServiceEvent> {
        Some(self)
    }
}

impl UserEvent for ActivateService {
    fn user_id(&self) -> UserId {
        self.user_id
    }
}

impl ActivateServiceEvent for ActivateService {
    fn service(&self) -> &ServiceKind {
        &self.service
    }

    fn instantiate_service(&self, user_id: UserId, app_queue: EventQueue) -> EventLoop {
        (self.factory)(user_id, app_queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Capabilities;

    #[test]
    fn test_login_debug_hides_password() {
        let login = Login::new("user", "hunter2", ClientId::new());
        let rendered = format!("{login:?}");
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_activate_service_has_both_capabilities() {
        let activate = ActivateService::new(UserId::new(7), ServiceKind::IRC, |_, _| {
            unreachable!("factory is not called by capability checks")
        });
        assert_eq!(
            activate.capabilities(),
            Capabilities::USER | Capabilities::ACTIVATE_SERVICE
        );
        assert_eq!(activate.service(), &ServiceKind::IRC);
    }
}

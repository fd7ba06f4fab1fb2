//! Capability guards.

use std::fmt;

use super::{Capabilities, Event};

/// Stateless predicate: "does this event have capability C".
///
/// Guards are supplied next to the exact-type list when a loop is built. A guard
/// matches when the event's capability tag-set intersects the guard's set.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EventGuard {
    name: &'static str,
    capabilities: Capabilities,
}

impl EventGuard {
    pub const fn new(name: &'static str, capabilities: Capabilities) -> Self {
        Self { name, capabilities }
    }

    /// Any user-scoped event.
    pub const fn user() -> Self {
        Self::new("user", Capabilities::USER)
    }

    pub const fn activate_service() -> Self {
        Self::new("activate-service", Capabilities::ACTIVATE_SERVICE)
    }

    pub const fn database() -> Self {
        Self::new("database", Capabilities::DATABASE)
    }

    pub const fn irc_command() -> Self {
        Self::new("irc-command", Capabilities::IRC_COMMAND)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn matches(&self, event: &dyn Event) -> bool {
        event.capabilities().intersects(self.capabilities)
    }
}

impl fmt::Debug for EventGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventGuard({})", self.name)
    }
}

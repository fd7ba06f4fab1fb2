//! Configuration structures.
//!
//! Only the shape lives here; reading files or the environment is left to the
//! embedding process.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ids::{ServerId, UserId};

/// Global gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Which modules the application router wires up.
    #[serde(default)]
    pub modules: ModulesConfig,

    /// Per-user services that get activated after login.
    #[serde(default)]
    pub services: ServicesConfig,

    /// IRC backend settings.
    #[serde(default)]
    pub irc: IrcConfig,

    /// Event loop runtime behaviour.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Module selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Static credentials accepted by the login store.
    pub login: Vec<Credentials>,

    /// Enable the web client bridge.
    pub webchat: bool,

    /// Backlog database backend.
    pub database: DatabaseBackend,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            login: vec![Credentials {
                username: "user".to_string(),
                password: "password".to_string(),
                user_id: UserId::new(1),
            }],
            webchat: true,
            database: DatabaseBackend::None,
        }
    }
}

/// One accepted login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub user_id: UserId,
}

/// Backlog database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// No backlog store; database events go nowhere.
    None,
    /// Process-local tables, lost on exit.
    Memory,
}

/// Services activated per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Activate the IRC backend for every user after login.
    pub irc: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self { irc: true }
    }
}

/// IRC backend settings shared by all users.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IrcConfig {
    #[serde(default)]
    pub servers: Vec<IrcServerConfig>,

    /// Store channel lines in the backlog database. Needs a database backend.
    #[serde(default)]
    pub backlog: bool,
}

/// One configured IRC server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcServerConfig {
    pub id: ServerId,
    pub name: String,
    pub nick: String,
    /// Endpoints the server can be reached on.
    #[serde(default)]
    pub hosts: Vec<IrcHost>,
    /// Channels joined right after activation.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// Network endpoint of an IRC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcHost {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ipv6: bool,
    #[serde(default)]
    pub ssl: bool,
}

impl IrcHost {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            ipv6: false,
            ssl: false,
        }
    }

    pub fn is_at(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }
}

/// What happens to a user's services when the user logs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoutPolicy {
    /// Keep the services running until process shutdown.
    #[default]
    Retain,
    /// Stop and join the user's services, then forget them.
    ///
    /// Applies to every `Logout`, so one client logging out also stops the
    /// services other clients of the same user are still using.
    Teardown,
}

/// Event loop runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// While joining a child loop during shutdown, log a warning every time this
    /// interval passes without the child exiting. The join itself never gives up.
    /// Zero disables the warning.
    #[serde(with = "humantime_serde")]
    pub join_warn_after: Duration,

    /// Logout handling in the user manager.
    pub logout_policy: LogoutPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            join_warn_after: Duration::from_secs(5),
            logout_policy: LogoutPolicy::Retain,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

//! Core types for the Harpoon runtime.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (UserId, ServerId, ClientId, ServiceKind)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for modules, services and the runtime

mod config;
mod errors;
mod ids;

pub use config::{
    Config, Credentials, DatabaseBackend, IrcConfig, IrcHost, IrcServerConfig, LogoutPolicy,
    ModulesConfig, ObservabilityConfig, RuntimeConfig, ServicesConfig,
};
pub use errors::{Error, Result};
pub use ids::{ClientId, ServerId, ServiceKind, UserId};

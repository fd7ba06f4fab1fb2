//! # Harpoon Core - Event Runtime for a Multi-Backend Chat Gateway
//!
//! Rust implementation of the gateway runtime providing:
//! - Typed events with stable type identifiers and capability tag-sets
//! - Subscription-filtered FIFO queues with capability guards
//! - Event loops: one tokio task per actor, explicit lifecycle and join
//! - A user manager that supervises one service loop per (user, service kind)
//! - Login, backlog database, IRC and web bridge modules wired by an application router
//!
//! ## Architecture
//!
//! Every actor owns one queue and drains it on its own task:
//! ```text
//!                    ┌───────────────────────────────────────────┐
//!   web clients  →   │                 app hub                   │
//!                    │  ┌───────┐ ┌────────┐ ┌───────┐ ┌───────┐ │
//!                    │  │ login │ │database│ │irc cfg│ │webchat│ │
//!                    │  └───────┘ └────────┘ └───────┘ └───────┘ │
//!                    │  ┌─────────────────────────────────────┐  │
//!                    │  │ user-manager                        │  │
//!                    │  │   user 1: irc-1   user 7: irc-7 ... │  │
//!                    │  └─────────────────────────────────────┘  │
//!                    └───────────────────────────────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod app;
pub mod events;
pub mod queue;
pub mod service;
pub mod types;
pub mod user;

// Internal utilities
pub mod observability;

#[cfg(test)]
mod testing;

pub use app::Application;
pub use events::{Event, EventGuard, EventRef, EventType};
pub use queue::{EventHandler, EventLoop, EventQueue, Flow, LoopExit, LoopState, Subscription};
pub use types::{Config, Error, Result};
pub use user::UserManager;

//! Per-user service supervision.
//!
//! The [`UserManager`] is an event loop whose handler owns a [`ServiceRegistry`]:
//!
//! ```text
//!   app queue ──► user-manager ──┬──► user 1: { irc ──► EventLoop, web ──► EventLoop }
//!                                └──► user 7: { irc ──► EventLoop }
//! ```
//!
//! Children are created on the first activate-service event for a
//! (user, service kind) pair and live until `Quit` (or, under
//! [`LogoutPolicy::Teardown`](crate::types::LogoutPolicy), until the user logs out).

mod manager;
mod registry;

pub use manager::UserManager;
pub use registry::{Activation, ServiceRegistry};

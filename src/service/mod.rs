//! Modules and per-user services built on the event loop runtime.

pub mod irc;

mod database;
mod login;
mod web;

pub use database::MemoryDatabase;
pub use login::StaticLoginStore;
pub use web::{Outbound, WebBridge};

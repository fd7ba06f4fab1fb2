//! IRC backend: settings module, per-user service and channel bookkeeping.
//!
//! `IrcSettings` runs once per process and reacts to logins by asking the user
//! manager to activate an `IrcService` for that user.

mod channel_store;
mod service;
mod settings;

pub use channel_store::{IrcChannelStore, IrcUserStore};
pub use service::IrcService;
pub use settings::IrcSettings;

//! Events: typed messages exchanged between event loops.
//!
//! Every concrete event kind implements [`Event`]. Two independent mechanisms
//! identify what an event is:
//!
//! - **Exact type**: [`Event::event_type`] returns a stable [`EventType`], unique per
//!   concrete kind. Handlers `match` on it and narrow with [`downcast_ref`](trait.Event.html#method.downcast_ref).
//! - **Capabilities**: a kind may implement capability views ([`UserEvent`],
//!   [`ActivateServiceEvent`], [`DatabaseEvent`], [`IrcCommand`]). The resulting
//!   [`Capabilities`] tag-set is what an [`EventGuard`] tests, so a subscription
//!   written against a capability covers kinds that do not exist yet.
//!
//! ```text
//!   Arc<dyn Event> ──► event_type()   ──► Subscription.types (exact, closed)
//!                  └─► capabilities() ──► Subscription.guards (open)
//! ```
//!
//! Events are immutable once built and shared as [`EventRef`] between the sender,
//! the queue and the consumer.

mod database;
mod guard;
mod irc;
mod kinds;

pub use database::{DatabaseQuery, DatabaseResult, Filter, Query};
pub use guard::EventGuard;
pub use irc::{
    IrcBacklogLine, IrcBacklogRequest, IrcBacklogResponse, IrcChannelListing, IrcChannelMessage,
    IrcChatListing, IrcChatListingRequest, IrcDeleteChannel, IrcHostAdded, IrcHostRemoved,
    IrcJoinChannel, IrcServerListing,
};
pub use kinds::{ActivateService, Init, Login, LoginResult, Logout, Quit, ServiceFactory};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::queue::{EventLoop, EventQueue};
use crate::types::{ServerId, ServiceKind, UserId};

/// Shared handle to an in-flight event.
pub type EventRef = Arc<dyn Event>;

/// Stable identifier of a concrete event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    Init,
    Quit,
    Login,
    LoginResult,
    Logout,
    ActivateService,
    DatabaseQuery,
    DatabaseResult,
    IrcJoinChannel,
    IrcDeleteChannel,
    IrcChatListingRequest,
    IrcChatListing,
    IrcChannelMessage,
    IrcHostAdded,
    IrcHostRemoved,
    IrcBacklogRequest,
    IrcBacklogResponse,
    /// Kinds defined outside this crate. The number must be unique per kind.
    Extension(u32),
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Init => "init",
            EventType::Quit => "quit",
            EventType::Login => "login",
            EventType::LoginResult => "login_result",
            EventType::Logout => "logout",
            EventType::ActivateService => "activate_service",
            EventType::DatabaseQuery => "database_query",
            EventType::DatabaseResult => "database_result",
            EventType::IrcJoinChannel => "irc_join_channel",
            EventType::IrcDeleteChannel => "irc_delete_channel",
            EventType::IrcChatListingRequest => "irc_chat_listing_request",
            EventType::IrcChatListing => "irc_chat_listing",
            EventType::IrcChannelMessage => "irc_channel_message",
            EventType::IrcHostAdded => "irc_host_added",
            EventType::IrcHostRemoved => "irc_host_removed",
            EventType::IrcBacklogRequest => "irc_backlog_request",
            EventType::IrcBacklogResponse => "irc_backlog_response",
            EventType::Extension(id) => return write!(f, "extension:{id}"),
        };
        f.write_str(name)
    }
}

bitflags! {
    /// Capability tag-set of an event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Scoped to one user ([`UserEvent`]).
        const USER = 1 << 0;
        /// Activates a per-user service ([`ActivateServiceEvent`]).
        const ACTIVATE_SERVICE = 1 << 1;
        /// Addressed to the backlog database ([`DatabaseEvent`]).
        const DATABASE = 1 << 2;
        /// Command for a user's IRC backend ([`IrcCommand`]).
        const IRC_COMMAND = 1 << 3;
    }
}

/// A typed, immutable message.
///
/// Implementors return their [`EventType`] and expose capability views by
/// overriding the `as_*` methods. [`Event::capabilities`] is derived from those
/// views, so the tag-set cannot disagree with what the event can be narrowed to.
pub trait Event: Any + Send + Sync + fmt::Debug {
    /// Stable identifier of this kind.
    fn event_type(&self) -> EventType;

    /// Upcast used by typed narrowing.
    fn as_any(&self) -> &dyn Any;

    fn as_user_event(&self) -> Option<&dyn UserEvent> {
        None
    }

    fn as_activate_service(&self) -> Option<&dyn ActivateServiceEvent> {
        None
    }

    fn as_database_event(&self) -> Option<&dyn DatabaseEvent> {
        None
    }

    fn as_irc_command(&self) -> Option<&dyn IrcCommand> {
        None
    }

    /// Capability tag-set of this instance.
    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::USER, self.as_user_event().is_some());
        caps.set(
            Capabilities::ACTIVATE_SERVICE,
            self.as_activate_service().is_some(),
        );
        caps.set(Capabilities::DATABASE, self.as_database_event().is_some());
        caps.set(Capabilities::IRC_COMMAND, self.as_irc_command().is_some());
        caps
    }
}

impl dyn Event {
    /// Typed view of this event if it is of kind `K`.
    pub fn downcast_ref<K: Event>(&self) -> Option<&K> {
        self.as_any().downcast_ref::<K>()
    }

    pub fn is<K: Event>(&self) -> bool {
        self.as_any().is::<K>()
    }

    /// User the event is scoped to, if it is user-scoped.
    pub fn user_id(&self) -> Option<UserId> {
        self.as_user_event().map(UserEvent::user_id)
    }
}

/// Capability: the event concerns exactly one user.
pub trait UserEvent: Send + Sync {
    fn user_id(&self) -> UserId;
}

/// Capability: the event asks the user manager to run a per-user service.
///
/// The user manager calls [`instantiate_service`](Self::instantiate_service) at most
/// once per (user, [`service`](Self::service)) and forwards the event to the result.
pub trait ActivateServiceEvent: UserEvent {
    fn service(&self) -> &ServiceKind;

    /// Builds and starts the service loop. `app_queue` is where the service sends
    /// the events it produces.
    fn instantiate_service(&self, user_id: UserId, app_queue: EventQueue) -> EventLoop;
}

/// Capability: the event belongs to the backlog database conversation.
pub trait DatabaseEvent: Send + Sync {
    /// Event this one answers or was triggered by, if any.
    fn origin(&self) -> Option<&EventRef>;
}

/// Capability: a command for one user's IRC backend on one server.
pub trait IrcCommand: UserEvent {
    fn server_id(&self) -> ServerId;
}

//! IRC backend commands and replies.

use std::any::Any;

use serde::{Deserialize, Serialize};

use super::{Event, EventType, IrcCommand, UserEvent};
use crate::types::{IrcHost, ServerId, UserId};

macro_rules! irc_command {
    ($kind:ident) => {
        impl Event for $kind {
            fn event_type(&self) -> EventType {
                EventType::$kind
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_user_event(&self) -> Option<&dyn UserEvent> {
                Some(self)
            }

            fn as_irc_command(&self) -> Option<&dyn IrcCommand> {
                Some(self)
            }
        }

        impl UserEvent for $kind {
            fn user_id(&self) -> UserId {
                self.user_id
            }
        }

        impl IrcCommand for $kind {
            fn server_id(&self) -> ServerId {
                self.server_id
            }
        }
    };
}

/// Join (or register) a channel on a server.
#[derive(Debug, Clone)]
pub struct IrcJoinChannel {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub channel: String,
    pub password: Option<String>,
}

impl IrcJoinChannel {
    pub fn new(
        user_id: UserId,
        server_id: ServerId,
        channel: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            user_id,
            server_id,
            channel: channel.into(),
            password,
        }
    }
}

/// Leave a channel and forget it.
#[derive(Debug, Clone)]
pub struct IrcDeleteChannel {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub channel: String,
}

/// Ask for the user's channel listing on one server.
#[derive(Debug, Clone)]
pub struct IrcChatListingRequest {
    pub user_id: UserId,
    pub server_id: ServerId,
}

/// A line posted to a channel by `nick`. Recorded in the backlog when enabled.
#[derive(Debug, Clone)]
pub struct IrcChannelMessage {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub channel: String,
    pub nick: String,
    pub text: String,
}

/// Add (or replace) a host the server can be reached on.
#[derive(Debug, Clone)]
pub struct IrcHostAdded {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub host: IrcHost,
}

/// Forget the host at `host:port`.
#[derive(Debug, Clone)]
pub struct IrcHostRemoved {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub host: String,
    pub port: u16,
}

/// Ask for the stored lines of one channel.
#[derive(Debug, Clone)]
pub struct IrcBacklogRequest {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub channel: String,
}

irc_command!(IrcJoinChannel);
irc_command!(IrcDeleteChannel);
irc_command!(IrcChatListingRequest);
irc_command!(IrcChannelMessage);
irc_command!(IrcHostAdded);
irc_command!(IrcHostRemoved);
irc_command!(IrcBacklogRequest);

/// One channel in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcChannelListing {
    pub name: String,
    /// Joined with a password.
    pub locked: bool,
    /// Nicks seen in the channel, sorted.
    pub users: Vec<String>,
}

/// Channels and hosts known on one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcServerListing {
    pub server_id: ServerId,
    pub name: String,
    pub nick: String,
    pub hosts: Vec<IrcHost>,
    pub channels: Vec<IrcChannelListing>,
}

/// Reply to [`IrcChatListingRequest`].
#[derive(Debug, Clone)]
pub struct IrcChatListing {
    pub user_id: UserId,
    pub servers: Vec<IrcServerListing>,
}

impl Event for IrcChatListing {
    fn event_type(&self) -> EventType {
        EventType::IrcChatListing
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_user_event(&self) -> Option<&dyn UserEvent> {
        Some(self)
    }
}

impl UserEvent for IrcChatListing {
    fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// One stored channel line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrcBacklogLine {
    pub nick: String,
    pub text: String,
}

/// Reply to [`IrcBacklogRequest`], oldest line first.
#[derive(Debug, Clone)]
pub struct IrcBacklogResponse {
    pub user_id: UserId,
    pub server_id: ServerId,
    pub channel: String,
    pub lines: Vec<IrcBacklogLine>,
}

impl Event for IrcBacklogResponse {
    fn event_type(&self) -> EventType {
        EventType::IrcBacklogResponse
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_user_event(&self) -> Option<&dyn UserEvent> {
        Some(self)
    }
}

impl UserEvent for IrcBacklogResponse {
    fn user_id(&self) -> UserId {
        self.user_id
    }
}

//! Channel membership bookkeeping.

use std::collections::BTreeMap;

use crate::events::IrcChannelListing;

/// A user seen in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcUserStore {
    nick: String,
    mode: String,
}

impl IrcUserStore {
    pub fn new(nick: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            mode: mode.into(),
        }
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn set_mode(&mut self, mode: impl Into<String>) {
        self.mode = mode.into();
    }
}

/// One channel: optional password and the users in it, keyed by nick.
#[derive(Debug, Clone, Default)]
pub struct IrcChannelStore {
    password: Option<String>,
    users: BTreeMap<String, IrcUserStore>,
}

impl IrcChannelStore {
    pub fn new(password: Option<String>) -> Self {
        Self {
            password,
            users: BTreeMap::new(),
        }
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Add `nick`, or update its mode if already present.
    pub fn add_user(&mut self, nick: impl Into<String>, mode: impl Into<String>) {
        let nick = nick.into();
        let mode = mode.into();
        self.users
            .entry(nick.clone())
            .and_modify(|user| user.set_mode(mode.clone()))
            .or_insert_with(|| IrcUserStore::new(nick, mode));
    }

    /// Add `nick` with an empty mode unless it is already known.
    pub fn saw_user(&mut self, nick: &str) {
        if !self.users.contains_key(nick) {
            self.users.insert(nick.to_string(), IrcUserStore::new(nick, ""));
        }
    }

    pub fn users(&self) -> impl Iterator<Item = &IrcUserStore> {
        self.users.values()
    }

    pub fn listing(&self, name: &str) -> IrcChannelListing {
        IrcChannelListing {
            name: name.to_string(),
            locked: self.password().is_some(),
            users: self.users().map(|user| user.nick().to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_updates_mode_in_place() {
        let mut channel = IrcChannelStore::new(Some("secret".into()));
        channel.add_user("ferris", "");
        channel.add_user("ferris", "@");
        channel.add_user("bors", "+");

        let users: Vec<_> = channel.users().map(|u| (u.nick(), u.mode())).collect();
        assert_eq!(users, vec![("bors", "+"), ("ferris", "@")]);
        assert_eq!(channel.password(), Some("secret"));
    }

    #[test]
    fn test_saw_user_keeps_existing_mode() {
        let mut channel = IrcChannelStore::default();
        channel.add_user("ferris", "@");
        channel.saw_user("ferris");
        channel.saw_user("crab");

        let users: Vec<_> = channel.users().map(|u| (u.nick(), u.mode())).collect();
        assert_eq!(users, vec![("crab", ""), ("ferris", "@")]);

        let listing = channel.listing("#rust");
        assert!(!listing.locked);
        assert_eq!(listing.users, vec!["crab".to_string(), "ferris".to_string()]);
    }
}

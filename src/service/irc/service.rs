//! Per-user IRC backend.
//!
//! Channel lines are kept in the `irc_backlog` table of the backlog store when
//! backlog is enabled. Writes and reads go out as [`DatabaseQuery`] batches on
//! the application queue and are answered on this loop's own queue; a backlog
//! read carries its request as origin so the answer can be matched up.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::channel_store::IrcChannelStore;
use crate::events::{
    DatabaseQuery, DatabaseResult, EventGuard, EventRef, EventType, Filter, IrcBacklogLine,
    IrcBacklogRequest, IrcBacklogResponse, IrcChannelMessage, IrcChatListing, IrcCommand,
    IrcDeleteChannel, IrcHostAdded, IrcHostRemoved, IrcJoinChannel, IrcServerListing, Query,
};
use crate::queue::{EventHandler, EventLoop, EventQueue, Flow, Subscription};
use crate::types::{IrcConfig, IrcHost, IrcServerConfig, Result, ServerId, UserId};

const BACKLOG_TABLE: &str = "irc_backlog";
const BACKLOG_COLUMNS: [&str; 5] = ["user_id", "server_id", "channel", "nick", "text"];

#[derive(Debug)]
struct ServerState {
    name: String,
    nick: String,
    hosts: Vec<IrcHost>,
    channels: BTreeMap<String, IrcChannelStore>,
}

impl ServerState {
    fn from_config(server: &IrcServerConfig) -> Self {
        let mut state = Self {
            name: server.name.clone(),
            nick: server.nick.clone(),
            hosts: server.hosts.clone(),
            channels: BTreeMap::new(),
        };
        for channel in &server.channels {
            state.join(channel, None);
        }
        state
    }

    fn join(&mut self, channel: &str, password: Option<String>) {
        let store = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| IrcChannelStore::new(password));
        store.add_user(self.nick.clone(), "");
    }

    /// Replaces a host already known at the same address.
    fn add_host(&mut self, host: IrcHost) {
        match self.hosts.iter_mut().find(|h| h.is_at(&host.host, host.port)) {
            Some(known) => *known = host,
            None => self.hosts.push(host),
        }
    }

    fn remove_host(&mut self, host: &str, port: u16) -> bool {
        let before = self.hosts.len();
        self.hosts.retain(|h| !h.is_at(host, port));
        self.hosts.len() != before
    }

    fn listing(&self, server_id: ServerId) -> IrcServerListing {
        IrcServerListing {
            server_id,
            name: self.name.clone(),
            nick: self.nick.clone(),
            hosts: self.hosts.clone(),
            channels: self
                .channels
                .iter()
                .map(|(name, store)| store.listing(name))
                .collect(),
        }
    }
}

/// Handler of one user's `irc-<user>` loop.
///
/// Keeps per-server channel stores and hosts, answers listing and backlog
/// requests on the application queue. Wire I/O is not part of this type.
#[derive(Debug)]
pub struct IrcService {
    user_id: UserId,
    app_queue: EventQueue,
    own_queue: EventQueue,
    backlog: bool,
    servers: BTreeMap<ServerId, ServerState>,
}

impl IrcService {
    pub fn new(
        user_id: UserId,
        app_queue: EventQueue,
        own_queue: EventQueue,
        config: &IrcConfig,
    ) -> Self {
        let servers = config
            .servers
            .iter()
            .map(|server| (server.id, ServerState::from_config(server)))
            .collect();
        Self {
            user_id,
            app_queue,
            own_queue,
            backlog: config.backlog,
            servers,
        }
    }

    pub fn subscription() -> Subscription {
        Subscription::new(
            [
                EventType::Quit,
                EventType::Logout,
                EventType::LoginResult,
                EventType::ActivateService,
                EventType::DatabaseResult,
            ],
            [EventGuard::irc_command()],
        )
    }

    /// Build the (Created) loop for `user_id`.
    pub fn build(user_id: UserId, app_queue: EventQueue, config: &IrcConfig) -> EventLoop {
        let (queue, mailbox) = EventQueue::new(format!("irc-{user_id}"), Self::subscription());
        let service = Self::new(user_id, app_queue, queue.clone(), config);
        EventLoop::from_parts(queue, mailbox, service)
    }

    fn server_mut(&mut self, command: &dyn IrcCommand) -> Option<&mut ServerState> {
        let server_id = command.server_id();
        let found = self.servers.get_mut(&server_id);
        if found.is_none() {
            tracing::warn!(
                user_id = %self.user_id,
                %server_id,
                "command for unknown server ignored"
            );
        }
        found
    }

    fn send_app(&self, event: EventRef) {
        if let Err(err) = self.app_queue.send_event(event) {
            tracing::warn!(user_id = %self.user_id, error = %err, "application queue unreachable");
        }
    }

    fn send_listing(&self, only: Option<ServerId>) {
        let servers = self
            .servers
            .iter()
            .filter(|(id, _)| only.map_or(true, |wanted| wanted == **id))
            .map(|(id, state)| state.listing(*id))
            .collect();
        self.send_app(Arc::new(IrcChatListing {
            user_id: self.user_id,
            servers,
        }));
    }

    fn query(&self, queries: Vec<Query>, origin: Option<EventRef>) {
        let mut query = DatabaseQuery::new(self.own_queue.clone(), queries);
        if let Some(origin) = origin {
            query = query.with_origin(origin);
        }
        self.send_app(Arc::new(query));
    }

    fn on_activated(&self) {
        tracing::info!(
            user_id = %self.user_id,
            servers = self.servers.len(),
            backlog = self.backlog,
            "irc backend up"
        );
        if self.backlog {
            self.query(
                vec![Query::CreateTable {
                    table: BACKLOG_TABLE.to_string(),
                    columns: BACKLOG_COLUMNS.iter().map(|c| c.to_string()).collect(),
                }],
                None,
            );
        }
        self.send_listing(None);
    }

    fn record(&mut self, message: &IrcChannelMessage) {
        let Some(server) = self.server_mut(message) else {
            return;
        };
        let Some(channel) = server.channels.get_mut(&message.channel) else {
            tracing::debug!(channel = %message.channel, "message for unjoined channel ignored");
            return;
        };
        channel.saw_user(&message.nick);

        if self.backlog {
            self.query(
                vec![Query::Insert {
                    table: BACKLOG_TABLE.to_string(),
                    values: vec![
                        json!(self.user_id.get()),
                        json!(message.server_id.get()),
                        json!(message.channel),
                        json!(message.nick),
                        json!(message.text),
                    ],
                }],
                None,
            );
        }
    }

    fn request_backlog(&self, event: &EventRef, request: &IrcBacklogRequest) {
        if !self.backlog {
            self.send_app(Arc::new(backlog_response(request, Vec::new())));
            return;
        }
        self.query(
            vec![Query::Select {
                table: BACKLOG_TABLE.to_string(),
                columns: vec!["nick".to_string(), "text".to_string()],
                filters: vec![
                    Filter::equals("user_id", self.user_id.get()),
                    Filter::equals("server_id", request.server_id.get()),
                    Filter::equals("channel", request.channel.clone()),
                ],
            }],
            Some(Arc::clone(event)),
        );
    }

    fn on_database_result(&self, result: &DatabaseResult) {
        let request = result
            .origin
            .as_ref()
            .and_then(|origin| origin.downcast_ref::<IrcBacklogRequest>());
        let Some(request) = request else {
            if !result.success {
                tracing::warn!(
                    user_id = %self.user_id,
                    error = ?result.error,
                    "backlog write failed"
                );
            }
            return;
        };

        let lines = if result.success {
            result.rows.iter().filter_map(|row| backlog_line(row)).collect()
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                channel = %request.channel,
                error = ?result.error,
                "backlog read failed"
            );
            Vec::new()
        };
        self.send_app(Arc::new(backlog_response(request, lines)));
    }
}

fn backlog_line(row: &[Value]) -> Option<IrcBacklogLine> {
    match row {
        [Value::String(nick), Value::String(text)] => Some(IrcBacklogLine {
            nick: nick.clone(),
            text: text.clone(),
        }),
        _ => None,
    }
}

fn backlog_response(request: &IrcBacklogRequest, lines: Vec<IrcBacklogLine>) -> IrcBacklogResponse {
    IrcBacklogResponse {
        user_id: request.user_id,
        server_id: request.server_id,
        channel: request.channel.clone(),
        lines,
    }
}

#[async_trait]
impl EventHandler for IrcService {
    async fn on_event(&mut self, event: EventRef) -> Result<Flow> {
        match event.event_type() {
            // Only sent after a successful login; the first listing goes out here
            // because that login reached the user manager before this loop existed.
            EventType::ActivateService => self.on_activated(),
            EventType::LoginResult => self.send_listing(None),
            EventType::IrcJoinChannel => {
                if let Some(join) = event.downcast_ref::<IrcJoinChannel>() {
                    if let Some(server) = self.server_mut(join) {
                        server.join(&join.channel, join.password.clone());
                        tracing::debug!(channel = %join.channel, "channel joined");
                    }
                }
            }
            EventType::IrcDeleteChannel => {
                if let Some(delete) = event.downcast_ref::<IrcDeleteChannel>() {
                    if let Some(server) = self.server_mut(delete) {
                        if server.channels.remove(&delete.channel).is_none() {
                            tracing::debug!(
                                channel = %delete.channel,
                                "delete for unknown channel"
                            );
                        }
                    }
                }
            }
            EventType::IrcChannelMessage => {
                if let Some(message) = event.downcast_ref::<IrcChannelMessage>() {
                    self.record(message);
                }
            }
            EventType::IrcHostAdded => {
                if let Some(added) = event.downcast_ref::<IrcHostAdded>() {
                    if let Some(server) = self.server_mut(added) {
                        server.add_host(added.host.clone());
                        tracing::debug!(
                            host = %added.host.host,
                            port = added.host.port,
                            "host added"
                        );
                    }
                }
            }
            EventType::IrcHostRemoved => {
                if let Some(removed) = event.downcast_ref::<IrcHostRemoved>() {
                    if let Some(server) = self.server_mut(removed) {
                        if !server.remove_host(&removed.host, removed.port) {
                            tracing::debug!(
                                host = %removed.host,
                                port = removed.port,
                                "remove for unknown host"
                            );
                        }
                    }
                }
            }
            EventType::IrcChatListingRequest => {
                if let Some(request) = event.as_irc_command() {
                    self.send_listing(Some(request.server_id()));
                }
            }
            EventType::IrcBacklogRequest => {
                if let Some(request) = event.downcast_ref::<IrcBacklogRequest>() {
                    self.request_backlog(&event, request);
                }
            }
            EventType::DatabaseResult => {
                if let Some(result) = event.downcast_ref::<DatabaseResult>() {
                    self.on_database_result(result);
                }
            }
            EventType::Quit => return Ok(Flow::Stop),
            EventType::Logout => {
                tracing::debug!(user_id = %self.user_id, "client logged out, backend kept");
            }
            _ => {}
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{IrcChannelListing, IrcChatListingRequest, Quit};
    use crate::queue::{LoopExit, Mailbox};
    use crate::service::MemoryDatabase;
    use pretty_assertions::assert_eq;

    fn config(backlog: bool) -> IrcConfig {
        IrcConfig {
            servers: vec![IrcServerConfig {
                id: ServerId::new(1),
                name: "libera".into(),
                nick: "ferris".into(),
                hosts: vec![IrcHost::new("irc.libera.chat", 6697)],
                channels: vec!["#rust".into()],
            }],
            backlog,
        }
    }

    fn start(user: UserId, app: EventQueue, backlog: bool) -> EventLoop {
        let mut irc = IrcService::build(user, app, &config(backlog));
        irc.start().unwrap();
        irc
    }

    async fn listing(mailbox: &mut Mailbox) -> Vec<IrcServerListing> {
        let event = mailbox.recv().await.unwrap();
        event.downcast_ref::<IrcChatListing>().unwrap().servers.clone()
    }

    fn channel(name: &str, users: &[&str]) -> IrcChannelListing {
        IrcChannelListing {
            name: name.into(),
            locked: false,
            users: users.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_join_delete_and_list() {
        let (app, mut mailbox) = EventQueue::new("app", Subscription::all());
        let user = UserId::new(4);
        let mut irc = start(user, app, false);
        let libera = ServerId::new(1);

        let send = |event: EventRef| irc.queue().send_event(event).unwrap();
        send(Arc::new(IrcJoinChannel::new(user, libera, "#tokio", None)));
        send(Arc::new(IrcJoinChannel::new(user, ServerId::new(9), "#lost", None)));
        send(Arc::new(IrcDeleteChannel {
            user_id: user,
            server_id: libera,
            channel: "#rust".into(),
        }));
        send(Arc::new(IrcChatListingRequest {
            user_id: user,
            server_id: libera,
        }));

        assert_eq!(
            listing(&mut mailbox).await,
            vec![IrcServerListing {
                server_id: libera,
                name: "libera".into(),
                nick: "ferris".into(),
                hosts: vec![IrcHost::new("irc.libera.chat", 6697)],
                channels: vec![channel("#tokio", &["ferris"])],
            }]
        );

        irc.queue().send_event(Arc::new(Quit)).unwrap();
        assert_eq!(irc.join().await.unwrap(), LoopExit::Stopped);
    }

    #[tokio::test]
    async fn test_listing_for_unknown_server_is_empty() {
        let (app, mut mailbox) = EventQueue::new("app", Subscription::all());
        let user = UserId::new(4);
        let mut irc = start(user, app, false);

        irc.queue()
            .send_event(Arc::new(IrcChatListingRequest {
                user_id: user,
                server_id: ServerId::new(2),
            }))
            .unwrap();
        assert!(listing(&mut mailbox).await.is_empty());

        irc.queue().send_event(Arc::new(Quit)).unwrap();
        irc.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_app_queue_does_not_stop_backend() {
        let (app, mailbox) = EventQueue::new("app", Subscription::all());
        drop(mailbox);
        let user = UserId::new(4);
        let mut irc = start(user, app, false);

        irc.queue()
            .send_event(Arc::new(IrcChatListingRequest {
                user_id: user,
                server_id: ServerId::new(1),
            }))
            .unwrap();
        irc.queue().send_event(Arc::new(Quit)).unwrap();
        assert_eq!(irc.join().await.unwrap(), LoopExit::Stopped);
    }

    #[tokio::test]
    async fn test_hosts_are_added_replaced_and_removed() {
        let (app, mut mailbox) = EventQueue::new("app", Subscription::all());
        let user = UserId::new(4);
        let mut irc = start(user, app, false);
        let libera = ServerId::new(1);

        let mut tls = IrcHost::new("irc.libera.chat", 6697);
        tls.ssl = true;
        let send = |event: EventRef| irc.queue().send_event(event).unwrap();
        send(Arc::new(IrcHostAdded {
            user_id: user,
            server_id: libera,
            host: tls.clone(),
        }));
        send(Arc::new(IrcHostAdded {
            user_id: user,
            server_id: libera,
            host: IrcHost::new("irc.eu.libera.chat", 6667),
        }));
        send(Arc::new(IrcHostRemoved {
            user_id: user,
            server_id: libera,
            host: "irc.eu.libera.chat".into(),
            port: 6667,
        }));
        send(Arc::new(IrcChatListingRequest {
            user_id: user,
            server_id: libera,
        }));

        let servers = listing(&mut mailbox).await;
        assert_eq!(servers[0].hosts, vec![tls]);

        irc.queue().send_event(Arc::new(Quit)).unwrap();
        irc.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_backlog_without_store_answers_empty() {
        let (app, mut mailbox) = EventQueue::new("app", Subscription::all());
        let user = UserId::new(4);
        let mut irc = start(user, app, false);

        irc.queue()
            .send_event(Arc::new(IrcBacklogRequest {
                user_id: user,
                server_id: ServerId::new(1),
                channel: "#rust".into(),
            }))
            .unwrap();
        let event = mailbox.recv().await.unwrap();
        let response = event.downcast_ref::<IrcBacklogResponse>().unwrap();
        assert_eq!(response.channel, "#rust");
        assert!(response.lines.is_empty());

        irc.queue().send_event(Arc::new(Quit)).unwrap();
        irc.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_backlog_round_trip_through_store() {
        use crate::events::Init;

        // The app mailbox stands in for the router: database queries go to the store,
        // everything else is kept for the assertions.
        let (app, mut mailbox) = EventQueue::new("app", Subscription::all());
        let mut db = MemoryDatabase::build();
        db.start().unwrap();
        db.queue().send_event(Arc::new(Init)).unwrap();

        let user = UserId::new(4);
        let libera = ServerId::new(1);
        let mut irc = start(user, app, true);
        let send = |event: EventRef| irc.queue().send_event(event).unwrap();
        send(irc_activation(user));
        for (nick, text) in [("ferris", "hello"), ("bors", "r+")] {
            send(Arc::new(IrcChannelMessage {
                user_id: user,
                server_id: libera,
                channel: "#rust".into(),
                nick: nick.into(),
                text: text.into(),
            }));
        }
        send(Arc::new(IrcChannelMessage {
            user_id: user,
            server_id: libera,
            channel: "#nowhere".into(),
            nick: "ghost".into(),
            text: "boo".into(),
        }));
        send(Arc::new(IrcBacklogRequest {
            user_id: user,
            server_id: libera,
            channel: "#rust".into(),
        }));

        let response = loop {
            let event = mailbox.recv().await.unwrap();
            if event.event_type() == EventType::DatabaseQuery {
                db.queue().send_event(event).unwrap();
                continue;
            }
            if let Some(response) = event.downcast_ref::<IrcBacklogResponse>() {
                break response.clone();
            }
        };
        assert_eq!(
            response.lines,
            vec![
                IrcBacklogLine {
                    nick: "ferris".into(),
                    text: "hello".into(),
                },
                IrcBacklogLine {
                    nick: "bors".into(),
                    text: "r+".into(),
                },
            ]
        );

        irc.queue().send_event(Arc::new(Quit)).unwrap();
        irc.join().await.unwrap();
        db.queue().send_event(Arc::new(Quit)).unwrap();
        db.join().await.unwrap();
    }

    fn irc_activation(user: UserId) -> EventRef {
        use crate::events::ActivateService;
        use crate::types::ServiceKind;

        Arc::new(ActivateService::new(user, ServiceKind::IRC, |user, app| {
            IrcService::build(user, app, &IrcConfig::default())
        }))
    }
}

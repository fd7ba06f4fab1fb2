//! Per-user service registry.
//!
//! Owned by the user manager's handler and only touched from its task, so it needs
//! no lock. At most one child loop exists per (user, service kind).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::events::{ActivateServiceEvent, EventRef, UserEvent};
use crate::queue::{EventLoop, EventQueue, LoopExit, LoopState};
use crate::types::{ServiceKind, UserId};

/// Outcome of an activation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// A new child was built and received the activation event.
    Created,
    /// A child for this (user, kind) already runs; nothing happened.
    AlreadyActive,
}

/// user id -> (service kind -> running child).
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    users: HashMap<UserId, HashMap<ServiceKind, EventLoop>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locate the user's service map, creating an empty one on first sight.
    pub fn touch(&mut self, user_id: UserId) -> &mut HashMap<ServiceKind, EventLoop> {
        self.users.entry(user_id).or_default()
    }

    /// Handle an activate-service event. `None` if `event` has no such capability.
    pub fn activate(&mut self, event: &EventRef, app_queue: &EventQueue) -> Option<Activation> {
        let request = event.as_activate_service()?;
        let user_id = request.user_id();
        let service = request.service();

        let slot = match self.touch(user_id).entry(service.clone()) {
            Entry::Occupied(_) => {
                tracing::debug!(%user_id, %service, "service already active");
                return Some(Activation::AlreadyActive);
            }
            Entry::Vacant(slot) => slot,
        };

        let mut child = request.instantiate_service(user_id, app_queue.clone());
        if child.state() == LoopState::Created {
            if let Err(err) = child.start() {
                tracing::warn!(%user_id, %service, error = %err, "failed to start service");
            }
        }
        if let Err(err) = child.queue().send_event(Arc::clone(event)) {
            tracing::warn!(%user_id, %service, error = %err, "service rejected activation event");
        }
        tracing::info!(%user_id, %service, actor = child.name(), "service activated");
        slot.insert(child);
        Some(Activation::Created)
    }

    /// Send `event` to the children of `user_id`. With `filtered`, only children
    /// whose queue accepts the event get it. Returns how many were reached.
    pub fn send_to_user(&self, user_id: UserId, event: &EventRef, filtered: bool) -> usize {
        let Some(services) = self.users.get(&user_id) else {
            return 0;
        };
        services
            .iter()
            .filter(|(_, child)| !filtered || child.queue().can_process_event(event.as_ref()))
            .filter(|(service, child)| deliver(user_id, service, child, event))
            .count()
    }

    /// Send `event` unconditionally to every child of every user.
    pub fn broadcast(&self, event: &EventRef) -> usize {
        self.users
            .iter()
            .flat_map(|(user_id, services)| {
                services
                    .iter()
                    .map(move |(service, child)| (*user_id, service, child))
            })
            .filter(|(user_id, service, child)| deliver(*user_id, service, child, event))
            .count()
    }

    /// Send `quit` to every child, wait until all of them are joined and empty the
    /// registry. Returns the number of children joined.
    pub async fn shutdown(&mut self, quit: &EventRef, warn_after: Duration) -> usize {
        let children: Vec<_> = self
            .users
            .drain()
            .flat_map(|(user_id, services)| {
                services
                    .into_iter()
                    .map(move |(service, child)| (user_id, service, child))
            })
            .collect();
        stop_and_join(children, quit, warn_after).await
    }

    /// Like [`shutdown`](Self::shutdown), restricted to one user. The user's map is
    /// dropped so a later activation builds fresh children.
    pub async fn remove_user(
        &mut self,
        user_id: UserId,
        stop: &EventRef,
        warn_after: Duration,
    ) -> usize {
        let Some(services) = self.users.remove(&user_id) else {
            return 0;
        };
        let children = services
            .into_iter()
            .map(|(service, child)| (user_id, service, child))
            .collect();
        stop_and_join(children, stop, warn_after).await
    }

    pub fn contains(&self, user_id: UserId, service: &ServiceKind) -> bool {
        self.users
            .get(&user_id)
            .is_some_and(|services| services.contains_key(service))
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn service_count(&self) -> usize {
        self.users.values().map(HashMap::len).sum()
    }
}

fn deliver(user_id: UserId, service: &ServiceKind, child: &EventLoop, event: &EventRef) -> bool {
    match child.queue().send_event(Arc::clone(event)) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%user_id, %service, error = %err, "service unreachable");
            false
        }
    }
}

async fn stop_and_join(
    mut children: Vec<(UserId, ServiceKind, EventLoop)>,
    stop: &EventRef,
    warn_after: Duration,
) -> usize {
    for (user_id, service, child) in &children {
        deliver(*user_id, service, child, stop);
    }

    let exits = join_all(
        children
            .iter_mut()
            .map(|(_, _, child)| child.join_warn(warn_after)),
    )
    .await;

    let mut joined = 0;
    for ((user_id, service, _), exit) in children.iter().zip(exits) {
        match exit {
            Ok(LoopExit::Stopped | LoopExit::Closed) => {
                tracing::debug!(%user_id, %service, "service joined");
                joined += 1;
            }
            Ok(exit) => {
                tracing::warn!(%user_id, %service, ?exit, "service ended abnormally");
                joined += 1;
            }
            Err(err) => tracing::error!(%user_id, %service, error = %err, "service join failed"),
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActivateService, EventGuard, EventType, Init, IrcJoinChannel, Quit};
    use crate::queue::Subscription;
    use crate::testing::{assert_silent, next, probe};
    use crate::types::ServerId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    type Taps = Arc<Mutex<Vec<UnboundedReceiver<EventRef>>>>;

    fn activation(
        user: u64,
        service: ServiceKind,
        built: Arc<AtomicUsize>,
        taps: Taps,
    ) -> EventRef {
        Arc::new(ActivateService::new(
            UserId::new(user),
            service,
            move |user_id, _app_queue| {
                built.fetch_add(1, Ordering::SeqCst);
                let (child, rx) = probe(
                    &format!("probe-{user_id}"),
                    Subscription::new([EventType::Quit], [EventGuard::irc_command()]),
                );
                taps.lock().unwrap().push(rx);
                child
            },
        ))
    }

    fn app_queue() -> EventQueue {
        EventQueue::new("app", Subscription::all()).0
    }

    #[tokio::test]
    async fn test_activation_is_idempotent_and_forwarded_first() {
        let built = Arc::new(AtomicUsize::new(0));
        let taps: Taps = Arc::default();
        let mut registry = ServiceRegistry::new();
        let app = app_queue();

        let event = activation(7, ServiceKind::IRC, built.clone(), taps.clone());
        assert_eq!(registry.activate(&event, &app), Some(Activation::Created));
        let again = activation(7, ServiceKind::IRC, built.clone(), taps.clone());
        assert_eq!(registry.activate(&again, &app), Some(Activation::AlreadyActive));

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(registry.service_count(), 1);
        assert!(registry.contains(UserId::new(7), &ServiceKind::IRC));

        let mut rx = taps.lock().unwrap().pop().unwrap();
        let first = next(&mut rx).await;
        assert!(Arc::ptr_eq(&first, &event));
        assert_silent(&mut rx).await;

        assert_eq!(registry.shutdown(&(Arc::new(Quit) as EventRef), Duration::ZERO).await, 1);
    }

    #[tokio::test]
    async fn test_activate_ignores_other_events() {
        let mut registry = ServiceRegistry::new();
        assert_eq!(registry.activate(&(Arc::new(Init) as EventRef), &app_queue()), None);
        assert_eq!(registry.user_count(), 0);
    }

    #[tokio::test]
    async fn test_filtered_send_respects_child_subscription() {
        let built = Arc::new(AtomicUsize::new(0));
        let taps: Taps = Arc::default();
        let mut registry = ServiceRegistry::new();
        let app = app_queue();
        registry.activate(&activation(2, ServiceKind::IRC, built, taps.clone()), &app);
        let mut rx = taps.lock().unwrap().pop().unwrap();
        next(&mut rx).await;

        let join: EventRef = Arc::new(IrcJoinChannel::new(
            UserId::new(2),
            ServerId::new(1),
            "#rust",
            None,
        ));
        let init: EventRef = Arc::new(Init);
        assert_eq!(registry.send_to_user(UserId::new(2), &join, true), 1);
        assert_eq!(registry.send_to_user(UserId::new(2), &init, true), 0);
        assert_eq!(registry.send_to_user(UserId::new(9), &join, true), 0);

        assert_eq!(next(&mut rx).await.event_type(), EventType::IrcJoinChannel);
        assert_silent(&mut rx).await;

        registry.shutdown(&(Arc::new(Quit) as EventRef), Duration::ZERO).await;
    }

    #[tokio::test]
    async fn test_remove_user_leaves_others_running() {
        let built = Arc::new(AtomicUsize::new(0));
        let taps: Taps = Arc::default();
        let mut registry = ServiceRegistry::new();
        let app = app_queue();
        registry.activate(&activation(1, ServiceKind::IRC, built.clone(), taps.clone()), &app);
        registry.activate(&activation(2, ServiceKind::IRC, built.clone(), taps.clone()), &app);

        let quit: EventRef = Arc::new(Quit);
        assert_eq!(registry.remove_user(UserId::new(1), &quit, Duration::ZERO).await, 1);
        assert!(!registry.contains(UserId::new(1), &ServiceKind::IRC));
        assert_eq!(registry.user_count(), 1);
        assert!(registry.contains(UserId::new(2), &ServiceKind::IRC));
        assert_eq!(registry.remove_user(UserId::new(1), &quit, Duration::ZERO).await, 0);

        assert_eq!(registry.shutdown(&quit, Duration::ZERO).await, 1);
        assert_eq!(registry.user_count(), 0);
    }
}

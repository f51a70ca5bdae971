//! Events, event groups and subscriptions.
//!
//! The [`EventSubsystem`] keeps both sides of publish/subscribe:
//!
//! - As a server, it knows which events are offered, which groups they belong to, and which
//!   peers subscribed to each group. [`EventSubsystem::notify`] returns the peers a notification
//!   must be delivered to.
//! - As a client, it tracks the state of each subscription. Subscriptions to services that are
//!   not available are kept [`SubscriptionState::Pending`] until the service appears.
//!
//! Periodic publication is not handled here. The application owns the timers that call
//! [`EventSubsystem::notify`].

use crate::{
    someip::{EventGroupId, EventId, ServiceKey},
    support::sync::lock,
    transport::PeerAddress,
    Error, Result,
};
use bytes::Bytes;
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Mutex,
};

/// Type of an event.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A plain event.
    #[default]
    Event,
    /// A field. New subscribers receive its last value right away.
    Field,
}

/// State of a subscription to an event group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Waiting for the service to become available.
    Pending,
    /// Subscription sent to the given peer, waiting for an answer.
    Requested(PeerAddress),
    /// Subscription accepted by the given peer.
    Subscribed(PeerAddress),
}

impl SubscriptionState {
    /// Returns the peer the subscription was sent to, if any.
    pub fn peer(self) -> Option<PeerAddress> {
        match self {
            Self::Pending => None,
            Self::Requested(peer) | Self::Subscribed(peer) => Some(peer),
        }
    }
}

#[derive(Debug)]
struct OfferedEvent {
    groups: BTreeSet<EventGroupId>,
    event_type: EventType,
    last_value: Option<Bytes>,
}

#[derive(Debug)]
struct RequestedEvent {
    groups: BTreeSet<EventGroupId>,
    event_type: EventType,
}

type EventKey = (ServiceKey, EventId);
type GroupKey = (ServiceKey, EventGroupId);

/// Events and subscriptions of a single application.
#[derive(Debug, Default)]
pub struct EventSubsystem {
    offered: Mutex<HashMap<EventKey, OfferedEvent>>,
    subscribers: Mutex<HashMap<GroupKey, HashSet<PeerAddress>>>,
    requested: Mutex<HashMap<EventKey, RequestedEvent>>,
    subscriptions: Mutex<HashMap<GroupKey, SubscriptionState>>,
}

fn check_groups(groups: &[EventGroupId]) -> Result<BTreeSet<EventGroupId>> {
    if groups.is_empty() {
        return Err(Error::InvalidIdentifier(
            "an event must belong to at least one group".into(),
        ));
    }
    groups.iter().map(|group| group.check()).collect()
}

impl EventSubsystem {
    /// Creates a new [`EventSubsystem`] without events or subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers an event as part of the given groups.
    ///
    /// Offering an event again replaces its groups and type, but keeps its last value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if `groups` is empty or contains a reserved id.
    pub fn offer_event(
        &self,
        key: ServiceKey,
        event: EventId,
        groups: &[EventGroupId],
        event_type: EventType,
    ) -> Result<()> {
        let groups = check_groups(groups)?;
        let mut offered = lock(&self.offered);
        let last_value = offered
            .remove(&(key, event))
            .and_then(|previous| previous.last_value);
        offered.insert(
            (key, event),
            OfferedEvent {
                groups,
                event_type,
                last_value,
            },
        );
        Ok(())
    }

    /// Withdraws an event. Returns `true` if it was offered.
    pub fn stop_offer_event(&self, key: ServiceKey, event: EventId) -> bool {
        lock(&self.offered).remove(&(key, event)).is_some()
    }

    /// Returns the last value notified for an offered event.
    pub fn last_value(&self, key: ServiceKey, event: EventId) -> Option<Bytes> {
        lock(&self.offered)
            .get(&(key, event))
            .and_then(|offered| offered.last_value.clone())
    }

    /// Records the value of an event, and returns the peers the notification must be sent to.
    ///
    /// A peer subscribed to several groups containing the event is returned once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOffered`] if the event is not offered.
    pub fn notify(&self, key: ServiceKey, event: EventId, payload: Bytes) -> Result<Vec<PeerAddress>> {
        let groups = {
            let mut offered = lock(&self.offered);
            let Some(offered) = offered.get_mut(&(key, event)) else {
                return Err(Error::NotOffered { key, event });
            };
            offered.last_value = Some(payload);
            offered.groups.clone()
        };
        let subscribers = lock(&self.subscribers);
        let mut targets: Vec<PeerAddress> = groups
            .iter()
            .filter_map(|group| subscribers.get(&(key, *group)))
            .flatten()
            .copied()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        targets.sort();
        Ok(targets)
    }

    /// Adds a subscriber to a group of an offered service.
    ///
    /// Returns the last values of the fields in the group, which must be sent to the new
    /// subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupNotOffered`] if no offered event belongs to the group.
    pub fn add_subscriber(
        &self,
        key: ServiceKey,
        group: EventGroupId,
        peer: PeerAddress,
    ) -> Result<Vec<(EventId, Bytes)>> {
        let mut initial: Vec<(EventId, Bytes)> = {
            let offered = lock(&self.offered);
            let mut events = offered
                .iter()
                .filter(|((k, _), offered)| *k == key && offered.groups.contains(&group))
                .peekable();
            if events.peek().is_none() {
                return Err(Error::GroupNotOffered { key, group });
            }
            events
                .filter(|(_, offered)| offered.event_type == EventType::Field)
                .filter_map(|((_, event), offered)| Some((*event, offered.last_value.clone()?)))
                .collect()
        };
        initial.sort_by_key(|(event, _)| *event);
        lock(&self.subscribers)
            .entry((key, group))
            .or_default()
            .insert(peer);
        Ok(initial)
    }

    /// Removes a subscriber from a group. Returns `true` if it was subscribed.
    pub fn remove_subscriber(&self, key: ServiceKey, group: EventGroupId, peer: PeerAddress) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let Some(peers) = subscribers.get_mut(&(key, group)) else {
            return false;
        };
        let removed = peers.remove(&peer);
        if peers.is_empty() {
            subscribers.remove(&(key, group));
        }
        removed
    }

    /// Removes every subscriber of a service.
    pub fn clear_service(&self, key: ServiceKey) {
        lock(&self.subscribers).retain(|(k, _), _| *k != key);
    }

    /// Registers interest in an event of a remote service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if `groups` is empty or contains a reserved id.
    pub fn request_event(
        &self,
        key: ServiceKey,
        event: EventId,
        groups: &[EventGroupId],
        event_type: EventType,
    ) -> Result<()> {
        let groups = check_groups(groups)?;
        lock(&self.requested).insert((key, event), RequestedEvent { groups, event_type });
        Ok(())
    }

    /// Drops interest in an event. Returns `true` if it was requested.
    pub fn release_event(&self, key: ServiceKey, event: EventId) -> bool {
        lock(&self.requested).remove(&(key, event)).is_some()
    }

    /// Whether a notification of the event sent by `peer` should be delivered.
    ///
    /// Returns the type of the event if it was requested, and one of its groups is subscribed to
    /// at `peer`.
    pub fn accepts(&self, key: ServiceKey, event: EventId, peer: PeerAddress) -> Option<EventType> {
        let (groups, event_type) = {
            let requested = lock(&self.requested);
            let requested = requested.get(&(key, event))?;
            (requested.groups.clone(), requested.event_type)
        };
        let subscriptions = lock(&self.subscriptions);
        groups
            .iter()
            .filter_map(|group| subscriptions.get(&(key, *group)))
            .any(|state| state.peer() == Some(peer))
            .then_some(event_type)
    }

    /// Subscribes to a group.
    ///
    /// `route` is the peer offering the service, if it is available. Returns the peer the
    /// subscription must be sent to, or [`None`] if there is nothing to send, either because the
    /// subscription already exists or because it is pending.
    pub fn subscribe(
        &self,
        key: ServiceKey,
        group: EventGroupId,
        route: Option<PeerAddress>,
    ) -> Option<PeerAddress> {
        let mut subscriptions = lock(&self.subscriptions);
        if subscriptions.contains_key(&(key, group)) {
            return None;
        }
        let state = route.map_or(SubscriptionState::Pending, SubscriptionState::Requested);
        subscriptions.insert((key, group), state);
        route
    }

    /// Cancels a subscription.
    ///
    /// Returns the peer the cancellation must be sent to, if the subscription was sent.
    pub fn unsubscribe(&self, key: ServiceKey, group: EventGroupId) -> Option<PeerAddress> {
        lock(&self.subscriptions)
            .remove(&(key, group))
            .and_then(SubscriptionState::peer)
    }

    /// Cancels every subscription to a service.
    ///
    /// Returns the groups and peers the cancellations must be sent to.
    pub fn unsubscribe_service(&self, key: ServiceKey) -> Vec<(EventGroupId, PeerAddress)> {
        let mut cancelled = Vec::new();
        lock(&self.subscriptions).retain(|(k, group), state| {
            if *k != key {
                return true;
            }
            if let Some(peer) = state.peer() {
                cancelled.push((*group, peer));
            }
            false
        });
        cancelled.sort();
        cancelled
    }

    /// Returns the state of a subscription.
    pub fn subscription(&self, key: ServiceKey, group: EventGroupId) -> Option<SubscriptionState> {
        lock(&self.subscriptions).get(&(key, group)).copied()
    }

    /// Resolves the pending subscriptions to a service that became reachable at `peer`.
    ///
    /// Returns the groups that must be subscribed to.
    pub fn resolve(&self, key: ServiceKey, peer: PeerAddress) -> Vec<EventGroupId> {
        let mut groups: Vec<EventGroupId> = lock(&self.subscriptions)
            .iter_mut()
            .filter(|((k, _), state)| *k == key && **state == SubscriptionState::Pending)
            .map(|((_, group), state)| {
                *state = SubscriptionState::Requested(peer);
                *group
            })
            .collect();
        groups.sort();
        groups
    }

    /// Returns every service with pending subscriptions.
    pub fn pending_services(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<ServiceKey> = lock(&self.subscriptions)
            .iter()
            .filter(|(_, state)| **state == SubscriptionState::Pending)
            .map(|((key, _), _)| *key)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        keys.sort();
        keys
    }

    /// Marks a subscription as accepted by `peer`. Returns `true` if it was waiting for it.
    pub fn acknowledge(&self, key: ServiceKey, group: EventGroupId, peer: PeerAddress) -> bool {
        match lock(&self.subscriptions).get_mut(&(key, group)) {
            Some(state) if *state == SubscriptionState::Requested(peer) => {
                *state = SubscriptionState::Subscribed(peer);
                true
            }
            _ => false,
        }
    }

    /// Marks a subscription rejected by `peer` as pending again.
    pub fn reject(&self, key: ServiceKey, group: EventGroupId, peer: PeerAddress) {
        if let Some(state) = lock(&self.subscriptions).get_mut(&(key, group)) {
            if state.peer() == Some(peer) {
                *state = SubscriptionState::Pending;
            }
        }
    }

    /// Marks every subscription to a service as pending.
    pub fn on_service_unavailable(&self, key: ServiceKey) {
        for ((k, _), state) in lock(&self.subscriptions).iter_mut() {
            if *k == key {
                *state = SubscriptionState::Pending;
            }
        }
    }

    /// Forgets a peer: its subscriptions to local groups are removed, and subscriptions sent to
    /// it become pending.
    pub fn remove_peer(&self, peer: PeerAddress) {
        lock(&self.subscribers).retain(|_, peers| {
            peers.remove(&peer);
            !peers.is_empty()
        });
        for state in lock(&self.subscriptions).values_mut() {
            if state.peer() == Some(peer) {
                *state = SubscriptionState::Pending;
            }
        }
    }

    /// Returns every subscription that was sent, and forgets all of them.
    pub fn drain_subscriptions(&self) -> Vec<(ServiceKey, EventGroupId, PeerAddress)> {
        let mut drained: Vec<_> = lock(&self.subscriptions)
            .drain()
            .filter_map(|((key, group), state)| Some((key, group, state.peer()?)))
            .collect();
        drained.sort();
        drained
    }

    /// Forgets every event, subscriber and subscription.
    pub fn clear(&self) {
        lock(&self.offered).clear();
        lock(&self.subscribers).clear();
        lock(&self.requested).clear();
        lock(&self.subscriptions).clear();
    }
}

#[cfg(test)]
mod tests;

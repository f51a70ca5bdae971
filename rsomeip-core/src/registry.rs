//! Registry of offered and requested services.
//!
//! The [`ServiceRegistry`] tracks which services are offered by the local application, which are
//! offered by remote peers, and which the local application is interested in. Every mutation
//! returns an [`Update`] describing whether the availability of an interesting service changed,
//! so that the caller can notify the availability handlers outside of the registry lock.

use crate::{
    someip::{InstanceId, ServiceId, ServiceKey},
    support::sync::lock,
    transport::PeerAddress,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};
use tokio::sync::watch;

/// Called with the service, instance and new availability of a requested service.
pub type AvailabilityHandler = Arc<dyn Fn(ServiceId, InstanceId, bool) + Send + Sync>;

/// A transition of the availability of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityChange {
    /// The service whose availability changed.
    pub key: ServiceKey,
    /// Whether the service is now available.
    pub available: bool,
}

/// Result of a registry mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Update {
    /// The service that was affected.
    pub key: ServiceKey,
    /// Whether the mutation had any effect.
    pub changed: bool,
    /// The availability transition caused by the mutation, if any.
    pub availability: Option<bool>,
}

impl Update {
    fn unchanged(key: ServiceKey) -> Self {
        Self {
            key,
            changed: false,
            availability: None,
        }
    }

    /// Returns the availability transition caused by the mutation, if any.
    pub fn change(&self) -> Option<AvailabilityChange> {
        self.availability.map(|available| AvailabilityChange {
            key: self.key,
            available,
        })
    }
}

/// Local interest in a service.
struct Interest {
    requested: bool,
    available: bool,
    handlers: Vec<AvailabilityHandler>,
    signal: watch::Sender<bool>,
}

impl Interest {
    fn new(available: bool) -> Self {
        let (signal, _) = watch::channel(available);
        Self {
            requested: false,
            available,
            handlers: Vec::new(),
            signal,
        }
    }
}

#[derive(Default)]
struct Inner {
    local: Option<PeerAddress>,
    offered: HashSet<ServiceKey>,
    remote: HashMap<ServiceKey, PeerAddress>,
    interests: HashMap<ServiceKey, Interest>,
}

impl Inner {
    fn is_available(&self, key: &ServiceKey) -> bool {
        self.offered.contains(key) || self.remote.contains_key(key)
    }

    /// Recomputes the availability of `key` and records a transition, if any.
    fn refresh(&mut self, key: ServiceKey, changed: bool) -> Update {
        let available = self.is_available(&key);
        let availability = match self.interests.get_mut(&key) {
            Some(interest) if interest.available != available => {
                interest.available = available;
                interest.signal.send_replace(available);
                Some(available)
            }
            _ => None,
        };
        Update {
            key,
            changed,
            availability,
        }
    }

    fn interest(&mut self, key: ServiceKey) -> &mut Interest {
        let available = self.is_available(&key);
        self.interests
            .entry(key)
            .or_insert_with(|| Interest::new(available))
    }
}

/// Registry of offered and requested services.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: Mutex<Inner>,
}

impl ServiceRegistry {
    /// Creates a new empty [`ServiceRegistry`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address that locally offered services are reachable at.
    pub fn set_local(&self, address: PeerAddress) {
        lock(&self.inner).local = Some(address);
    }

    /// Marks the service as offered by the local application.
    ///
    /// Offering a service more than once has no effect.
    pub fn offer(&self, key: ServiceKey) -> Update {
        let mut inner = lock(&self.inner);
        let changed = inner.offered.insert(key);
        inner.refresh(key, changed)
    }

    /// Withdraws the local offer of the service.
    pub fn stop_offer(&self, key: ServiceKey) -> Update {
        let mut inner = lock(&self.inner);
        let changed = inner.offered.remove(&key);
        inner.refresh(key, changed)
    }

    /// Records that a remote peer offers the service.
    pub fn add_remote(&self, key: ServiceKey, peer: PeerAddress) -> Update {
        let mut inner = lock(&self.inner);
        let changed = inner.remote.insert(key, peer) != Some(peer);
        inner.refresh(key, changed)
    }

    /// Records that a remote peer stopped offering the service.
    ///
    /// Has no effect if the service is offered by a different peer.
    pub fn remove_remote(&self, key: ServiceKey, peer: PeerAddress) -> Update {
        let mut inner = lock(&self.inner);
        if inner.remote.get(&key) != Some(&peer) {
            return Update::unchanged(key);
        }
        inner.remote.remove(&key);
        inner.refresh(key, true)
    }

    /// Forgets every service offered by the given peer.
    pub fn remove_peer(&self, peer: PeerAddress) -> Vec<Update> {
        let mut inner = lock(&self.inner);
        let keys: Vec<ServiceKey> = inner
            .remote
            .iter()
            .filter(|(_, address)| **address == peer)
            .map(|(key, _)| *key)
            .collect();
        keys.into_iter()
            .map(|key| {
                inner.remote.remove(&key);
                inner.refresh(key, true)
            })
            .collect()
    }

    /// Registers interest in the service.
    ///
    /// Returns `true` if the service was not requested before.
    pub fn request(&self, key: ServiceKey) -> bool {
        let mut inner = lock(&self.inner);
        let interest = inner.interest(key);
        !std::mem::replace(&mut interest.requested, true)
    }

    /// Drops interest in the service.
    ///
    /// Returns `true` if the service was requested.
    pub fn release(&self, key: ServiceKey) -> bool {
        let mut inner = lock(&self.inner);
        let Some(interest) = inner.interests.get_mut(&key) else {
            return false;
        };
        let requested = std::mem::replace(&mut interest.requested, false);
        if interest.handlers.is_empty() && interest.signal.receiver_count() == 0 {
            inner.interests.remove(&key);
        }
        requested
    }

    /// Registers a handler for availability changes of the service.
    ///
    /// Returns `true` if the service is already available, in which case the caller should
    /// notify the new handler once.
    pub fn register_handler(&self, key: ServiceKey, handler: AvailabilityHandler) -> bool {
        let mut inner = lock(&self.inner);
        let interest = inner.interest(key);
        interest.handlers.push(handler);
        interest.available
    }

    /// Returns the availability handlers of the service.
    pub fn handlers(&self, key: &ServiceKey) -> Vec<AvailabilityHandler> {
        lock(&self.inner)
            .interests
            .get(key)
            .map(|interest| interest.handlers.clone())
            .unwrap_or_default()
    }

    /// Returns a receiver that observes the availability of the service.
    pub fn watch(&self, key: ServiceKey) -> watch::Receiver<bool> {
        lock(&self.inner).interest(key).signal.subscribe()
    }

    /// Whether the service is offered locally or by a known peer.
    pub fn is_available(&self, key: &ServiceKey) -> bool {
        lock(&self.inner).is_available(key)
    }

    /// Whether the service is offered locally.
    pub fn is_offered(&self, key: &ServiceKey) -> bool {
        lock(&self.inner).offered.contains(key)
    }

    /// Returns the address requests to the service should be sent to.
    ///
    /// Local offers take precedence over remote ones.
    pub fn route(&self, key: &ServiceKey) -> Option<PeerAddress> {
        let inner = lock(&self.inner);
        if inner.offered.contains(key) {
            inner.local
        } else {
            inner.remote.get(key).copied()
        }
    }

    /// Returns every service offered locally.
    pub fn offered(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<_> = lock(&self.inner).offered.iter().copied().collect();
        keys.sort();
        keys
    }

    /// Returns every requested service.
    pub fn requested(&self) -> Vec<ServiceKey> {
        let mut keys: Vec<_> = lock(&self.inner)
            .interests
            .iter()
            .filter(|(_, interest)| interest.requested)
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    /// Forgets every offer, interest and handler.
    ///
    /// Receivers returned by [`ServiceRegistry::watch`] are closed.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.offered.clear();
        inner.remote.clear();
        inner.interests.clear();
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ServiceRegistry")
            .field("local", &inner.local)
            .field("offered", &inner.offered)
            .field("remote", &inner.remote)
            .field("interests", &inner.interests.len())
            .finish()
    }
}

#[cfg(test)]
mod tests;

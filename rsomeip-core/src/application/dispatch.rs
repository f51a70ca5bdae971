//! Processing context of an application.
//!
//! Everything in here runs on the task that drives [`super::Application::run`]: inbound frames,
//! queued work and the timeout scan are handled one at a time, in arrival order.

use super::Inner;
use crate::{
    discovery::{self, Entry, EntryType},
    registry::{AvailabilityChange, AvailabilityHandler},
    router::{Continuation, PendingRequest},
    someip::{CodecError, EventGroupId, EventId, Message, MessageType, ServiceKey},
    support::sync::lock,
    transport::{PeerAddress, TransportError, TransportEvent},
    Error,
};
use bytes::Bytes;
use std::sync::Mutex;
use tokio::{
    sync::mpsc,
    time::{Instant, Interval},
};

/// Work deferred to the processing context.
pub enum Work {
    /// Tell every availability handler of the service about a transition.
    Availability(AvailabilityChange),
    /// Tell a single availability handler about the current availability of a service.
    Notify {
        handler: AvailabilityHandler,
        key: ServiceKey,
        available: bool,
    },
    /// Complete a request.
    Complete {
        pending: PendingRequest,
        outcome: Outcome,
    },
}

/// Outcome of a request.
#[derive(Debug)]
pub enum Outcome {
    /// The response or error response of the remote application.
    Reply(Message),
    /// A local failure.
    Failed(Error),
}

/// Queue of [`Work`] for the processing context.
pub struct WorkQueue {
    sender: mpsc::UnboundedSender<Work>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Work>>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn push(&self, work: Work) {
        if self.sender.send(work).is_err() {
            tracing::debug!("work dropped after the processing context ended");
        }
    }

    /// Takes the receiving end. Only the first call returns it.
    pub fn take(&self) -> Option<mpsc::UnboundedReceiver<Work>> {
        lock(&self.receiver).take()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for the next tick of an optional interval. Never resolves without one.
pub async fn tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Inner {
    pub(super) fn perform(&self, work: Work) {
        match work {
            Work::Availability(AvailabilityChange { key, available }) => {
                tracing::info!(
                    "{} service {key} is {}",
                    self.name,
                    if available { "available" } else { "NOT available" }
                );
                for handler in self.registry.handlers(&key) {
                    handler(key.service, key.instance, available);
                }
            }
            Work::Notify {
                handler,
                key,
                available,
            } => handler(key.service, key.instance, available),
            Work::Complete { pending, outcome } => self.finish(pending, outcome),
        }
    }

    /// Delivers the outcome of a request to its continuation.
    pub(super) fn finish(&self, pending: PendingRequest, outcome: Outcome) {
        let PendingRequest {
            request,
            continuation,
            ..
        } = pending;
        match continuation {
            Continuation::Handler => {
                let message = match outcome {
                    Outcome::Reply(message) => message,
                    Outcome::Failed(error) => {
                        tracing::debug!("{} request {request} failed: {error}", self.name);
                        request.to_error(error.return_code())
                    }
                };
                match self.router.handler(message.key(), message.method) {
                    Some(handler) => handler(message),
                    None => tracing::debug!("{} no handler for {message}", self.name),
                }
            }
            Continuation::Callback(callback) => callback(match outcome {
                Outcome::Reply(message) if message.message_type == MessageType::Error => {
                    Err(Error::from_message(&message))
                }
                Outcome::Reply(message) => Ok(message),
                Outcome::Failed(error) => Err(error),
            }),
        }
    }

    /// Fails every request whose deadline passed.
    pub(super) fn expire(&self, now: Instant) {
        for pending in self.router.expire(now) {
            tracing::debug!("{} request {} timed out", self.name, pending.request);
            self.finish(pending, Outcome::Failed(Error::Timeout));
        }
    }

    /// Completes the requests left in the queue once the processing context ends.
    pub(super) fn drain(&self, work: &mut mpsc::UnboundedReceiver<Work>) {
        while let Ok(item) = work.try_recv() {
            if let Work::Complete { pending, .. } = item {
                self.finish(pending, Outcome::Failed(Error::Stopped));
            }
        }
    }

    pub(super) fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Received { peer, data } => self.on_frame(peer, data),
            TransportEvent::Disconnected(peer) => self.on_disconnected(peer),
        }
    }

    fn on_frame(&self, peer: PeerAddress, data: Bytes) {
        match Message::from_bytes(data) {
            Ok(message) if discovery::is_discovery(&message) => self.on_discovery(peer, &message),
            Ok(message) => self.on_message(peer, message),
            Err(error) => self.on_malformed(peer, &error),
        }
    }

    fn on_malformed(&self, peer: PeerAddress, error: &CodecError) {
        tracing::warn!("{} malformed frame from {peer}: {error}", self.name);
        if let Some(reply) = error.reply() {
            if let Err(error) = self.transmit(peer, &reply) {
                tracing::debug!("{} failed to reject {reply}: {error}", self.name);
            }
        }
    }

    fn on_message(&self, peer: PeerAddress, message: Message) {
        tracing::trace!("{} {message} <- {peer}", self.name);
        match message.message_type {
            MessageType::Request | MessageType::RequestNoReturn => self.on_request(peer, message),
            MessageType::Response | MessageType::Error => match self.router.complete(&message) {
                Some(pending) => self.finish(pending, Outcome::Reply(message)),
                None => tracing::debug!("{} discarded unsolicited {message}", self.name),
            },
            MessageType::Notification => {
                let event = EventId::new(message.method.as_u16());
                let Some(event_type) = self.events.accepts(message.key(), event, peer) else {
                    tracing::trace!("{} not subscribed to {message}", self.name);
                    return;
                };
                match self.router.handler(message.key(), message.method) {
                    Some(handler) => handler(message),
                    None => tracing::trace!("{} no handler for {event_type:?} {message}", self.name),
                }
            }
            MessageType::Unknown(_) => {
                tracing::warn!("{} dropped {message} from {peer}", self.name);
            }
        }
    }

    fn on_request(&self, peer: PeerAddress, message: Message) {
        let expects_response = message.message_type == MessageType::Request;
        let message = message.with_origin(peer);
        match self.router.dispatch(&self.registry, &message) {
            Ok(handler) => handler(message),
            Err(error) if expects_response => {
                tracing::debug!("{} rejected {message}: {error}", self.name);
                let reply = message.to_error(error.return_code());
                if let Err(error) = self.transmit(peer, &reply) {
                    tracing::debug!("{} failed to send {reply}: {error}", self.name);
                }
            }
            Err(error) => tracing::debug!("{} dropped {message}: {error}", self.name),
        }
    }

    fn on_disconnected(&self, peer: PeerAddress) {
        tracing::warn!("{} lost connection to {peer}", self.name);
        for update in self.registry.remove_peer(peer) {
            self.on_unavailable(update);
        }
        self.events.remove_peer(peer);
        for pending in self.router.fail_peer(peer) {
            let error = Error::TransportFailure(TransportError::Disconnected(peer));
            self.finish(pending, Outcome::Failed(error));
        }
    }

    fn on_discovery(&self, peer: PeerAddress, message: &Message) {
        let entries = match discovery::entries(message) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!("{} malformed discovery entries from {peer}: {error}", self.name);
                return;
            }
        };
        for entry in entries {
            tracing::trace!("{} {:?} {} <- {peer}", self.name, entry.entry_type, entry.key);
            self.on_entry(peer, entry);
        }
    }

    fn on_entry(&self, peer: PeerAddress, entry: Entry) {
        let Entry {
            entry_type,
            key,
            group,
        } = entry;
        match entry_type {
            EntryType::FindService => {
                if self.registry.is_offered(&key) {
                    self.send_entries(peer, &[Entry::offer(key)]);
                }
            }
            EntryType::OfferService => {
                // Subscriptions go out before waiters learn that the service is available.
                self.resolve_subscriptions(key, peer);
                let update = self.registry.add_remote(key, peer);
                if update.changed {
                    tracing::debug!("{} learned {key} at {peer}", self.name);
                }
                self.publish(update);
            }
            EntryType::StopOfferService => {
                self.on_unavailable(self.registry.remove_remote(key, peer));
            }
            EntryType::Subscribe => self.on_subscribe(peer, key, group),
            EntryType::StopSubscribe => {
                if self.events.remove_subscriber(key, group, peer) {
                    tracing::debug!("{} {peer} unsubscribed from {key}.{group}", self.name);
                }
            }
            EntryType::SubscribeAck => {
                if self.events.acknowledge(key, group, peer) {
                    tracing::debug!("{} subscribed to {key}.{group}", self.name);
                }
            }
            EntryType::SubscribeNack => {
                tracing::warn!("{} subscription to {key}.{group} rejected", self.name);
                self.events.reject(key, group, peer);
            }
        }
    }

    fn on_subscribe(&self, peer: PeerAddress, key: ServiceKey, group: EventGroupId) {
        let accepted = if self.registry.is_offered(&key) {
            self.events.add_subscriber(key, group, peer)
        } else {
            Err(Error::ServiceNotFound(key))
        };
        match accepted {
            Ok(initial) => {
                tracing::debug!("{} {peer} subscribed to {key}.{group}", self.name);
                self.send_entries(peer, &[Entry::ack(key, group)]);
                for (event, value) in initial {
                    self.deliver(key, event, value, &[peer]);
                }
            }
            Err(error) => {
                tracing::debug!("{} rejected subscription of {peer}: {error}", self.name);
                self.send_entries(peer, &[Entry::nack(key, group)]);
            }
        }
    }
}

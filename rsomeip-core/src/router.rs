//! Routing and dispatch of messages.
//!
//! The [`RoutingEngine`] owns the handler table of an application, assigns session ids to
//! outgoing requests, and correlates responses with the requests they answer.
//!
//! The engine never invokes user code itself. Lookups return the handler or the
//! [`PendingRequest`] to complete, and the caller invokes them after every lock is released.

use crate::{
    registry::ServiceRegistry,
    someip::{ClientId, Message, MethodId, RequestId, ServiceKey, SessionId},
    support::sync::lock,
    transport::PeerAddress,
    Error, Result,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::time::Instant;

/// Handles messages addressed to a method or event.
pub type MessageHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Receives the outcome of a single request.
pub type ResponseCallback = Box<dyn FnOnce(Result<Message>) + Send>;

/// What to do with the outcome of a request.
pub enum Continuation {
    /// Deliver the response to the message handler registered for the method.
    ///
    /// Failures are delivered as error responses.
    Handler,
    /// Call the given function.
    Callback(ResponseCallback),
}

impl std::fmt::Debug for Continuation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler => f.write_str("Handler"),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

/// A request waiting for its response.
#[derive(Debug)]
pub struct PendingRequest {
    /// Header of the request. The payload is not kept.
    pub request: Message,
    /// Peer the request was sent to, if it was sent at all.
    pub peer: Option<PeerAddress>,
    /// Instant after which the request times out.
    pub deadline: Instant,
    /// What to do with the outcome.
    pub continuation: Continuation,
}

impl PendingRequest {
    /// Creates a request that was never sent.
    pub fn unsent(request: Message, continuation: Continuation) -> Self {
        Self {
            request: request.with_payload(bytes::Bytes::new()),
            peer: None,
            deadline: Instant::now(),
            continuation,
        }
    }
}

#[derive(Debug)]
struct Pending {
    next_session: SessionId,
    requests: HashMap<RequestId, PendingRequest>,
}

/// Routes messages of a single application.
pub struct RoutingEngine {
    client: ClientId,
    handlers: Mutex<HashMap<(ServiceKey, MethodId), MessageHandler>>,
    pending: Mutex<Pending>,
}

impl RoutingEngine {
    /// Creates a new [`RoutingEngine`] for requests sent by `client`.
    pub fn new(client: ClientId) -> Self {
        Self {
            client,
            handlers: Mutex::default(),
            pending: Mutex::new(Pending {
                next_session: SessionId::ENABLED,
                requests: HashMap::new(),
            }),
        }
    }

    /// Registers the handler of a method or event, replacing the previous one.
    pub fn register(&self, key: ServiceKey, method: MethodId, handler: MessageHandler) {
        lock(&self.handlers).insert((key, method), handler);
    }

    /// Returns the handler of a method or event.
    pub fn handler(&self, key: ServiceKey, method: MethodId) -> Option<MessageHandler> {
        lock(&self.handlers).get(&(key, method)).cloned()
    }

    /// Returns the handler an inbound request should be dispatched to.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceNotFound`] if the service is not offered by this application.
    /// - [`Error::MethodNotFound`] if no handler is registered for the method.
    pub fn dispatch(&self, registry: &ServiceRegistry, request: &Message) -> Result<MessageHandler> {
        let key = request.key();
        if !registry.is_offered(&key) {
            return Err(Error::ServiceNotFound(key));
        }
        self.handler(key, request.method)
            .ok_or(Error::MethodNotFound {
                key,
                method: request.method,
            })
    }

    /// Returns a session id that is not used by any request in flight.
    fn allocate(pending: &mut Pending, client: ClientId) -> Result<SessionId> {
        for _ in 0..=u16::MAX {
            let session = pending.next_session.increment();
            if !pending
                .requests
                .contains_key(&RequestId::new(client, session))
            {
                return Ok(session);
            }
        }
        Err(Error::SessionsExhausted(client))
    }

    /// Assigns a session id to a request that expects no response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionsExhausted`] if every session id is in flight.
    pub fn assign(&self, request: Message) -> Result<Message> {
        let session = Self::allocate(&mut lock(&self.pending), self.client)?;
        Ok(request.with_client(self.client).with_session(session))
    }

    /// Records a request that is about to be sent to `peer`.
    ///
    /// Returns the request with its client and session ids set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionsExhausted`] if every session id is in flight.
    pub fn begin(
        &self,
        request: Message,
        peer: PeerAddress,
        deadline: Instant,
        continuation: Continuation,
    ) -> Result<Message> {
        let mut pending = lock(&self.pending);
        let session = Self::allocate(&mut pending, self.client)?;
        let request = request.with_client(self.client).with_session(session);
        pending.requests.insert(
            request.request_id(),
            PendingRequest {
                request: request.clone().with_payload(bytes::Bytes::new()),
                peer: Some(peer),
                deadline,
                continuation,
            },
        );
        tracing::trace!("pending {request}");
        Ok(request)
    }

    /// Removes a request that could not be sent.
    pub fn abort(&self, id: RequestId) -> Option<PendingRequest> {
        lock(&self.pending).requests.remove(&id)
    }

    /// Removes the request answered by `response`.
    ///
    /// Returns [`None`] if the response does not match any request in flight.
    pub fn complete(&self, response: &Message) -> Option<PendingRequest> {
        if response.client != self.client {
            return None;
        }
        let mut pending = lock(&self.pending);
        let id = response.request_id();
        match pending.requests.get(&id) {
            Some(request) if request.request.key() == response.key() => {
                pending.requests.remove(&id)
            }
            _ => None,
        }
    }

    /// Removes every request whose deadline passed.
    pub fn expire(&self, now: Instant) -> Vec<PendingRequest> {
        let mut pending = lock(&self.pending);
        let expired: Vec<RequestId> = pending
            .requests
            .iter()
            .filter(|(_, request)| request.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        expired
            .iter()
            .filter_map(|id| pending.requests.remove(id))
            .collect()
    }

    /// Removes every request sent to the given peer.
    pub fn fail_peer(&self, peer: PeerAddress) -> Vec<PendingRequest> {
        let mut pending = lock(&self.pending);
        let failed: Vec<RequestId> = pending
            .requests
            .iter()
            .filter(|(_, request)| request.peer == Some(peer))
            .map(|(id, _)| *id)
            .collect();
        failed
            .iter()
            .filter_map(|id| pending.requests.remove(id))
            .collect()
    }

    /// Removes every request in flight.
    pub fn drain(&self) -> Vec<PendingRequest> {
        lock(&self.pending)
            .requests
            .drain()
            .map(|(_, request)| request)
            .collect()
    }

    /// Returns the number of requests in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).requests.len()
    }

    /// Removes every handler.
    pub fn clear(&self) {
        lock(&self.handlers).clear();
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("client", &self.client)
            .field("handlers", &lock(&self.handlers).len())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;

//! In-process transport.

use super::{Inbound, PeerAddress, Transport, TransportError, TransportEvent};
use crate::support::{collections::SharedMap, sync::lock};
use bytes::Bytes;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc;

/// Connects the [`MemoryTransport`]s of applications living in the same process.
///
/// Cloning the hub returns a handle to the same set of endpoints.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    endpoints: SharedMap<u32, mpsc::UnboundedSender<TransportEvent>>,
    next_id: Arc<AtomicU32>,
}

impl MemoryHub {
    /// Creates a new [`MemoryHub`] without endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new transport connected to this hub.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            state: Mutex::default(),
        }
    }

    fn allocate(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn open_endpoints(&self) -> Vec<u32> {
        self.endpoints.entries().into_iter().map(|(id, _)| id).collect()
    }
}

/// Transport between applications connected to the same [`MemoryHub`].
///
/// Frames are delivered through unbounded channels, which preserves their order.
#[derive(Debug)]
pub struct MemoryTransport {
    hub: MemoryHub,
    state: Mutex<EndpointState>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum EndpointState {
    #[default]
    Unbound,
    Bound(u32),
    Open(u32),
    Closed,
}

impl MemoryTransport {
    fn open_id(&self) -> Result<u32, TransportError> {
        match *lock(&self.state) {
            EndpointState::Open(id) => Ok(id),
            EndpointState::Closed => Err(TransportError::Closed),
            EndpointState::Unbound | EndpointState::Bound(_) => Err(TransportError::NotOpen),
        }
    }
}

impl Transport for MemoryTransport {
    fn bind(&self) -> Result<PeerAddress, TransportError> {
        let mut state = lock(&self.state);
        match *state {
            EndpointState::Unbound => {
                let id = self.hub.allocate();
                *state = EndpointState::Bound(id);
                Ok(PeerAddress::Local(id))
            }
            EndpointState::Bound(id) | EndpointState::Open(id) => Ok(PeerAddress::Local(id)),
            EndpointState::Closed => Err(TransportError::Closed),
        }
    }

    fn open(&self) -> Result<Inbound, TransportError> {
        let mut state = lock(&self.state);
        let EndpointState::Bound(id) = *state else {
            return Err(match *state {
                EndpointState::Unbound => TransportError::NotBound,
                _ => TransportError::Closed,
            });
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        self.hub.endpoints.insert(id, sender);
        *state = EndpointState::Open(id);
        Ok(receiver)
    }

    fn send(&self, peer: &PeerAddress, data: Bytes) -> Result<(), TransportError> {
        let id = self.open_id()?;
        let PeerAddress::Local(target) = *peer else {
            return Err(TransportError::UnknownPeer(*peer));
        };
        let Some(sender) = self.hub.endpoints.get(&target) else {
            return Err(TransportError::UnknownPeer(*peer));
        };
        let event = TransportEvent::Received {
            peer: PeerAddress::Local(id),
            data,
        };
        if sender.send(event).is_err() {
            self.hub.endpoints.remove(&target);
            return Err(TransportError::Disconnected(*peer));
        }
        Ok(())
    }

    fn peers(&self) -> Vec<PeerAddress> {
        let own = self.open_id().ok();
        self.hub
            .open_endpoints()
            .into_iter()
            .filter(|id| Some(*id) != own)
            .map(PeerAddress::Local)
            .collect()
    }

    fn local_address(&self) -> Option<PeerAddress> {
        match *lock(&self.state) {
            EndpointState::Bound(id) | EndpointState::Open(id) => Some(PeerAddress::Local(id)),
            EndpointState::Unbound | EndpointState::Closed => None,
        }
    }

    fn close(&self) {
        let previous = std::mem::replace(&mut *lock(&self.state), EndpointState::Closed);
        let EndpointState::Open(id) = previous else {
            return;
        };
        self.hub.endpoints.remove(&id);
        for (_, sender) in self.hub.endpoints.entries() {
            let _ = sender.send(TransportEvent::Disconnected(PeerAddress::Local(id)));
        }
        tracing::trace!("closed memory endpoint {id}");
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(hub: &MemoryHub) -> (MemoryTransport, PeerAddress, Inbound) {
        let transport = hub.transport();
        let address = transport.bind().expect("should bind");
        let inbound = transport.open().expect("should open");
        (transport, address, inbound)
    }

    #[test]
    fn frames_are_delivered_in_order() {
        let hub = MemoryHub::new();
        let (a, a_address, _a_inbound) = open(&hub);
        let (_b, b_address, mut b_inbound) = open(&hub);
        assert_ne!(a_address, b_address);

        for i in 0..10u8 {
            a.send(&b_address, Bytes::from(vec![i])).expect("should send");
        }
        for i in 0..10u8 {
            assert_eq!(
                b_inbound.try_recv(),
                Ok(TransportEvent::Received {
                    peer: a_address,
                    data: Bytes::from(vec![i])
                })
            );
        }
    }

    #[test]
    fn peers_exclude_self_and_unopened_endpoints() {
        let hub = MemoryHub::new();
        let (a, _, _a_inbound) = open(&hub);
        let (_b, b_address, _b_inbound) = open(&hub);
        let c = hub.transport();
        c.bind().expect("should bind");
        assert_eq!(a.peers(), vec![b_address]);
        assert!(c.peers().len() == 2);
    }

    #[test]
    fn send_requires_open_transport() {
        let hub = MemoryHub::new();
        let transport = hub.transport();
        assert!(matches!(
            transport.send(&PeerAddress::Local(1), Bytes::new()),
            Err(TransportError::NotOpen)
        ));
        assert!(matches!(transport.open(), Err(TransportError::NotBound)));
    }

    #[test]
    fn unknown_peers_are_rejected() {
        let hub = MemoryHub::new();
        let (a, _, _a_inbound) = open(&hub);
        assert!(matches!(
            a.send(&PeerAddress::Local(42), Bytes::new()),
            Err(TransportError::UnknownPeer(PeerAddress::Local(42)))
        ));
    }

    #[test]
    fn closing_notifies_other_endpoints() {
        let hub = MemoryHub::new();
        let (a, a_address, _a_inbound) = open(&hub);
        let (b, b_address, mut b_inbound) = open(&hub);
        a.close();
        assert_eq!(
            b_inbound.try_recv(),
            Ok(TransportEvent::Disconnected(a_address))
        );
        assert!(b.peers().is_empty());
        assert!(matches!(
            a.send(&b_address, Bytes::new()),
            Err(TransportError::Closed)
        ));
        assert!(a.local_address().is_none());
    }
}

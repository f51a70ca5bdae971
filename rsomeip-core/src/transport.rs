//! Transport abstraction.
//!
//! A [`Transport`] moves serialized messages between peers. Applications are agnostic to the
//! medium: [`MemoryTransport`] connects applications of the same process through a
//! [`MemoryHub`], while [`TcpTransport`] connects applications over the network.
//!
//! Every concrete transport must provide ordered, reliable, at-most-once delivery per peer.

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::sync::mpsc;

pub mod memory;
pub use memory::{MemoryHub, MemoryTransport};

pub mod tcp;
pub use tcp::TcpTransport;

/// Address of a peer reachable through a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeerAddress {
    /// An endpoint of a [`MemoryHub`].
    Local(u32),
    /// A network socket.
    Socket(SocketAddr),
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(id) => write!(f, "local:{id}"),
            Self::Socket(address) => write!(f, "{address}"),
        }
    }
}

/// Something that happened at the transport boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame was received from a peer.
    Received {
        /// Source of the frame.
        peer: PeerAddress,
        /// Contents of the frame.
        data: Bytes,
    },
    /// The connection to a peer was lost.
    Disconnected(PeerAddress),
}

/// Stream of events delivered by an open [`Transport`].
pub type Inbound = mpsc::UnboundedReceiver<TransportEvent>;

/// Errors returned by a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport was closed.
    #[error("transport is closed")]
    Closed,
    /// The transport was not bound yet.
    #[error("transport is not bound")]
    NotBound,
    /// The transport was not opened yet.
    #[error("transport is not open")]
    NotOpen,
    /// The peer is not reachable through this transport.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerAddress),
    /// The connection to the peer was lost.
    #[error("connection to {0} was lost")]
    Disconnected(PeerAddress),
    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Moves serialized messages to and from peers.
///
/// The lifecycle of a transport follows the one of its application: it is bound when the
/// application is initialized, opened when the application starts, and closed when it stops.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Acquires the resources of the transport, and returns the local address.
    ///
    /// # Errors
    ///
    /// Returns an error if the resources cannot be acquired.
    fn bind(&self) -> Result<PeerAddress, TransportError>;

    /// Starts delivering frames, and returns the stream of inbound events.
    ///
    /// Called from within the tokio runtime that processes the events.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is not bound, already open, or closed.
    fn open(&self) -> Result<Inbound, TransportError>;

    /// Sends a frame to the given peer without waiting for its delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer is known to be unreachable. Failures detected later are
    /// reported as [`TransportEvent::Disconnected`].
    fn send(&self, peer: &PeerAddress, data: Bytes) -> Result<(), TransportError>;

    /// Returns the peers that broadcasts should be sent to.
    fn peers(&self) -> Vec<PeerAddress>;

    /// Returns the local address, if the transport is bound.
    fn local_address(&self) -> Option<PeerAddress>;

    /// Releases every resource of the transport.
    fn close(&self);
}

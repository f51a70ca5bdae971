//! Network transport over TCP streams.
//!
//! Each application listens on one address and opens one outgoing stream per peer it sends
//! frames to. Frames are length-delimited. The first frame of every outgoing stream carries the
//! listening address of the sender, which identifies it to the receiving side.

use super::{Inbound, PeerAddress, Transport, TransportError, TransportEvent};
use crate::support::{collections::SharedMap, sync::lock};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::{
    net::{TcpListener, TcpStream},
    runtime::Handle,
    sync::mpsc,
};
use tokio_util::{
    codec::{FramedRead, FramedWrite, LengthDelimitedCodec},
    sync::CancellationToken,
};

/// Transport over TCP streams.
///
/// Peers are configured statically, and complemented by every peer that connects to the local
/// listener.
#[derive(Debug)]
pub struct TcpTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    bind: SocketAddr,
    static_peers: Vec<SocketAddr>,
    state: Mutex<State>,
    known_peers: Mutex<KnownPeers>,
    writers: SharedMap<SocketAddr, mpsc::UnboundedSender<Bytes>>,
    cancel: CancellationToken,
}

/// Peers with an incoming stream, and the generation of their latest stream.
#[derive(Debug, Default)]
struct KnownPeers {
    next: u64,
    streams: HashMap<SocketAddr, u64>,
}

impl KnownPeers {
    /// Records a new stream from `peer`, which replaces any older one.
    fn connect(&mut self, peer: SocketAddr) -> u64 {
        self.next += 1;
        self.streams.insert(peer, self.next);
        self.next
    }

    /// Forgets `peer` if `generation` is its latest stream. Returns `true` if it was forgotten.
    fn disconnect(&mut self, peer: SocketAddr, generation: u64) -> bool {
        if self.streams.get(&peer) != Some(&generation) {
            return false;
        }
        self.streams.remove(&peer);
        true
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Unbound,
    Bound(std::net::TcpListener, SocketAddr),
    Open(Connection),
    Closed,
}

#[derive(Debug, Clone)]
struct Connection {
    local: SocketAddr,
    handle: Handle,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl TcpTransport {
    /// Creates a new [`TcpTransport`] listening on `bind`, and broadcasting to `peers`.
    pub fn new(bind: SocketAddr, peers: Vec<SocketAddr>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bind,
                static_peers: peers,
                state: Mutex::default(),
                known_peers: Mutex::default(),
                writers: SharedMap::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn connection(&self) -> Result<Connection, TransportError> {
        match &*lock(&self.inner.state) {
            State::Open(connection) => Ok(connection.clone()),
            State::Closed => Err(TransportError::Closed),
            State::Unbound | State::Bound(..) => Err(TransportError::NotOpen),
        }
    }
}

impl Transport for TcpTransport {
    fn bind(&self) -> Result<PeerAddress, TransportError> {
        let mut state = lock(&self.inner.state);
        match &*state {
            State::Unbound => {}
            State::Bound(_, local) => return Ok(PeerAddress::Socket(*local)),
            State::Open(connection) => return Ok(PeerAddress::Socket(connection.local)),
            State::Closed => return Err(TransportError::Closed),
        }
        let listener = std::net::TcpListener::bind(self.inner.bind)?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        *state = State::Bound(listener, local);
        tracing::debug!("tcp transport bound to {local}");
        Ok(PeerAddress::Socket(local))
    }

    fn open(&self) -> Result<Inbound, TransportError> {
        let mut state = lock(&self.inner.state);
        match &*state {
            State::Bound(..) => {}
            State::Unbound => return Err(TransportError::NotBound),
            State::Open(_) | State::Closed => return Err(TransportError::Closed),
        }
        let handle = Handle::try_current().map_err(|_| TransportError::NotOpen)?;
        let State::Bound(listener, local) = std::mem::replace(&mut *state, State::Closed) else {
            return Err(TransportError::Closed);
        };
        let listener = {
            let _guard = handle.enter();
            TcpListener::from_std(listener)?
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Connection {
            local,
            handle: handle.clone(),
            inbound: sender,
        };
        handle.spawn(accept(Arc::clone(&self.inner), listener, connection.clone()));
        *state = State::Open(connection);
        Ok(receiver)
    }

    fn send(&self, peer: &PeerAddress, data: Bytes) -> Result<(), TransportError> {
        let connection = self.connection()?;
        let PeerAddress::Socket(address) = *peer else {
            return Err(TransportError::UnknownPeer(*peer));
        };
        let writer = self.inner.writers.get_or_insert_with(address, || {
            let (sender, receiver) = mpsc::unbounded_channel();
            connection.handle.spawn(write(
                Arc::clone(&self.inner),
                address,
                receiver,
                connection.clone(),
            ));
            sender
        });
        writer.send(data).map_err(|_| {
            self.inner.writers.remove(&address);
            TransportError::Disconnected(*peer)
        })
    }

    fn peers(&self) -> Vec<PeerAddress> {
        let local = self.local_address();
        let mut peers: HashSet<SocketAddr> =
            lock(&self.inner.known_peers).streams.keys().copied().collect();
        peers.extend(self.inner.static_peers.iter().copied());
        let mut peers: Vec<PeerAddress> = peers
            .into_iter()
            .map(PeerAddress::Socket)
            .filter(|peer| Some(*peer) != local)
            .collect();
        peers.sort();
        peers
    }

    fn local_address(&self) -> Option<PeerAddress> {
        match &*lock(&self.inner.state) {
            State::Bound(_, local) => Some(PeerAddress::Socket(*local)),
            State::Open(connection) => Some(PeerAddress::Socket(connection.local)),
            State::Unbound | State::Closed => None,
        }
    }

    fn close(&self) {
        let previous = std::mem::replace(&mut *lock(&self.inner.state), State::Closed);
        if matches!(previous, State::Closed) {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.writers.clear();
        lock(&self.inner.known_peers).streams.clear();
        tracing::trace!("closed tcp transport on {}", self.inner.bind);
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Accepts incoming streams until the transport is closed.
async fn accept(inner: Arc<Inner>, listener: TcpListener, connection: Connection) {
    loop {
        tokio::select! {
            () = inner.cancel.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, address)) => {
                    tracing::trace!("accepted stream from {address}");
                    tokio::spawn(read(Arc::clone(&inner), stream, connection.clone()));
                }
                Err(error) => {
                    tracing::warn!("failed to accept stream on {}: {error}", connection.local);
                    break;
                }
            }
        }
    }
}

/// Reads frames from an incoming stream and forwards them to the application.
async fn read(inner: Arc<Inner>, stream: TcpStream, connection: Connection) {
    let mut frames = FramedRead::new(stream, LengthDelimitedCodec::new());
    let hello = tokio::select! {
        () = inner.cancel.cancelled() => return,
        frame = frames.next() => frame,
    };
    let Some(peer) = hello
        .and_then(Result::ok)
        .and_then(|frame| std::str::from_utf8(&frame).ok()?.parse::<SocketAddr>().ok())
    else {
        tracing::warn!("dropping stream without a valid hello frame");
        return;
    };
    let generation = lock(&inner.known_peers).connect(peer);
    loop {
        let frame = tokio::select! {
            () = inner.cancel.cancelled() => return,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(data)) => {
                let event = TransportEvent::Received {
                    peer: PeerAddress::Socket(peer),
                    data: data.freeze(),
                };
                if connection.inbound.send(event).is_err() {
                    return;
                }
            }
            Some(Err(error)) => {
                tracing::warn!("failed to read from {peer}: {error}");
                break;
            }
            None => break,
        }
    }
    if !lock(&inner.known_peers).disconnect(peer, generation) {
        tracing::trace!("stream from {peer} was replaced by a newer one");
        return;
    }
    let _ = connection
        .inbound
        .send(TransportEvent::Disconnected(PeerAddress::Socket(peer)));
}

/// Writes frames to an outgoing stream until the writer is dropped.
async fn write(
    inner: Arc<Inner>,
    peer: SocketAddr,
    mut outgoing: mpsc::UnboundedReceiver<Bytes>,
    connection: Connection,
) {
    let session = async {
        let stream = TcpStream::connect(peer).await?;
        stream.set_nodelay(true)?;
        let mut frames = FramedWrite::new(stream, LengthDelimitedCodec::new());
        frames
            .send(Bytes::from(connection.local.to_string()))
            .await?;
        while let Some(data) = outgoing.recv().await {
            frames.send(data).await?;
        }
        Ok::<_, std::io::Error>(())
    };
    tokio::select! {
        () = inner.cancel.cancelled() => {}
        result = session => {
            if let Err(error) = result {
                tracing::warn!("failed to write to {peer}: {error}");
                inner.writers.remove(&peer);
                let _ = connection
                    .inbound
                    .send(TransportEvent::Disconnected(PeerAddress::Socket(peer)));
            }
        }
    }
}

//! Async UDP socket wrapper implementing [`PacketConn`].
//!
//! Provides a connected datagram endpoint for the slicer and the sequenced
//! transport.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::core::PacketConn;

/// Connected UDP socket for one peer.
///
/// `recv` fails with [`io::ErrorKind::ConnectionAborted`] once the socket has
/// been closed, so blocked readers wake up on shutdown.
#[derive(Debug)]
pub struct RelaySocket {
    /// The underlying UDP socket.
    socket: Arc<UdpSocket>,
    /// Fired by `close`.
    closed: CancellationToken,
}

impl RelaySocket {
    /// Bind to `local` and connect to `peer`.
    pub async fn connect(local: SocketAddr, peer: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(peer).await?;
        Ok(Self::from_socket(socket))
    }

    /// Wrap an already connected UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket: Arc::new(socket),
            closed: CancellationToken::new(),
        }
    }

    /// Get the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Get the connected peer address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.socket.peer_addr()
    }

    /// Get a reference to the underlying socket.
    pub fn inner(&self) -> &UdpSocket {
        &self.socket
    }

    /// Get a clone of the Arc-wrapped socket.
    pub fn socket_arc(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

#[async_trait]
impl PacketConn for RelaySocket {
    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.is_cancelled() {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.socket.send(buf).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::select! {
            _ = self.closed.cancelled() => Err(io::ErrorKind::ConnectionAborted.into()),
            result = self.socket.recv(buf) => result,
        }
    }

    async fn close(&self) -> io::Result<()> {
        self.closed.cancel();
        Ok(())
    }
}

/// Builder for a pair of addresses and socket options.
#[derive(Debug, Clone)]
pub struct RelaySocketBuilder {
    local: SocketAddr,
    peer: Option<SocketAddr>,
}

impl Default for RelaySocketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelaySocketBuilder {
    /// Create a builder bound to an ephemeral IPv4 port.
    pub fn new() -> Self {
        Self {
            local: SocketAddr::from(([0, 0, 0, 0], 0)),
            peer: None,
        }
    }

    /// Set the local bind address.
    pub fn local_addr(mut self, addr: SocketAddr) -> Self {
        self.local = addr;
        self
    }

    /// Set the peer address.
    pub fn peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer = Some(addr);
        self
    }

    /// Bind and connect.
    pub async fn connect(self) -> io::Result<RelaySocket> {
        let peer = self
            .peer
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "peer address not set"))?;
        RelaySocket::connect(self.local, peer).await
    }
}

//! Core traits for the relay transport.
//!
//! These traits are the seams between the reliability layers and whatever
//! carries their bytes or produces their media.

use std::io;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A connected, datagram-oriented byte connection.
///
/// Every `send` is delivered (or lost) as one unit and every `recv` yields at
/// most one unit, so framing survives the trip. Both halves may be used
/// concurrently from different tasks.
///
/// # Example
///
/// ```ignore
/// struct Loopback(tokio::net::UdpSocket);
///
/// #[async_trait]
/// impl PacketConn for Loopback {
///     async fn send(&self, buf: &[u8]) -> io::Result<usize> {
///         self.0.send(buf).await
///     }
///
///     async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
///         self.0.recv(buf).await
///     }
/// }
/// ```
#[async_trait]
pub trait PacketConn: Send + Sync + 'static {
    /// Send one datagram, returning the number of bytes accepted.
    async fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Receive one datagram into `buf`, returning its length.
    ///
    /// After `close`, this MUST return an error rather than block forever.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Release the connection.
    async fn close(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Pull-based source of encoded media for the writer loops.
///
/// `None` means the source is exhausted and the writer should stop.
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next encoded frame.
    ///
    /// MUST be cancel-safe: writers race it against retransmissions.
    async fn next_frame(&mut self) -> Option<Vec<u8>>;
}

#[async_trait]
impl FrameSource for mpsc::Receiver<Vec<u8>> {
    async fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.recv().await
    }
}

//! In-memory datagram pipe with optional simulated loss.

use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::core::PacketConn;

type DropFilter = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// One end of a bounded in-memory datagram pipe.
///
/// Datagrams keep their boundaries. A receive buffer smaller than the datagram
/// truncates it, like UDP. Closing one end makes the other end's `recv` fail
/// once its backlog is drained.
pub struct MemoryConn {
    tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    rx: AsyncMutex<mpsc::Receiver<Vec<u8>>>,
    closed: CancellationToken,
    loss: Option<f64>,
    drop_filter: Option<DropFilter>,
    sent: AtomicUsize,
    dropped: AtomicUsize,
}

impl std::fmt::Debug for MemoryConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConn")
            .field("loss", &self.loss)
            .field("sent", &self.sent.load(Ordering::Relaxed))
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryConn {
    /// Create two connected ends, each buffering up to `capacity` datagrams.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    fn new(tx: mpsc::Sender<Vec<u8>>, rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: AsyncMutex::new(rx),
            closed: CancellationToken::new(),
            loss: None,
            drop_filter: None,
            sent: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Drop each outgoing datagram with the given probability.
    pub fn with_loss(mut self, probability: f64) -> Self {
        self.loss = Some(probability.clamp(0.0, 1.0));
        self
    }

    /// Drop every outgoing datagram for which `filter` returns true.
    pub fn drop_if<F>(mut self, filter: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.drop_filter = Some(Box::new(filter));
        self
    }

    /// Datagrams handed to the pipe, including dropped ones.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    /// Datagrams dropped by loss simulation.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn should_drop(&self, buf: &[u8]) -> bool {
        if let Some(filter) = &self.drop_filter {
            if filter(buf) {
                return true;
            }
        }
        match self.loss {
            Some(p) if p > 0.0 => rand::thread_rng().gen_bool(p),
            _ => false,
        }
    }
}

#[async_trait]
impl PacketConn for MemoryConn {
    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| io::Error::other("poisoned sender"))?
            .clone()
            .ok_or(io::ErrorKind::BrokenPipe)?;

        self.sent.fetch_add(1, Ordering::Relaxed);
        if self.should_drop(buf) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(len = buf.len(), "simulated datagram loss");
            return Ok(buf.len());
        }

        tx.send(buf.to_vec())
            .await
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let datagram = tokio::select! {
            _ = self.closed.cancelled() => return Err(io::ErrorKind::ConnectionAborted.into()),
            datagram = async { self.rx.lock().await.recv().await } => datagram,
        };

        let datagram = datagram.ok_or(io::ErrorKind::UnexpectedEof)?;
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(n)
    }

    async fn close(&self) -> io::Result<()> {
        self.closed.cancel();
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
        Ok(())
    }
}

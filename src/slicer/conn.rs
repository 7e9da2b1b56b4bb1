//! Frame slicing over a datagram connection.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::header::{FrameHeader, Slice};
use super::ring::{FrameRing, SliceOutcome};
use crate::core::constants::{DEFAULT_SLICE_MTU, SLICE_HEADER_SIZE};
use crate::core::{FrameSource, PacketConn, SliceError, SliceResult};

/// Slicer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicerConfig {
    /// Maximum slice payload. Both ends MUST agree on it.
    pub mtu: usize,
}

impl Default for SlicerConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_SLICE_MTU,
        }
    }
}

impl SlicerConfig {
    /// Create a config with the given slice MTU, capped at what the header can describe.
    pub fn with_mtu(mtu: usize) -> Self {
        Self { mtu }.sanitized()
    }

    /// Clamp the MTU into `1..=u16::MAX`. Applied by [`SliceConn::new`], so
    /// literal configs are safe.
    pub fn sanitized(self) -> Self {
        Self {
            mtu: self.mtu.clamp(1, usize::from(u16::MAX)),
        }
    }

    /// Largest frame that fits in `u16::MAX` slices.
    pub fn max_frame_len(&self) -> usize {
        usize::from(u16::MAX) * self.mtu
    }
}

/// Splits encoded frames into MTU-bound slices and reassembles them.
///
/// The sender side is `&self` and may be shared; frame ids come from an atomic
/// counter that wraps at 2^16. The receiver keeps at most
/// [`FRAME_RING_SIZE`](crate::core::constants::FRAME_RING_SIZE) frames in
/// flight, so callers MUST pace sends to stay within that window.
#[derive(Debug)]
pub struct SliceConn<C> {
    conn: Arc<C>,
    config: SlicerConfig,
    frame_counter: AtomicU16,
}

impl<C: PacketConn> SliceConn<C> {
    /// Wrap a datagram connection.
    pub fn new(conn: Arc<C>, config: SlicerConfig) -> Self {
        Self {
            conn,
            config: config.sanitized(),
            frame_counter: AtomicU16::new(0),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SlicerConfig {
        &self.config
    }

    /// Get the underlying connection.
    pub fn conn(&self) -> &Arc<C> {
        &self.conn
    }

    fn next_frame_id(&self) -> u16 {
        self.frame_counter.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Send one frame as `ceil(len / mtu)` slices.
    ///
    /// Fails on the first write error. Slices already written are not
    /// recalled; the receiver sees the frame as lost.
    pub async fn start_send(&self, frame: &[u8]) -> SliceResult<usize> {
        if frame.is_empty() {
            return Ok(0);
        }

        let mtu = self.config.mtu;
        let slice_count = frame.len().div_ceil(mtu);
        if slice_count > usize::from(u16::MAX) {
            return Err(SliceError::FrameTooLarge {
                len: frame.len(),
                max: self.config.max_frame_len(),
            });
        }

        let frame_id = self.next_frame_id();
        for (index, chunk) in frame.chunks(mtu).enumerate() {
            let header = FrameHeader {
                frame_id,
                slice_count: slice_count as u16,
                slice_index: index as u16,
                slice_len: chunk.len() as u16,
            };
            let datagram = Slice::encode(&header, chunk);
            let n = self.conn.send(&datagram).await?;
            if n == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
            trace!(%header, "slice sent");
        }

        Ok(frame.len())
    }

    /// Read slices until the connection fails, emitting every completed frame.
    ///
    /// Returns `Ok(())` once `out` is closed. Any malformed slice is fatal to
    /// the loop.
    pub async fn read_assembled(&self, out: mpsc::Sender<Vec<u8>>) -> SliceResult<()> {
        let mtu = self.config.mtu;
        let mut ring = FrameRing::new();
        let mut buf = vec![0u8; SLICE_HEADER_SIZE + mtu];

        loop {
            let n = tokio::select! {
                _ = out.closed() => {
                    debug!("frame consumer gone, slice reader stopping");
                    return Ok(());
                }
                result = self.conn.recv(&mut buf) => result?,
            };

            let slice = Slice::decode(&buf[..n], mtu).inspect_err(|err| {
                warn!(
                    %err,
                    datagram = %hex::encode(&buf[..n.min(SLICE_HEADER_SIZE + 16)]),
                    "malformed slice"
                );
            })?;

            if let SliceOutcome::Complete(frame) = ring.accept(slice) {
                if out.send(frame).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// Pull frames from `source` and slice each onto `conn` until the source ends.
pub async fn frame_write<C, S>(source: &mut S, conn: &SliceConn<C>) -> SliceResult<()>
where
    C: PacketConn,
    S: FrameSource + ?Sized,
{
    while let Some(frame) = source.next_frame().await {
        conn.start_send(&frame).await?;
    }
    debug!("frame source exhausted");
    Ok(())
}

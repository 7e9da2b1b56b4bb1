//! Sequenced transport over a datagram connection.
//!
//! Every outbound chunk gets a 5-byte header with a sequence number from one
//! atomic counter shared by all payload types, and the exact bytes written are
//! cached for NACK answers. Inbound packets feed a [`SortedQueue`]; gaps that
//! stay open trigger NACKs, answered from the peer's cache with priority over
//! fresh sends.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::cache::SendCache;
use super::config::TransportConfig;
use super::packet::{DataNode, MediaFrame, PacketHeader, PayloadType};
use super::queue::{Consumed, SortedQueue};
use crate::core::constants::{NODE_POOL_SIZE, PACKET_HEADER_SIZE, SEQUENCE_SIZE};
use crate::core::{FrameSource, PacketConn, TransportError, TransportResult};

/// Sequenced, NACK-recovering connection.
///
/// Writer loops, the reader task and the consume loop all share one
/// `QueueConn` through an `Arc`.
#[derive(Debug)]
pub struct QueueConn<C> {
    conn: Arc<C>,
    config: TransportConfig,
    sequence: AtomicU32,
    /// Keeps the chunks of one payload on consecutive sequences.
    send_lock: AsyncMutex<()>,
    send_cache: SendCache,
    resend_tx: mpsc::Sender<Arc<[u8]>>,
    resend_rx: AsyncMutex<mpsc::Receiver<Arc<[u8]>>>,
    queue: SortedQueue,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl<C: PacketConn> QueueConn<C> {
    /// Wrap a datagram connection.
    pub fn new(conn: Arc<C>, config: TransportConfig) -> Self {
        let config = config.sanitized();
        let (resend_tx, resend_rx) = mpsc::channel(config.resend_capacity);
        Self {
            conn,
            config,
            sequence: AtomicU32::new(0),
            send_lock: AsyncMutex::new(()),
            send_cache: SendCache::new(),
            resend_tx,
            resend_rx: AsyncMutex::new(resend_rx),
            queue: SortedQueue::with_thresholds(config.nack_after, config.skip_after),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Last sequence number assigned (0 before the first send).
    pub fn sequence(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Get the receive queue.
    pub fn queue(&self) -> &SortedQueue {
        &self.queue
    }

    /// Get the retransmission cache.
    pub fn send_cache(&self) -> &SendCache {
        &self.send_cache
    }

    /// Check whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn write_packet(&self, packet: &[u8]) -> TransportResult<()> {
        let written = self.conn.send(packet).await?;
        if written != packet.len() {
            return Err(TransportError::DataLost {
                written,
                expected: packet.len(),
            });
        }
        Ok(())
    }

    /// Send `payload` as one or more sequenced packets of type `ty`.
    pub async fn send_with_seq_and_type(&self, ty: PayloadType, payload: &[u8]) -> TransportResult<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }

        let _guard = self.send_lock.lock().await;
        for chunk in payload.chunks(self.config.slice_size()) {
            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
            let packet: Arc<[u8]> = PacketHeader::new(sequence, ty).encode(chunk).into();

            self.send_cache.store(sequence, Arc::clone(&packet));
            self.write_packet(&packet).await?;
            trace!(sequence, %ty, len = chunk.len(), "packet sent");
        }
        Ok(())
    }

    /// Answer a NACK by queueing the cached packet for the writer loops.
    ///
    /// [`TransportError::CacheLost`] is recoverable: the sequence was evicted
    /// and the peer will eventually skip past it.
    pub fn resend_lost_pkt(&self, nack: &[u8]) -> TransportResult<()> {
        let requested: [u8; SEQUENCE_SIZE] = nack
            .try_into()
            .map_err(|_| TransportError::AckLost { len: nack.len() })?;
        let sequence = u32::from_be_bytes(requested);

        let packet = self
            .send_cache
            .get(sequence)
            .ok_or(TransportError::CacheLost { sequence })?;

        match self.resend_tx.try_send(packet) {
            Ok(()) => {
                debug!(sequence, "retransmission queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(sequence, "retransmission queue full, request dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::ConnectionClosed),
        }
    }

    /// Read one datagram from the peer and parse it into a node.
    pub async fn read_data_node_from_peer(&self, buf: &mut [u8]) -> TransportResult<DataNode> {
        let n = tokio::select! {
            _ = self.cancel.cancelled() => return Err(TransportError::ConnectionClosed),
            result = self.conn.recv(&mut *buf) => result?,
        };

        DataNode::decode(&buf[..n]).inspect_err(|err| {
            warn!(
                %err,
                datagram = %hex::encode(&buf[..n.min(PACKET_HEADER_SIZE + 16)]),
                "malformed packet"
            );
        })
    }

    /// Route one received node: NACKs are answered, then parked as fillers.
    fn handle_node(&self, node: DataNode) -> TransportResult<()> {
        if node.payload_type == PayloadType::Nack {
            match self.resend_lost_pkt(&node.payload) {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => warn!(%err, "nack not answered"),
                Err(err) => return Err(err),
            }
            self.queue
                .product(DataNode::new(PayloadType::Nack, node.sequence, Vec::new()));
            return Ok(());
        }

        trace!(%node, "node received");
        self.queue.product(node);
        Ok(())
    }

    /// Writer loop: send frames from `source` as `ty` until it is exhausted.
    ///
    /// Pending retransmissions always go out before the next fresh frame.
    /// Returns `Ok(())` on exhaustion or close, or the first write error.
    pub async fn writing_frame<S>(&self, ty: PayloadType, source: &mut S) -> TransportResult<()>
    where
        S: FrameSource + ?Sized,
    {
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(()),

                Some(packet) = async { self.resend_rx.lock().await.recv().await } => {
                    self.write_packet(&packet).await?;
                    trace!(len = packet.len(), "retransmitted");
                }

                frame = source.next_frame() => {
                    let Some(frame) = frame else {
                        info!(%ty, "frame source exhausted, writer stopping");
                        return Ok(());
                    };
                    self.send_with_seq_and_type(ty, &frame).await?;
                }
            }
        }
    }

    /// Reader task body: parse, route and signal every inbound node.
    async fn reading(&self, signal: mpsc::Sender<()>) -> TransportResult<()> {
        let mut buf = vec![0u8; self.config.mtu];
        loop {
            let node = self.read_data_node_from_peer(&mut buf).await?;
            self.handle_node(node)?;
            if signal.send(()).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Run the receive side, delivering reassembled frames to `out`.
    ///
    /// Spawns the reader task and drives the queue on every arrival, sending
    /// NACKs as the queue asks for them. Returns `Ok(())` when `out` is dropped
    /// or the connection is closed locally, otherwise the first fatal error.
    pub async fn read_frame_data(self: &Arc<Self>, out: mpsc::Sender<MediaFrame>) -> TransportResult<()> {
        let (signal_tx, mut signal_rx) = mpsc::channel(NODE_POOL_SIZE);
        let (err_tx, mut err_rx) = mpsc::channel(1);

        let reader_cancel = self.cancel.child_token();
        let _reader_guard = reader_cancel.clone().drop_guard();
        let reader = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = reader_cancel.cancelled() => {}
                result = reader.reading(signal_tx) => {
                    if let Err(err) = result {
                        let _ = err_tx.send(err).await;
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),

                _ = out.closed() => {
                    debug!("frame consumer gone, reader stopping");
                    return Ok(());
                }

                Some(err) = err_rx.recv() => {
                    if self.is_closed() {
                        return Ok(());
                    }
                    warn!(%err, "reader failed");
                    return Err(err);
                }

                Some(()) = signal_rx.recv() => {
                    if !self.drain_queue(&out).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Step the queue until it stalls. Returns `false` once `out` is closed.
    async fn drain_queue(&self, out: &mpsc::Sender<MediaFrame>) -> TransportResult<bool> {
        loop {
            match self.queue.consume() {
                Consumed::Frame(node) => {
                    if out.send(node.into()).await.is_err() {
                        return Ok(false);
                    }
                }
                Consumed::Merged | Consumed::Skipped { to: Some(_) } => {}
                Consumed::Nack(sequence) => {
                    debug!(sequence, "asking peer to resend");
                    self.send_with_seq_and_type(PayloadType::Nack, &sequence.to_be_bytes())
                        .await?;
                    return Ok(true);
                }
                Consumed::Idle | Consumed::Pending | Consumed::Skipped { to: None } => {
                    return Ok(true);
                }
            }
        }
    }

    /// Sender-only read loop: answer NACKs and discard inbound media.
    pub async fn serve_nacks(&self) -> TransportResult<()> {
        let mut buf = vec![0u8; self.config.mtu];
        loop {
            let node = match self.read_data_node_from_peer(&mut buf).await {
                Ok(node) => node,
                Err(_) if self.is_closed() => return Ok(()),
                Err(err) => return Err(err),
            };
            if node.payload_type != PayloadType::Nack {
                trace!(%node, "media ignored by nack server");
                continue;
            }
            match self.resend_lost_pkt(&node.payload) {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => warn!(%err, "nack not answered"),
                Err(err) => return Err(err),
            }
        }
    }

    /// Shut the connection down. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.queue.reset();
        self.send_cache.reset();
        self.sequence.store(0, Ordering::SeqCst);
        if let Err(err) = self.conn.close().await {
            warn!(%err, "closing connection failed");
        }
        info!("sequenced connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MemoryConn;
    use crate::transport::TransportConfigBuilder;

    fn conn_pair(config: TransportConfig) -> (Arc<QueueConn<MemoryConn>>, Arc<MemoryConn>) {
        let (a, b) = MemoryConn::pair(NODE_POOL_SIZE);
        (Arc::new(QueueConn::new(Arc::new(a), config)), Arc::new(b))
    }

    async fn recv_header(peer: &MemoryConn) -> (PacketHeader, Vec<u8>) {
        let mut buf = vec![0u8; 16 * 1024];
        let n = peer.recv(&mut buf).await.unwrap();
        (PacketHeader::from_bytes(&buf[..n]).unwrap(), buf[PACKET_HEADER_SIZE..n].to_vec())
    }

    #[tokio::test]
    async fn test_sequence_monotonic_across_types() {
        let (qc, peer) = conn_pair(TransportConfig::default());

        qc.send_with_seq_and_type(PayloadType::Video1, b"v").await.unwrap();
        qc.send_with_seq_and_type(PayloadType::Audio, b"a").await.unwrap();
        qc.send_with_seq_and_type(PayloadType::Video2, b"w").await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(recv_header(&peer).await.0.sequence);
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(qc.sequence(), 3);
    }

    #[tokio::test]
    async fn test_degenerate_literal_config() {
        let config = TransportConfig {
            mtu: 0,
            resend_capacity: 0,
            ..TransportConfig::default()
        };
        let (qc, peer) = conn_pair(config);
        assert_eq!(qc.config().mtu, PACKET_HEADER_SIZE + 1);

        qc.send_with_seq_and_type(PayloadType::Audio, b"ab").await.unwrap();
        assert_eq!(recv_header(&peer).await.1, b"a");
        assert_eq!(recv_header(&peer).await.1, b"b");
    }

    #[tokio::test]
    async fn test_large_payload_split_into_chunks() {
        let config = TransportConfigBuilder::new().mtu(PACKET_HEADER_SIZE + 4).build();
        let (qc, peer) = conn_pair(config);

        qc.send_with_seq_and_type(PayloadType::Video1, b"0123456789").await.unwrap();

        let mut chunks = Vec::new();
        for expected_seq in 1..=3 {
            let (header, payload) = recv_header(&peer).await;
            assert_eq!(header.sequence, expected_seq);
            assert_eq!(header.payload_type, PayloadType::Video1);
            chunks.push(payload);
        }
        assert_eq!(chunks, vec![b"0123".to_vec(), b"4567".to_vec(), b"89".to_vec()]);
    }

    #[tokio::test]
    async fn test_sent_bytes_are_cached() {
        let (qc, peer) = conn_pair(TransportConfig::default());
        qc.send_with_seq_and_type(PayloadType::Audio, b"pcm").await.unwrap();

        let mut buf = [0u8; 64];
        let n = peer.recv(&mut buf).await.unwrap();
        assert_eq!(qc.send_cache().get(1).as_deref(), Some(&buf[..n]));
    }

    #[tokio::test]
    async fn test_resend_lost_pkt() {
        let (qc, _peer) = conn_pair(TransportConfig::default());
        qc.send_with_seq_and_type(PayloadType::Audio, b"pcm").await.unwrap();

        qc.resend_lost_pkt(&1u32.to_be_bytes()).unwrap();
        assert!(matches!(
            qc.resend_lost_pkt(&2u32.to_be_bytes()),
            Err(TransportError::CacheLost { sequence: 2 })
        ));
        assert!(matches!(
            qc.resend_lost_pkt(&[0, 1]),
            Err(TransportError::AckLost { len: 2 })
        ));
    }

    #[tokio::test]
    async fn test_writer_drains_retransmissions_first() {
        let (qc, peer) = conn_pair(TransportConfig::default());
        qc.send_with_seq_and_type(PayloadType::Audio, b"first").await.unwrap();
        let _ = recv_header(&peer).await;

        qc.resend_lost_pkt(&1u32.to_be_bytes()).unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        tx.send(b"fresh".to_vec()).await.unwrap();
        drop(tx);
        qc.writing_frame(PayloadType::Audio, &mut rx).await.unwrap();

        let (resent, payload) = recv_header(&peer).await;
        assert_eq!(resent.sequence, 1);
        assert_eq!(payload, b"first");
        let (fresh, payload) = recv_header(&peer).await;
        assert_eq!(fresh.sequence, 2);
        assert_eq!(payload, b"fresh");
    }

    #[tokio::test]
    async fn test_read_node_errors() {
        let (qc, peer) = conn_pair(TransportConfig::default());
        let mut buf = vec![0u8; 64];

        peer.send(&[0, 0, 1]).await.unwrap();
        assert!(matches!(
            qc.read_data_node_from_peer(&mut buf).await,
            Err(TransportError::HeaderLost { len: 3 })
        ));

        peer.send(&[0, 0, 0, 1, 0x7f]).await.unwrap();
        assert!(matches!(
            qc.read_data_node_from_peer(&mut buf).await,
            Err(TransportError::InvalidPayload(0x7f))
        ));
    }

    #[tokio::test]
    async fn test_malformed_nack_is_fatal_to_reader() {
        let (qc, peer) = conn_pair(TransportConfig::default());
        peer.send(&PacketHeader::new(1, PayloadType::Nack).encode(&[1, 2]))
            .await
            .unwrap();

        let (out, _frames) = mpsc::channel(4);
        assert!(matches!(
            qc.read_frame_data(out).await,
            Err(TransportError::AckLost { len: 2 })
        ));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (qc, _peer) = conn_pair(TransportConfig::default());
        qc.send_with_seq_and_type(PayloadType::Audio, b"x").await.unwrap();

        qc.close().await;
        qc.close().await;

        assert!(qc.is_closed());
        assert_eq!(qc.sequence(), 0);
        assert!(qc.send_cache().get(1).is_none());
        assert!(matches!(
            qc.send_with_seq_and_type(PayloadType::Audio, b"y").await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_stops_reader_cleanly() {
        let (qc, _peer) = conn_pair(TransportConfig::default());
        let (out, _frames) = mpsc::channel(4);

        let reader = {
            let qc = Arc::clone(&qc);
            tokio::spawn(async move { qc.read_frame_data(out).await })
        };
        tokio::task::yield_now().await;
        qc.close().await;

        assert!(reader.await.unwrap().is_ok());
    }
}

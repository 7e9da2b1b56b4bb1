//! Per-call context tying one [`QueueConn`] to the application.
//!
//! A call owns a video writer, an audio writer, the frame reader and a monitor
//! task. The first fatal error from any of them ends the call.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::config::TransportConfig;
use super::conn::QueueConn;
use super::packet::{MediaFrame, PayloadType};
use crate::core::constants::{NAL_TYPE_MASK, NAL_TYPE_PPS, NAL_TYPE_SPS, VIDEO_START_CODE};
use crate::core::{PacketConn, TransportError, TransportResult};

/// Frames buffered per outbound stream before `send_*` waits.
const OUTBOUND_CAPACITY: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds back outbound video until a decodable starting point shows up.
///
/// The gate opens on the first frame whose first NAL unit is an SPS or PPS,
/// and stays open for the rest of the call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeyFrameGate {
    found: bool,
}

impl KeyFrameGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the gate has opened.
    pub fn is_open(&self) -> bool {
        self.found
    }

    /// Decide whether `frame` may be sent, opening the gate if it carries
    /// parameter sets.
    pub fn admit(&mut self, frame: &[u8]) -> bool {
        if self.found {
            return true;
        }

        let nal_type = frame
            .windows(VIDEO_START_CODE.len())
            .position(|window| window == VIDEO_START_CODE)
            .and_then(|idx| frame.get(idx + VIDEO_START_CODE.len()))
            .map(|byte| byte & NAL_TYPE_MASK);

        if matches!(nal_type, Some(NAL_TYPE_SPS | NAL_TYPE_PPS)) {
            info!(nal_type = ?nal_type, "found key frame, video gate open");
            self.found = true;
        } else {
            debug!(len = frame.len(), "no key frame yet, video dropped");
        }
        self.found
    }
}

/// One live call over a sequenced connection.
pub struct CallSession<C> {
    conn: Arc<QueueConn<C>>,
    video_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    audio_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    gate: Mutex<KeyFrameGate>,
    error: Mutex<Option<TransportError>>,
    ended: CancellationToken,
    finished: CancellationToken,
}

impl<C> std::fmt::Debug for CallSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("gate", &*lock(&self.gate))
            .field("ended", &self.ended.is_cancelled())
            .field("finished", &self.finished.is_cancelled())
            .finish()
    }
}

impl<C: PacketConn> CallSession<C> {
    /// Start a call: spawn both writers, the reader and the monitor.
    ///
    /// Reassembled inbound frames go to `sink`.
    pub fn start(conn: Arc<C>, config: TransportConfig, sink: mpsc::Sender<MediaFrame>) -> Arc<Self> {
        let conn = Arc::new(QueueConn::new(conn, config));
        let (video_tx, mut video_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_CAPACITY);
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_CAPACITY);

        let session = Arc::new(Self {
            conn: Arc::clone(&conn),
            video_tx: Mutex::new(Some(video_tx)),
            audio_tx: Mutex::new(Some(audio_tx)),
            gate: Mutex::new(KeyFrameGate::new()),
            error: Mutex::new(None),
            ended: CancellationToken::new(),
            finished: CancellationToken::new(),
        });

        let mut tasks = JoinSet::new();
        let writer = Arc::clone(&conn);
        tasks.spawn(async move { writer.writing_frame(PayloadType::Video1, &mut video_rx).await });
        let writer = Arc::clone(&conn);
        tasks.spawn(async move { writer.writing_frame(PayloadType::Audio, &mut audio_rx).await });
        tasks.spawn(async move { conn.read_frame_data(sink).await });

        tokio::spawn(Arc::clone(&session).monitor(tasks));
        info!("call started");
        session
    }

    async fn monitor(self: Arc<Self>, mut tasks: JoinSet<TransportResult<()>>) {
        loop {
            tokio::select! {
                biased;

                _ = self.ended.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(err))) => {
                        error!(%err, "call failed");
                        *lock(&self.error) = Some(err);
                        break;
                    }
                    Some(Err(err)) => {
                        error!(%err, "call task aborted");
                        *lock(&self.error) = Some(TransportError::Io(io::Error::other(err)));
                        break;
                    }
                },
            }
        }

        self.end_call();
        self.conn.close().await;
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Err(err)) = joined {
                debug!(%err, "call task error after end");
            }
        }
        self.finished.cancel();
        info!("call ended");
    }

    /// Queue an encoded video frame.
    ///
    /// Returns `Ok(false)` while the key frame gate is still closed.
    pub async fn send_video(&self, frame: &[u8]) -> TransportResult<bool> {
        if self.ended.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        if !lock(&self.gate).admit(frame) {
            return Ok(false);
        }
        let tx = lock(&self.video_tx).clone().ok_or(TransportError::ConnectionClosed)?;
        tx.send(frame.to_vec())
            .await
            .map_err(|_| TransportError::ConnectionClosed)?;
        Ok(true)
    }

    /// Queue an encoded audio frame.
    pub async fn send_audio(&self, frame: &[u8]) -> TransportResult<()> {
        if self.ended.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        let tx = lock(&self.audio_tx).clone().ok_or(TransportError::ConnectionClosed)?;
        tx.send(frame.to_vec())
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// End the call. Safe to call more than once.
    pub fn end_call(&self) {
        lock(&self.video_tx).take();
        lock(&self.audio_tx).take();
        self.ended.cancel();
    }

    /// Check whether the call has ended.
    pub fn is_ended(&self) -> bool {
        self.ended.is_cancelled()
    }

    /// Wait until every call task has stopped, returning the error that
    /// ended the call, if any.
    pub async fn wait(&self) -> TransportResult<()> {
        self.finished.cancelled().await;
        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Take the error that ended the call.
    pub fn take_error(&self) -> Option<TransportError> {
        lock(&self.error).take()
    }

    /// Get the underlying sequenced connection.
    pub fn conn(&self) -> &Arc<QueueConn<C>> {
        &self.conn
    }
}

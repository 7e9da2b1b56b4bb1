//! Shared helpers for integration tests: tracing setup and an in-memory media
//! engine standing in for the real peer-connection stack.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use media_relay::core::EngineError;
use media_relay::relay::{
    LocalTrack, MediaSession, RemoteTrack, SessionDescription, SessionFactory, TrackKind,
};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

pub const WAIT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Poll `check` until it holds or the wait budget runs out.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Inbound track fed by the test through a channel.
pub struct FakeRemoteTrack {
    mime: String,
    packets: mpsc::Receiver<Result<Vec<u8>, EngineError>>,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl RemoteTrack for FakeRemoteTrack {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    async fn read_packet(&mut self) -> Result<Vec<u8>, EngineError> {
        let packet = self
            .packets
            .recv()
            .await
            .unwrap_or_else(|| Err(EngineError::new("track ended")));
        self.reads.fetch_add(1, Ordering::SeqCst);
        packet
    }
}

/// Handle the test keeps to drive a [`FakeRemoteTrack`].
pub struct RemoteFeed {
    pub tx: mpsc::Sender<Result<Vec<u8>, EngineError>>,
    reads: Arc<AtomicUsize>,
}

impl RemoteFeed {
    pub async fn push(&self, packet: &[u8]) {
        self.tx.send(Ok(packet.to_vec())).await.unwrap();
    }

    pub async fn fail(&self, msg: &str) {
        self.tx.send(Err(EngineError::new(msg))).await.unwrap();
    }

    /// Packets (or errors) taken by the relay so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Outbound track recording everything written to it.
#[derive(Default)]
pub struct FakeLocalTrack {
    written: Mutex<Vec<Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl FakeLocalTrack {
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LocalTrack for FakeLocalTrack {
    async fn write_packet(&self, packet: &[u8]) -> Result<(), EngineError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(EngineError::new("write refused"));
        }
        self.written.lock().unwrap().push(packet.to_vec());
        Ok(())
    }
}

/// One fake peer connection.
pub struct FakeSession {
    pub sid: String,
    pub audio: Arc<FakeLocalTrack>,
    pub video: Arc<FakeLocalTrack>,
    tracks_tx: mpsc::UnboundedSender<Box<dyn RemoteTrack>>,
    tracks_rx: AsyncMutex<mpsc::UnboundedReceiver<Box<dyn RemoteTrack>>>,
    fail_answer: bool,
    closed: CancellationToken,
    close_calls: AtomicUsize,
}

impl FakeSession {
    fn new(sid: &str, fail_answer: bool) -> Self {
        let (tracks_tx, tracks_rx) = mpsc::unbounded_channel();
        Self {
            sid: sid.to_string(),
            audio: Arc::default(),
            video: Arc::default(),
            tracks_tx,
            tracks_rx: AsyncMutex::new(tracks_rx),
            fail_answer,
            closed: CancellationToken::new(),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// Announce a new inbound track and return the handle feeding it.
    pub fn add_track(&self, mime: &str) -> RemoteFeed {
        let (tx, packets) = mpsc::channel(1);
        let reads = Arc::new(AtomicUsize::new(0));
        let track = FakeRemoteTrack {
            mime: mime.to_string(),
            packets,
            reads: Arc::clone(&reads),
        };
        self.tracks_tx.send(Box::new(track)).unwrap();
        RemoteFeed { tx, reads }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaSession for FakeSession {
    async fn answer(&self, offer: &SessionDescription) -> Result<SessionDescription, EngineError> {
        if self.fail_answer {
            return Err(EngineError::new("bad offer"));
        }
        Ok(SessionDescription::answer(format!("answer-to:{}", offer.sdp)))
    }

    async fn accept_track(&self) -> Option<Box<dyn RemoteTrack>> {
        let mut tracks = self.tracks_rx.lock().await;
        tokio::select! {
            _ = self.closed.cancelled() => None,
            track = tracks.recv() => track,
        }
    }

    fn local_track(&self, kind: TrackKind) -> Option<Arc<dyn LocalTrack>> {
        match kind {
            TrackKind::Audio => Some(Arc::clone(&self.audio) as Arc<dyn LocalTrack>),
            TrackKind::Video => Some(Arc::clone(&self.video) as Arc<dyn LocalTrack>),
        }
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.cancel();
        Ok(())
    }
}

/// Factory handing out [`FakeSession`]s and remembering them in order.
#[derive(Default)]
pub struct FakeFactory {
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    fail_answer: AtomicBool,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every later session reject its offer.
    pub fn fail_answers(&self) {
        self.fail_answer.store(true, Ordering::SeqCst);
    }

    /// The `index`-th session created.
    pub fn session(&self, index: usize) -> Arc<FakeSession> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }

    pub fn created(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn create(&self, sid: &str) -> Result<Arc<dyn MediaSession>, EngineError> {
        let session = Arc::new(FakeSession::new(sid, self.fail_answer.load(Ordering::SeqCst)));
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session as Arc<dyn MediaSession>)
    }
}

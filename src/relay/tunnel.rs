//! Relay tunnel pairing a caller session with a callee session.
//!
//! ```text
//!            accept_track                          local_track
//! caller ──► [caller worker] ── waits for callee ──► callee
//! callee ──► [callee worker] ── fires ready ───────► caller
//!                   │
//!                   ▼ first error
//!               [monitor] ── close both ── report id ──► registry
//! ```
//!
//! Until the callee's first track is matched, caller packets are read and
//! dropped so the engine's receive buffers never back up.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::config::RelayConfig;
use super::engine::{LocalTrack, MediaSession, RemoteTrack, SessionFactory};
use super::signal::{SessionDescription, SessionSignal};
use crate::core::{RelayError, RelayResult};

type SessionSlot = Mutex<Option<Arc<dyn MediaSession>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tunnel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunnelState {
    /// Caller answered; caller media is drained and dropped.
    AwaitingCallee,
    /// Callee track matched; media flows both ways.
    Relaying,
    /// Both sessions released.
    Closed,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingCallee => f.write_str("awaiting-callee"),
            Self::Relaying => f.write_str("relaying"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Caller,
    Callee,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller => f.write_str("caller"),
            Self::Callee => f.write_str("callee"),
        }
    }
}

/// Answer the offer on a fresh session, closing it if that fails.
async fn answer_offer(
    session: &Arc<dyn MediaSession>,
    offer: &SessionDescription,
) -> RelayResult<SessionDescription> {
    match session.answer(offer).await {
        Ok(answer) => Ok(answer),
        Err(err) => {
            if let Err(close_err) = session.close().await {
                debug!(%close_err, "closing unanswered session failed");
            }
            Err(err.into())
        }
    }
}

/// One relayed call.
pub struct Tunnel {
    id: String,
    config: RelayConfig,
    factory: Arc<dyn SessionFactory>,
    caller: SessionSlot,
    callee: SessionSlot,
    callee_ready: CancellationToken,
    shutdown: CancellationToken,
    closed: AtomicBool,
    err_tx: mpsc::Sender<RelayError>,
}

impl fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tunnel")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Tunnel {
    /// Open a tunnel for the caller's offer.
    ///
    /// Returns the tunnel and the caller's answer. When the tunnel later fails,
    /// its id is sent on `closed_tx`.
    pub async fn new(
        factory: Arc<dyn SessionFactory>,
        signal: &SessionSignal,
        config: RelayConfig,
        closed_tx: mpsc::Sender<String>,
    ) -> RelayResult<(Arc<Self>, SessionDescription)> {
        info!(tunnel = %signal.sid, "creating tunnel");
        let config = config.sanitized();

        let session = factory.create(&signal.sid).await?;
        let answer = answer_offer(&session, &signal.sdp).await?;

        let (err_tx, err_rx) = mpsc::channel(config.error_capacity);
        let tunnel = Arc::new(Self {
            id: signal.sid.clone(),
            config,
            factory,
            caller: Mutex::new(Some(Arc::clone(&session))),
            callee: Mutex::new(None),
            callee_ready: CancellationToken::new(),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
            err_tx,
        });

        tunnel.spawn_acceptor(Side::Caller, session);
        tokio::spawn(Arc::clone(&tunnel).monitor(err_rx, closed_tx));
        info!(tunnel = %tunnel.id, "caller session answered");
        Ok((tunnel, answer))
    }

    /// Attach the callee's offer, returning the callee's answer.
    pub async fn update(self: &Arc<Self>, signal: &SessionSignal) -> RelayResult<SessionDescription> {
        if self.is_closed() {
            return Err(RelayError::TunnelClosed);
        }
        if lock(&self.callee).is_some() {
            return Err(RelayError::CalleeAlreadyJoined(self.id.clone()));
        }

        let session = self.factory.create(&signal.sid).await?;
        let answer = answer_offer(&session, &signal.sdp).await?;

        let rejected = {
            let mut callee = lock(&self.callee);
            if self.is_closed() {
                Some(RelayError::TunnelClosed)
            } else if callee.is_some() {
                Some(RelayError::CalleeAlreadyJoined(self.id.clone()))
            } else {
                *callee = Some(Arc::clone(&session));
                None
            }
        };
        if let Some(err) = rejected {
            if let Err(close_err) = session.close().await {
                debug!(%close_err, "closing rejected callee session failed");
            }
            return Err(err);
        }

        self.spawn_acceptor(Side::Callee, session);
        info!(tunnel = %self.id, "callee session answered");
        Ok(answer)
    }

    /// Tunnel id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TunnelState {
        if self.is_closed() {
            TunnelState::Closed
        } else if self.callee_ready.is_cancelled() {
            TunnelState::Relaying
        } else {
            TunnelState::AwaitingCallee
        }
    }

    /// Check whether the tunnel is closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close both sessions and stop every worker. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(tunnel = %self.id, "tunnel closing");
        self.shutdown.cancel();

        let callee = lock(&self.callee).take();
        let caller = lock(&self.caller).take();
        for (side, session) in [(Side::Callee, callee), (Side::Caller, caller)] {
            let Some(session) = session else {
                continue;
            };
            if let Err(err) = session.close().await {
                warn!(tunnel = %self.id, %side, %err, "closing session failed");
            }
        }
    }

    fn report(&self, err: RelayError) {
        if let Err(err) = self.err_tx.try_send(err) {
            debug!(tunnel = %self.id, %err, "tunnel error dropped");
        }
    }

    fn spawn_acceptor(self: &Arc<Self>, side: Side, session: Arc<dyn MediaSession>) {
        let tunnel = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let track = tokio::select! {
                    _ = tunnel.shutdown.cancelled() => return,
                    track = session.accept_track() => track,
                };
                let Some(track) = track else {
                    debug!(tunnel = %tunnel.id, %side, "session stopped delivering tracks");
                    return;
                };
                tokio::spawn(Arc::clone(&tunnel).run_worker(side, track));
            }
        });
    }

    async fn run_worker(self: Arc<Self>, side: Side, track: Box<dyn RemoteTrack>) {
        let mime = track.mime_type().to_string();
        info!(tunnel = %self.id, %side, %mime, "track received");

        let result = match side {
            Side::Caller => self.on_caller_track(track).await,
            Side::Callee => self.on_callee_track(track).await,
        };
        match result {
            Ok(()) => debug!(tunnel = %self.id, %side, %mime, "track worker stopped"),
            Err(RelayError::UnsupportedCodec(mime)) => {
                warn!(tunnel = %self.id, %side, %mime, "unknown codec, track not relayed");
            }
            Err(err) => {
                warn!(tunnel = %self.id, %side, %mime, %err, "track worker failed");
                self.report(err);
            }
        }
    }

    async fn on_caller_track(&self, mut track: Box<dyn RemoteTrack>) -> RelayResult<()> {
        let mut discarded = 0u64;
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => return Ok(()),
                _ = self.callee_ready.cancelled() => break,
                packet = track.read_packet() => {
                    let packet = packet?;
                    discarded += 1;
                    trace!(tunnel = %self.id, len = packet.len(), "caller packet dropped, no callee yet");
                }
            }
        }
        debug!(tunnel = %self.id, discarded, "callee ready, relaying caller track");

        let mime = track.mime_type().to_string();
        let kind = self
            .config
            .track_kind(&mime)
            .ok_or_else(|| RelayError::UnsupportedCodec(mime.clone()))?;
        let Some(callee) = lock(&self.callee).clone() else {
            return Ok(());
        };
        let local = callee
            .local_track(kind)
            .ok_or(RelayError::UnsupportedCodec(mime))?;

        self.relay(track.as_mut(), local.as_ref()).await
    }

    async fn on_callee_track(&self, mut track: Box<dyn RemoteTrack>) -> RelayResult<()> {
        let mime = track.mime_type().to_string();
        let kind = self
            .config
            .track_kind(&mime)
            .ok_or_else(|| RelayError::UnsupportedCodec(mime.clone()))?;
        let Some(caller) = lock(&self.caller).clone() else {
            return Ok(());
        };
        let local = caller
            .local_track(kind)
            .ok_or(RelayError::UnsupportedCodec(mime))?;

        if !self.callee_ready.is_cancelled() {
            info!(tunnel = %self.id, "callee ready, relaying");
            self.callee_ready.cancel();
        }

        self.relay(track.as_mut(), local.as_ref()).await
    }

    async fn relay(&self, remote: &mut dyn RemoteTrack, local: &dyn LocalTrack) -> RelayResult<()> {
        loop {
            let packet = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                packet = remote.read_packet() => packet?,
            };
            local.write_packet(&packet).await?;
        }
    }

    async fn monitor(self: Arc<Self>, mut err_rx: mpsc::Receiver<RelayError>, closed_tx: mpsc::Sender<String>) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                debug!(tunnel = %self.id, "tunnel closed locally");
            }
            Some(err) = err_rx.recv() => {
                warn!(tunnel = %self.id, %err, "tunnel closed by error");
                self.close().await;
                if closed_tx.send(self.id.clone()).await.is_err() {
                    debug!(tunnel = %self.id, "registry gone, teardown not reported");
                }
            }
        }
    }
}

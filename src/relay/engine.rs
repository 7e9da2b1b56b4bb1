//! Seams to the external real-time media engine.
//!
//! ICE, DTLS and SRTP live behind these traits; the relay only sees session
//! descriptions going in and opaque packets coming out of tracks.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::signal::SessionDescription;
use crate::core::EngineError;

/// Media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Creates one media session per call side.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    /// Create a session for tunnel `sid`.
    async fn create(&self, sid: &str) -> Result<Arc<dyn MediaSession>, EngineError>;
}

/// One peer connection held by the relay.
#[async_trait]
pub trait MediaSession: Send + Sync + 'static {
    /// Apply the remote offer and produce the local answer once candidate
    /// gathering is complete.
    async fn answer(&self, offer: &SessionDescription) -> Result<SessionDescription, EngineError>;

    /// Wait for the next inbound track. `None` once the session is closed.
    async fn accept_track(&self) -> Option<Box<dyn RemoteTrack>>;

    /// Outbound track of the given kind.
    fn local_track(&self, kind: TrackKind) -> Option<Arc<dyn LocalTrack>>;

    /// Close the session.
    async fn close(&self) -> Result<(), EngineError>;
}

/// Inbound packet stream.
#[async_trait]
pub trait RemoteTrack: Send + 'static {
    /// Codec mime type, e.g. `video/H264`.
    fn mime_type(&self) -> &str;

    /// Read the next packet.
    async fn read_packet(&mut self) -> Result<Vec<u8>, EngineError>;
}

/// Outbound packet sink.
#[async_trait]
pub trait LocalTrack: Send + Sync + 'static {
    /// Write one packet.
    async fn write_packet(&self, packet: &[u8]) -> Result<(), EngineError>;
}

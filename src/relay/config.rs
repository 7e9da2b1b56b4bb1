//! Relay configuration.

use super::engine::TrackKind;
use crate::core::constants::{DEFAULT_AUDIO_MIME, DEFAULT_VIDEO_MIME, TUNNEL_ERROR_CAPACITY};

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Mime type relayed audio-to-audio.
    pub audio_mime: String,
    /// Mime type relayed video-to-video.
    pub video_mime: String,
    /// Worker errors buffered per tunnel before later ones are dropped.
    pub error_capacity: usize,
    /// Teardown notices buffered for the registry cleanup task.
    pub registry_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            audio_mime: DEFAULT_AUDIO_MIME.to_string(),
            video_mime: DEFAULT_VIDEO_MIME.to_string(),
            error_capacity: TUNNEL_ERROR_CAPACITY,
            registry_capacity: 64,
        }
    }
}

impl RelayConfig {
    /// Map a track mime type to its kind, ignoring ASCII case.
    pub fn track_kind(&self, mime: &str) -> Option<TrackKind> {
        if mime.eq_ignore_ascii_case(&self.audio_mime) {
            Some(TrackKind::Audio)
        } else if mime.eq_ignore_ascii_case(&self.video_mime) {
            Some(TrackKind::Video)
        } else {
            None
        }
    }

    /// Raise zero buffer capacities to one. Applied by tunnels and the
    /// registry, so literal configs are safe.
    pub fn sanitized(self) -> Self {
        Self {
            error_capacity: self.error_capacity.max(1),
            registry_capacity: self.registry_capacity.max(1),
            ..self
        }
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the audio codec mime type.
    pub fn audio_mime(mut self, mime: impl Into<String>) -> Self {
        self.config.audio_mime = mime.into();
        self
    }

    /// Set the video codec mime type.
    pub fn video_mime(mut self, mime: impl Into<String>) -> Self {
        self.config.video_mime = mime.into();
        self
    }

    /// Set the per-tunnel error buffer.
    pub fn error_capacity(mut self, capacity: usize) -> Self {
        self.config.error_capacity = capacity.max(1);
        self
    }

    /// Set the registry teardown buffer.
    pub fn registry_capacity(mut self, capacity: usize) -> Self {
        self.config.registry_capacity = capacity.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RelayConfig {
        self.config.sanitized()
    }
}

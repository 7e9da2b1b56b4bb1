//! Media relay between a caller and a callee.
//!
//! A [`Tunnel`] holds one media session per side of a call and forwards
//! packets track to track, audio to audio and video to video. The
//! [`TunnelRegistry`] routes signaling offers to tunnels by id and drops
//! tunnels once they fail.
//!
//! The media engine itself (ICE, DTLS, SRTP, SDP handling) is external and
//! reached through the traits in this module.

mod config;
mod engine;
mod registry;
mod signal;
mod tunnel;

pub use config::{RelayConfig, RelayConfigBuilder};
pub use engine::{LocalTrack, MediaSession, RemoteTrack, SessionFactory, TrackKind};
pub use registry::TunnelRegistry;
pub use signal::{SdpKind, SessionDescription, SessionSignal, SignalKind};
pub use tunnel::{Tunnel, TunnelState};

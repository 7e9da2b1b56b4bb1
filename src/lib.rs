//! # media-relay
//!
//! Loss-tolerant transport for live audio/video between two peers.
//!
//! The crate is the hand-built reliability layer that sits between an encoder
//! and a lossy datagram path:
//!
//! - **Slicing**: oversized encoded frames are cut into MTU-bound slices and
//!   reassembled on the far side
//! - **Sequencing**: every datagram carries a sender-wide sequence number, and
//!   sent bytes are cached so gaps can be NACKed and retransmitted
//! - **Dejitter**: a bounded reorder queue releases whole frames in order and
//!   skips forward to the next keyframe when a gap never fills
//! - **Relaying**: tunnels pair a caller and a callee media session and forward
//!   packets between them once both sides are ready
//!
//! ## Feature Flags
//!
//! - `slicer` (default): frame slicer and reassembler
//! - `transport` (default): sequenced transport, reorder queue, call sessions
//! - `relay` (default): relay tunnels and the tunnel registry
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and the datagram/media-source traits
//! - [`net`]: UDP and in-memory datagram connections
//! - [`slicer`]: frame slicer (requires `slicer` feature)
//! - [`transport`]: sequenced transport (requires `transport` feature)
//! - [`relay`]: relay tunnels (requires `relay` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use media_relay::prelude::*;
//! use tokio::sync::mpsc;
//!
//! # async fn run() -> std::io::Result<()> {
//! let socket = RelaySocketBuilder::new()
//!     .local_addr("0.0.0.0:0".parse().unwrap())
//!     .peer_addr("203.0.113.7:7000".parse().unwrap())
//!     .connect()
//!     .await?;
//!
//! let (sink, mut frames) = mpsc::channel(64);
//! let call = CallSession::start(Arc::new(socket), TransportConfig::default(), sink);
//!
//! // frames before the first SPS/PPS are held back
//! call.send_video(&[0, 0, 0, 1, 0x67, 0x42]).await.ok();
//!
//! while let Some(frame) = frames.recv().await {
//!     println!("{} frame, {} bytes", frame.kind, frame.data.len());
//! }
//! call.end_call();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Datagram connections (always included)
pub mod net;

// Slicer layer (feature-gated)
#[cfg(feature = "slicer")]
#[cfg_attr(docsrs, doc(cfg(feature = "slicer")))]
pub mod slicer;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Relay layer (feature-gated)
#[cfg(feature = "relay")]
#[cfg_attr(docsrs, doc(cfg(feature = "relay")))]
pub mod relay;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::net::{MemoryConn, RelaySocket, RelaySocketBuilder};

    #[cfg(feature = "slicer")]
    pub use crate::slicer::{FrameHeader, SliceConn, SlicerConfig, frame_write};

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        CallSession, KeyFrameGate, MediaFrame, PayloadType, QueueConn, TransportConfig,
        TransportConfigBuilder,
    };

    #[cfg(feature = "relay")]
    pub use crate::relay::{
        LocalTrack, MediaSession, RelayConfig, RelayConfigBuilder, RemoteTrack, SessionDescription,
        SessionFactory, SessionSignal, SignalKind, TrackKind, Tunnel, TunnelRegistry, TunnelState,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{MediaRelayError, PacketConn, RelayError, SliceError, TransportError};

#[cfg(feature = "slicer")]
pub use slicer::SliceConn;

#[cfg(feature = "transport")]
pub use transport::{CallSession, QueueConn};

#[cfg(feature = "relay")]
pub use relay::{Tunnel, TunnelRegistry};

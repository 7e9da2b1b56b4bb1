//! Error types for the relay transport.

use std::io;

use thiserror::Error;

/// Errors raised by the frame slicer and reassembler.
#[derive(Debug, Error)]
pub enum SliceError {
    /// Slice header violates its invariants.
    #[error(
        "invalid frame header: id={frame_id} count={slice_count} index={slice_index} len={slice_len}"
    )]
    InvalidFrameHeader {
        /// Frame id.
        frame_id: u16,
        /// Declared slice count.
        slice_count: u16,
        /// Declared slice index.
        slice_index: u16,
        /// Declared slice payload length.
        slice_len: u16,
    },

    /// Fewer bytes arrived than the header declares.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead {
        /// Bytes required.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },

    /// Frame needs more slices than the header can count.
    #[error("frame too large: {len} bytes exceeds {max}")]
    FrameTooLarge {
        /// Frame length.
        len: usize,
        /// Largest sendable frame.
        max: usize,
    },

    /// Connection error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for slicer operations.
pub type SliceResult<T> = Result<T, SliceError>;

/// Errors raised by the sequenced transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Datagram shorter than the 5-byte packet header.
    #[error("header lost: datagram of {len} bytes")]
    HeaderLost {
        /// Datagram length.
        len: usize,
    },

    /// Connection accepted fewer bytes than the packet holds.
    #[error("data lost: wrote {written} of {expected} bytes")]
    DataLost {
        /// Bytes written.
        written: usize,
        /// Packet length.
        expected: usize,
    },

    /// NACK for a sequence whose cache slot is empty or was overwritten.
    #[error("retransmission cache lost sequence {sequence}")]
    CacheLost {
        /// Requested sequence.
        sequence: u32,
    },

    /// NACK payload is not exactly one sequence number.
    #[error("malformed nack: {len} bytes")]
    AckLost {
        /// Payload length.
        len: usize,
    },

    /// Unknown payload type byte.
    #[error("invalid payload type: {0:#04x}")]
    InvalidPayload(u8),

    /// Connection was closed locally.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Check if the read/answer loop may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::CacheLost { .. })
    }

    /// Check if this error must tear the connection down.
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Opaque failure reported by the external media engine.
#[derive(Debug, Clone, Error)]
#[error("media engine: {0}")]
pub struct EngineError(pub String);

impl EngineError {
    /// Create an engine error from any message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors raised by relay tunnels and the tunnel registry.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Media engine failure.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Track codec matches neither the audio nor the video codec.
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// No tunnel registered under this id.
    #[error("unknown tunnel: {0}")]
    UnknownTunnel(String),

    /// A tunnel is already registered under this id.
    #[error("tunnel already exists: {0}")]
    TunnelExists(String),

    /// A callee already joined this tunnel.
    #[error("callee already joined tunnel {0}")]
    CalleeAlreadyJoined(String),

    /// The tunnel was torn down.
    #[error("tunnel closed")]
    TunnelClosed,
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Top-level errors.
#[derive(Debug, Error)]
pub enum MediaRelayError {
    /// Slicer error.
    #[error("slicer error: {0}")]
    Slice(#[from] SliceError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Relay error.
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

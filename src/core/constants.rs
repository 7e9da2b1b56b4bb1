//! Wire and buffer constants.
//!
//! Header layouts and ring sizes are fixed by the wire format and MUST NOT be
//! changed independently on the two ends of a connection.

// =============================================================================
// SLICER (frame header)
// =============================================================================

/// Slice header size (frame id + slice count + slice index + slice length).
pub const SLICE_HEADER_SIZE: usize = 8;

/// Default maximum slice payload, sized for a UDP path over ICE.
pub const DEFAULT_SLICE_MTU: usize = 1400;

/// Number of in-flight frames tracked by the receive ring.
///
/// Frames are keyed by `frame_id % FRAME_RING_SIZE`; a sender must not run more
/// than this many frames ahead of the receiver.
pub const FRAME_RING_SIZE: usize = 1 << 6;

// =============================================================================
// SEQUENCED TRANSPORT
// =============================================================================

/// Sequence number field size.
pub const SEQUENCE_SIZE: usize = 4;

/// Payload type field size.
pub const PAYLOAD_TYPE_SIZE: usize = 1;

/// Sequenced packet header size.
pub const PACKET_HEADER_SIZE: usize = SEQUENCE_SIZE + PAYLOAD_TYPE_SIZE;

/// Default datagram size for the sequenced transport.
pub const DEFAULT_TRANSPORT_MTU: usize = 1 << 13;

/// Send cache and receive pool size. Divides 2^32 so slots stay stable across
/// sequence wrap-around.
pub const NODE_POOL_SIZE: usize = 1 << 12;

/// Empty polls tolerated before a NACK is sent for the missing sequence.
pub const NACK_AFTER_POLLS: u32 = 1 << 3;

/// Empty polls tolerated before skipping forward to the next keyframe.
pub const SKIP_AFTER_POLLS: u32 = 1 << 4;

// =============================================================================
// H.264
// =============================================================================

/// Annex-B start code that opens every encoded video frame.
pub const VIDEO_START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Mask extracting the NAL unit type from the first NAL header byte.
pub const NAL_TYPE_MASK: u8 = 0x1f;

/// Sequence parameter set NAL unit type.
pub const NAL_TYPE_SPS: u8 = 7;

/// Picture parameter set NAL unit type.
pub const NAL_TYPE_PPS: u8 = 8;

// =============================================================================
// RELAY
// =============================================================================

/// Default audio codec relayed between sessions.
pub const DEFAULT_AUDIO_MIME: &str = "audio/PCMU";

/// Default video codec relayed between sessions.
pub const DEFAULT_VIDEO_MIME: &str = "video/H264";

/// Capacity of a tunnel's shared error channel.
pub const TUNNEL_ERROR_CAPACITY: usize = 6;

//! Sequenced packet header and receive-side data nodes.

use std::fmt;

use crate::core::constants::{PACKET_HEADER_SIZE, SEQUENCE_SIZE, VIDEO_START_CODE};
use crate::core::{TransportError, TransportResult};

/// Payload type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    /// Primary video stream.
    Video1 = 0x01,
    /// Secondary video stream.
    Video2 = 0x02,
    /// Audio stream.
    Audio = 0x03,
    /// Retransmission request carrying one sequence number.
    Nack = 0x04,
}

impl PayloadType {
    /// Parse payload type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Video1),
            0x02 => Some(Self::Video2),
            0x03 => Some(Self::Audio),
            0x04 => Some(Self::Nack),
            _ => None,
        }
    }

    /// Convert payload type to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Check if this is one of the video streams.
    pub fn is_video(self) -> bool {
        matches!(self, Self::Video1 | Self::Video2)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video1 => "video1",
            Self::Video2 => "video2",
            Self::Audio => "audio",
            Self::Nack => "nack",
        };
        f.write_str(name)
    }
}

/// Header prefixed to every transport datagram.
///
/// Wire format (5 bytes):
/// ```text
/// +--------------------+--------+
/// | Sequence           | Type   |
/// | 4 bytes (BE32)     | 1 byte |
/// +--------------------+--------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Per-sender sequence number, shared by all payload types.
    pub sequence: u32,
    /// Payload type.
    pub payload_type: PayloadType,
}

impl PacketHeader {
    /// Create a new header.
    pub fn new(sequence: u32, payload_type: PayloadType) -> Self {
        Self {
            sequence,
            payload_type,
        }
    }

    /// Serialize to bytes (5 bytes).
    pub fn to_bytes(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        buf[..SEQUENCE_SIZE].copy_from_slice(&self.sequence.to_be_bytes());
        buf[SEQUENCE_SIZE] = self.payload_type.as_byte();
        buf
    }

    /// Parse from the start of a datagram.
    pub fn from_bytes(bytes: &[u8]) -> TransportResult<Self> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(TransportError::HeaderLost { len: bytes.len() });
        }
        let sequence = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let payload_type = PayloadType::from_byte(bytes[SEQUENCE_SIZE])
            .ok_or(TransportError::InvalidPayload(bytes[SEQUENCE_SIZE]))?;
        Ok(Self::new(sequence, payload_type))
    }

    /// Build a full datagram: header followed by `payload`.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PACKET_HEADER_SIZE + payload.len());
        buf.extend_from_slice(&self.to_bytes());
        buf.extend_from_slice(payload);
        buf
    }
}

/// Check whether a video payload opens a new frame (Annex-B start code).
pub fn is_frame_start(payload: &[u8]) -> bool {
    payload.starts_with(&VIDEO_START_CODE)
}

/// One received packet waiting in the sorted queue.
///
/// `is_key` marks a safe frame boundary: a video payload that begins with the
/// start code, or any audio payload (audio packets are always whole frames).
/// NACK nodes are empty, non-key fillers that keep the sequence space gapless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    /// Payload type.
    pub payload_type: PayloadType,
    /// Sender's sequence number.
    pub sequence: u32,
    /// Payload bytes (merged continuation fragments included).
    pub payload: Vec<u8>,
    /// Whether this node starts a frame.
    pub is_key: bool,
}

impl DataNode {
    /// Create a node, deriving `is_key` from the payload type and content.
    pub fn new(payload_type: PayloadType, sequence: u32, payload: Vec<u8>) -> Self {
        let is_key = match payload_type {
            PayloadType::Video1 | PayloadType::Video2 => is_frame_start(&payload),
            PayloadType::Audio => true,
            PayloadType::Nack => false,
        };
        Self {
            payload_type,
            sequence,
            payload,
            is_key,
        }
    }

    /// Parse a whole datagram into a node.
    pub fn decode(datagram: &[u8]) -> TransportResult<Self> {
        let header = PacketHeader::from_bytes(datagram)?;
        Ok(Self::new(
            header.payload_type,
            header.sequence,
            datagram[PACKET_HEADER_SIZE..].to_vec(),
        ))
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{seq:{} type:{} key:{} len:{}}}",
            self.sequence,
            self.payload_type,
            self.is_key,
            self.payload.len()
        )
    }
}

/// A reassembled frame handed to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// Stream the frame belongs to.
    pub kind: PayloadType,
    /// Frame bytes.
    pub data: Vec<u8>,
}

impl From<DataNode> for MediaFrame {
    fn from(node: DataNode) -> Self {
        Self {
            kind: node.payload_type,
            data: node.payload,
        }
    }
}

//! Slice header encoding and decoding.

use std::fmt;

use crate::core::constants::SLICE_HEADER_SIZE;
use crate::core::{SliceError, SliceResult};

/// Header carried by every slice of a sliced frame.
///
/// Wire format (8 bytes, big-endian):
/// ```text
/// +------------+-------------+-------------+-------------+
/// | Frame ID   | Slice Count | Slice Index | Slice Len   |
/// | 2 bytes    | 2 bytes     | 2 bytes     | 2 bytes     |
/// +------------+-------------+-------------+-------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Per-connection frame counter (wraps at 2^16).
    pub frame_id: u16,
    /// Total slices in the frame (>= 1).
    pub slice_count: u16,
    /// Position of this slice (< slice_count).
    pub slice_index: u16,
    /// Payload bytes following the header (<= MTU).
    pub slice_len: u16,
}

impl FrameHeader {
    /// Serialize to bytes (8 bytes).
    pub fn to_bytes(&self) -> [u8; SLICE_HEADER_SIZE] {
        let mut buf = [0u8; SLICE_HEADER_SIZE];
        buf[0..2].copy_from_slice(&self.frame_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.slice_count.to_be_bytes());
        buf[4..6].copy_from_slice(&self.slice_index.to_be_bytes());
        buf[6..8].copy_from_slice(&self.slice_len.to_be_bytes());
        buf
    }

    /// Parse and validate a header against the slice MTU.
    pub fn from_bytes(bytes: &[u8], mtu: usize) -> SliceResult<Self> {
        if bytes.len() < SLICE_HEADER_SIZE {
            return Err(SliceError::ShortRead {
                expected: SLICE_HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let header = Self {
            frame_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            slice_count: u16::from_be_bytes([bytes[2], bytes[3]]),
            slice_index: u16::from_be_bytes([bytes[4], bytes[5]]),
            slice_len: u16::from_be_bytes([bytes[6], bytes[7]]),
        };

        if usize::from(header.slice_len) > mtu
            || header.slice_count == 0
            || header.slice_index >= header.slice_count
        {
            return Err(SliceError::InvalidFrameHeader {
                frame_id: header.frame_id,
                slice_count: header.slice_count,
                slice_index: header.slice_index,
                slice_len: header.slice_len,
            });
        }

        Ok(header)
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} slice {}/{} ({} bytes)",
            self.frame_id, self.slice_index, self.slice_count, self.slice_len
        )
    }
}

/// One MTU-bound fragment of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    /// Parsed header.
    pub header: FrameHeader,
    /// Exactly `header.slice_len` bytes.
    pub payload: Vec<u8>,
}

impl Slice {
    /// Parse one datagram into a slice.
    ///
    /// Bytes beyond the declared `slice_len` are ignored.
    pub fn decode(datagram: &[u8], mtu: usize) -> SliceResult<Self> {
        let header = FrameHeader::from_bytes(datagram, mtu)?;
        let body = &datagram[SLICE_HEADER_SIZE..];
        let len = usize::from(header.slice_len);
        if body.len() < len {
            return Err(SliceError::ShortRead {
                expected: len,
                actual: body.len(),
            });
        }
        Ok(Self {
            header,
            payload: body[..len].to_vec(),
        })
    }

    /// Serialize header and payload into one datagram.
    pub fn encode(header: &FrameHeader, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SLICE_HEADER_SIZE + payload.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(payload);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::DEFAULT_SLICE_MTU;

    fn header(frame_id: u16, count: u16, index: u16, len: u16) -> FrameHeader {
        FrameHeader {
            frame_id,
            slice_count: count,
            slice_index: index,
            slice_len: len,
        }
    }

    #[test]
    fn test_header_wire_layout() {
        let h = header(0x0102, 0x0003, 0x0002, 0x0578);
        assert_eq!(h.to_bytes(), [0x01, 0x02, 0x00, 0x03, 0x00, 0x02, 0x05, 0x78]);
        assert_eq!(FrameHeader::from_bytes(&h.to_bytes(), DEFAULT_SLICE_MTU).unwrap(), h);
    }

    #[test]
    fn test_reject_len_over_mtu() {
        let bytes = header(1, 1, 0, 1401).to_bytes();
        assert!(matches!(
            FrameHeader::from_bytes(&bytes, 1400),
            Err(SliceError::InvalidFrameHeader { slice_len: 1401, .. })
        ));
    }

    #[test]
    fn test_reject_zero_count() {
        let bytes = header(1, 0, 0, 10).to_bytes();
        assert!(matches!(
            FrameHeader::from_bytes(&bytes, 1400),
            Err(SliceError::InvalidFrameHeader { slice_count: 0, .. })
        ));
    }

    #[test]
    fn test_reject_index_equal_to_count() {
        let bytes = header(1, 2, 2, 10).to_bytes();
        assert!(matches!(
            FrameHeader::from_bytes(&bytes, 1400),
            Err(SliceError::InvalidFrameHeader { slice_index: 2, .. })
        ));
    }

    #[test]
    fn test_truncated_header_is_short_read() {
        assert!(matches!(
            FrameHeader::from_bytes(&[0, 1, 0], 1400),
            Err(SliceError::ShortRead { expected: 8, actual: 3 })
        ));
    }

    #[test]
    fn test_slice_short_payload() {
        let datagram = Slice::encode(&header(1, 1, 0, 10), &[0u8; 6]);
        assert!(matches!(
            Slice::decode(&datagram, 1400),
            Err(SliceError::ShortRead { expected: 10, actual: 6 })
        ));
    }

    #[test]
    fn test_slice_ignores_trailing_bytes() {
        let mut datagram = Slice::encode(&header(1, 1, 0, 3), b"abc");
        datagram.extend_from_slice(b"zz");
        let slice = Slice::decode(&datagram, 1400).unwrap();
        assert_eq!(slice.payload, b"abc");
    }
}

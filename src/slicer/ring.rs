//! Receive-side frame reassembly ring.
//!
//! In-flight frames live in a fixed ring of [`FRAME_RING_SIZE`] slots keyed by
//! `frame_id % FRAME_RING_SIZE`. A slot holds at most one frame: a slice for a
//! different frame id evicts whatever was there, partial data included.

use tracing::{debug, trace};

use super::header::Slice;
use crate::core::constants::FRAME_RING_SIZE;

/// A frame being assembled in a ring slot.
#[derive(Debug, Clone)]
pub struct ReceiveFrame {
    frame_id: u16,
    slices_received: u16,
    complete: bool,
    cache: Vec<Option<Vec<u8>>>,
}

impl ReceiveFrame {
    fn new(frame_id: u16, slice_count: u16) -> Self {
        Self {
            frame_id,
            slices_received: 0,
            complete: false,
            cache: vec![None; usize::from(slice_count)],
        }
    }

    /// Frame id.
    pub fn frame_id(&self) -> u16 {
        self.frame_id
    }

    /// Distinct slices stored so far.
    pub fn slices_received(&self) -> u16 {
        self.slices_received
    }

    /// Slices expected.
    pub fn slice_count(&self) -> u16 {
        self.cache.len() as u16
    }

    /// Whether every slice has arrived.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Concatenate the slices in index order.
    fn flush(&mut self) -> Vec<u8> {
        let len = self.cache.iter().flatten().map(Vec::len).sum();
        let mut buf = Vec::with_capacity(len);
        for payload in self.cache.iter_mut().flatten() {
            buf.append(payload);
        }
        buf
    }
}

/// Result of feeding a slice into the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceOutcome {
    /// Stored, frame still missing slices.
    Incomplete,
    /// This slice index was already stored; dropped.
    Duplicate,
    /// Last slice arrived; the reassembled frame.
    Complete(Vec<u8>),
}

/// Fixed-size reassembly ring.
#[derive(Debug, Clone)]
pub struct FrameRing {
    slots: Vec<Option<ReceiveFrame>>,
    evictions: u64,
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRing {
    /// Create an empty ring.
    pub fn new() -> Self {
        Self {
            slots: vec![None; FRAME_RING_SIZE],
            evictions: 0,
        }
    }

    /// Ring slot for a frame id.
    pub fn slot_index(frame_id: u16) -> usize {
        usize::from(frame_id) % FRAME_RING_SIZE
    }

    /// The frame currently assembling in `frame_id`'s slot, if it is that frame.
    pub fn get(&self, frame_id: u16) -> Option<&ReceiveFrame> {
        self.slots[Self::slot_index(frame_id)]
            .as_ref()
            .filter(|frame| frame.frame_id == frame_id)
    }

    /// Partial frames discarded because another frame claimed their slot.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Store a slice, emitting the frame once its last slice arrives.
    pub fn accept(&mut self, slice: Slice) -> SliceOutcome {
        let header = slice.header;
        let idx = Self::slot_index(header.frame_id);
        let slot = &mut self.slots[idx];

        let reuse = matches!(
            slot,
            Some(frame) if frame.frame_id == header.frame_id
                && frame.slice_count() == header.slice_count
        );
        if !reuse {
            if let Some(old) = slot.as_ref() {
                self.evictions += 1;
                debug!(
                    slot = idx,
                    evicted = old.frame_id,
                    received = old.slices_received,
                    frame_id = header.frame_id,
                    "frame ring slot reclaimed"
                );
            }
            *slot = Some(ReceiveFrame::new(header.frame_id, header.slice_count));
        }

        let Some(frame) = slot.as_mut() else {
            return SliceOutcome::Incomplete;
        };

        let entry = &mut frame.cache[usize::from(header.slice_index)];
        if entry.is_some() {
            trace!(%header, "duplicate slice");
            return SliceOutcome::Duplicate;
        }
        *entry = Some(slice.payload);
        frame.slices_received += 1;

        if frame.slices_received < header.slice_count {
            return SliceOutcome::Incomplete;
        }

        frame.complete = true;
        let buf = frame.flush();
        trace!(frame_id = header.frame_id, len = buf.len(), "frame reassembled");
        *slot = None;
        SliceOutcome::Complete(buf)
    }
}

//! Retransmission cache.
//!
//! A ring of [`NODE_POOL_SIZE`] slots keyed by `sequence % NODE_POOL_SIZE`.
//! Each slot remembers the last packet written under its key; a later
//! sequence mapping to the same slot overwrites it, and a NACK for the
//! overwritten sequence is a cache miss.

use std::sync::{Arc, Mutex};

use crate::core::constants::NODE_POOL_SIZE;

type Entry = Option<(u32, Arc<[u8]>)>;

/// Bounded store of sent packets for NACK answers.
///
/// Slots are locked individually; concurrent writers only ever contend on
/// the same slot, which requires sequences `NODE_POOL_SIZE` apart.
#[derive(Debug)]
pub struct SendCache {
    slots: Vec<Mutex<Entry>>,
}

impl Default for SendCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SendCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            slots: (0..NODE_POOL_SIZE).map(|_| Mutex::new(None)).collect(),
        }
    }

    fn slot(&self, sequence: u32) -> &Mutex<Entry> {
        &self.slots[sequence as usize % NODE_POOL_SIZE]
    }

    /// Remember the exact bytes written for `sequence`.
    pub fn store(&self, sequence: u32, packet: Arc<[u8]>) {
        if let Ok(mut slot) = self.slot(sequence).lock() {
            *slot = Some((sequence, packet));
        }
    }

    /// Look up the packet sent as `sequence`, if still cached.
    pub fn get(&self, sequence: u32) -> Option<Arc<[u8]>> {
        let slot = self.slot(sequence).lock().ok()?;
        match slot.as_ref() {
            Some((cached, packet)) if *cached == sequence => Some(Arc::clone(packet)),
            _ => None,
        }
    }

    /// Drop every cached packet.
    pub fn reset(&self) {
        for slot in &self.slots {
            if let Ok(mut slot) = slot.lock() {
                *slot = None;
            }
        }
    }
}

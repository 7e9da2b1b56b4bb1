//! Reorder/dejitter queue.
//!
//! Received nodes are parked at `sequence % NODE_POOL_SIZE` and consumed in
//! sequence order through a single cursor. Continuation fragments are merged
//! into the node under the cursor until the next frame start shows up, at
//! which point the merged buffer is released as one frame.
//!
//! A gap at `cursor + 1` is polled rather than waited on:
//!
//! ```text
//! empty poll ──► lost++ timeout++
//!                  │
//!                  ├─ lost > nack_after && timeout <= skip_after ──► NACK(cursor+1), lost = 0
//!                  └─ lost > nack_after && timeout >  skip_after ──► jump to next key ≥ cursor+2
//! ```
//!
//! Liveness wins over completeness: everything jumped over is discarded.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, trace, warn};

use super::packet::{DataNode, PayloadType};
use crate::core::constants::{NACK_AFTER_POLLS, NODE_POOL_SIZE, SKIP_AFTER_POLLS};

/// Result of one [`SortedQueue::consume`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumed {
    /// Cursor not placed yet.
    Idle,
    /// `cursor + 1` has not arrived; counters advanced.
    Pending,
    /// A continuation fragment was appended; cursor advanced.
    Merged,
    /// A complete frame; cursor advanced to the next frame start.
    Frame(DataNode),
    /// Ask the peer to retransmit this sequence.
    Nack(u32),
    /// Cursor jumped forward to a frame start (`None` if none was buffered).
    Skipped {
        /// Sequence the cursor landed on.
        to: Option<u32>,
    },
}

#[derive(Debug)]
struct QueueState {
    pointer: Option<usize>,
    pool: Vec<Option<DataNode>>,
    lost: u32,
    timeout: u32,
}

impl QueueState {
    fn new() -> Self {
        Self {
            pointer: None,
            pool: vec![None; NODE_POOL_SIZE],
            lost: 0,
            timeout: 0,
        }
    }

    fn reset_counters(&mut self) {
        self.lost = 0;
        self.timeout = 0;
    }

    /// The node `offset` slots past `pos`, if it holds exactly `base + offset`.
    fn node_at(&self, pos: usize, base: u32, offset: usize) -> Option<&DataNode> {
        self.pool[(pos + offset) % NODE_POOL_SIZE]
            .as_ref()
            .filter(|node| node.sequence == base.wrapping_add(offset as u32))
    }

    /// Move the cursor to the first frame start at `pointer + from` or later,
    /// clearing every slot passed over.
    fn skip_to_key(&mut self, pos: usize, base: u32, from: usize) -> Option<u32> {
        self.reset_counters();

        let offset = (from..NODE_POOL_SIZE)
            .find(|&offset| self.node_at(pos, base, offset).is_some_and(|node| node.is_key))?;

        for passed in 0..offset {
            self.pool[(pos + passed) % NODE_POOL_SIZE] = None;
        }
        let target = (pos + offset) % NODE_POOL_SIZE;
        self.pointer = Some(target);
        Some(base.wrapping_add(offset as u32))
    }
}

/// Bounded reorder queue with loss-driven recovery.
///
/// One reader/writer lock guards the pool; it is never held across an await.
#[derive(Debug)]
pub struct SortedQueue {
    state: RwLock<QueueState>,
    nack_after: u32,
    skip_after: u32,
}

impl Default for SortedQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SortedQueue {
    /// Create a queue with the default recovery thresholds.
    pub fn new() -> Self {
        Self::with_thresholds(NACK_AFTER_POLLS, SKIP_AFTER_POLLS)
    }

    /// Create a queue with custom recovery thresholds.
    pub fn with_thresholds(nack_after: u32, skip_after: u32) -> Self {
        Self {
            state: RwLock::new(QueueState::new()),
            nack_after,
            skip_after,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, QueueState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sequence under the cursor.
    pub fn cursor(&self) -> Option<u32> {
        let state = self.read();
        state
            .pointer
            .and_then(|pos| state.pool[pos].as_ref())
            .map(|node| node.sequence)
    }

    /// Current `(lost, timeout)` counters.
    pub fn counters(&self) -> (u32, u32) {
        let state = self.read();
        (state.lost, state.timeout)
    }

    /// Check whether a node with this sequence is parked.
    pub fn contains(&self, sequence: u32) -> bool {
        let state = self.read();
        state.pool[sequence as usize % NODE_POOL_SIZE]
            .as_ref()
            .is_some_and(|node| node.sequence == sequence)
    }

    /// Park a received node.
    ///
    /// An occupied slot is overwritten (last writer wins). Nodes at or behind
    /// the cursor are late duplicates and are dropped. Sequence 1 places the
    /// cursor when none is set. Returns whether the node was stored.
    ///
    /// Known limitation: nothing but sequence 1 places the cursor, so if it is
    /// lost the queue stays [`Consumed::Idle`] and never asks for it again.
    pub fn product(&self, node: DataNode) -> bool {
        let mut state = self.write();

        if let Some(cursor) = state.pointer.and_then(|pos| state.pool[pos].as_ref()) {
            if (node.sequence.wrapping_sub(cursor.sequence) as i32) <= 0 {
                trace!(%node, cursor = cursor.sequence, "late node dropped");
                return false;
            }
        }

        let pos = node.sequence as usize % NODE_POOL_SIZE;
        if let Some(old) = &state.pool[pos] {
            debug!(%node, replaced = old.sequence, "pool slot overwritten");
        }
        if state.pointer.is_none() && node.sequence == 1 {
            debug!(%node, "found start sequence");
            state.pointer = Some(pos);
        }
        state.pool[pos] = Some(node);
        true
    }

    /// Advance the cursor by one step.
    ///
    /// A non-key node at `cursor + 1` of the same payload type is a
    /// continuation and is merged; the empty NACK filler merges into any type.
    /// A key node, or a non-key node of another type, ends the frame under the
    /// cursor. If that frame never had a start it is discarded and the cursor
    /// lands on `cursor + 1` directly, unlike the timeout skip which only
    /// considers `cursor + 2` onwards.
    pub fn consume(&self) -> Consumed {
        {
            let state = self.read();
            let Some(pos) = state.pointer else {
                return Consumed::Idle;
            };
            if state.pool[pos].is_none() {
                return Consumed::Idle;
            }
        }

        let mut state = self.write();
        let Some(pos) = state.pointer else {
            return Consumed::Idle;
        };
        let Some((base, cur_key)) = state.pool[pos].as_ref().map(|n| (n.sequence, n.is_key)) else {
            return Consumed::Idle;
        };
        let next_pos = (pos + 1) % NODE_POOL_SIZE;

        let cur_type = state.pool[pos].as_ref().map(|n| n.payload_type);
        let next = state
            .node_at(pos, base, 1)
            .map(|n| (n.is_key, n.payload_type));
        let Some((next_key, next_type)) = next else {
            state.lost += 1;
            state.timeout += 1;
            trace!(cursor = base, lost = state.lost, timeout = state.timeout, "no next node");

            if state.lost > self.nack_after {
                if state.timeout <= self.skip_after {
                    state.lost = 0;
                    debug!(sequence = base.wrapping_add(1), "requesting retransmission");
                    return Consumed::Nack(base.wrapping_add(1));
                }
                let to = state.skip_to_key(pos, base, 2);
                warn!(cursor = base, ?to, "retransmission timed out, skipping forward");
                return Consumed::Skipped { to };
            }
            return Consumed::Pending;
        };

        // a continuation of another payload type is a frame boundary, only
        // the empty NACK filler merges across types
        let continues = !next_key && (next_type == PayloadType::Nack || Some(next_type) == cur_type);
        if continues {
            let Some(cur) = state.pool[pos].take() else {
                return Consumed::Idle;
            };
            if let Some(next) = state.pool[next_pos].as_mut() {
                let mut payload = cur.payload;
                payload.append(&mut next.payload);
                next.payload = payload;
                next.is_key = cur.is_key;
                next.payload_type = cur.payload_type;
                trace!(merged = %next, "continuation merged");
            }
            state.pointer = Some(next_pos);
            state.reset_counters();
            return Consumed::Merged;
        }

        state.reset_counters();
        let cur = state.pool[pos].take();
        state.pointer = Some(next_pos);

        match cur {
            Some(cur) if cur_key => Consumed::Frame(cur),
            _ => {
                debug!(cursor = base, "orphan fragment without frame start, skipped");
                Consumed::Skipped {
                    to: Some(base.wrapping_add(1)),
                }
            }
        }
    }

    /// Drop every parked node and unset the cursor.
    pub fn reset(&self) {
        *self.write() = QueueState::new();
    }
}

//! Transport configuration.

use crate::core::constants::{
    DEFAULT_TRANSPORT_MTU, NACK_AFTER_POLLS, NODE_POOL_SIZE, PACKET_HEADER_SIZE, SKIP_AFTER_POLLS,
};

/// Sequenced transport configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// Largest datagram written or read, header included.
    pub mtu: usize,
    /// Empty polls before a NACK is sent.
    pub nack_after: u32,
    /// Empty polls before skipping to the next keyframe.
    pub skip_after: u32,
    /// Pending retransmissions held for the writer loops.
    pub resend_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_TRANSPORT_MTU,
            nack_after: NACK_AFTER_POLLS,
            skip_after: SKIP_AFTER_POLLS,
            resend_capacity: NODE_POOL_SIZE,
        }
    }
}

impl TransportConfig {
    /// Payload bytes carried per datagram, at least one.
    pub fn slice_size(&self) -> usize {
        self.mtu.saturating_sub(PACKET_HEADER_SIZE).max(1)
    }

    /// Raise values that leave no room for payload or queueing to their
    /// minimum. Applied by every connection, so literal configs are safe.
    pub fn sanitized(self) -> Self {
        Self {
            mtu: self.mtu.max(PACKET_HEADER_SIZE + 1),
            resend_capacity: self.resend_capacity.max(1),
            ..self
        }
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the datagram size. Values that leave no room for payload are raised
    /// to header + 1.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.config.mtu = mtu.max(PACKET_HEADER_SIZE + 1);
        self
    }

    /// Set the empty-poll count that triggers a NACK.
    pub fn nack_after(mut self, polls: u32) -> Self {
        self.config.nack_after = polls;
        self
    }

    /// Set the empty-poll count that triggers a skip to the next keyframe.
    pub fn skip_after(mut self, polls: u32) -> Self {
        self.config.skip_after = polls;
        self
    }

    /// Set the retransmission queue capacity.
    pub fn resend_capacity(mut self, capacity: usize) -> Self {
        self.config.resend_capacity = capacity.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TransportConfig {
        self.config.sanitized()
    }
}

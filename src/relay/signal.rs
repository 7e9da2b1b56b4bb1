//! Signaling messages exchanged with the relay.

use std::fmt;

/// Offer or answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdpKind {
    /// Session offer.
    Offer,
    /// Session answer.
    Answer,
}

/// A session description, opaque to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Offer or answer.
    pub kind: SdpKind,
    /// Description body.
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Which side of the call an offer comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// Opens a new tunnel.
    CallerOffer,
    /// Joins an existing tunnel.
    CalleeOffer,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallerOffer => f.write_str("caller-offer"),
            Self::CalleeOffer => f.write_str("callee-offer"),
        }
    }
}

/// Offer addressed to one tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSignal {
    /// Tunnel id shared by both sides of a call.
    pub sid: String,
    /// Caller or callee.
    pub kind: SignalKind,
    /// The offer.
    pub sdp: SessionDescription,
}

impl SessionSignal {
    /// Caller offer opening tunnel `sid`.
    pub fn caller_offer(sid: impl Into<String>, sdp: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            kind: SignalKind::CallerOffer,
            sdp: SessionDescription::offer(sdp),
        }
    }

    /// Callee offer joining tunnel `sid`.
    pub fn callee_offer(sid: impl Into<String>, sdp: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            kind: SignalKind::CalleeOffer,
            sdp: SessionDescription::offer(sdp),
        }
    }
}

//! Sequenced transport with NACK recovery.
//!
//! Media is carried in datagrams prefixed with a 5-byte header: a sequence
//! number shared by every payload type, then the type itself. The receiver
//! reorders arrivals in a [`SortedQueue`], merges continuation fragments back
//! into frames, asks for missing sequences and eventually skips forward to the
//! next keyframe when they do not come back.
//!
//! ```text
//! ┌──────────────┐   send_with_seq_and_type    ┌──────────────┐
//! │ CallSession  │ ──────────────────────────► │  SendCache   │
//! │  writers     │        [seq|type|data]      └──────┬───────┘
//! └──────┬───────┘                                    │ resend
//!        ▼                                            │
//!   PacketConn  ◄──────────────── NACK(seq) ──────────┘
//!        │
//!        ▼
//! ┌──────────────┐  consume   ┌──────────────┐
//! │ SortedQueue  │ ─────────► │  MediaFrame  │
//! └──────────────┘            └──────────────┘
//! ```

mod cache;
mod config;
mod conn;
mod packet;
mod queue;
mod session;

pub use cache::SendCache;
pub use config::{TransportConfig, TransportConfigBuilder};
pub use conn::QueueConn;
pub use packet::{DataNode, MediaFrame, PacketHeader, PayloadType, is_frame_start};
pub use queue::{Consumed, SortedQueue};
pub use session::{CallSession, KeyFrameGate};

//! Frame slicer and reassembler.
//!
//! Encoded video frames larger than the path MTU are split into slices, each
//! prefixed with an 8-byte [`FrameHeader`]. The receive side routes slices into
//! a 64-slot [`FrameRing`] and emits a frame once all of its slices are in.
//!
//! ```text
//! frame (5000 bytes, mtu 1400)
//!   ├── [id=1 count=4 index=0 len=1400] ....
//!   ├── [id=1 count=4 index=1 len=1400] ....
//!   ├── [id=1 count=4 index=2 len=1400] ....
//!   └── [id=1 count=4 index=3 len=800]  ....
//! ```

mod conn;
mod header;
mod ring;

pub use conn::{SliceConn, SlicerConfig, frame_write};
pub use header::{FrameHeader, Slice};
pub use ring::{FrameRing, ReceiveFrame, SliceOutcome};

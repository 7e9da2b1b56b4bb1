//! Datagram connections carrying slicer and transport packets.
//!
//! - [`RelaySocket`]: connected tokio UDP socket
//! - [`MemoryConn`]: in-memory pipe with simulated loss, for tests and local loops

mod memory;
mod socket;

pub use memory::MemoryConn;
pub use socket::{RelaySocket, RelaySocketBuilder};

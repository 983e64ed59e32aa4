//! Transport layer module for the MID sensor hub
//!
//! This crate provides the byte-stream transport used to talk to the hub,
//! with serial (RS-485 adapter) and UDP implementations plus an in-memory
//! transport for tests and hub simulators.

pub mod error;
pub mod hub;
pub mod memory;
pub mod serial;
pub mod stream;
pub mod udp;

pub use error::{MidError, MidResult};
pub use hub::HubTransport;
pub use memory::MemoryTransport;
pub use serial::{SerialSettings, SerialTransport};
pub use stream::{StreamAccessor, TransportLayer};
pub use udp::{UdpSettings, UdpTransport, MAX_UDP_PAYLOAD_SIZE};

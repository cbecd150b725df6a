//! ALDL Protocol Implementation
//!
//! This crate describes what to poll from an ALDL-equipped ECM and how to
//! talk to it: communication definitions, request framing, the transport
//! trait the acquisition loop drives, a blocking serial transport and a
//! scripted mock.

mod error;
mod mock;
mod packet;
mod request;
mod serial;
mod transport;

pub use error::AldlError;
pub use mock::{MockReply, MockTransport};
pub use packet::{CommConfig, CommDefinition, PacketConfig, PacketDefinition, MIN_PACKET_LENGTH};
pub use request::{cmp_bytestring, generate_mode, generate_request, hex_string};
pub use serial::{SerialConfig, SerialTransport, DEFAULT_BAUD_RATE};
pub use transport::Transport;

/// ALDL mode constants
pub mod mode {
    /// Transmit a data message
    pub const TRANSMIT: u8 = 0x01;
    /// Silence normal bus chatter
    pub const SILENCE: u8 = 0x08;
    /// Resume normal bus chatter
    pub const RESUME: u8 = 0x09;
}

//! ALDL Packet Validation
//!
//! Pure checks applied to every packet received from the bus: the trailing
//! checksum byte and an optional header sanity pre-filter. Malformed input is
//! reported as invalid, never as a panic.

mod checksum;
mod error;
mod validator;

pub use checksum::{
    calc_msglength, checksum_generate, checksum_residue, checksum_test,
    MSGLENGTH_OFFSET,
};
pub use error::ValidationError;
pub use validator::{header_sanity_check, PacketValidator, ValidationConfig, DEFAULT_DEVICE_ADDRESS};

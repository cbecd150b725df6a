//! Validation Error Types

use thiserror::Error;

/// Reasons a received packet is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Leading byte is not the device address
    #[error("Header mismatch: expected {expected:02X}, got {}", fmt_actual(.actual))]
    HeaderMismatch { expected: u8, actual: Option<u8> },

    /// Bytes do not sum to zero
    #[error("Checksum mismatch: residue {residue:02X}")]
    ChecksumMismatch { residue: u8 },

    /// Fewer bytes than the packet length
    #[error("Invalid length: expected {expected} bytes, have {available}")]
    InvalidLength { expected: usize, available: usize },
}

fn fmt_actual(actual: &Option<u8>) -> String {
    match actual {
        Some(byte) => format!("{byte:02X}"),
        None => "nothing".to_string(),
    }
}

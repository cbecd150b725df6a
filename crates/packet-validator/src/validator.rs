//! Packet Validator

use crate::checksum::{checksum_residue, checksum_test};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Default ECM address on the bus
pub const DEFAULT_DEVICE_ADDRESS: u8 = 0xF4;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Address expected in the first byte of every response
    pub device_address: u8,
    /// Reject responses whose first byte is not `device_address`
    pub check_header: bool,
    /// Verify the trailing checksum byte
    pub verify_checksum: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            device_address: DEFAULT_DEVICE_ADDRESS,
            check_header: false,
            verify_checksum: true,
        }
    }
}

/// Leading address byte check
///
/// This is cheap and catches garbage before the checksum pass.
pub fn header_sanity_check(buf: &[u8], expected_address: u8) -> bool {
    buf.first() == Some(&expected_address)
}

/// Validator for received packets
#[derive(Debug, Clone)]
pub struct PacketValidator {
    config: ValidationConfig,
}

impl PacketValidator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Current configuration
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Check the header byte if header checking is enabled
    pub fn validate_header(&self, buf: &[u8]) -> Result<(), ValidationError> {
        if !self.config.check_header || header_sanity_check(buf, self.config.device_address) {
            return Ok(());
        }
        Err(ValidationError::HeaderMismatch {
            expected: self.config.device_address,
            actual: buf.first().copied(),
        })
    }

    /// Check the checksum of the first `length` bytes if checksums are enabled
    pub fn validate_checksum(&self, buf: &[u8], length: usize) -> Result<(), ValidationError> {
        if !self.config.verify_checksum {
            return Ok(());
        }
        if buf.len() < length {
            return Err(ValidationError::InvalidLength {
                expected: length,
                available: buf.len(),
            });
        }
        if checksum_test(buf, length) {
            Ok(())
        } else {
            Err(ValidationError::ChecksumMismatch {
                residue: checksum_residue(buf, length),
            })
        }
    }

    /// Run the header check, then the checksum check
    pub fn validate(&self, buf: &[u8], length: usize) -> Result<(), ValidationError> {
        self.validate_header(buf)?;
        self.validate_checksum(buf, length)?;
        trace!("packet of {} bytes validated", length);
        Ok(())
    }
}

impl Default for PacketValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

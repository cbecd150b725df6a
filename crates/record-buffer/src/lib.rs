//! Record History
//!
//! Completed snapshots are appended by a single producer and read by any
//! number of consumers, each at its own pace. Records are immutable once
//! appended and handed out as shared handles; consumers track their position
//! by sequence number only.

mod buffer;
mod cursor;
mod policy;

pub use buffer::{RecordBuffer, RecordHandle};
pub use cursor::Cursor;
pub use policy::RetentionPolicy;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record buffer errors
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Invalid retention policy: {0}")]
    InvalidPolicy(String),
    #[error("Record codec error: {0}")]
    Codec(String),
}

impl From<postcard::Error> for BufferError {
    fn from(err: postcard::Error) -> Self {
        BufferError::Codec(err.to_string())
    }
}

/// One packet's bytes as of snapshot time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketSnapshot {
    /// Raw response bytes
    pub data: Vec<u8>,
    /// Whether `data` passed validation
    pub clean: bool,
}

/// Snapshot of every packet in the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Position in the history, strictly increasing
    pub sequence: u64,
    /// Assembly time (Unix ms)
    pub timestamp_ms: u64,
    /// One entry per packet definition, in table order
    pub packets: Vec<PacketSnapshot>,
}

impl Record {
    /// Snapshot of the packet at `index`
    pub fn packet(&self, index: usize) -> Option<&PacketSnapshot> {
        self.packets.get(index)
    }

    /// Whether every packet in the record is clean
    pub fn is_clean(&self) -> bool {
        self.packets.iter().all(|p| p.clean)
    }

    /// Encode for an external logger
    pub fn to_bytes(&self) -> Result<Vec<u8>, BufferError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Decode a record produced by [`Record::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BufferError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_codec() {
        let record = Record {
            sequence: 42,
            timestamp_ms: 1_700_000_000_000,
            packets: vec![
                PacketSnapshot {
                    data: vec![0xF4, 0x92, 0x01, 0x79],
                    clean: true,
                },
                PacketSnapshot::default(),
            ],
        };
        let bytes = record.to_bytes().unwrap();
        assert_eq!(Record::from_bytes(&bytes).unwrap(), record);
        assert!(!record.is_clean());
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        assert!(matches!(
            Record::from_bytes(&[0x2A]),
            Err(BufferError::Codec(_))
        ));
    }
}

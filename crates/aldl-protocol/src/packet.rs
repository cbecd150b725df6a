//! Communication and Packet Definitions
//!
//! A communication definition is the packet table for one ECM: which
//! messages to request, how long each response is, and how often to poll it.

use crate::error::AldlError;
use crate::mode;
use crate::request::generate_request;
use packet_validator::DEFAULT_DEVICE_ADDRESS;
use serde::{Deserialize, Serialize};

/// Address byte, length byte and checksum byte
pub const MIN_PACKET_LENGTH: usize = 3;

/// Configuration for one packet in the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketConfig {
    /// Name used for index lookups by consumers
    pub name: String,
    /// Message number sent in the request
    pub id: u8,
    /// Request mode (default: mode 1, transmit data)
    #[serde(default = "default_mode")]
    pub mode: u8,
    /// Expected response length including header and checksum
    pub length: usize,
    /// Polling divisor: 1 = every pass, N = every Nth pass, 0 = never
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    /// Re-poll immediately after a failed response
    #[serde(default)]
    pub retry: bool,
}

fn default_mode() -> u8 {
    mode::TRANSMIT
}

fn default_frequency() -> u32 {
    1
}

impl PacketConfig {
    /// Create a mode 1 packet polled every pass
    pub fn new(name: &str, id: u8, length: usize) -> Self {
        Self {
            name: name.to_string(),
            id,
            mode: mode::TRANSMIT,
            length,
            frequency: 1,
            retry: false,
        }
    }

    /// Set the polling divisor
    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Enable or disable immediate retry
    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for a communication definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommConfig {
    /// ECM address, also the expected first byte of each response
    pub device_address: u8,
    /// Verify response checksums
    pub checksum_enable: bool,
    /// Packet table, polled in order
    pub packets: Vec<PacketConfig>,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            device_address: DEFAULT_DEVICE_ADDRESS,
            checksum_enable: true,
            // Mode 1 message 0: 64 data bytes on most 8192 baud ECMs
            packets: vec![PacketConfig::new("main", 0x00, 67)],
        }
    }
}

/// One packet of the table, with its most recently received bytes
#[derive(Debug, Clone)]
pub struct PacketDefinition {
    config: PacketConfig,
    command: Vec<u8>,
    data: Vec<u8>,
    clean: bool,
}

impl PacketDefinition {
    fn new(config: PacketConfig, device_address: u8) -> Self {
        let command = generate_request(device_address, config.mode, config.id);
        let data = vec![0; config.length];
        Self {
            config,
            command,
            data,
            clean: false,
        }
    }

    /// Packet name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Message number
    pub fn id(&self) -> u8 {
        self.config.id
    }

    /// Expected response length
    pub fn length(&self) -> usize {
        self.config.length
    }

    /// Polling divisor
    pub fn frequency(&self) -> u32 {
        self.config.frequency
    }

    /// Whether a failure is retried immediately
    pub fn retry(&self) -> bool {
        self.config.retry
    }

    /// Precomputed request frame
    pub fn command(&self) -> &[u8] {
        &self.command
    }

    /// Most recently received bytes, valid or not
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether `data` passed validation
    pub fn is_clean(&self) -> bool {
        self.clean
    }

    /// Overwrite the data buffer in place
    ///
    /// The buffer keeps the configured length: short responses leave the
    /// tail from the previous poll, long ones are cut off.
    pub fn store(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.data.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
    }

    /// Mark the data buffer as valid or not
    pub fn set_clean(&mut self, clean: bool) {
        self.clean = clean;
    }

    /// Underlying configuration
    pub fn config(&self) -> &PacketConfig {
        &self.config
    }
}

/// Packet table for one ECM
#[derive(Debug, Clone)]
pub struct CommDefinition {
    packets: Vec<PacketDefinition>,
    device_address: u8,
    checksum_enable: bool,
}

impl CommDefinition {
    /// Build and validate a definition
    pub fn new(config: CommConfig) -> Result<Self, AldlError> {
        if config.packets.is_empty() {
            return Err(AldlError::InvalidDefinition(
                "at least one packet is required".to_string(),
            ));
        }
        for (i, packet) in config.packets.iter().enumerate() {
            if packet.length < MIN_PACKET_LENGTH {
                return Err(AldlError::InvalidDefinition(format!(
                    "packet {} ({}) length {} is below the minimum of {}",
                    i, packet.name, packet.length, MIN_PACKET_LENGTH
                )));
            }
            if config.packets[..i].iter().any(|p| p.name == packet.name) {
                return Err(AldlError::InvalidDefinition(format!(
                    "duplicate packet name {}",
                    packet.name
                )));
            }
        }

        let packets = config
            .packets
            .into_iter()
            .map(|p| PacketDefinition::new(p, config.device_address))
            .collect();

        Ok(Self {
            packets,
            device_address: config.device_address,
            checksum_enable: config.checksum_enable,
        })
    }

    /// Packet table in polling order
    pub fn packets(&self) -> &[PacketDefinition] {
        &self.packets
    }

    /// Mutable packet table, for the acquisition loop
    pub fn packets_mut(&mut self) -> &mut [PacketDefinition] {
        &mut self.packets
    }

    /// Packet at `index`
    pub fn packet(&self, index: usize) -> Option<&PacketDefinition> {
        self.packets.get(index)
    }

    /// Number of packets
    pub fn n_packets(&self) -> usize {
        self.packets.len()
    }

    /// ECM address
    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    /// Whether checksums are verified
    pub fn checksum_enable(&self) -> bool {
        self.checksum_enable
    }

    /// Index of the packet named `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.packets.iter().position(|p| p.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_packets() -> CommConfig {
        CommConfig {
            packets: vec![
                PacketConfig::new("fast", 0x00, 10),
                PacketConfig::new("slow", 0x01, 6).with_frequency(4),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_definition_builds_commands() {
        let comm = CommDefinition::new(two_packets()).unwrap();
        assert_eq!(comm.n_packets(), 2);
        assert_eq!(comm.packets()[0].command(), &[0xF4, 0x57, 0x01, 0x00, 0xB4]);
        assert_eq!(comm.packets()[1].frequency(), 4);
        assert_eq!(comm.packets()[1].data().len(), 6);
        assert!(!comm.packets()[1].is_clean());
    }

    #[test]
    fn test_empty_table_rejected() {
        let config = CommConfig {
            packets: vec![],
            ..Default::default()
        };
        assert!(matches!(
            CommDefinition::new(config),
            Err(AldlError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_short_packet_rejected() {
        let config = CommConfig {
            packets: vec![PacketConfig::new("tiny", 0x00, 2)],
            ..Default::default()
        };
        assert!(CommDefinition::new(config).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = CommConfig {
            packets: vec![
                PacketConfig::new("a", 0x00, 10),
                PacketConfig::new("a", 0x01, 10),
            ],
            ..Default::default()
        };
        assert!(CommDefinition::new(config).is_err());
    }

    #[test]
    fn test_index_of() {
        let comm = CommDefinition::new(two_packets()).unwrap();
        assert_eq!(comm.index_of("slow"), Some(1));
        assert_eq!(comm.index_of("missing"), None);
    }

    #[test]
    fn test_store_keeps_length() {
        let mut comm = CommDefinition::new(two_packets()).unwrap();
        let packet = &mut comm.packets_mut()[1];
        packet.store(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(packet.data(), &[1, 2, 3, 4, 5, 6]);
        packet.store(&[9, 9]);
        assert_eq!(packet.data(), &[9, 9, 3, 4, 5, 6]);
    }
}

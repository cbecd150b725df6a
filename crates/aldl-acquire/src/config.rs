//! Acquisition Configuration

use serde::{Deserialize, Serialize};

/// When the loop assembles a record from the packet buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotCadence {
    /// One record after every pass that polled at least one packet
    PerPass,
    /// One record every N polled packets, whatever their outcome
    EveryPackets(u32),
}

impl Default for SnapshotCadence {
    fn default() -> Self {
        SnapshotCadence::PerPass
    }
}

/// Configuration for the acquisition loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    /// Consecutive failures tolerated before the link is declared lost (default: 10)
    pub max_fail_disconnect: u32,
    /// Reject responses whose first byte is not the device address
    pub check_header: bool,
    /// Publish a packets-per-second figure
    pub track_throughput: bool,
    /// Throughput averaging window in milliseconds
    pub throughput_window_ms: u64,
    /// Record assembly cadence
    pub snapshot: SnapshotCadence,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            max_fail_disconnect: 10,
            check_header: false,
            track_throughput: true,
            throughput_window_ms: 5000,
            snapshot: SnapshotCadence::PerPass,
        }
    }
}

//! ALDL Acquisition Engine
//!
//! Drives a diagnostic bus from a single producer thread: per-packet
//! frequency scheduling, immediate retry, failure-streak desync detection
//! and reconnect. Completed snapshots land in a shared record history that
//! any number of consumers read at their own pace.

mod acquire;
mod config;
mod connection;
mod error;
mod observer;
mod scheduler;
mod session;
mod stats;

pub use acquire::{AcquisitionHandle, AcquisitionLoop, StepOutcome};
pub use config::{AcquireConfig, SnapshotCadence};
pub use connection::{ConnectionMonitor, ConnectionState};
pub use error::AcquireError;
pub use observer::{AcquisitionObserver, FailureKind, PacketEvent, PacketOutcome};
pub use scheduler::FrequencyScheduler;
pub use session::Session;
pub use stats::{Statistics, StatsAggregator};

//! Per-packet observers
//!
//! Observers run on the acquisition thread after every processed packet,
//! whatever its outcome. They must return quickly; a slow observer slows the
//! bus.

use crate::connection::ConnectionState;
use crate::session::Session;
use aldl_protocol::PacketDefinition;
use serde::{Deserialize, Serialize};

/// Why a packet exchange failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// No response before the transport timed out
    TransportTimeout,
    /// Response did not start with the device address
    HeaderMismatch,
    /// Response failed checksum verification
    ChecksumMismatch,
}

impl FailureKind {
    /// Short label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransportTimeout => "timeout",
            FailureKind::HeaderMismatch => "header mismatch",
            FailureKind::ChecksumMismatch => "checksum mismatch",
        }
    }
}

/// Result of one packet exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketOutcome {
    /// Response stored and marked clean
    Ok,
    /// Response missing or rejected
    Failed(FailureKind),
}

impl PacketOutcome {
    /// Whether the exchange succeeded
    pub fn is_ok(&self) -> bool {
        matches!(self, PacketOutcome::Ok)
    }
}

/// What an observer sees after one packet step
pub struct PacketEvent<'a> {
    /// Position of the packet in the table
    pub index: usize,
    /// Packet as it stands after the exchange
    pub packet: &'a PacketDefinition,
    /// Exchange result
    pub outcome: PacketOutcome,
    /// The same packet will be re-polled on the next step
    pub retry_pending: bool,
    /// Connection state after the exchange
    pub state: ConnectionState,
    /// Session the loop is feeding
    pub session: &'a Session,
}

/// Hook invoked once per processed packet
pub trait AcquisitionObserver: Send {
    fn on_packet(&mut self, event: &PacketEvent<'_>);
}

/// Adapter running a closure as an observer
pub(crate) struct FnObserver<F>(pub(crate) F);

impl<F> AcquisitionObserver for FnObserver<F>
where
    F: FnMut(&PacketEvent<'_>) + Send,
{
    fn on_packet(&mut self, event: &PacketEvent<'_>) {
        (self.0)(event)
    }
}

//! Transport Boundary
//!
//! The acquisition loop drives the bus only through this trait. Both calls
//! block; a timed out request is reported as an error, never retried here.

use crate::error::AldlError;
use crate::packet::PacketDefinition;

/// Byte-level access to the diagnostic bus
pub trait Transport: Send {
    /// Put the ECM into diagnostic mode, discarding any stale input
    fn reconnect(&mut self) -> Result<(), AldlError>;

    /// Send the packet's request and read its response
    fn request_packet(&mut self, packet: &PacketDefinition) -> Result<Vec<u8>, AldlError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn reconnect(&mut self) -> Result<(), AldlError> {
        (**self).reconnect()
    }

    fn request_packet(&mut self, packet: &PacketDefinition) -> Result<Vec<u8>, AldlError> {
        (**self).request_packet(packet)
    }
}

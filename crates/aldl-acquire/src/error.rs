//! Acquisition errors

use aldl_protocol::AldlError;
use record_buffer::BufferError;
use thiserror::Error;

/// Acquisition errors
///
/// Only raised while setting a session up or tearing the loop down. Bus
/// failures never surface here; they are counted and resolved in the loop.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Invalid communication definition: {0}")]
    Definition(#[from] AldlError),
    #[error("Record buffer error: {0}")]
    Buffer(#[from] BufferError),
    #[error("Session already has a producer attached")]
    ProducerAttached,
    #[error("Failed to spawn acquisition thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Acquisition thread panicked")]
    Panicked,
}

//! ALDL Error Types

use thiserror::Error;

/// Errors that can occur during ALDL communication
#[derive(Debug, Error)]
pub enum AldlError {
    /// Serial port connection error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// No response within the read window
    #[error("Timeout waiting for ALDL response")]
    Timeout,

    /// Our own transmission did not come back on the single-wire bus
    #[error("Echo mismatch: sent {sent}, read {read}")]
    EchoMismatch { sent: String, read: String },

    /// Communication definition failed validation
    #[error("Invalid communication definition: {0}")]
    InvalidDefinition(String),

    /// Request issued before the transport was opened
    #[error("ALDL transport not connected")]
    NotConnected,
}

impl From<std::io::Error> for AldlError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => AldlError::Timeout,
            _ => AldlError::SerialError(err.to_string()),
        }
    }
}

impl From<tokio_serial::Error> for AldlError {
    fn from(err: tokio_serial::Error) -> Self {
        AldlError::SerialError(err.to_string())
    }
}

//! Core error type for all APDU operations

use crate::response::status::StatusWord;

/// Result type for APDU operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Failed to transmit data
    #[error("Transmission error: {0}")]
    TransmissionError(String),

    /// Parse error when processing response
    #[error("Parse error: {0}")]
    ParseError(&'static str),

    /// Status error from response
    #[error("Status error {status}, message: {message:?}")]
    StatusError {
        /// Status word that caused the error
        status: StatusWord,
        /// Optional error message
        message: Option<&'static str>,
    },

    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),
}

impl Error {
    /// Create a new transmission error
    pub fn transmission<S: Into<String>>(message: S) -> Self {
        Self::TransmissionError(message.into())
    }

    /// Create a new parse error
    pub const fn parse(message: &'static str) -> Self {
        Self::ParseError(message)
    }
}

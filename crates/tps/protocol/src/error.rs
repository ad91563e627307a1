use thiserror::Error;

use crate::MessageType;

/// Result type for client protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for client protocol operations
#[derive(Debug, Error)]
pub enum Error {
    /// Reading from or writing to the client failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client closed the connection
    #[error("Connection closed by client")]
    Closed,

    /// A frame or field could not be decoded
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A message type number no side defines
    #[error("Unknown message type: {0}")]
    UnknownMessageType(u32),

    /// The client answered with a different message than the one awaited
    #[error("Expected {expected} message, received {actual}")]
    UnexpectedMessage {
        /// Awaited message type
        expected: MessageType,
        /// Received message type
        actual: MessageType,
    },
}

impl Error {
    /// Build a [`Error::Malformed`]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

impl From<Error> for tps_apdu_core::Error {
    fn from(error: Error) -> Self {
        Self::transmission(error.to_string())
    }
}

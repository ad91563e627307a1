use iso7816_tlv::TlvError;
use thiserror::Error;
use tps_apdu_core::StatusWord;

/// Result type for GlobalPlatform operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for GlobalPlatform operations
#[derive(Debug, Error)]
pub enum Error {
    /// APDU exchange or transport failure
    #[error(transparent)]
    Apdu(#[from] tps_apdu_core::Error),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(&'static str),

    /// Invalid or unsupported data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(&'static str),

    /// Malformed BER-TLV data
    #[error("TLV error: {0}")]
    Tlv(TlvError),

    /// Wrong data length
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// INITIALIZE UPDATE answered with a length no protocol produces
    #[error("Unexpected INITIALIZE UPDATE response length: {0}")]
    InitializeUpdateLength(usize),

    /// Unsupported secure channel protocol
    #[error("Unsupported secure channel protocol: {0:#04x}")]
    UnsupportedProtocol(u8),

    /// The channel was used before EXTERNAL AUTHENTICATE completed
    #[error("Secure channel not authenticated")]
    NotAuthenticated,

    /// The card rejected a command
    #[error("{operation} failed with status {status} ({})", .status.description())]
    CardStatus {
        /// Name of the failed operation
        operation: &'static str,
        /// Status word returned by the card
        status: StatusWord,
    },

    /// CAP file error
    #[error("CAP file error: {0}")]
    CapFile(&'static str),

    /// I/O error while reading a load file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TlvError> for Error {
    fn from(error: TlvError) -> Self {
        Self::Tlv(error)
    }
}

impl Error {
    /// Status word carried by a card rejection, if any
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::CardStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

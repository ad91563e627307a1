use derive_more::Display;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Status code reported to the client in END_OP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[repr(u32)]
pub enum EndOpStatus {
    /// Operation completed
    #[display("success")]
    Success = 0,
    /// Operation not serviced here
    #[display("bad status")]
    BadStatus = 9,
    /// Client or card connection failed
    #[display("connection error")]
    Connection = 13,
    /// User could not be authenticated
    #[display("login error")]
    Login = 14,
    /// Token database failure
    #[display("token database error")]
    TokenDatabase = 15,
    /// Token is disabled
    #[display("disabled token")]
    DisabledToken = 16,
    /// Secure channel could not be established or used
    #[display("secure channel error")]
    SecureChannel = 17,
    /// Configuration lookup failed
    #[display("misconfiguration")]
    Misconfiguration = 18,
    /// Applet upgrade failed
    #[display("upgrade applet error")]
    UpgradeApplet = 19,
    /// Key changeover failed
    #[display("key changeover error")]
    KeyChangeover = 20,
    /// Token is not known to the database
    #[display("unknown token")]
    UnknownToken = 28,
}

impl EndOpStatus {
    /// Numeric code sent on the wire
    pub const fn code(self) -> u32 {
        self as u32
    }
}

/// The protocol error every engine step surfaces
#[derive(Debug, Error)]
pub enum Error {
    /// Secure channel setup, sanity check or wrapped command failure
    #[error("Secure channel error: {0}")]
    SecureChannel(String),

    /// Missing or malformed configuration
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Applet upgrade failed
    #[error("Applet upgrade failed: {0}")]
    UpgradeApplet(String),

    /// Key changeover failed
    #[error("Key changeover failed: {0}")]
    KeyChangeover(String),

    /// Login failed
    #[error("Login failed: {0}")]
    Login(String),

    /// The client connection or APDU exchange failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Token database failure
    #[error("Token database error: {0}")]
    TokenDatabase(String),

    /// The token may not be used
    #[error("Token disabled: {0}")]
    DisabledToken(String),

    /// The token is not known and unknown tokens are not allowed
    #[error("Unknown token: {0}")]
    UnknownToken(String),

    /// Operation not supported by this server
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl Error {
    /// END_OP status code for this error
    pub const fn status(&self) -> EndOpStatus {
        match self {
            Self::SecureChannel(_) => EndOpStatus::SecureChannel,
            Self::Misconfiguration(_) => EndOpStatus::Misconfiguration,
            Self::UpgradeApplet(_) => EndOpStatus::UpgradeApplet,
            Self::KeyChangeover(_) => EndOpStatus::KeyChangeover,
            Self::Login(_) => EndOpStatus::Login,
            Self::Connection(_) => EndOpStatus::Connection,
            Self::TokenDatabase(_) => EndOpStatus::TokenDatabase,
            Self::DisabledToken(_) => EndOpStatus::DisabledToken,
            Self::UnknownToken(_) => EndOpStatus::UnknownToken,
            Self::UnsupportedOperation(_) => EndOpStatus::BadStatus,
        }
    }

    /// Convert a GlobalPlatform failure, keeping transport failures as
    /// [`Error::Connection`] and turning everything else into `other`
    pub fn from_gp(
        error: tps_apdu_globalplatform::Error,
        other: impl FnOnce(String) -> Self,
    ) -> Self {
        match error {
            tps_apdu_globalplatform::Error::Apdu(e) => Self::from(e),
            e => other(e.to_string()),
        }
    }
}

impl From<tps_apdu_core::Error> for Error {
    fn from(error: tps_apdu_core::Error) -> Self {
        Self::Connection(error.to_string())
    }
}

impl From<tps_apdu_globalplatform::Error> for Error {
    fn from(error: tps_apdu_globalplatform::Error) -> Self {
        Self::from_gp(error, Self::SecureChannel)
    }
}

impl From<tps_protocol::Error> for Error {
    fn from(error: tps_protocol::Error) -> Self {
        Self::Connection(error.to_string())
    }
}

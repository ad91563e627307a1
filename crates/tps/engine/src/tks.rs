//! Token Key Service interface
//!
//! The key service holds the master keys. It hands out random data, derives
//! session keys for a card and builds the PUT KEY payload for a new key set.
//! Session keys come back wrapped under the connection's shared secret; only
//! the key service ever sees raw master key material.

use std::fmt;

use bytes::Bytes;
use tps_apdu_globalplatform::{
    KeyInfo, Protocol, SessionKey,
    crypto::{self, Block8, HostChallenge},
};

use crate::{Error, Result};

/// Derivation constants for the four SCP02 session keys
pub mod scp02 {
    /// Encryption session key
    pub const ENC: [u8; 2] = [0x01, 0x82];
    /// C-MAC session key
    pub const CMAC: [u8; 2] = [0x01, 0x01];
    /// R-MAC session key
    pub const RMAC: [u8; 2] = [0x01, 0x02];
    /// Data encryption key
    pub const DEK: [u8; 2] = [0x01, 0x81];
}

/// Status the key service reports for a successful call
pub const STATUS_OK: u32 = 0;

/// A key service answer whose status must be checked before its payload is used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TksResponse<T> {
    /// Status reported by the key service
    pub status: u32,
    /// Payload, absent on failure
    pub data: Option<T>,
}

impl<T> TksResponse<T> {
    /// Successful answer
    pub const fn ok(data: T) -> Self {
        Self {
            status: STATUS_OK,
            data: Some(data),
        }
    }

    /// Failed answer with `status`
    pub const fn failed(status: u32) -> Self {
        Self { status, data: None }
    }

    /// Payload of a successful answer
    ///
    /// A non zero status, or a zero status without payload, becomes an error
    /// built by `error`.
    pub fn into_result(self, operation: &str, error: impl FnOnce(String) -> Error) -> Result<T> {
        match (self.status, self.data) {
            (STATUS_OK, Some(data)) => Ok(data),
            (STATUS_OK, None) => Err(error(format!("{operation} returned no data"))),
            (status, _) => Err(error(format!("{operation} failed with TKS status {status}"))),
        }
    }
}

/// Card data the key service derives session keys from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKeyRequest {
    /// Key diversification data from INITIALIZE UPDATE
    pub key_diversification_data: [u8; 10],
    /// Card unique identifier
    pub cuid: [u8; 10],
    /// Key set the card answered with
    pub key_info: KeyInfo,
    /// Card challenge (SCP02: sequence counter included)
    pub card_challenge: Bytes,
    /// Host challenge sent to the card
    pub host_challenge: HostChallenge,
    /// Card cryptogram
    pub card_cryptogram: Block8,
    /// Negotiated protocol
    pub protocol: Protocol,
    /// Master key set name
    pub key_set: String,
}

/// Session keys derived in a single round trip (SCP01, SCP03)
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedSessionKeys {
    /// Wrapped encryption session key
    pub enc: Bytes,
    /// Wrapped MAC session key
    pub mac: Bytes,
    /// Wrapped key-encryption key
    pub kek: Bytes,
    /// Host cryptogram for EXTERNAL AUTHENTICATE
    pub host_cryptogram: Block8,
}

impl fmt::Debug for WrappedSessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedSessionKeys")
            .field("host_cryptogram", &hex::encode_upper(self.host_cryptogram))
            .finish_non_exhaustive()
    }
}

/// Input for a new key set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySetRequest {
    /// Key version the new set is created for
    pub new_version: u8,
    /// Key set currently active on the card
    pub current_key_info: KeyInfo,
    /// Negotiated protocol
    pub protocol: Protocol,
    /// Card unique identifier
    pub cuid: [u8; 10],
    /// Key diversification data
    pub key_diversification_data: [u8; 10],
    /// Wrapped DEK (KEK) of the open channel
    pub wrapped_dek: Bytes,
    /// Master key set name
    pub key_set: String,
}

/// Client for one or more key service connections
///
/// The outer `Result` reports a failed call; the inner status reports what
/// the key service made of the request.
pub trait TksClient: Send + Sync + fmt::Debug {
    /// Random bytes generated by the key service
    fn compute_random_data(&self, connection: &str, size: usize) -> Result<TksResponse<Bytes>>;

    /// SCP01 session keys and host cryptogram
    fn compute_session_key(
        &self,
        connection: &str,
        request: &SessionKeyRequest,
    ) -> Result<TksResponse<WrappedSessionKeys>>;

    /// One wrapped SCP02 session key for `derivation_constant`
    fn compute_session_key_scp02(
        &self,
        connection: &str,
        request: &SessionKeyRequest,
        derivation_constant: [u8; 2],
    ) -> Result<TksResponse<Bytes>>;

    /// SCP03 session keys and host cryptogram
    fn compute_session_keys_scp03(
        &self,
        connection: &str,
        request: &SessionKeyRequest,
    ) -> Result<TksResponse<WrappedSessionKeys>>;

    /// PUT KEY payload for a new key set
    fn create_key_set_data(&self, connection: &str, request: &KeySetRequest)
    -> Result<TksResponse<Bytes>>;
}

/// Unwrap a session key received from the key service
pub fn unwrap_session_key(shared_secret: &[u8], wrapped: &[u8]) -> Result<SessionKey> {
    crypto::unwrap_key(shared_secret, wrapped)
        .map_err(|e| Error::SecureChannel(format!("cannot unwrap session key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_response_status_is_checked() {
        let ok = TksResponse::ok(Bytes::from_static(&[1, 2, 3]));
        assert_eq!(
            ok.into_result("compute random data", Error::SecureChannel).unwrap().as_ref(),
            &[1, 2, 3]
        );

        let failed: TksResponse<Bytes> = TksResponse::failed(4);
        let error = failed
            .into_result("create key set data", Error::KeyChangeover)
            .unwrap_err();
        assert!(matches!(error, Error::KeyChangeover(ref message) if message.contains("status 4")));

        let empty: TksResponse<Bytes> = TksResponse {
            status: STATUS_OK,
            data: None,
        };
        assert!(empty.into_result("compute session key", Error::SecureChannel).is_err());
    }

    #[test]
    fn test_unwrap_session_key() {
        let secret = hex!("404142434445464748494a4b4c4d4e4f");
        let key = SessionKey::new(hex!("00112233445566778899aabbccddeeff"));
        let wrapped = crypto::wrap_key(&secret, &key).unwrap();
        assert_eq!(unwrap_session_key(&secret, &wrapped).unwrap(), key);
        assert!(matches!(
            unwrap_session_key(&secret, &wrapped[..8]),
            Err(Error::SecureChannel(_))
        ));
    }
}

//! APDU response definitions
//!
//! This module provides the response half of an APDU exchange according to
//! ISO/IEC 7816-4.

pub mod status;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{Error, Result};
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data
    payload: Option<Bytes>,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: Option<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload,
            status: status.into(),
        }
    }

    /// Create a success response
    pub const fn success(payload: Option<Bytes>) -> Self {
        Self {
            payload,
            status: StatusWord::new(0x90, 0x00),
        }
    }

    /// Create an error response from a status word
    pub fn error(status: impl Into<StatusWord>) -> Self {
        Self {
            payload: None,
            status: status.into(),
        }
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let [payload @ .., sw1, sw2] = data else {
            return Err(Error::parse("response shorter than a status word"));
        };
        let status = StatusWord::new(*sw1, *sw2);
        let payload = (!payload.is_empty()).then(|| Bytes::copy_from_slice(payload));

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.as_ref().map_or(0, |p| p.len()),
            "Parsed APDU response"
        );

        Ok(Self { payload, status })
    }

    /// Serialize back to raw bytes, payload followed by the status word
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data().len() + 2);
        buf.put_slice(self.data());
        buf.put_u8(self.status.sw1);
        buf.put_u8(self.status.sw2);
        buf.freeze()
    }

    /// The status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// The payload, if the card returned one
    pub const fn payload(&self) -> &Option<Bytes> {
        &self.payload
    }

    /// The payload as a slice, empty when absent
    pub fn data(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// Universal success predicate: the card reported normal processing
    ///
    /// Callers must check this before trusting returned data.
    pub const fn check_result(&self) -> bool {
        self.status.is_success()
    }

    /// Convert into the payload, failing with the status word otherwise
    pub fn into_result(self) -> Result<Bytes> {
        if self.check_result() {
            Ok(self.payload.unwrap_or_default())
        } else {
            Err(Error::StatusError {
                status: self.status,
                message: Some(self.status.description()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_from_bytes() {
        let response = Response::from_bytes(&hex!("0102039000")).unwrap();
        assert!(response.check_result());
        assert_eq!(response.data(), &hex!("010203"));

        let response = Response::from_bytes(&hex!("6A82")).unwrap();
        assert!(!response.check_result());
        assert!(response.payload().is_none());
        assert_eq!(response.data(), &[] as &[u8]);

        assert!(Response::from_bytes(&hex!("90")).is_err());
    }

    #[test]
    fn test_to_bytes_keeps_status() {
        let raw = hex!("9F7F2A47909000");
        let response = Response::from_bytes(&raw).unwrap();
        assert_eq!(response.to_bytes().as_ref(), raw);
    }

    #[test]
    fn test_into_result() {
        let ok = Response::success(Some(Bytes::from_static(&[0xAA])));
        assert_eq!(ok.into_result().unwrap().as_ref(), &[0xAA]);

        let err = Response::error((0x69, 0x82)).into_result().unwrap_err();
        assert!(matches!(err, Error::StatusError { status, .. } if status.sw2 == 0x82));
    }
}

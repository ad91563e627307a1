//! Key-set identification
//!
//! A card reports which key set answered INITIALIZE UPDATE as two bytes
//! (version, index) for SCP01/02 and three for SCP03. The upper-case hex form
//! of those bytes is what the token database stores.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Identifies a key set on the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyInfo {
    /// Key version number
    pub version: u8,
    /// Key index
    pub index: u8,
    /// Third byte reported by SCP03 cards
    pub kek_index: Option<u8>,
}

impl KeyInfo {
    /// Key version cards ship with from the vendor
    pub const DEVELOPMENT_VERSION: u8 = 0xFF;

    /// Create a two byte key info
    pub const fn new(version: u8, index: u8) -> Self {
        Self {
            version,
            index,
            kek_index: None,
        }
    }

    /// Add the third SCP03 byte
    pub const fn with_kek_index(mut self, kek_index: u8) -> Self {
        self.kek_index = Some(kek_index);
        self
    }

    /// Parse from two or three raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match *bytes {
            [version, index] => Ok(Self::new(version, index)),
            [version, index, kek] => Ok(Self::new(version, index).with_kek_index(kek)),
            _ => Err(Error::InvalidLength {
                expected: 2,
                actual: bytes.len(),
            }),
        }
    }

    /// Raw byte form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.version, self.index];
        bytes.extend(self.kek_index);
        bytes
    }

    /// Upper-case hex form, e.g. `0101`
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.to_bytes())
    }
}

impl fmt::Display for KeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for KeyInfo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 4 && s.len() != 6 {
            return Err(Error::InvalidFormat("key info must be 4 or 6 hex digits"));
        }
        let bytes = hex::decode(s).map_err(|_| Error::InvalidFormat("key info is not hex"))?;
        Self::from_bytes(&bytes)
    }
}

//! Session key material for an open secure channel
//!
//! Session keys arrive from the key service wrapped under a transport key and
//! are unwrapped by the caller. Only the keys needed to protect commands are
//! held in the clear; the key-encryption key stays wrapped because this
//! process only ever forwards it back to the key service.

use std::fmt;

use bytes::Bytes;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Protocol, Result};

/// A 16 byte session key, wiped on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 16]);

impl SessionKey {
    /// Length of every session key
    pub const LEN: usize = 16;

    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Copy key bytes from a slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; 16] = bytes.try_into().map_err(|_| Error::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(key))
    }

    /// Raw key bytes
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Protocol specific session keys
#[derive(Debug, Clone)]
pub enum SessionKeys {
    /// SCP01: encryption and MAC keys, key-encryption key kept wrapped
    Scp01 {
        /// Session encryption key
        enc: SessionKey,
        /// Session MAC key
        mac: SessionKey,
        /// Wrapped key-encryption key
        wrapped_kek: Bytes,
    },
    /// SCP02: one key per derivation purpose
    Scp02 {
        /// Sequence counter reported by the card
        sequence_counter: [u8; 2],
        /// Session encryption key
        enc: SessionKey,
        /// Session C-MAC key
        cmac: SessionKey,
        /// Session R-MAC key
        rmac: SessionKey,
        /// Wrapped data encryption key
        wrapped_dek: Bytes,
    },
    /// SCP03: AES session keys
    Scp03 {
        /// Key usage byte reported as third key info byte
        key_usage: u8,
        /// S-ENC
        enc: SessionKey,
        /// S-MAC
        mac: SessionKey,
        /// Wrapped key-encryption key
        wrapped_kek: Bytes,
    },
}

impl SessionKeys {
    /// Protocol these keys belong to
    pub const fn protocol(&self) -> Protocol {
        match self {
            Self::Scp01 { .. } => Protocol::Scp01,
            Self::Scp02 { .. } => Protocol::Scp02,
            Self::Scp03 { .. } => Protocol::Scp03,
        }
    }

    /// The wrapped key-encryption key (DEK for SCP02)
    pub const fn wrapped_dek(&self) -> &Bytes {
        match self {
            Self::Scp01 { wrapped_kek, .. } | Self::Scp03 { wrapped_kek, .. } => wrapped_kek,
            Self::Scp02 { wrapped_dek, .. } => wrapped_dek,
        }
    }

    /// Key used to encrypt command data
    pub const fn enc(&self) -> &SessionKey {
        match self {
            Self::Scp01 { enc, .. } | Self::Scp02 { enc, .. } | Self::Scp03 { enc, .. } => enc,
        }
    }

    /// Key used to MAC commands
    pub const fn mac(&self) -> &SessionKey {
        match self {
            Self::Scp01 { mac, .. } | Self::Scp03 { mac, .. } => mac,
            Self::Scp02 { cmac, .. } => cmac,
        }
    }
}

//! INITIALIZE UPDATE command
//!
//! Starts a secure channel session. The card answers with its key
//! diversification data, the key set it picked, its challenge and its
//! cryptogram. Where those fields sit depends on the protocol.

use bytes::Bytes;
use tps_apdu_core::Command;

use crate::{
    Error, KeyInfo, Protocol, Result,
    constants::{cla, ins},
    crypto::{Block8, HostChallenge},
};

/// Response lengths a card may produce
const VALID_LENGTHS: [usize; 3] = [28, 29, 32];
/// Key diversification data size
const KDD_SIZE: usize = 10;
/// Index the SCP02 key info is reported with
const SCP02_KEY_INDEX: u8 = 0x01;

/// Build an INITIALIZE UPDATE for the given key set
pub fn initialize_update(key_info: KeyInfo, host_challenge: &HostChallenge) -> Command {
    Command::new_with_data(
        cla::GP,
        ins::INITIALIZE_UPDATE,
        key_info.version,
        key_info.index,
        host_challenge.to_vec(),
    )
    .with_le(0x00)
}

/// Parsed INITIALIZE UPDATE answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeUpdateResponse {
    /// Key diversification data
    pub key_diversification_data: [u8; KDD_SIZE],
    /// Key set the card used
    pub key_info: KeyInfo,
    /// Sequence counter: two bytes for SCP02, three for SCP03 when present
    pub sequence_counter: Bytes,
    /// Card challenge: six bytes for SCP02, eight otherwise
    pub card_challenge: Bytes,
    /// Card cryptogram
    pub card_cryptogram: Block8,
}

impl InitializeUpdateResponse {
    /// Parse the response data (without status word) for `protocol`
    pub fn parse(data: &[u8], protocol: Protocol) -> Result<Self> {
        if !VALID_LENGTHS.contains(&data.len()) {
            return Err(Error::InitializeUpdateLength(data.len()));
        }

        let mut key_diversification_data = [0u8; KDD_SIZE];
        key_diversification_data.copy_from_slice(&data[..KDD_SIZE]);
        let mut card_cryptogram = [0u8; 8];

        let (key_info, sequence_counter, card_challenge) = match protocol {
            Protocol::Scp01 => {
                card_cryptogram.copy_from_slice(&data[20..28]);
                (
                    KeyInfo::new(data[10], data[11]),
                    Bytes::new(),
                    Bytes::copy_from_slice(&data[12..20]),
                )
            }
            Protocol::Scp02 => {
                card_cryptogram.copy_from_slice(&data[20..28]);
                (
                    KeyInfo::new(data[10], SCP02_KEY_INDEX),
                    Bytes::copy_from_slice(&data[12..14]),
                    Bytes::copy_from_slice(&data[14..20]),
                )
            }
            Protocol::Scp03 => {
                if data.len() < 29 {
                    return Err(Error::InitializeUpdateLength(data.len()));
                }
                card_cryptogram.copy_from_slice(&data[21..29]);
                let sequence_counter = if data.len() == 32 {
                    Bytes::copy_from_slice(&data[29..32])
                } else {
                    Bytes::new()
                };
                (
                    KeyInfo::new(data[10], data[11]).with_kek_index(data[12]),
                    sequence_counter,
                    Bytes::copy_from_slice(&data[13..21]),
                )
            }
        };

        Ok(Self {
            key_diversification_data,
            key_info,
            sequence_counter,
            card_challenge,
            card_cryptogram,
        })
    }

    /// SCP02 sequence counter as a fixed array
    pub fn scp02_sequence_counter(&self) -> Result<[u8; 2]> {
        self.sequence_counter
            .as_ref()
            .try_into()
            .map_err(|_| Error::InvalidLength {
                expected: 2,
                actual: self.sequence_counter.len(),
            })
    }

    /// SCP02 card challenge as a fixed array
    pub fn scp02_card_challenge(&self) -> Result<[u8; 6]> {
        self.card_challenge
            .as_ref()
            .try_into()
            .map_err(|_| Error::InvalidLength {
                expected: 6,
                actual: self.card_challenge.len(),
            })
    }
}

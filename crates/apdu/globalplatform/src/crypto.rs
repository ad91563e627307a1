//! Cryptographic primitives for SCP01, SCP02 and SCP03
//!
//! Nothing here derives card keys. Session keys come from the key service;
//! this module only MACs and encrypts commands with them, computes the SCP02
//! host cryptogram and unwraps transported session keys.

use aes::Aes128;
use cbc_mac::{CbcMac, Mac};
use cipher::{
    BlockDecrypt, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    block_padding::{Iso7816, Padding},
    consts::{U8, U16},
    generic_array::{ArrayLength, GenericArray, typenum::Unsigned},
};
use cmac::Cmac;
use des::{Des, TdesEde2, TdesEde3};
use zeroize::Zeroize;

use crate::{Error, Result, SessionKey};

/// Eight byte DES block, MAC or cryptogram
pub type Block8 = [u8; 8];
/// SCP02 sequence counter
pub type SequenceCounter = [u8; 2];
/// SCP02 card challenge (without the sequence counter)
pub type CardChallenge = [u8; 6];
/// Host challenge
pub type HostChallenge = [u8; 8];

/// Split data into cipher blocks, applying ISO 7816-4 padding
///
/// With `always_pad` a full padding block is appended to aligned input,
/// otherwise aligned input is left as is.
fn to_blocks<B: ArrayLength<u8>>(data: &[u8], always_pad: bool) -> Vec<GenericArray<u8, B>> {
    let chunks = data.chunks_exact(B::USIZE);
    let remainder = chunks.remainder();
    let mut blocks: Vec<GenericArray<u8, B>> = chunks.map(GenericArray::clone_from_slice).collect();

    if always_pad || !remainder.is_empty() {
        let mut last = GenericArray::<u8, B>::default();
        last[..remainder.len()].copy_from_slice(remainder);
        <Iso7816 as Padding<B>>::pad(&mut last, remainder.len());
        blocks.push(last);
    }
    blocks
}

fn flatten<B: ArrayLength<u8>>(blocks: &[GenericArray<u8, B>]) -> Vec<u8> {
    blocks.iter().flatten().copied().collect()
}

fn xor_into(target: &mut GenericArray<u8, U8>, other: &GenericArray<u8, U8>) {
    for (a, b) in target.iter_mut().zip(other.iter()) {
        *a ^= *b;
    }
}

/// Full triple DES CBC-MAC as used by SCP01
///
/// Every block is chained through two-key 3DES, starting from `icv`.
pub fn mac_3des_cbc(key: &SessionKey, icv: &Block8, data: &[u8]) -> Block8 {
    let mut blocks = to_blocks::<U8>(data, true);
    let mut encryptor = cbc::Encryptor::<TdesEde2>::new(
        GenericArray::from_slice(key.as_bytes()),
        GenericArray::from_slice(icv),
    );
    encryptor.encrypt_blocks_mut(&mut blocks);

    let mut mac = [0u8; 8];
    if let Some(last) = blocks.last() {
        mac.copy_from_slice(last);
    }
    mac
}

/// Retail MAC as used by SCP02
///
/// Single DES under the first key half for all blocks except the last,
/// which is processed with two-key 3DES.
pub fn mac_retail(key: &SessionKey, icv: &Block8, data: &[u8]) -> Block8 {
    let blocks = to_blocks::<U8>(data, true);
    let des = Des::new(GenericArray::from_slice(&key.as_bytes()[..8]));
    let tdes = TdesEde2::new(GenericArray::from_slice(key.as_bytes()));

    let mut chain = GenericArray::clone_from_slice(icv);
    if let Some((last, head)) = blocks.split_last() {
        for block in head {
            xor_into(&mut chain, block);
            des.encrypt_block(&mut chain);
        }
        xor_into(&mut chain, last);
        tdes.encrypt_block(&mut chain);
    }
    chain.into()
}

/// Encrypt an ICV (Initial Chaining Vector) for SCP02
///
/// The previous C-MAC is encrypted with single DES under the first half of
/// the C-MAC key before it chains into the next command.
pub fn encrypt_icv(mac_key: &SessionKey, icv: &Block8) -> Block8 {
    let key = GenericArray::from_slice(&mac_key.as_bytes()[..8]);
    let mut mac = <CbcMac<Des> as Mac>::new(key);
    mac.update(icv);
    mac.finalize().into_bytes().into()
}

/// Calculate an SCP02 cryptogram
///
/// The host cryptogram covers sequence counter, card challenge and host
/// challenge in that order; the card cryptogram starts with the host
/// challenge instead.
pub fn calculate_cryptogram(
    enc_key: &SessionKey,
    sequence_counter: &SequenceCounter,
    card_challenge: &CardChallenge,
    host_challenge: &HostChallenge,
    for_host: bool,
) -> Block8 {
    let mut data = Vec::with_capacity(16);
    if for_host {
        data.extend_from_slice(sequence_counter);
        data.extend_from_slice(card_challenge);
        data.extend_from_slice(host_challenge);
    } else {
        data.extend_from_slice(host_challenge);
        data.extend_from_slice(sequence_counter);
        data.extend_from_slice(card_challenge);
    }
    mac_3des_cbc(enc_key, &[0u8; 8], &data)
}

/// Two-key 3DES CBC encryption with a zero IV
///
/// SCP02 always pads; SCP01 only pads input that is not block aligned.
pub fn encrypt_3des_cbc(key: &SessionKey, data: &[u8], always_pad: bool) -> Vec<u8> {
    let mut blocks = to_blocks::<U8>(data, always_pad);
    let mut encryptor = cbc::Encryptor::<TdesEde2>::new(
        GenericArray::from_slice(key.as_bytes()),
        &GenericArray::default(),
    );
    encryptor.encrypt_blocks_mut(&mut blocks);
    flatten(&blocks)
}

/// AES-CMAC over the MAC chaining value followed by `data`, as used by SCP03
///
/// Returns the full 16 byte value; the command carries its first 8 bytes
/// and the whole value chains into the next command.
pub fn aes_cmac(key: &SessionKey, chaining: &[u8; 16], data: &[u8]) -> Result<[u8; 16]> {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key.as_bytes())
        .map_err(|_| Error::Crypto("invalid AES key length"))?;
    mac.update(chaining);
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// AES-CBC command data encryption as used by SCP03
///
/// The IV is the encryption counter encrypted under the session ENC key.
pub fn encrypt_aes_cbc(key: &SessionKey, counter: u128, data: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let mut icv = GenericArray::clone_from_slice(&counter.to_be_bytes());
    cipher.encrypt_block(&mut icv);

    let mut blocks = to_blocks::<U16>(data, true);
    let mut encryptor =
        cbc::Encryptor::<Aes128>::new(GenericArray::from_slice(key.as_bytes()), &icv);
    encryptor.encrypt_blocks_mut(&mut blocks);
    flatten(&blocks)
}

/// Unwrap a session key transported under a 3DES shared secret (ECB)
///
/// The transport key may be two-key (16 bytes) or three-key (24 bytes).
pub fn unwrap_key(transport_key: &[u8], wrapped: &[u8]) -> Result<SessionKey> {
    if wrapped.len() != SessionKey::LEN {
        return Err(Error::InvalidLength {
            expected: SessionKey::LEN,
            actual: wrapped.len(),
        });
    }
    let mut blocks: Vec<GenericArray<u8, U8>> = wrapped
        .chunks_exact(8)
        .map(GenericArray::clone_from_slice)
        .collect();

    match transport_key.len() {
        16 => TdesEde2::new(GenericArray::from_slice(transport_key)).decrypt_blocks(&mut blocks),
        24 => TdesEde3::new(GenericArray::from_slice(transport_key)).decrypt_blocks(&mut blocks),
        actual => {
            return Err(Error::InvalidLength {
                expected: 16,
                actual,
            });
        }
    }

    let mut clear = flatten(&blocks);
    let key = SessionKey::from_slice(&clear);
    clear.zeroize();
    key
}

/// Wrap a session key under a 3DES shared secret (ECB)
///
/// Counterpart of [`unwrap_key`], used by whatever side hands out keys.
pub fn wrap_key(transport_key: &[u8], key: &SessionKey) -> Result<Vec<u8>> {
    let mut blocks: Vec<GenericArray<u8, U8>> = key
        .as_bytes()
        .chunks_exact(8)
        .map(GenericArray::clone_from_slice)
        .collect();

    match transport_key.len() {
        16 => TdesEde2::new(GenericArray::from_slice(transport_key)).encrypt_blocks(&mut blocks),
        24 => TdesEde3::new(GenericArray::from_slice(transport_key)).encrypt_blocks(&mut blocks),
        actual => {
            return Err(Error::InvalidLength {
                expected: 16,
                actual,
            });
        }
    }
    Ok(flatten(&blocks))
}

//! Secure channel negotiation
//!
//! One call runs the whole handshake up to a channel that only lacks
//! EXTERNAL AUTHENTICATE:
//!
//! 1. random host challenge from the key service
//! 2. INITIALIZE UPDATE and protocol specific response parsing
//! 3. key set sanity checks against the card's reported key info
//! 4. session key derivation on the key service, unwrapped locally
//! 5. channel construction, noting the card's key info in the token record
//!
//! The caller finishes with [`PendingChannel::authenticate`].

use std::fmt;

use bytes::{Bytes, BytesMut};
use tps_apdu_core::CardTransport;
use tps_apdu_globalplatform::{
    Handshake, KeyInfo, Protocol, SecureChannel, SecurityLevel, SessionKeys,
    constants::CHALLENGE_SIZE,
    crypto::{Block8, HostChallenge},
};
use tracing::{debug, instrument};

use crate::{
    CardSession, Error, Result, TksClient,
    policy::{KeyCheckInput, KeyPolicy},
    tks::{self, SessionKeyRequest, WrappedSessionKeys, unwrap_session_key},
};

/// A channel whose handshake completed up to the host cryptogram
#[derive(Debug)]
pub struct PendingChannel {
    channel: SecureChannel,
    host_cryptogram: Block8,
}

impl PendingChannel {
    /// Key set the card answered with
    pub const fn key_info(&self) -> KeyInfo {
        self.channel.key_info()
    }

    /// Send EXTERNAL AUTHENTICATE and hand out the usable channel
    pub fn authenticate(mut self, transport: &mut dyn CardTransport) -> Result<SecureChannel> {
        self.channel
            .external_authenticate(transport, &self.host_cryptogram)?;
        Ok(self.channel)
    }
}

/// Establishes secure channels with session keys from the key service
pub struct Negotiator<'a> {
    tks: &'a dyn TksClient,
    connection: &'a str,
    key_set: &'a str,
    shared_secret: Vec<u8>,
    level: SecurityLevel,
    policy: KeyPolicy<'a>,
}

impl fmt::Debug for Negotiator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("connection", &self.connection)
            .field("key_set", &self.key_set)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl<'a> Negotiator<'a> {
    /// Negotiator using key service `connection` and master key set `key_set`
    pub const fn new(
        tks: &'a dyn TksClient,
        connection: &'a str,
        key_set: &'a str,
        shared_secret: Vec<u8>,
        level: SecurityLevel,
        policy: KeyPolicy<'a>,
    ) -> Self {
        Self {
            tks,
            connection,
            key_set,
            shared_secret,
            level,
            policy,
        }
    }

    /// Run the handshake for `key_info` up to, not including, EXTERNAL AUTHENTICATE
    #[instrument(level = "debug", skip_all, fields(%protocol, %key_info))]
    pub fn setup_secure_channel(
        &self,
        transport: &mut dyn CardTransport,
        session: &mut CardSession,
        protocol: Protocol,
        key_info: KeyInfo,
    ) -> Result<PendingChannel> {
        let cuid = *session
            .applet_info
            .as_ref()
            .ok_or_else(|| Error::SecureChannel("card identity not read".into()))?
            .cuid();

        let host_challenge = self.host_challenge()?;
        let handshake = Handshake::initialize(transport, protocol, key_info, host_challenge)?;
        debug!(card_key_info = %handshake.key_info(), "Card answered INITIALIZE UPDATE");
        if let Some(info) = session.applet_info.as_mut() {
            info.record_kdd(*handshake.key_diversification_data());
        }

        self.policy.check(&KeyCheckInput {
            cuid: &cuid,
            kdd: handshake.key_diversification_data(),
            key_info: handshake.key_info(),
            record: session.record_on_file(),
            changed_over_key_info: session.changed_over_key_info,
        })?;

        let request = SessionKeyRequest {
            key_diversification_data: *handshake.key_diversification_data(),
            cuid,
            key_info: handshake.key_info(),
            card_challenge: card_challenge(&handshake),
            host_challenge,
            card_cryptogram: handshake.response.card_cryptogram,
            protocol,
            key_set: self.key_set.to_owned(),
        };
        let (keys, host_cryptogram) = match protocol {
            Protocol::Scp01 => {
                let wrapped = self
                    .tks
                    .compute_session_key(self.connection, &request)?
                    .into_result("compute session key", Error::SecureChannel)?;
                self.scp01_keys(wrapped)?
            }
            Protocol::Scp02 => self.scp02_keys(&handshake, &request)?,
            Protocol::Scp03 => {
                let wrapped = self
                    .tks
                    .compute_session_keys_scp03(self.connection, &request)?
                    .into_result("compute session keys SCP03", Error::SecureChannel)?;
                self.scp03_keys(&handshake, wrapped)?
            }
        };

        let channel = SecureChannel::new(&handshake, keys, self.level)?;
        session.set_key_info(channel.key_info());
        debug!(key_info = %channel.key_info(), "Secure channel ready for authentication");

        Ok(PendingChannel {
            channel,
            host_cryptogram,
        })
    }

    /// Handshake and EXTERNAL AUTHENTICATE in one step
    pub fn open(
        &self,
        transport: &mut dyn CardTransport,
        session: &mut CardSession,
        protocol: Protocol,
        key_info: KeyInfo,
    ) -> Result<SecureChannel> {
        self.setup_secure_channel(transport, session, protocol, key_info)?
            .authenticate(transport)
    }

    fn host_challenge(&self) -> Result<HostChallenge> {
        let random = self
            .tks
            .compute_random_data(self.connection, CHALLENGE_SIZE)?
            .into_result("compute random data", Error::SecureChannel)?;
        random.as_ref().try_into().map_err(|_| {
            Error::SecureChannel(format!(
                "key service returned {} random bytes, expected {CHALLENGE_SIZE}",
                random.len()
            ))
        })
    }

    fn scp01_keys(&self, wrapped: WrappedSessionKeys) -> Result<(SessionKeys, Block8)> {
        let keys = SessionKeys::Scp01 {
            enc: unwrap_session_key(&self.shared_secret, &wrapped.enc)?,
            mac: unwrap_session_key(&self.shared_secret, &wrapped.mac)?,
            wrapped_kek: wrapped.kek,
        };
        Ok((keys, wrapped.host_cryptogram))
    }

    fn scp02_keys(
        &self,
        handshake: &Handshake,
        request: &SessionKeyRequest,
    ) -> Result<(SessionKeys, Block8)> {
        let derive = |name: &str, constant: [u8; 2]| -> Result<Bytes> {
            self.tks
                .compute_session_key_scp02(self.connection, request, constant)?
                .into_result(name, Error::SecureChannel)
        };
        let enc = unwrap_session_key(&self.shared_secret, &derive("SCP02 ENC", tks::scp02::ENC)?)?;
        let cmac = unwrap_session_key(&self.shared_secret, &derive("SCP02 C-MAC", tks::scp02::CMAC)?)?;
        let rmac = unwrap_session_key(&self.shared_secret, &derive("SCP02 R-MAC", tks::scp02::RMAC)?)?;
        let wrapped_dek = derive("SCP02 DEK", tks::scp02::DEK)?;

        let host_cryptogram = handshake.scp02_host_cryptogram(&enc)?;
        let keys = SessionKeys::Scp02 {
            sequence_counter: handshake.response.scp02_sequence_counter()?,
            enc,
            cmac,
            rmac,
            wrapped_dek,
        };
        Ok((keys, host_cryptogram))
    }

    fn scp03_keys(
        &self,
        handshake: &Handshake,
        wrapped: WrappedSessionKeys,
    ) -> Result<(SessionKeys, Block8)> {
        let keys = SessionKeys::Scp03 {
            key_usage: handshake.key_info().kek_index.unwrap_or_default(),
            enc: unwrap_session_key(&self.shared_secret, &wrapped.enc)?,
            mac: unwrap_session_key(&self.shared_secret, &wrapped.mac)?,
            wrapped_kek: wrapped.kek,
        };
        Ok((keys, wrapped.host_cryptogram))
    }
}

/// Card challenge as the key service expects it; SCP02 prefixes the sequence counter
fn card_challenge(handshake: &Handshake) -> Bytes {
    match handshake.protocol {
        Protocol::Scp02 => {
            let response = &handshake.response;
            let mut challenge = BytesMut::with_capacity(8);
            challenge.extend_from_slice(&response.sequence_counter);
            challenge.extend_from_slice(&response.card_challenge);
            challenge.freeze()
        }
        Protocol::Scp01 | Protocol::Scp03 => handshake.response.card_challenge.clone(),
    }
}

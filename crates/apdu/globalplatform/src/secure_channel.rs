//! Secure channel for GlobalPlatform card management
//!
//! A [`Handshake`] carries what INITIALIZE UPDATE returned. Once the caller
//! obtained session keys for it, a [`SecureChannel`] authenticates with
//! EXTERNAL AUTHENTICATE and from then on wraps every command with a C-MAC
//! and, at [`SecurityLevel::MacEnc`], encrypted command data.
//!
//! Responses are never unwrapped: no R-MAC is requested.

use std::fmt;

use bytes::{BufMut, BytesMut};
use tps_apdu_core::{CardTransport, Command, Response, command::MAX_DATA_LENGTH};
use tracing::{debug, trace};

use crate::{
    Error, KeyInfo, Protocol, Result, SessionKey, SessionKeys,
    commands::{
        self, InitializeUpdateResponse, delete, external_authenticate, initialize_update,
        install, load, put_key,
    },
    constants::{MAC_SIZE, ins, security_level},
    crypto::{self, Block8, HostChallenge},
    load::LoadBlock,
};

/// Protection applied to commands after authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityLevel {
    /// C-MAC only
    #[default]
    Mac,
    /// C-MAC and command data encryption
    MacEnc,
}

impl SecurityLevel {
    /// Pick the level from the channel encryption setting
    pub const fn from_encryption(encryption: bool) -> Self {
        if encryption { Self::MacEnc } else { Self::Mac }
    }

    /// P1 of EXTERNAL AUTHENTICATE
    pub const fn p1(self) -> u8 {
        match self {
            Self::Mac => security_level::C_MAC,
            Self::MacEnc => security_level::C_DECRYPTION,
        }
    }

    const fn encrypts(self) -> bool {
        matches!(self, Self::MacEnc)
    }
}

/// The outcome of INITIALIZE UPDATE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Protocol the card was addressed with
    pub protocol: Protocol,
    /// Host challenge sent to the card
    pub host_challenge: HostChallenge,
    /// Parsed card answer
    pub response: InitializeUpdateResponse,
}

impl Handshake {
    /// Send INITIALIZE UPDATE and parse the answer for `protocol`
    pub fn initialize(
        transport: &mut dyn CardTransport,
        protocol: Protocol,
        key_info: KeyInfo,
        host_challenge: HostChallenge,
    ) -> Result<Self> {
        debug!(%protocol, key_info = %key_info, "Sending INITIALIZE UPDATE");
        let data = commands::expect_success(
            "INITIALIZE UPDATE",
            transport.transmit(&initialize_update::initialize_update(key_info, &host_challenge))?,
        )?;
        let response = InitializeUpdateResponse::parse(&data, protocol)?;
        Ok(Self {
            protocol,
            host_challenge,
            response,
        })
    }

    /// Key set the card answered with
    pub const fn key_info(&self) -> KeyInfo {
        self.response.key_info
    }

    /// Key diversification data
    pub const fn key_diversification_data(&self) -> &[u8; 10] {
        &self.response.key_diversification_data
    }

    /// Host cryptogram computed from the SCP02 ENC session key
    pub fn scp02_host_cryptogram(&self, enc: &SessionKey) -> Result<Block8> {
        Ok(crypto::calculate_cryptogram(
            enc,
            &self.response.scp02_sequence_counter()?,
            &self.response.scp02_card_challenge()?,
            &self.host_challenge,
            true,
        ))
    }
}

/// MAC chaining state produced by wrapping one command
enum Chaining {
    Des { icv: Block8 },
    Aes { chaining: [u8; 16], counter: u128 },
}

/// An authenticated GlobalPlatform secure channel
pub struct SecureChannel {
    keys: SessionKeys,
    key_info: KeyInfo,
    key_diversification_data: [u8; 10],
    level: SecurityLevel,
    /// SCP01/02 MAC chaining value
    icv: Block8,
    /// SCP03 MAC chaining value
    chaining: [u8; 16],
    /// SCP03 encryption counter
    counter: u128,
    authenticated: bool,
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("protocol", &self.keys.protocol())
            .field("key_info", &self.key_info)
            .field("level", &self.level)
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

impl SecureChannel {
    /// Build a channel from a handshake and the session keys derived for it
    pub fn new(handshake: &Handshake, keys: SessionKeys, level: SecurityLevel) -> Result<Self> {
        if keys.protocol() != handshake.protocol {
            return Err(Error::InvalidFormat(
                "session keys do not match the negotiated protocol",
            ));
        }
        Ok(Self {
            keys,
            key_info: handshake.key_info(),
            key_diversification_data: *handshake.key_diversification_data(),
            level,
            icv: [0u8; 8],
            chaining: [0u8; 16],
            counter: 0,
            authenticated: false,
        })
    }

    /// Negotiated protocol
    pub const fn protocol(&self) -> Protocol {
        self.keys.protocol()
    }

    /// Key set the channel was opened with
    pub const fn key_info(&self) -> KeyInfo {
        self.key_info
    }

    /// Key diversification data reported during the handshake
    pub const fn key_diversification_data(&self) -> &[u8; 10] {
        &self.key_diversification_data
    }

    /// Security level used after authentication
    pub const fn security_level(&self) -> SecurityLevel {
        self.level
    }

    /// The wrapped DEK (KEK for SCP01/03), forwarded to key set creation
    pub const fn wrapped_dek(&self) -> &bytes::Bytes {
        self.keys.wrapped_dek()
    }

    /// Whether EXTERNAL AUTHENTICATE succeeded
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Complete the handshake with the host cryptogram
    pub fn external_authenticate(
        &mut self,
        transport: &mut dyn CardTransport,
        host_cryptogram: &Block8,
    ) -> Result<()> {
        let command = external_authenticate::external_authenticate(self.level.p1(), host_cryptogram);
        let wrapped = self.wrap_with(&command, false)?;
        commands::expect_success("EXTERNAL AUTHENTICATE", transport.transmit(&wrapped)?)?;
        self.authenticated = true;
        debug!(protocol = %self.protocol(), level = ?self.level, "Secure channel authenticated");
        Ok(())
    }

    /// Wrap a command for this session
    pub fn wrap(&mut self, command: &Command) -> Result<Command> {
        if !self.authenticated {
            return Err(Error::NotAuthenticated);
        }
        let encrypt = self.level.encrypts() && command.instruction() != ins::EXTERNAL_AUTHENTICATE;
        self.wrap_with(command, encrypt)
    }

    /// Wrap and transmit a command
    pub fn send(&mut self, transport: &mut dyn CardTransport, command: &Command) -> Result<Response> {
        let wrapped = self.wrap(command)?;
        Ok(transport.transmit(&wrapped)?)
    }

    /// Chaining state only advances once the wrapped command is known to fit
    fn wrap_with(&mut self, command: &Command, encrypt: bool) -> Result<Command> {
        let data = command.data().unwrap_or_default();
        let too_long = |actual| Error::InvalidLength {
            expected: MAX_DATA_LENGTH,
            actual,
        };
        if data.len() + MAC_SIZE > MAX_DATA_LENGTH {
            return Err(too_long(data.len() + MAC_SIZE));
        }
        let cla = command.class() | 0x04;

        let (body, next) = match self.keys.protocol() {
            Protocol::Scp01 | Protocol::Scp02 => self.wrap_des(command, cla, data, encrypt)?,
            Protocol::Scp03 => self.wrap_aes(command, cla, data, encrypt)?,
        };
        if body.len() > MAX_DATA_LENGTH {
            return Err(too_long(body.len()));
        }
        match next {
            Chaining::Des { icv } => self.icv = icv,
            Chaining::Aes { chaining, counter } => {
                self.chaining = chaining;
                self.counter = counter;
            }
        }
        trace!(ins = format_args!("{:#04x}", command.instruction()), encrypt, "Wrapped command");

        let mut wrapped = Command::new(cla, command.instruction(), command.p1(), command.p2())
            .with_data(body.freeze());
        if let Some(le) = command.expected_length() {
            wrapped = wrapped.with_le(le);
        }
        Ok(wrapped)
    }

    /// SCP01/02: MAC over the plain command, then encrypt the data
    fn wrap_des(
        &self,
        command: &Command,
        cla: u8,
        data: &[u8],
        encrypt: bool,
    ) -> Result<(BytesMut, Chaining)> {
        let mac_data = header(command, cla, data.len() + MAC_SIZE, data)?;
        let mac_key = self.keys.mac();

        let mac = match self.keys.protocol() {
            Protocol::Scp01 => crypto::mac_3des_cbc(mac_key, &self.icv, &mac_data),
            _ => {
                let icv = if self.icv == [0u8; 8] {
                    self.icv
                } else {
                    crypto::encrypt_icv(mac_key, &self.icv)
                };
                crypto::mac_retail(mac_key, &icv, &mac_data)
            }
        };

        let mut body = BytesMut::with_capacity(data.len() + 2 * MAC_SIZE);
        if encrypt && !data.is_empty() {
            let enc = self.keys.enc();
            let encrypted = match self.keys.protocol() {
                Protocol::Scp01 => {
                    let length = u8::try_from(data.len()).map_err(|_| Error::InvalidLength {
                        expected: MAX_DATA_LENGTH,
                        actual: data.len(),
                    })?;
                    let mut plain = Vec::with_capacity(data.len() + 1);
                    plain.push(length);
                    plain.extend_from_slice(data);
                    crypto::encrypt_3des_cbc(enc, &plain, false)
                }
                _ => crypto::encrypt_3des_cbc(enc, data, true),
            };
            body.put_slice(&encrypted);
        } else {
            body.put_slice(data);
        }
        body.put_slice(&mac);
        Ok((body, Chaining::Des { icv: mac }))
    }

    /// SCP03: encrypt the data, then MAC the protected command
    fn wrap_aes(
        &self,
        command: &Command,
        cla: u8,
        data: &[u8],
        encrypt: bool,
    ) -> Result<(BytesMut, Chaining)> {
        let mut counter = self.counter;
        let payload = if self.authenticated {
            // First protected command uses counter 1
            counter += 1;
            if encrypt && !data.is_empty() {
                crypto::encrypt_aes_cbc(self.keys.enc(), counter, data)
            } else {
                data.to_vec()
            }
        } else {
            data.to_vec()
        };

        let mac_data = header(command, cla, payload.len() + MAC_SIZE, &payload)?;
        let mac = crypto::aes_cmac(self.keys.mac(), &self.chaining, &mac_data)?;

        let mut body = BytesMut::with_capacity(payload.len() + MAC_SIZE);
        body.put_slice(&payload);
        body.put_slice(&mac[..MAC_SIZE]);
        Ok((body, Chaining::Aes { chaining: mac, counter }))
    }

    /// Largest LOAD block payload that still fits once wrapped
    pub const fn max_block_payload(&self, block_size: usize) -> usize {
        let cipher_block = match (self.level, self.keys.protocol()) {
            (SecurityLevel::Mac, _) => 0,
            (SecurityLevel::MacEnc, Protocol::Scp03) => 16,
            (SecurityLevel::MacEnc, _) => 8,
        };
        block_size.saturating_sub(MAC_SIZE + cipher_block)
    }

    /// Delete an applet instance or package
    ///
    /// Returns whether the card confirmed the deletion. A card that does not
    /// know the object answers with an error status, which is not an error
    /// here.
    pub fn delete_object(
        &mut self,
        transport: &mut dyn CardTransport,
        aid: &[u8],
        related: bool,
    ) -> Result<bool> {
        let response = self.send(transport, &delete::delete(aid, related))?;
        if !response.check_result() {
            debug!(aid = %hex::encode_upper(aid), status = %response.status(), "DELETE not confirmed");
        }
        Ok(response.check_result())
    }

    /// INSTALL [for load]
    pub fn install_load(
        &mut self,
        transport: &mut dyn CardTransport,
        package_aid: &[u8],
        security_domain_aid: &[u8],
        load_file_size: usize,
    ) -> Result<()> {
        let size = u16::try_from(load_file_size).map_err(|_| Error::CapFile("load file too large"))?;
        let response = self.send(
            transport,
            &install::for_load(package_aid, security_domain_aid, size),
        )?;
        commands::expect_success("INSTALL for load", response)?;
        Ok(())
    }

    /// Send one LOAD block
    pub fn load_block(&mut self, transport: &mut dyn CardTransport, block: &LoadBlock) -> Result<()> {
        let response = self.send(transport, &load::load(block.number, block.last, &block.data))?;
        commands::expect_success("LOAD", response)?;
        Ok(())
    }

    /// INSTALL [for install and make selectable]
    #[allow(clippy::too_many_arguments)]
    pub fn install_applet(
        &mut self,
        transport: &mut dyn CardTransport,
        package_aid: &[u8],
        module_aid: &[u8],
        instance_aid: &[u8],
        privileges: u8,
        instance_size: u16,
        memory_size: u16,
    ) -> Result<()> {
        let command = install::for_install_and_make_selectable(
            package_aid,
            module_aid,
            instance_aid,
            privileges,
            instance_size,
            memory_size,
        );
        let response = self.send(transport, &command)?;
        commands::expect_success("INSTALL for install", response)?;
        Ok(())
    }

    /// PUT KEY with key set data produced by the key service
    pub fn put_keys(
        &mut self,
        transport: &mut dyn CardTransport,
        current_version: u8,
        key_index: u8,
        key_set_data: &[u8],
    ) -> Result<()> {
        let response = self.send(
            transport,
            &put_key::put_keys(current_version, key_index, key_set_data),
        )?;
        commands::expect_success("PUT KEY", response)?;
        Ok(())
    }
}

/// CLA INS P1 P2 Lc followed by `data`
fn header(command: &Command, cla: u8, lc: usize, data: &[u8]) -> Result<Vec<u8>> {
    let lc = u8::try_from(lc).map_err(|_| Error::InvalidLength {
        expected: MAX_DATA_LENGTH,
        actual: lc,
    })?;
    let mut out = Vec::with_capacity(5 + data.len());
    out.extend_from_slice(&[cla, command.instruction(), command.p1(), command.p2(), lc]);
    out.extend_from_slice(data);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionKey, commands::encode, test_util::ScriptedTransport};
    use bytes::Bytes;
    use hex_literal::hex;

    const INIT_UPDATE: [u8; 28] = hex!("000002650183039536622002000de9c62ba1c4c8e55fcb91b6654ce4");

    fn scp02_handshake() -> Handshake {
        Handshake {
            protocol: Protocol::Scp02,
            host_challenge: hex!("f0467f908e5ca23f"),
            response: InitializeUpdateResponse::parse(&INIT_UPDATE, Protocol::Scp02).unwrap(),
        }
    }

    fn scp02_keys(cmac: [u8; 16]) -> SessionKeys {
        SessionKeys::Scp02 {
            sequence_counter: hex!("000d"),
            enc: SessionKey::new(hex!("404142434445464748494a4b4c4d4e4f")),
            cmac: SessionKey::new(cmac),
            rmac: SessionKey::new(hex!("404142434445464748494a4b4c4d4e4f")),
            wrapped_dek: Bytes::from_static(&[0xDE; 16]),
        }
    }

    #[test]
    fn test_handshake_initialize() {
        let mut transport =
            ScriptedTransport::new([[&INIT_UPDATE[..], &hex!("9000")[..]].concat()]);
        let handshake = Handshake::initialize(
            &mut transport,
            Protocol::Scp02,
            KeyInfo::new(0x20, 0x00),
            hex!("f0467f908e5ca23f"),
        )
        .unwrap();

        assert_eq!(transport.sent[0], hex!("8050200008f0467f908e5ca23f00"));
        assert_eq!(handshake.key_info(), KeyInfo::new(0x20, 0x01));
        assert_eq!(handshake.key_diversification_data(), &hex!("00000265018303953662"));
    }

    #[test]
    fn test_handshake_rejects_bad_length() {
        let mut transport = ScriptedTransport::new([[&INIT_UPDATE[..27], &hex!("9000")[..]].concat()]);
        let err = Handshake::initialize(
            &mut transport,
            Protocol::Scp02,
            KeyInfo::new(0x20, 0x00),
            [0u8; 8],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InitializeUpdateLength(27)));
    }

    #[test]
    fn test_scp02_mac_chain() {
        let mut channel = SecureChannel::new(
            &scp02_handshake(),
            scp02_keys(hex!("2983ba77d709c2daa1e6000abccac951")),
            SecurityLevel::Mac,
        )
        .unwrap();
        let mut transport = ScriptedTransport::new([hex!("9000").to_vec()]);

        channel
            .external_authenticate(&mut transport, &hex!("1d4de92eaf7a2c9f"))
            .unwrap();
        assert_eq!(transport.sent[0], hex!("84820100101d4de92eaf7a2c9f8f9b0df681c1d3ec"));
        assert!(channel.is_authenticated());

        // The previous MAC, encrypted, chains into the next command
        let command = Command::new_with_data(0x80, 0xF2, 0x80, 0x02, hex!("4f00").to_vec()).with_le(0);
        let wrapped = channel.wrap(&command).unwrap();
        assert_eq!(encode(&wrapped), hex!("84f280020a4f0030f149209e17b39700"));
    }

    #[test]
    fn test_wrap_requires_authentication() {
        let mut channel = SecureChannel::new(
            &scp02_handshake(),
            scp02_keys([1; 16]),
            SecurityLevel::Mac,
        )
        .unwrap();
        let command = Command::new(0x80, 0xCA, 0x00, 0x66).with_le(0);
        assert!(matches!(channel.wrap(&command), Err(Error::NotAuthenticated)));
    }

    #[test]
    fn test_failed_authentication() {
        let mut channel = SecureChannel::new(
            &scp02_handshake(),
            scp02_keys([1; 16]),
            SecurityLevel::Mac,
        )
        .unwrap();
        let mut transport = ScriptedTransport::new([hex!("6300").to_vec()]);
        let err = channel
            .external_authenticate(&mut transport, &[0u8; 8])
            .unwrap_err();
        assert_eq!(err.status_word(), Some((0x63, 0x00).into()));
        assert!(!channel.is_authenticated());
    }

    #[test]
    fn test_scp02_encryption_pads_data() {
        let mut channel = SecureChannel::new(
            &scp02_handshake(),
            scp02_keys([1; 16]),
            SecurityLevel::MacEnc,
        )
        .unwrap();
        let mut transport = ScriptedTransport::new([hex!("9000").to_vec()]);
        channel.external_authenticate(&mut transport, &[0u8; 8]).unwrap();
        // EXTERNAL AUTHENTICATE itself stays in the clear
        assert_eq!(&transport.sent[0][..5], &hex!("8482030010"));
        assert_eq!(&transport.sent[0][5..13], &[0u8; 8]);

        let wrapped = channel
            .wrap(&Command::new_with_data(0x80, 0xE4, 0x00, 0x80, [0xAA; 8].to_vec()))
            .unwrap();
        // 8 data bytes grow to 16 with mandatory padding, plus the MAC
        assert_eq!(wrapped.data().map(<[u8]>::len), Some(24));
        assert_ne!(&wrapped.data().unwrap()[..8], &[0xAA; 8]);
    }

    #[test]
    fn test_scp01_encrypts_length_prefixed_data() {
        let handshake = Handshake {
            protocol: Protocol::Scp01,
            host_challenge: [0u8; 8],
            response: InitializeUpdateResponse::parse(&[0u8; 28], Protocol::Scp01).unwrap(),
        };
        let keys = SessionKeys::Scp01 {
            enc: SessionKey::new([2; 16]),
            mac: SessionKey::new([3; 16]),
            wrapped_kek: Bytes::from_static(&[4; 16]),
        };
        let mut channel = SecureChannel::new(&handshake, keys, SecurityLevel::MacEnc).unwrap();
        let mut transport = ScriptedTransport::new([hex!("9000").to_vec()]);
        channel.external_authenticate(&mut transport, &[0u8; 8]).unwrap();

        // Length byte plus seven data bytes fill one block exactly
        let wrapped = channel
            .wrap(&Command::new_with_data(0x80, 0xD8, 0x01, 0x81, [0x55; 7].to_vec()))
            .unwrap();
        assert_eq!(wrapped.data().map(<[u8]>::len), Some(16));
        assert_eq!(wrapped.class(), 0x84);
    }

    #[test]
    fn test_scp03_counter_and_chaining() {
        let data = hex!(
            "00000265018303953662" "300370" "1122334455667788" "a1a2a3a4a5a6a7a8" "000012"
        );
        let handshake = Handshake {
            protocol: Protocol::Scp03,
            host_challenge: [0u8; 8],
            response: InitializeUpdateResponse::parse(&data, Protocol::Scp03).unwrap(),
        };
        let keys = SessionKeys::Scp03 {
            key_usage: 0x70,
            enc: SessionKey::new(hex!("2b7e151628aed2a6abf7158809cf4f3c")),
            mac: SessionKey::new(hex!("2b7e151628aed2a6abf7158809cf4f3c")),
            wrapped_kek: Bytes::from_static(&[4; 16]),
        };
        let mut channel = SecureChannel::new(&handshake, keys, SecurityLevel::MacEnc).unwrap();
        assert_eq!(channel.key_info().to_hex(), "300370");

        let mut transport = ScriptedTransport::new([hex!("9000").to_vec()]);
        channel.external_authenticate(&mut transport, &[0u8; 8]).unwrap();
        assert_eq!(channel.counter, 0);

        let command = Command::new_with_data(0x80, 0xE4, 0x00, 0x80, hex!("4f00").to_vec());
        let first = channel.wrap(&command).unwrap();
        let second = channel.wrap(&command).unwrap();
        assert_eq!(channel.counter, 2);
        // Same plaintext, different counter and chaining value
        assert_eq!(first.data().map(<[u8]>::len), Some(24));
        assert_ne!(first.data(), second.data());
    }

    #[test]
    fn test_oversized_wrapped_command_rejected() {
        let mut channel = SecureChannel::new(
            &scp02_handshake(),
            scp02_keys([1; 16]),
            SecurityLevel::Mac,
        )
        .unwrap();
        let mut transport = ScriptedTransport::new([hex!("9000").to_vec()]);
        channel.external_authenticate(&mut transport, &[0u8; 8]).unwrap();

        let command = Command::new_with_data(0x80, 0xE8, 0x00, 0x00, vec![0u8; 250]);
        assert!(matches!(
            channel.wrap(&command),
            Err(Error::InvalidLength { expected: 255, .. })
        ));
    }

    #[test]
    fn test_rejected_command_leaves_chain_untouched() {
        let authenticated = || {
            let mut channel =
                SecureChannel::new(&scp02_handshake(), scp02_keys([1; 16]), SecurityLevel::MacEnc)
                    .unwrap();
            let mut transport = ScriptedTransport::new([hex!("9000").to_vec()]);
            channel.external_authenticate(&mut transport, &[0u8; 8]).unwrap();
            channel
        };
        let mut channel = authenticated();
        let mut untouched = authenticated();

        // 245 bytes pad to 248 once encrypted, one byte too many with the MAC
        let oversized = Command::new_with_data(0x80, 0xE8, 0x00, 0x00, vec![0u8; 245]);
        assert!(matches!(
            channel.wrap(&oversized),
            Err(Error::InvalidLength {
                expected: 255,
                actual: 256
            })
        ));

        let command = Command::new_with_data(0x80, 0xE4, 0x00, 0x80, hex!("4f00").to_vec());
        assert_eq!(
            encode(&channel.wrap(&command).unwrap()),
            encode(&untouched.wrap(&command).unwrap())
        );
    }

    #[test]
    fn test_scp03_rejected_command_keeps_counter() {
        let data = hex!(
            "00000265018303953662" "300370" "1122334455667788" "a1a2a3a4a5a6a7a8" "000012"
        );
        let handshake = Handshake {
            protocol: Protocol::Scp03,
            host_challenge: [0u8; 8],
            response: InitializeUpdateResponse::parse(&data, Protocol::Scp03).unwrap(),
        };
        let keys = SessionKeys::Scp03 {
            key_usage: 0x70,
            enc: SessionKey::new([5; 16]),
            mac: SessionKey::new([6; 16]),
            wrapped_kek: Bytes::new(),
        };
        let mut channel = SecureChannel::new(&handshake, keys, SecurityLevel::MacEnc).unwrap();
        let mut transport = ScriptedTransport::new([hex!("9000").to_vec()]);
        channel.external_authenticate(&mut transport, &[0u8; 8]).unwrap();
        let chaining = channel.chaining;

        let oversized = Command::new_with_data(0x80, 0xE8, 0x00, 0x00, vec![0u8; 240]);
        assert!(channel.wrap(&oversized).is_err());
        assert_eq!(channel.counter, 0);
        assert_eq!(channel.chaining, chaining);
    }

    #[test]
    fn test_max_block_payload() {
        let handshake = scp02_handshake();
        let mac_only = SecureChannel::new(&handshake, scp02_keys([1; 16]), SecurityLevel::Mac).unwrap();
        let encrypted =
            SecureChannel::new(&handshake, scp02_keys([1; 16]), SecurityLevel::MacEnc).unwrap();
        assert_eq!(mac_only.max_block_payload(0xF8), 240);
        assert_eq!(encrypted.max_block_payload(0xF8), 232);
    }

    #[test]
    fn test_mismatched_keys_rejected() {
        let keys = SessionKeys::Scp01 {
            enc: SessionKey::new([2; 16]),
            mac: SessionKey::new([3; 16]),
            wrapped_kek: Bytes::new(),
        };
        assert!(SecureChannel::new(&scp02_handshake(), keys, SecurityLevel::Mac).is_err());
    }

    #[test]
    fn test_put_keys_failure_carries_status() {
        let mut channel = SecureChannel::new(
            &scp02_handshake(),
            scp02_keys([1; 16]),
            SecurityLevel::Mac,
        )
        .unwrap();
        let mut transport =
            ScriptedTransport::new([hex!("9000").to_vec(), hex!("6A80").to_vec()]);
        channel.external_authenticate(&mut transport, &[0u8; 8]).unwrap();

        let err = channel
            .put_keys(&mut transport, 0xFF, 0x01, &hex!("01"))
            .unwrap_err();
        assert_eq!(err.status_word(), Some((0x6A, 0x80).into()));
        assert_eq!(&transport.sent[1][..4], &hex!("84D80081"));
    }
}

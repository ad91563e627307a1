//! Simulated client, card and key service for end-to-end scenarios

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, VecDeque},
    path::PathBuf,
    sync::Arc,
};

use bytes::Bytes;
use hex_literal::hex;
use parking_lot::Mutex;
use tps_apdu_globalplatform::{Protocol, SessionKey, crypto};
use tps_engine::{
    EngineContext, MemoryAuditSink, MemoryTokenStore, Result, StaticAuthenticator, TksClient,
    TksResponse, TpsConfig, TpsConnection,
    config::{OperationProfile, TksConnectionConfig},
    tks::{KeySetRequest, SessionKeyRequest, WrappedSessionKeys},
};
use tps_protocol::{MessageChannel, OpType, TpsMessage};

pub const CUID: &str = "1122334455667788AABB";
pub const REQUIRED_APPLET: &str = "1.4.54de790f";
pub const SHARED_SECRET: [u8; 16] = hex!("404142434445464748494a4b4c4d4e4f");

pub const CARD_MANAGER: [u8; 7] = hex!("A0000000030000");
pub const APPLET_INSTANCE: [u8; 7] = hex!("627601FF000000");
pub const APPLET_PACKAGE: [u8; 6] = hex!("627601FF0000");

/// Card recognition data of a GP 2.1.1 card speaking SCP02 i=15
const SCP02_CARD_DATA: [u8; 51] = hex!(
    "6631"
    "732F"
    "06072A864886FC6B01"
    "600C060A2A864886FC6B02020101"
    "630906072A864886FC6B03"
    "640B06092A864886FC6B040215"
);

/// Card recognition data of a GP 2.2 card speaking SCP03 i=70
const SCP03_CARD_DATA: [u8; 51] = hex!(
    "6631"
    "732F"
    "06072A864886FC6B01"
    "600C060A2A864886FC6B02020201"
    "630906072A864886FC6B03"
    "640B06092A864886FC6B040370"
);

/// GET DATA CPLC answer for CUID 1122334455667788AABB, MSN DEADBEEF
const CPLC: [u8; 47] = hex!(
    "9F7F2A"
    "11223344" "0000000000000000" "7788AABB" "5566"
    "00000000000000000000" "00000000000000000000"
    "DEADBEEF"
    "9000"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selected {
    None,
    CardManager,
    Applet,
}

/// A GlobalPlatform card with the provisioning applet
#[derive(Debug)]
pub struct SimulatedCard {
    pub protocol: Protocol,
    pub key_version: u8,
    pub applet: Option<(u8, u8, [u8; 4])>,
    pub reject_next_put_key: bool,
    pub commands: Vec<Vec<u8>>,
    selected: Selected,
}

impl SimulatedCard {
    /// Card speaking `protocol`, using key set `key_version` and running `applet`
    pub fn new(protocol: Protocol, key_version: u8, applet: Option<(u8, u8, [u8; 4])>) -> Self {
        Self {
            protocol,
            key_version,
            applet,
            reject_next_put_key: false,
            commands: Vec::new(),
            selected: Selected::None,
        }
    }

    /// SCP01 card without card recognition data
    pub fn scp01(key_version: u8, applet: Option<(u8, u8, [u8; 4])>) -> Self {
        Self::new(Protocol::Scp01, key_version, applet)
    }

    pub fn scp02(key_version: u8, applet: Option<(u8, u8, [u8; 4])>) -> Self {
        Self::new(Protocol::Scp02, key_version, applet)
    }

    /// SCP03 card with key index 03 and third key info byte 70
    pub fn scp03(key_version: u8, applet: Option<(u8, u8, [u8; 4])>) -> Self {
        Self::new(Protocol::Scp03, key_version, applet)
    }

    /// Commands sent with CLA `cla` and INS `ins`
    pub fn sent(&self, cla: u8, ins: u8) -> Vec<&Vec<u8>> {
        self.commands
            .iter()
            .filter(|apdu| apdu[0] == cla && apdu[1] == ins)
            .collect()
    }

    pub fn count(&self, cla: u8, ins: u8) -> usize {
        self.sent(cla, ins).len()
    }

    /// Commands that change the card's content
    pub fn management_commands(&self) -> usize {
        [0xE4, 0xE6, 0xE8, 0xD8]
            .into_iter()
            .map(|ins| self.count(0x84, ins))
            .sum()
    }

    fn process(&mut self, apdu: &[u8]) -> Vec<u8> {
        self.commands.push(apdu.to_vec());
        let (cla, ins, p1, p2) = (apdu[0], apdu[1], apdu[2], apdu[3]);
        let data = if apdu.len() > 5 {
            let lc = usize::from(apdu[4]);
            &apdu[5..5 + lc]
        } else {
            &[][..]
        };

        match (cla, ins) {
            (0x00, 0xA4) => self.select(data),
            (0x80, 0xCA) => match [p1, p2] {
                [0x9F, 0x7F] => CPLC.to_vec(),
                [0x00, 0x66] => match self.protocol {
                    Protocol::Scp01 => hex!("6A88").to_vec(),
                    Protocol::Scp02 => [&SCP02_CARD_DATA[..], &hex!("9000")[..]].concat(),
                    Protocol::Scp03 => [&SCP03_CARD_DATA[..], &hex!("9000")[..]].concat(),
                },
                _ => hex!("6A88").to_vec(),
            },
            (0xB0, 0x70) if self.selected == Selected::Applet => match self.applet {
                Some((_, _, build)) => [&build[..], &hex!("9000")[..]].concat(),
                None => hex!("6D00").to_vec(),
            },
            (0xB0, 0x3C) if self.selected == Selected::Applet => match self.applet {
                Some((major, minor, _)) => [
                    &[0x02, 0x01, major, minor][..],
                    &hex!("00010000 00008000 00000000")[..],
                    &hex!("9000")[..],
                ]
                .concat(),
                None => hex!("6D00").to_vec(),
            },
            (0x80, 0x50) => {
                if p1 != 0x00 && p1 != self.key_version {
                    return hex!("6A88").to_vec();
                }
                let mut answer = hex!("1122334455667788AABB").to_vec();
                match self.protocol {
                    Protocol::Scp01 => {
                        answer.extend_from_slice(&[self.key_version, 0x01]);
                        answer.extend_from_slice(&hex!("A1A2A3A4A5A6A7A8"));
                    }
                    Protocol::Scp02 => {
                        answer.extend_from_slice(&[self.key_version, 0x02, 0x00, 0x2A]);
                        answer.extend_from_slice(&hex!("A1A2A3A4A5A6"));
                    }
                    Protocol::Scp03 => {
                        answer.extend_from_slice(&[self.key_version, 0x03, 0x70]);
                        answer.extend_from_slice(&hex!("A1A2A3A4A5A6A7A8"));
                    }
                }
                answer.extend_from_slice(&hex!("C1C2C3C4C5C6C7C8"));
                answer.extend_from_slice(&hex!("9000"));
                answer
            }
            (0x84, 0x82) => hex!("9000").to_vec(),
            (0x84, 0xE4) => {
                let aid = &data[2..2 + usize::from(data[1])];
                if self.applet.is_some() && (aid == APPLET_INSTANCE || aid == APPLET_PACKAGE) {
                    if aid == APPLET_PACKAGE {
                        self.applet = None;
                    }
                    hex!("009000").to_vec()
                } else {
                    hex!("6A88").to_vec()
                }
            }
            (0x84, 0xE6) => {
                if p1 == 0x0C {
                    self.applet = Some((1, 4, hex!("54DE790F")));
                }
                hex!("009000").to_vec()
            }
            (0x84, 0xE8) => hex!("009000").to_vec(),
            (0x84, 0xD8) => {
                if self.reject_next_put_key {
                    self.reject_next_put_key = false;
                    return hex!("6A80").to_vec();
                }
                self.key_version = data[0];
                [&[data[0]][..], &hex!("0102039000")[..]].concat()
            }
            _ => hex!("6D00").to_vec(),
        }
    }

    fn select(&mut self, aid: &[u8]) -> Vec<u8> {
        if aid == CARD_MANAGER {
            self.selected = Selected::CardManager;
            hex!("9000").to_vec()
        } else if aid == APPLET_INSTANCE && self.applet.is_some() {
            self.selected = Selected::Applet;
            hex!("9000").to_vec()
        } else {
            hex!("6A82").to_vec()
        }
    }
}

/// The client side: answers every server message the way a real client does
#[derive(Debug)]
pub struct SimulatedClient {
    pub card: SimulatedCard,
    pub credentials: (String, String),
    pub sent: Vec<TpsMessage>,
    incoming: VecDeque<TpsMessage>,
}

impl SimulatedClient {
    pub fn new(card: SimulatedCard, operation: OpType, token_type: &str) -> Self {
        let extensions = BTreeMap::from([("tokenType".to_owned(), token_type.to_owned())]);
        Self {
            card,
            credentials: ("jdoe".into(), "secret".into()),
            sent: Vec::new(),
            incoming: VecDeque::from([TpsMessage::BeginOp {
                operation,
                extensions,
            }]),
        }
    }

    /// `(result, status)` of the END_OP the server sent
    pub fn end_op(&self) -> Option<(u8, u32)> {
        self.sent.iter().find_map(|message| match message {
            TpsMessage::EndOp {
                result, message, ..
            } => Some((*result, *message)),
            _ => None,
        })
    }

    /// Percentages of every progress update
    pub fn progress(&self) -> Vec<u8> {
        self.sent
            .iter()
            .filter_map(|message| match message {
                TpsMessage::StatusUpdateRequest { current_state, .. } => Some(*current_state),
                _ => None,
            })
            .collect()
    }
}

impl MessageChannel for SimulatedClient {
    fn send(&mut self, message: &TpsMessage) -> tps_protocol::Result<()> {
        let message = TpsMessage::decode(&message.encode())?;
        match &message {
            TpsMessage::TokenPduRequest { pdu } => {
                let answer = self.card.process(pdu);
                self.incoming.push_back(TpsMessage::TokenPduResponse {
                    pdu: Bytes::from(answer),
                });
            }
            TpsMessage::StatusUpdateRequest { current_state, .. } => {
                self.incoming.push_back(TpsMessage::StatusUpdateResponse {
                    current_state: *current_state,
                });
            }
            TpsMessage::LoginRequest { .. } => {
                self.incoming.push_back(TpsMessage::LoginResponse {
                    screen_name: self.credentials.0.clone(),
                    password: self.credentials.1.clone(),
                });
            }
            _ => {}
        }
        self.sent.push(message);
        Ok(())
    }

    fn receive(&mut self) -> tps_protocol::Result<TpsMessage> {
        let message = self.incoming.pop_front().ok_or(tps_protocol::Error::Closed)?;
        TpsMessage::decode(&message.encode())
    }
}

/// Key service handing out fixed keys wrapped under [`SHARED_SECRET`]
#[derive(Debug, Default)]
pub struct FakeTks {
    pub calls: Mutex<Vec<String>>,
    pub key_set_requests: Mutex<Vec<KeySetRequest>>,
}

impl FakeTks {
    fn wrapped(fill: u8) -> Bytes {
        let key = SessionKey::new([fill; 16]);
        Bytes::from(crypto::wrap_key(&SHARED_SECRET, &key).unwrap_or_default())
    }

    fn wrapped_keys() -> WrappedSessionKeys {
        WrappedSessionKeys {
            enc: Self::wrapped(1),
            mac: Self::wrapped(2),
            kek: Self::wrapped(3),
            host_cryptogram: [0xCC; 8],
        }
    }
}

impl TksClient for FakeTks {
    fn compute_random_data(&self, _: &str, size: usize) -> Result<TksResponse<Bytes>> {
        self.calls.lock().push("random".into());
        Ok(TksResponse::ok(Bytes::from(vec![0x5A; size])))
    }

    fn compute_session_key(
        &self,
        _: &str,
        _: &SessionKeyRequest,
    ) -> Result<TksResponse<WrappedSessionKeys>> {
        self.calls.lock().push("session key".into());
        Ok(TksResponse::ok(Self::wrapped_keys()))
    }

    fn compute_session_key_scp02(
        &self,
        _: &str,
        _: &SessionKeyRequest,
        derivation_constant: [u8; 2],
    ) -> Result<TksResponse<Bytes>> {
        self.calls
            .lock()
            .push(format!("scp02 {}", hex::encode(derivation_constant)));
        Ok(TksResponse::ok(Self::wrapped(derivation_constant[1])))
    }

    fn compute_session_keys_scp03(
        &self,
        _: &str,
        _: &SessionKeyRequest,
    ) -> Result<TksResponse<WrappedSessionKeys>> {
        self.calls.lock().push("session keys scp03".into());
        Ok(TksResponse::ok(Self::wrapped_keys()))
    }

    fn create_key_set_data(
        &self,
        _: &str,
        request: &KeySetRequest,
    ) -> Result<TksResponse<Bytes>> {
        self.calls.lock().push("key set".into());
        self.key_set_requests.lock().push(request.clone());
        let mut data = vec![request.new_version];
        data.extend_from_slice(&[0x80; 22]);
        Ok(TksResponse::ok(Bytes::from(data)))
    }
}

/// Configuration with an `op.format.userKey` profile built by `profile`
pub fn config(profile: impl FnOnce(&mut OperationProfile)) -> TpsConfig {
    let mut config = TpsConfig::default();
    config.channel.encryption = false;
    config.tks.insert(
        "tks1".into(),
        TksConnectionConfig {
            shared_secret_name: "sharedSecret".into(),
            shared_secret: hex::encode_upper(SHARED_SECRET),
        },
    );
    let mut format = OperationProfile::default();
    format.applet_update.enabled = true;
    format.applet_update.required_version = Some(REQUIRED_APPLET.into());
    profile(&mut format);
    config
        .op
        .entry("format".into())
        .or_default()
        .insert("userKey".into(), format);
    config
}

/// Shared state of one scenario
#[derive(Debug)]
pub struct Harness {
    pub store: Arc<MemoryTokenStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub tks: Arc<FakeTks>,
    pub context: EngineContext,
}

impl Harness {
    pub fn new(config: TpsConfig, store: MemoryTokenStore) -> Self {
        let store = Arc::new(store);
        let audit = Arc::new(MemoryAuditSink::new());
        let tks = Arc::new(FakeTks::default());
        let context = EngineContext::new(
            config,
            tks.clone(),
            store.clone(),
            audit.clone(),
            Arc::new(StaticAuthenticator::new().with_user("jdoe", "secret")),
        );
        Self {
            store,
            audit,
            tks,
            context,
        }
    }

    /// Serve one connection from `client`
    pub fn run(&self, client: SimulatedClient) -> (Result<()>, SimulatedClient) {
        let mut connection = TpsConnection::new(self.context.clone(), client);
        let result = connection.run();
        (result, connection.into_inner())
    }
}

/// Write an applet load file into a fresh directory
pub fn applet_directory(name: &str, version: &str, size: usize) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tps-engine-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let contents: Vec<u8> = (0..size).map(|i| i as u8).collect();
    std::fs::write(dir.join(format!("{version}.ijc")), contents).unwrap();
    dir
}

//! Platform and secure channel protocol detection
//!
//! The Card Manager publishes card recognition data (GET DATA `0066`), a
//! small BER structure of OIDs. The last two bytes of the secure channel
//! protocol OID name the SCP version and its implementation option.

use bytes::Bytes;
use derive_more::Display;
use iso7816_tlv::ber::{Tag, Tlv, Value};
use tracing::{debug, warn};
use tps_apdu_core::CardTransport;

use crate::{
    Error, Result,
    commands::{self, get_data, select},
    constants::{get_data as objects, recognition, tags},
    util::tlv,
};

/// GlobalPlatform card specification generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Platform {
    /// GlobalPlatform 2.0.1
    #[display("GP201")]
    Gp201,
    /// GlobalPlatform 2.1.1 and later
    #[display("GP211")]
    Gp211,
}

/// Secure channel protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Protocol {
    /// SCP01, 3DES with a single key derivation round-trip
    #[display("SCP01")]
    Scp01,
    /// SCP02, 3DES with per-purpose session keys
    #[display("SCP02")]
    Scp02,
    /// SCP03, AES
    #[display("SCP03")]
    Scp03,
}

impl Protocol {
    /// Map the protocol number from card recognition data
    pub const fn from_number(number: u8) -> Result<Self> {
        match number {
            1 => Ok(Self::Scp01),
            2 => Ok(Self::Scp02),
            3 => Ok(Self::Scp03),
            other => Err(Error::UnsupportedProtocol(other)),
        }
    }

    /// Protocol number as reported by the card
    pub const fn number(self) -> u8 {
        match self {
            Self::Scp01 => 1,
            Self::Scp02 => 2,
            Self::Scp03 => 3,
        }
    }

    /// Platform generation implied by the protocol
    pub const fn platform(self) -> Platform {
        match self {
            Self::Scp01 => Platform::Gp201,
            Self::Scp02 | Self::Scp03 => Platform::Gp211,
        }
    }
}

/// One entry of the key information template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInformation {
    /// Key identifier
    pub id: u8,
    /// Key version number
    pub version: u8,
}

/// Platform and protocol a card supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Platform generation
    pub platform: Platform,
    /// Secure channel protocol
    pub protocol: Protocol,
    /// Protocol implementation option ("i" parameter)
    pub implementation: u8,
    /// Card recognition data OID
    pub card_recognition_oid: Bytes,
    /// Card management type and version OID
    pub card_management_type_oid: Bytes,
    /// Card identification scheme OID
    pub card_identification_scheme_oid: Bytes,
    /// Secure channel protocol OID
    pub secure_channel_oid: Bytes,
    /// Raw key information template
    pub key_info_data: Bytes,
}

/// SCP01 implementation option assumed when nothing was detected
const FALLBACK_IMPLEMENTATION: u8 = 0x05;

impl PlatformInfo {
    /// What a card that does not publish recognition data is assumed to be
    pub const fn fallback() -> Self {
        Self {
            platform: Platform::Gp201,
            protocol: Protocol::Scp01,
            implementation: FALLBACK_IMPLEMENTATION,
            card_recognition_oid: Bytes::new(),
            card_management_type_oid: Bytes::new(),
            card_identification_scheme_oid: Bytes::new(),
            secure_channel_oid: Bytes::new(),
            key_info_data: Bytes::new(),
        }
    }

    /// Parse card recognition data and attach the raw key information
    ///
    /// Every element must carry a value; declared lengths running past the
    /// buffer are rejected by the BER parser.
    pub fn from_card_data(card_data: &[u8], key_info_data: &[u8]) -> Result<Self> {
        let card_data = Tlv::from_bytes(card_data)?;
        reject_empty(&card_data)?;
        let recognition_data = constructed(&card_data, recognition::CARD_DATA)
            .ok_or(Error::InvalidFormat("card data tag 66 expected"))?
            .first()
            .ok_or(Error::InvalidFormat("card recognition data missing"))?;
        let elements = constructed(recognition_data, recognition::CARD_RECOGNITION_DATA)
            .ok_or(Error::InvalidFormat("card recognition data tag 73 expected"))?;

        let mut card_recognition_oid = None;
        let mut card_management_type_oid = None;
        let mut card_identification_scheme_oid = None;
        let mut secure_channel_oid = None;

        for element in elements {
            match *element.tag().to_bytes() {
                [recognition::OID] => card_recognition_oid = Some(primitive(element)?),
                [recognition::CARD_MANAGEMENT_TYPE] => {
                    card_management_type_oid = Some(inner_oid(element)?)
                }
                [recognition::CARD_IDENTIFICATION_SCHEME] => {
                    card_identification_scheme_oid = Some(inner_oid(element)?)
                }
                [recognition::SECURE_CHANNEL_PROTOCOL] => {
                    secure_channel_oid = Some(inner_oid(element)?)
                }
                _ => debug!(tag = %element.tag(), "Skipping card recognition element"),
            }
        }

        let secure_channel_oid =
            secure_channel_oid.ok_or(Error::InvalidFormat("secure channel protocol OID missing"))?;
        let [.., number, implementation] = *secure_channel_oid else {
            return Err(Error::InvalidFormat("secure channel protocol OID too short"));
        };
        let protocol = Protocol::from_number(number)?;

        Ok(Self {
            platform: protocol.platform(),
            protocol,
            implementation,
            card_recognition_oid: copy(card_recognition_oid),
            card_management_type_oid: copy(card_management_type_oid),
            card_identification_scheme_oid: copy(card_identification_scheme_oid),
            secure_channel_oid: Bytes::copy_from_slice(secure_channel_oid),
            key_info_data: Bytes::copy_from_slice(key_info_data),
        })
    }

    /// GlobalPlatform version from the card management type OID
    ///
    /// The OID ends in the version digits, e.g. `...02 02 01 01` for 2.1.1.
    pub fn gp_version(&self) -> Option<(u8, u8)> {
        match self.card_management_type_oid.as_ref() {
            [.., 0x02, major, minor, _] if self.card_management_type_oid.len() >= 10 => {
                Some((*major, *minor))
            }
            _ => None,
        }
    }

    /// Key sets listed in the key information template
    pub fn key_information(&self) -> Vec<KeyInformation> {
        let Some(template) =
            tlv::find_tlv_value(self.key_info_data.clone(), tags::KEY_INFORMATION_TEMPLATE)
        else {
            return Vec::new();
        };
        tlv::find_all_tlv_values(template, tags::KEY_INFORMATION_DATA)
            .into_iter()
            .filter_map(|entry| match entry.as_ref() {
                [id, version, ..] => Some(KeyInformation {
                    id: *id,
                    version: *version,
                }),
                _ => None,
            })
            .collect()
    }
}

fn copy(value: Option<&[u8]>) -> Bytes {
    value.map(Bytes::copy_from_slice).unwrap_or_default()
}

/// Elements of a constructed TLV carrying `tag`
fn constructed(tlv: &Tlv, tag: u8) -> Option<&[Tlv]> {
    if tlv.tag() != &Tag::try_from(tag).ok()? {
        return None;
    }
    match tlv.value() {
        Value::Constructed(elements) => Some(elements),
        Value::Primitive(_) => None,
    }
}

fn primitive(tlv: &Tlv) -> Result<&[u8]> {
    match tlv.value() {
        Value::Primitive(bytes) => Ok(bytes),
        Value::Constructed(_) => Err(Error::InvalidFormat("primitive value expected")),
    }
}

/// The OID wrapped in a card recognition element
fn inner_oid(element: &Tlv) -> Result<&[u8]> {
    let Value::Constructed(inner) = element.value() else {
        return Err(Error::InvalidFormat("constructed OID wrapper expected"));
    };
    match inner.first() {
        Some(oid) if oid.tag().to_bytes() == [recognition::OID] => primitive(oid),
        _ => Err(Error::InvalidFormat("OID tag 06 expected")),
    }
}

fn reject_empty(tlv: &Tlv) -> Result<()> {
    if tlv.length() == 0 {
        return Err(Error::InvalidFormat("TLV declares zero length"));
    }
    if let Value::Constructed(elements) = tlv.value() {
        elements.iter().try_for_each(reject_empty)?;
    }
    Ok(())
}

/// Detect platform and protocol from the Card Manager
///
/// Selects the Card Manager and reads card recognition data and the key
/// information template. A missing key information template is tolerated.
pub fn detect(transport: &mut dyn CardTransport, card_manager_aid: &[u8]) -> Result<PlatformInfo> {
    commands::expect_success(
        "SELECT card manager",
        transport.transmit(&select::select_by_name(card_manager_aid))?,
    )?;
    let card_data = commands::expect_success(
        "GET DATA card recognition data",
        transport.transmit(&get_data::get_data(objects::CARD_RECOGNITION_DATA, 0x00))?,
    )?;

    let response = transport.transmit(&get_data::get_data(objects::KEY_INFORMATION, 0x00))?;
    let key_info_data = if response.check_result() {
        response.data().to_vec()
    } else {
        warn!(status = %response.status(), "Card does not publish key information");
        Vec::new()
    };

    let info = PlatformInfo::from_card_data(&card_data, &key_info_data)?;
    debug!(
        platform = %info.platform,
        protocol = %info.protocol,
        implementation = format_args!("{:#04x}", info.implementation),
        "Detected card platform"
    );
    Ok(info)
}

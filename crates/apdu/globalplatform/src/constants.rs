//! Constants used in GlobalPlatform operations
//!
//! This module contains the CLA bytes, instruction codes, parameter values
//! and tags the token processing server sends to cards.

/// Command classes
pub mod cla {
    /// ISO7816 command class
    pub const ISO7816: u8 = 0x00;
    /// GlobalPlatform command class
    pub const GP: u8 = 0x80;
    /// Secure messaging command class (with MAC)
    pub const MAC: u8 = 0x84;
    /// Provisioning applet command class
    pub const APPLET: u8 = 0xB0;
}

/// Instruction codes
pub mod ins {
    /// SELECT command
    pub const SELECT: u8 = 0xA4;
    /// INITIALIZE UPDATE command
    pub const INITIALIZE_UPDATE: u8 = 0x50;
    /// EXTERNAL AUTHENTICATE command
    pub const EXTERNAL_AUTHENTICATE: u8 = 0x82;
    /// GET DATA command
    pub const GET_DATA: u8 = 0xCA;
    /// DELETE command
    pub const DELETE: u8 = 0xE4;
    /// LOAD command
    pub const LOAD: u8 = 0xE8;
    /// INSTALL command
    pub const INSTALL: u8 = 0xE6;
    /// PUT KEY command
    pub const PUT_KEY: u8 = 0xD8;
    /// Provisioning applet GET VERSION
    pub const APPLET_GET_VERSION: u8 = 0x70;
    /// Provisioning applet GET STATUS
    pub const APPLET_GET_STATUS: u8 = 0x3C;
}

/// Parameter values for SELECT command (P1)
pub mod select_p1 {
    /// Select by DF name
    pub const BY_NAME: u8 = 0x04;
}

/// Parameter values for INSTALL command (P1)
pub mod install_p1 {
    /// Install for load
    pub const FOR_LOAD: u8 = 0x02;
    /// Install for install
    pub const FOR_INSTALL: u8 = 0x04;
    /// Install for make selectable
    pub const FOR_MAKE_SELECTABLE: u8 = 0x08;
    /// Install for install and make selectable
    pub const FOR_INSTALL_AND_MAKE_SELECTABLE: u8 = FOR_INSTALL | FOR_MAKE_SELECTABLE;
}

/// Parameter values for LOAD command (P1)
pub mod load_p1 {
    /// More blocks to follow
    pub const MORE_BLOCKS: u8 = 0x00;
    /// Last block
    pub const LAST_BLOCK: u8 = 0x80;
}

/// Parameter values for DELETE command (P2)
pub mod delete_p2 {
    /// Delete object only
    pub const OBJECT: u8 = 0x00;
    /// Delete object and related objects
    pub const OBJECT_AND_RELATED: u8 = 0x80;
}

/// Parameter values for PUT KEY command
pub mod put_key {
    /// P1 value that adds a new key set instead of replacing one
    pub const NEW_KEY_SET: u8 = 0x00;
    /// P2 flag announcing multiple keys in the data field
    pub const MULTIPLE_KEYS: u8 = 0x80;
}

/// Security level bits used as EXTERNAL AUTHENTICATE P1
pub mod security_level {
    /// Command MAC
    pub const C_MAC: u8 = 0x01;
    /// Command decryption plus command MAC
    pub const C_DECRYPTION: u8 = 0x03;
}

/// GET DATA object tags
pub mod get_data {
    /// Card Production Life Cycle data
    pub const CPLC: u16 = 0x9F7F;
    /// Card recognition data
    pub const CARD_RECOGNITION_DATA: u16 = 0x0066;
    /// Key information template
    pub const KEY_INFORMATION: u16 = 0x00E0;
}

/// Tags for TLV data
pub mod tags {
    /// Application/package AID
    pub const AID: u8 = 0x4F;
    /// Load file data block
    pub const LOAD_FILE_DATA_BLOCK: u8 = 0xC4;
    /// System specific parameters
    pub const SYSTEM_PARAMETERS: u8 = 0xEF;
    /// Non-volatile code space limit
    pub const NON_VOLATILE_CODE_LIMIT: u8 = 0xC6;
    /// Volatile data space limit
    pub const VOLATILE_DATA_LIMIT: u8 = 0xC7;
    /// Non-volatile data space limit
    pub const NON_VOLATILE_DATA_LIMIT: u8 = 0xC8;
    /// Application specific parameters
    pub const APPLICATION_PARAMETERS: u8 = 0xC9;
    /// Key information template
    pub const KEY_INFORMATION_TEMPLATE: u8 = 0xE0;
    /// Key information data
    pub const KEY_INFORMATION_DATA: u8 = 0xC0;
}

/// Tags of the card recognition data structure
pub mod recognition {
    /// Card data wrapper
    pub const CARD_DATA: u8 = 0x66;
    /// Card recognition data
    pub const CARD_RECOGNITION_DATA: u8 = 0x73;
    /// Object identifier
    pub const OID: u8 = 0x06;
    /// Card management type and version
    pub const CARD_MANAGEMENT_TYPE: u8 = 0x60;
    /// Card identification scheme
    pub const CARD_IDENTIFICATION_SCHEME: u8 = 0x63;
    /// Secure channel protocol and implementation
    pub const SECURE_CHANNEL_PROTOCOL: u8 = 0x64;
}

/// Default Card Manager AID
pub const CARD_MANAGER_AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00];

/// Size of the challenges exchanged during INITIALIZE UPDATE
pub const CHALLENGE_SIZE: usize = 8;

/// Size of a C-MAC appended to a wrapped command
pub const MAC_SIZE: usize = 8;

//! Provisioning applet commands
//!
//! The provisioning applet answers two proprietary commands used to decide
//! whether an upgrade is due: GET VERSION (build id) and GET STATUS
//! (versions and memory).

use tps_apdu_core::Command;

use crate::{
    Error, Result,
    constants::{cla, ins},
};

/// Length of the GET VERSION answer
pub const VERSION_LENGTH: u8 = 0x04;
/// Length of the GET STATUS answer
pub const STATUS_LENGTH: u8 = 0x10;

/// GET VERSION
pub const fn get_version() -> Command {
    Command::new(cla::APPLET, ins::APPLET_GET_VERSION, 0x00, 0x00).with_le(VERSION_LENGTH)
}

/// GET STATUS
pub const fn get_status() -> Command {
    Command::new(cla::APPLET, ins::APPLET_GET_STATUS, 0x00, 0x00).with_le(STATUS_LENGTH)
}

/// Extract the four byte build id from a GET VERSION answer
pub fn parse_build_id(data: &[u8]) -> Result<[u8; 4]> {
    data.get(..4)
        .and_then(|id| id.try_into().ok())
        .ok_or(Error::InvalidLength {
            expected: VERSION_LENGTH as usize,
            actual: data.len(),
        })
}

/// Decoded GET STATUS answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppletStatus {
    /// Platform major version
    pub platform_major: u8,
    /// Platform minor version
    pub platform_minor: u8,
    /// Applet major version
    pub applet_major: u8,
    /// Applet minor version
    pub applet_minor: u8,
    /// Total card memory
    pub total_memory: u32,
    /// Free card memory
    pub free_memory: u32,
}

impl AppletStatus {
    /// Parse a GET STATUS answer
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::InvalidLength {
                expected: STATUS_LENGTH as usize,
                actual: data.len(),
            });
        }
        let word = |at: usize| u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);

        Ok(Self {
            platform_major: data[0],
            platform_minor: data[1],
            applet_major: data[2],
            applet_minor: data[3],
            total_memory: word(4),
            free_memory: word(8),
        })
    }
}

//! GlobalPlatform card management for the token processing server
//!
//! This crate implements the card-side half of token provisioning:
//!
//! - GlobalPlatform command builders (SELECT, GET DATA, INITIALIZE UPDATE,
//!   EXTERNAL AUTHENTICATE, DELETE, INSTALL, LOAD, PUT KEY)
//! - SCP01, SCP02 and SCP03 secure channel wrapping over session keys that
//!   were derived elsewhere
//! - card identity extraction from CPLC data
//! - platform and protocol detection from card recognition data
//! - load file handling for applet upgrades
//!
//! Session key derivation is deliberately absent: master keys never reach
//! this process, so the channel is built from keys handed in by the caller.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod commands;
pub mod constants;
pub mod cplc;
pub mod crypto;
mod error;
pub mod key_info;
pub mod load;
pub mod platform;
pub mod secure_channel;
pub mod session;
pub mod util;

#[cfg(test)]
mod test_util;

pub use error::{Error, Result};
pub use key_info::KeyInfo;
pub use load::{LoadBlock, LoadCommandStream, LoadFile};
pub use platform::{Platform, PlatformInfo, Protocol};
pub use secure_channel::{Handshake, SecureChannel, SecurityLevel};
pub use session::{SessionKey, SessionKeys};

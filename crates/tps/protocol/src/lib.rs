//! Client message protocol for the token processing server
//!
//! The remote client holding the card talks to the server in small framed,
//! form-encoded messages. This crate provides:
//!
//! - [`TpsMessage`] and its wire codec
//! - the [`MessageChannel`] abstraction and a framed stream implementation
//! - [`ApduRelay`], a [`CardTransport`](tps_apdu_core::CardTransport) that
//!   carries APDUs to the card inside TOKEN_PDU messages
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod channel;
mod error;
pub mod message;
pub mod relay;

pub use channel::{MessageChannel, StreamChannel};
pub use error::{Error, Result};
pub use message::{MessageType, OpType, TpsMessage};
pub use relay::{ApduRelay, Credentials};

//! Core types for APDU (Application Protocol Data Unit) exchange
//!
//! This crate provides the foundational types used by the token processing
//! server to talk to a smart card that is physically attached to a remote
//! client:
//!
//! - [`Command`] and [`Response`] per ISO/IEC 7816-4
//! - [`StatusWord`] interpretation
//! - the [`CardTransport`] trait every APDU carrier implements
//! - a shared [`Error`] type
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use command::Command;
pub use response::Response;
pub use response::status::StatusWord;
pub use transport::CardTransport;

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Command, Error, Response, Result, response::status::StatusWord,
        transport::CardTransport,
    };
}

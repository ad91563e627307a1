//! Transport traits for APDU communication with cards
//!
//! A transport moves raw APDU bytes to a card and back. In the token
//! processing server the card sits behind a remote client, so the usual
//! implementation is a message relay rather than a local reader.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{Command, Response, Result};

/// Trait for basic card transports
///
/// A transport is responsible for sending and receiving raw APDU bytes.
/// It has no knowledge of command structure, secure channels, or protocol
/// details.
pub trait CardTransport: Send + fmt::Debug {
    /// Send raw APDU bytes to card and return response bytes
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes> {
        trace!(command = %hex::encode_upper(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode_upper(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = %e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    ///
    /// This is the method that concrete implementations should override.
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes>;

    /// Serialize a command, transmit it and parse the response
    fn transmit(&mut self, command: &Command) -> Result<Response> {
        let raw = command.to_bytes()?;
        let response = Response::from_bytes(&self.transmit_raw(&raw)?)?;
        debug!(
            ins = format_args!("{:#04x}", command.instruction()),
            status = %response.status(),
            "APDU exchanged"
        );
        Ok(response)
    }

    /// Check if the transport still reaches a card
    fn is_connected(&self) -> bool;
}

//! APDU relay to the remote card
//!
//! Every APDU travels to the client in a TOKEN_PDU_REQUEST and exactly one
//! TOKEN_PDU_RESPONSE is awaited for it. Any transport failure or out of
//! order message ends the operation; nothing is retried.

use std::fmt;

use bytes::Bytes;
use tps_apdu_core::CardTransport;
use tracing::{debug, instrument};

use crate::{Error, MessageChannel, MessageType, OpType, Result, TpsMessage};

/// Credentials returned by the client in LOGIN_RESPONSE
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User id
    pub user_id: String,
    /// Password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"..")
            .finish()
    }
}

/// Relays APDUs and session messages over a [`MessageChannel`]
#[derive(Debug)]
pub struct ApduRelay<C> {
    channel: C,
}

impl<C: MessageChannel> ApduRelay<C> {
    /// Relay over `channel`
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// The underlying channel
    pub const fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Give the channel back
    pub fn into_inner(self) -> C {
        self.channel
    }

    /// Send one APDU and return the raw response APDU
    #[instrument(level = "trace", skip_all)]
    pub fn send_apdu(&mut self, command: &[u8]) -> Result<Bytes> {
        self.channel.send(&TpsMessage::TokenPduRequest {
            pdu: Bytes::copy_from_slice(command),
        })?;
        match self.channel.receive()? {
            TpsMessage::TokenPduResponse { pdu } => Ok(pdu),
            other => Err(Error::UnexpectedMessage {
                expected: MessageType::TokenPduResponse,
                actual: other.message_type(),
            }),
        }
    }

    /// Wait for the BEGIN_OP that opens a session
    pub fn receive_begin_op(&mut self) -> Result<TpsMessage> {
        let message = self.channel.receive()?;
        match message.message_type() {
            MessageType::BeginOp => Ok(message),
            actual => Err(Error::UnexpectedMessage {
                expected: MessageType::BeginOp,
                actual,
            }),
        }
    }

    /// Report progress and wait for the acknowledgement
    pub fn status_update(&mut self, percent: u8, task: &str) -> Result<()> {
        debug!(percent, task, "Status update");
        self.channel.send(&TpsMessage::StatusUpdateRequest {
            current_state: percent,
            next_task: task.to_owned(),
        })?;
        match self.channel.receive()? {
            TpsMessage::StatusUpdateResponse { .. } => Ok(()),
            other => Err(Error::UnexpectedMessage {
                expected: MessageType::StatusUpdateResponse,
                actual: other.message_type(),
            }),
        }
    }

    /// Ask the client for credentials
    pub fn request_login(&mut self, invalid_password: bool, blocked: bool) -> Result<Credentials> {
        self.channel.send(&TpsMessage::LoginRequest {
            invalid_password,
            blocked,
        })?;
        match self.channel.receive()? {
            TpsMessage::LoginResponse {
                screen_name,
                password,
            } => Ok(Credentials {
                user_id: screen_name,
                password,
            }),
            other => Err(Error::UnexpectedMessage {
                expected: MessageType::LoginResponse,
                actual: other.message_type(),
            }),
        }
    }

    /// Close the operation with its result and status code
    pub fn end_op(&mut self, operation: OpType, result: u8, status: u32) -> Result<()> {
        self.channel.send(&TpsMessage::EndOp {
            operation,
            result,
            message: status,
        })
    }
}

impl<C: MessageChannel> CardTransport for ApduRelay<C> {
    fn do_transmit_raw(&mut self, command: &[u8]) -> tps_apdu_core::Result<Bytes> {
        Ok(self.send_apdu(command)?)
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::collections::VecDeque;
    use tps_apdu_core::Command;

    /// Channel replaying client messages and recording server messages
    #[derive(Debug, Default)]
    struct ScriptedChannel {
        sent: Vec<TpsMessage>,
        incoming: VecDeque<TpsMessage>,
    }

    impl MessageChannel for ScriptedChannel {
        fn send(&mut self, message: &TpsMessage) -> Result<()> {
            self.sent.push(message.clone());
            Ok(())
        }

        fn receive(&mut self) -> Result<TpsMessage> {
            self.incoming.pop_front().ok_or(Error::Closed)
        }
    }

    fn relay(incoming: impl IntoIterator<Item = TpsMessage>) -> ApduRelay<ScriptedChannel> {
        ApduRelay::new(ScriptedChannel {
            sent: Vec::new(),
            incoming: incoming.into_iter().collect(),
        })
    }

    #[test]
    fn test_transmit_through_relay() {
        let mut relay = relay([TpsMessage::TokenPduResponse {
            pdu: Bytes::from_static(&hex!("6F109000")),
        }]);
        let response = relay
            .transmit(&Command::new_with_data(0x00, 0xA4, 0x04, 0x00, hex!("A0000000030000").to_vec()).with_le(0))
            .unwrap();

        assert!(response.check_result());
        assert_eq!(response.data(), &hex!("6F10"));
        assert_eq!(
            relay.channel_mut().sent[0],
            TpsMessage::TokenPduRequest {
                pdu: Bytes::from_static(&hex!("00A4040007A000000003000000")),
            }
        );
    }

    #[test]
    fn test_unexpected_message_is_fatal() {
        let mut relay = relay([TpsMessage::StatusUpdateResponse { current_state: 5 }]);
        let err = relay.send_apdu(&hex!("80CA9F7F2D")).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedMessage {
                expected: MessageType::TokenPduResponse,
                actual: MessageType::StatusUpdateResponse
            }
        ));
    }

    #[test]
    fn test_closed_channel_surfaces_as_transport_error() {
        let mut relay = relay([]);
        let err = relay.transmit_raw(&hex!("80CA9F7F2D")).unwrap_err();
        assert!(matches!(err, tps_apdu_core::Error::TransmissionError(_)));
    }

    #[test]
    fn test_status_update_and_login() {
        let mut relay = relay([
            TpsMessage::StatusUpdateResponse { current_state: 10 },
            TpsMessage::LoginResponse {
                screen_name: "jdoe".into(),
                password: "secret".into(),
            },
        ]);
        relay.status_update(10, "PROGRESS_APPLET_UPGRADE").unwrap();
        let credentials = relay.request_login(false, false).unwrap();
        assert_eq!(credentials.user_id, "jdoe");
        assert!(!format!("{credentials:?}").contains("secret"));
    }
}

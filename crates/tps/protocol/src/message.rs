//! Client messages and their wire format
//!
//! A frame is `s=<len>&<body>` where `<len>` counts the body bytes. The body
//! is `msg_type=<n>` followed by form-encoded fields. APDU carrying messages
//! end with `pdu_size=<n>&pdu_data=<raw bytes>`; the raw bytes are not
//! encoded, so `pdu_data` is always the last field.

use std::collections::BTreeMap;
use std::str::FromStr;

use bytes::Bytes;
use derive_more::Display;
use url::form_urlencoded;

use crate::{Error, Result};

/// Message type numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MessageType {
    /// Client starts an operation
    #[display("BEGIN_OP")]
    BeginOp,
    /// Server asks for credentials
    #[display("LOGIN_REQUEST")]
    LoginRequest,
    /// Client sends credentials
    #[display("LOGIN_RESPONSE")]
    LoginResponse,
    /// Server sends an APDU for the card
    #[display("TOKEN_PDU_REQUEST")]
    TokenPduRequest,
    /// Client returns the card's answer
    #[display("TOKEN_PDU_RESPONSE")]
    TokenPduResponse,
    /// Server ends the operation
    #[display("END_OP")]
    EndOp,
    /// Server reports progress
    #[display("STATUS_UPDATE_REQUEST")]
    StatusUpdateRequest,
    /// Client acknowledges progress
    #[display("STATUS_UPDATE_RESPONSE")]
    StatusUpdateResponse,
}

impl MessageType {
    /// Wire number
    pub const fn number(self) -> u32 {
        match self {
            Self::BeginOp => 2,
            Self::LoginRequest => 3,
            Self::LoginResponse => 4,
            Self::TokenPduRequest => 9,
            Self::TokenPduResponse => 10,
            Self::EndOp => 13,
            Self::StatusUpdateRequest => 14,
            Self::StatusUpdateResponse => 15,
        }
    }

    /// Map a wire number
    pub const fn from_number(number: u32) -> Result<Self> {
        Ok(match number {
            2 => Self::BeginOp,
            3 => Self::LoginRequest,
            4 => Self::LoginResponse,
            9 => Self::TokenPduRequest,
            10 => Self::TokenPduResponse,
            13 => Self::EndOp,
            14 => Self::StatusUpdateRequest,
            15 => Self::StatusUpdateResponse,
            other => return Err(Error::UnknownMessageType(other)),
        })
    }
}

/// Operation requested by BEGIN_OP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OpType {
    /// Format the token
    #[display("op_format")]
    Format,
    /// Enroll certificates
    #[display("op_enroll")]
    Enroll,
    /// Reset the PIN
    #[display("op_reset_pin")]
    ResetPin,
}

impl OpType {
    /// Name used in configuration lookups and activity logs
    pub const fn name(self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Enroll => "enroll",
            Self::ResetPin => "pinReset",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "op_format" => Ok(Self::Format),
            "op_enroll" => Ok(Self::Enroll),
            "op_reset_pin" => Ok(Self::ResetPin),
            other => Err(Error::malformed(format!("unknown operation {other:?}"))),
        }
    }
}

/// A client protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpsMessage {
    /// Client starts an operation
    BeginOp {
        /// Requested operation
        operation: OpType,
        /// Client supplied extensions such as `tokenType`
        extensions: BTreeMap<String, String>,
    },
    /// Server asks for credentials
    LoginRequest {
        /// The previous attempt used a wrong password
        invalid_password: bool,
        /// The account is blocked
        blocked: bool,
    },
    /// Client sends credentials
    LoginResponse {
        /// User id
        screen_name: String,
        /// Password
        password: String,
    },
    /// Server sends an APDU for the card
    TokenPduRequest {
        /// Command APDU
        pdu: Bytes,
    },
    /// Client returns the card's answer
    TokenPduResponse {
        /// Response APDU including the status word
        pdu: Bytes,
    },
    /// Server ends the operation
    EndOp {
        /// Operation being ended
        operation: OpType,
        /// 0 on success, 1 on failure
        result: u8,
        /// Numeric status code
        message: u32,
    },
    /// Server reports progress
    StatusUpdateRequest {
        /// Percentage done
        current_state: u8,
        /// Name of the next task
        next_task: String,
    },
    /// Client acknowledges progress
    StatusUpdateResponse {
        /// Percentage acknowledged
        current_state: u8,
    },
}

impl TpsMessage {
    /// Message type of this message
    pub const fn message_type(&self) -> MessageType {
        match self {
            Self::BeginOp { .. } => MessageType::BeginOp,
            Self::LoginRequest { .. } => MessageType::LoginRequest,
            Self::LoginResponse { .. } => MessageType::LoginResponse,
            Self::TokenPduRequest { .. } => MessageType::TokenPduRequest,
            Self::TokenPduResponse { .. } => MessageType::TokenPduResponse,
            Self::EndOp { .. } => MessageType::EndOp,
            Self::StatusUpdateRequest { .. } => MessageType::StatusUpdateRequest,
            Self::StatusUpdateResponse { .. } => MessageType::StatusUpdateResponse,
        }
    }

    /// Encode the message body, without the `s=<len>&` prefix
    pub fn encode_body(&self) -> Vec<u8> {
        let mut fields = form_urlencoded::Serializer::new(String::new());
        fields.append_pair("msg_type", &self.message_type().number().to_string());

        let pdu = match self {
            Self::BeginOp {
                operation,
                extensions,
            } => {
                fields.append_pair("operation", &operation.to_string());
                if !extensions.is_empty() {
                    let nested = form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(extensions)
                        .finish();
                    fields.append_pair("extensions", &nested);
                }
                None
            }
            Self::LoginRequest {
                invalid_password,
                blocked,
            } => {
                fields.append_pair("invalid_pw", flag(*invalid_password));
                fields.append_pair("blocked", flag(*blocked));
                None
            }
            Self::LoginResponse {
                screen_name,
                password,
            } => {
                fields.append_pair("screen_name", screen_name);
                fields.append_pair("password", password);
                None
            }
            Self::TokenPduRequest { pdu } | Self::TokenPduResponse { pdu } => Some(pdu),
            Self::EndOp {
                operation,
                result,
                message,
            } => {
                fields.append_pair("operation", &operation.to_string());
                fields.append_pair("result", &result.to_string());
                fields.append_pair("message", &message.to_string());
                None
            }
            Self::StatusUpdateRequest {
                current_state,
                next_task,
            } => {
                fields.append_pair("current_state", &current_state.to_string());
                fields.append_pair("next_task_name", next_task);
                None
            }
            Self::StatusUpdateResponse { current_state } => {
                fields.append_pair("current_state", &current_state.to_string());
                None
            }
        };

        let mut body = fields.finish().into_bytes();
        if let Some(pdu) = pdu {
            body.extend_from_slice(format!("&pdu_size={}&pdu_data=", pdu.len()).as_bytes());
            body.extend_from_slice(pdu);
        }
        body
    }

    /// Encode the complete frame
    pub fn encode(&self) -> Bytes {
        let body = self.encode_body();
        let mut frame = format!("s={}&", body.len()).into_bytes();
        frame.extend_from_slice(&body);
        Bytes::from(frame)
    }

    /// Decode a complete frame
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let rest = frame
            .strip_prefix(b"s=")
            .ok_or_else(|| Error::malformed("frame does not start with s="))?;
        let split = rest
            .iter()
            .position(|&b| b == b'&')
            .ok_or_else(|| Error::malformed("frame size not terminated"))?;
        let size: usize = parse_number(&rest[..split], "s")?;
        let body = &rest[split + 1..];
        if body.len() != size {
            return Err(Error::malformed(format!(
                "frame announces {size} bytes, carries {}",
                body.len()
            )));
        }
        Self::decode_body(body)
    }

    /// Decode a message body
    pub fn decode_body(body: &[u8]) -> Result<Self> {
        let (fields, pdu) = split_fields(body);

        let message_type = MessageType::from_number(number(&fields, "msg_type")?)?;
        Ok(match message_type {
            MessageType::BeginOp => Self::BeginOp {
                operation: OpType::parse(field(&fields, "operation")?)?,
                extensions: fields
                    .get("extensions")
                    .map(|nested| form_urlencoded::parse(nested.as_bytes()).into_owned().collect())
                    .unwrap_or_default(),
            },
            MessageType::LoginRequest => Self::LoginRequest {
                invalid_password: number::<u8>(&fields, "invalid_pw")? != 0,
                blocked: number::<u8>(&fields, "blocked")? != 0,
            },
            MessageType::LoginResponse => Self::LoginResponse {
                screen_name: field(&fields, "screen_name")?.to_owned(),
                password: field(&fields, "password")?.to_owned(),
            },
            MessageType::TokenPduRequest | MessageType::TokenPduResponse => {
                let pdu = pdu.ok_or_else(|| Error::malformed("missing field pdu_data"))?;
                let size: usize = number(&fields, "pdu_size")?;
                if size != pdu.len() {
                    return Err(Error::malformed(format!(
                        "pdu_size {size} does not match {} data bytes",
                        pdu.len()
                    )));
                }
                let pdu = Bytes::copy_from_slice(pdu);
                if message_type == MessageType::TokenPduRequest {
                    Self::TokenPduRequest { pdu }
                } else {
                    Self::TokenPduResponse { pdu }
                }
            }
            MessageType::EndOp => Self::EndOp {
                operation: OpType::parse(field(&fields, "operation")?)?,
                result: number(&fields, "result")?,
                message: number(&fields, "message")?,
            },
            MessageType::StatusUpdateRequest => Self::StatusUpdateRequest {
                current_state: number(&fields, "current_state")?,
                next_task: field(&fields, "next_task_name")?.to_owned(),
            },
            MessageType::StatusUpdateResponse => Self::StatusUpdateResponse {
                current_state: number(&fields, "current_state")?,
            },
        })
    }
}

const fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

fn field<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> Result<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::malformed(format!("missing field {name}")))
}

fn number<T: FromStr>(fields: &BTreeMap<String, String>, name: &str) -> Result<T> {
    parse_number(field(fields, name)?.as_bytes(), name)
}

fn parse_number<T: FromStr>(raw: &[u8], name: &str) -> Result<T> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| Error::malformed(format!("field {name} is not a valid number")))
}

/// Split a body into its encoded fields and the raw `pdu_data` bytes
fn split_fields(body: &[u8]) -> (BTreeMap<String, String>, Option<&[u8]>) {
    const PDU_DATA: &[u8] = b"pdu_data=";

    let (encoded, pdu) = if body.starts_with(PDU_DATA) {
        (&body[..0], Some(&body[PDU_DATA.len()..]))
    } else {
        match find(body, b"&pdu_data=") {
            Some(at) => (&body[..at], Some(&body[at + 1 + PDU_DATA.len()..])),
            None => (body, None),
        }
    };

    let fields = form_urlencoded::parse(encoded).into_owned().collect();
    (fields, pdu)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

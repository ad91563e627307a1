//! APDU command definitions
//!
//! Commands are short ISO/IEC 7816-4 APDUs: a four byte header, an optional
//! data field of at most 255 bytes and an optional one byte Le.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// Expected length type for APDU commands
pub type ExpectedLength = u8;

/// Maximum length of a short APDU data field
pub const MAX_DATA_LENGTH: usize = 255;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Option<Bytes>,
    le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command carrying a data field
    pub fn new_with_data(cla: u8, ins: u8, p1: u8, p2: u8, data: impl Into<Bytes>) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Set the data field
    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected response length (Le)
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Replace the class byte
    pub const fn with_class(mut self, cla: u8) -> Self {
        self.cla = cla;
        self
    }

    /// Command class (CLA)
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Instruction code (INS)
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// First parameter (P1)
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter (P2)
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Command data, if any
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Expected response length, if any
    pub const fn expected_length(&self) -> Option<ExpectedLength> {
        self.le
    }

    /// Length of the serialized command
    pub fn command_length(&self) -> usize {
        4 + self.data.as_ref().map_or(0, |d| 1 + d.len()) + usize::from(self.le.is_some())
    }

    /// Serialize to raw APDU bytes
    ///
    /// Fails when the data field does not fit a short APDU.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = &self.data {
            if data.len() > MAX_DATA_LENGTH {
                return Err(Error::InvalidCommandLength(data.len()));
            }
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        Ok(buffer.freeze())
    }

    /// Parse raw APDU bytes back into a command
    ///
    /// Handles the four short APDU cases. A five byte command is read as
    /// header plus Le.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let [cla, ins, p1, p2, body @ ..] = raw else {
            return Err(Error::InvalidCommandLength(raw.len()));
        };
        let command = Self::new(*cla, *ins, *p1, *p2);

        match body {
            [] => Ok(command),
            [le] => Ok(command.with_le(*le)),
            [lc, rest @ ..] => {
                let lc = usize::from(*lc);
                match rest.len() {
                    n if n == lc => Ok(command.with_data(Bytes::copy_from_slice(rest))),
                    n if n == lc + 1 => Ok(command
                        .with_data(Bytes::copy_from_slice(&rest[..lc]))
                        .with_le(rest[lc])),
                    _ => Err(Error::InvalidCommandLength(raw.len())),
                }
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X} {:02X}",
            self.cla, self.ins, self.p1, self.p2
        )?;
        if let Some(data) = &self.data {
            write!(f, " [{}]", hex::encode_upper(data))?;
        }
        if let Some(le) = self.le {
            write!(f, " Le={le:02X}")?;
        }
        Ok(())
    }
}

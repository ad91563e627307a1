//! Message channels to the remote client
//!
//! The transport underneath is assumed reliable and ordered; this module only
//! frames messages on it.

use std::fmt;
use std::io::{ErrorKind, Read, Write};

use tracing::trace;

use crate::{Error, Result, TpsMessage};

/// Largest message body accepted from a client
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Longest size prefix accepted, in digits
const MAX_SIZE_DIGITS: usize = 8;

/// A bidirectional, message-framed channel to the client
pub trait MessageChannel: Send + fmt::Debug {
    /// Write one message
    fn send(&mut self, message: &TpsMessage) -> Result<()>;

    /// Block until one message arrives
    fn receive(&mut self) -> Result<TpsMessage>;
}

/// [`MessageChannel`] over any byte stream
#[derive(Debug)]
pub struct StreamChannel<S> {
    stream: S,
}

impl<S: Read + Write> StreamChannel<S> {
    /// Frame messages on `stream`
    pub const fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Give the stream back
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read the `s=<len>&` prefix
    ///
    /// Sizes above [`MAX_FRAME_SIZE`] are rejected before any body is read.
    fn read_size(&mut self) -> Result<usize> {
        let Some(first) = self.read_byte()? else {
            return Err(Error::Closed);
        };
        if first != b's' || self.read_byte()? != Some(b'=') {
            return Err(Error::malformed("frame does not start with s="));
        }

        let mut size = 0usize;
        for _ in 0..=MAX_SIZE_DIGITS {
            match self.read_byte()? {
                Some(b'&') => return Ok(size),
                Some(digit @ b'0'..=b'9') => {
                    size = size * 10 + usize::from(digit - b'0');
                    if size > MAX_FRAME_SIZE {
                        return Err(Error::malformed(format!(
                            "frame size exceeds {MAX_FRAME_SIZE} bytes"
                        )));
                    }
                }
                Some(_) => return Err(Error::malformed("frame size is not a number")),
                None => return Err(Error::Closed),
            }
        }
        Err(Error::malformed("frame size too long"))
    }
}

impl<S: Read + Write + Send + fmt::Debug> MessageChannel for StreamChannel<S> {
    fn send(&mut self, message: &TpsMessage) -> Result<()> {
        let frame = message.encode();
        trace!(message_type = %message.message_type(), size = frame.len(), "Sending message");
        self.stream.write_all(&frame)?;
        self.stream.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<TpsMessage> {
        let size = self.read_size()?;
        let mut body = vec![0u8; size];
        self.stream.read_exact(&mut body).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::Closed,
            _ => e.into(),
        })?;
        let message = TpsMessage::decode_body(&body)?;
        trace!(message_type = %message.message_type(), size, "Received message");
        Ok(message)
    }
}

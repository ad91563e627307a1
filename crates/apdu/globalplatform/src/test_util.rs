//! Scripted card transport for unit tests

use std::collections::VecDeque;

use bytes::Bytes;
use tps_apdu_core::{CardTransport, Error};

/// Replays canned responses and records every command sent
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    pub(crate) sent: Vec<Vec<u8>>,
    responses: VecDeque<Vec<u8>>,
}

impl ScriptedTransport {
    pub(crate) fn new(responses: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            sent: Vec::new(),
            responses: responses.into_iter().collect(),
        }
    }
}

impl CardTransport for ScriptedTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> tps_apdu_core::Result<Bytes> {
        self.sent.push(command.to_vec());
        self.responses
            .pop_front()
            .map(Bytes::from)
            .ok_or_else(|| Error::transmission("no scripted response left"))
    }

    fn is_connected(&self) -> bool {
        true
    }
}

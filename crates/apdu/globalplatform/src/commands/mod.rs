//! GlobalPlatform command definitions
//!
//! Each submodule builds the [`Command`]s of one instruction and, where the
//! card answers with structured data, parses that answer.

pub mod applet;
pub mod delete;
pub mod external_authenticate;
pub mod get_data;
pub mod initialize_update;
pub mod install;
pub mod load;
pub mod put_key;
pub mod select;

pub use applet::AppletStatus;
pub use initialize_update::InitializeUpdateResponse;

use bytes::Bytes;
use tps_apdu_core::Response;

use crate::{Error, Result};

/// Turn a card response into its payload, naming the operation on failure
pub fn expect_success(operation: &'static str, response: Response) -> Result<Bytes> {
    if response.check_result() {
        Ok(response.payload().clone().unwrap_or_default())
    } else {
        Err(Error::CardStatus {
            operation,
            status: response.status(),
        })
    }
}

#[cfg(test)]
pub(crate) fn encode(command: &tps_apdu_core::Command) -> Vec<u8> {
    command.to_bytes().map(|raw| raw.to_vec()).unwrap_or_default()
}

//! SELECT command
//!
//! Used to select the Card Manager and the provisioning applet by AID.

use tps_apdu_core::Command;

use crate::constants::{cla, ins, select_p1};

/// Select an application or security domain by its AID
pub fn select_by_name(aid: &[u8]) -> Command {
    Command::new_with_data(cla::ISO7816, ins::SELECT, select_p1::BY_NAME, 0x00, aid.to_vec())
        .with_le(0x00)
}

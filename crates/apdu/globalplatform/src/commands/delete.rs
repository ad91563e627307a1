//! DELETE command
//!
//! Removes an applet instance or a load file, optionally with everything
//! instantiated from it.

use tps_apdu_core::Command;

use crate::{
    constants::{cla, delete_p2, ins, tags},
    util::tlv,
};

/// Delete the object with the given AID
pub fn delete(aid: &[u8], related: bool) -> Command {
    let p2 = if related {
        delete_p2::OBJECT_AND_RELATED
    } else {
        delete_p2::OBJECT
    };
    Command::new_with_data(cla::GP, ins::DELETE, 0x00, p2, tlv::tag_length_value(tags::AID, aid))
        .with_le(0x00)
}

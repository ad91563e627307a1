//! LOAD command

use tps_apdu_core::Command;

use crate::constants::{cla, ins, load_p1};

/// One LOAD block; P2 numbers the blocks from zero
pub fn load(block_number: u8, last: bool, block: &[u8]) -> Command {
    let p1 = if last {
        load_p1::LAST_BLOCK
    } else {
        load_p1::MORE_BLOCKS
    };
    Command::new_with_data(cla::GP, ins::LOAD, p1, block_number, block.to_vec()).with_le(0x00)
}

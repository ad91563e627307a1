//! GET DATA command
//!
//! The two byte object tag travels in P1/P2.

use tps_apdu_core::Command;

use crate::constants::{cla, ins};

/// Read a data object from the currently selected security domain
pub const fn get_data(tag: u16, le: u8) -> Command {
    let [p1, p2] = tag.to_be_bytes();
    Command::new(cla::GP, ins::GET_DATA, p1, p2).with_le(le)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{commands::encode, constants::get_data as objects};
    use hex_literal::hex;

    #[test]
    fn test_get_data_cplc() {
        assert_eq!(encode(&get_data(objects::CPLC, 0x2D)), hex!("80CA9F7F2D"));
        assert_eq!(
            encode(&get_data(objects::CARD_RECOGNITION_DATA, 0x00)),
            hex!("80CA006600")
        );
    }
}

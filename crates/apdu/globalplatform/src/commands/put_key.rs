//! PUT KEY command
//!
//! The key set data is produced by the key service; this module only frames
//! it.

use tps_apdu_core::Command;

use crate::{
    KeyInfo,
    constants::{cla, ins, put_key},
};

/// Replace key set `current_version` (or add a new one) with `key_set_data`
///
/// A card still on the development key set is addressed with P1 `00`.
pub fn put_keys(current_version: u8, key_index: u8, key_set_data: &[u8]) -> Command {
    let p1 = if current_version == KeyInfo::DEVELOPMENT_VERSION {
        put_key::NEW_KEY_SET
    } else {
        current_version
    };
    Command::new_with_data(
        cla::GP,
        ins::PUT_KEY,
        p1,
        put_key::MULTIPLE_KEYS | key_index,
        key_set_data.to_vec(),
    )
    .with_le(0x00)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_put_keys_replaces_current_version() {
        let cmd = put_keys(0x01, 0x01, &hex!("02"));
        assert_eq!((cmd.p1(), cmd.p2()), (0x01, 0x81));
    }

    #[test]
    fn test_put_keys_on_development_card() {
        let cmd = put_keys(0xFF, 0x01, &hex!("01"));
        assert_eq!((cmd.p1(), cmd.p2()), (0x00, 0x81));
    }
}

//! EXTERNAL AUTHENTICATE command
//!
//! Completes the handshake with the host cryptogram. P1 carries the security
//! level every later command of the session will use.

use tps_apdu_core::Command;

use crate::{
    constants::{cla, ins},
    crypto::Block8,
};

/// Build the plain EXTERNAL AUTHENTICATE command, before MAC wrapping
pub fn external_authenticate(security_level: u8, host_cryptogram: &Block8) -> Command {
    Command::new_with_data(
        cla::GP,
        ins::EXTERNAL_AUTHENTICATE,
        security_level,
        0x00,
        host_cryptogram.to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{commands::encode, constants::security_level};
    use hex_literal::hex;

    #[test]
    fn test_external_authenticate() {
        let cmd = external_authenticate(security_level::C_MAC, &hex!("1d4de92eaf7a2c9f"));
        assert_eq!(encode(&cmd), hex!("80820100081d4de92eaf7a2c9f"));
    }
}

//! INSTALL command
//!
//! Two forms are used during an applet upgrade: INSTALL [for load] announces
//! a load file, INSTALL [for install and make selectable] instantiates the
//! applet from it.

use tps_apdu_core::Command;

use crate::{
    constants::{cla, ins, install_p1, tags},
    util::tlv,
};

/// INSTALL [for load] with the load file size as a code space limit
pub fn for_load(package_aid: &[u8], security_domain_aid: &[u8], load_file_size: u16) -> Command {
    let mut data = Vec::with_capacity(package_aid.len() + security_domain_aid.len() + 12);
    data.extend(tlv::length_value(package_aid));
    data.extend(tlv::length_value(security_domain_aid));
    // No load file data block hash
    data.push(0x00);
    data.extend(tlv::length_value(&tlv::tag_length_value(
        tags::SYSTEM_PARAMETERS,
        &tlv::tag_length_value(tags::NON_VOLATILE_CODE_LIMIT, &load_file_size.to_be_bytes()),
    )));
    // No load token
    data.push(0x00);

    Command::new_with_data(cla::GP, ins::INSTALL, install_p1::FOR_LOAD, 0x00, data).with_le(0x00)
}

/// INSTALL [for install and make selectable]
pub fn for_install_and_make_selectable(
    package_aid: &[u8],
    module_aid: &[u8],
    instance_aid: &[u8],
    privileges: u8,
    instance_size: u16,
    memory_size: u16,
) -> Command {
    let mut system = tlv::tag_length_value(tags::VOLATILE_DATA_LIMIT, &instance_size.to_be_bytes());
    system.extend(tlv::tag_length_value(
        tags::NON_VOLATILE_DATA_LIMIT,
        &memory_size.to_be_bytes(),
    ));
    let mut parameters = tlv::tag_length_value(tags::SYSTEM_PARAMETERS, &system);
    parameters.extend(tlv::tag_length_value(tags::APPLICATION_PARAMETERS, &[]));

    let mut data = Vec::new();
    data.extend(tlv::length_value(package_aid));
    data.extend(tlv::length_value(module_aid));
    data.extend(tlv::length_value(instance_aid));
    data.extend(tlv::length_value(&[privileges]));
    data.extend(tlv::length_value(&parameters));
    // No install token
    data.push(0x00);

    Command::new_with_data(
        cla::GP,
        ins::INSTALL,
        install_p1::FOR_INSTALL_AND_MAKE_SELECTABLE,
        0x00,
        data,
    )
    .with_le(0x00)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{commands::encode, constants::CARD_MANAGER_AID};
    use hex_literal::hex;

    #[test]
    fn test_install_for_load() {
        let cmd = for_load(&hex!("627601FF0000"), &CARD_MANAGER_AID, 0x1234);
        assert_eq!(cmd.p1(), install_p1::FOR_LOAD);
        assert_eq!(
            cmd.data(),
            Some(hex!("06627601FF0000" "07A0000000030000" "00" "06EF04C6021234" "00").as_ref())
        );
    }

    #[test]
    fn test_install_for_install_and_make_selectable() {
        let cmd = for_install_and_make_selectable(
            &hex!("627601FF0000"),
            &hex!("627601FF000000"),
            &hex!("627601FF000000"),
            0x00,
            18000,
            5000,
        );
        assert_eq!(cmd.p1(), 0x0C);
        assert_eq!(
            encode(&cmd),
            hex!(
                "80E60C0027"
                "06627601FF0000"
                "07627601FF000000"
                "07627601FF000000"
                "0100"
                "0CEF08C7024650C8021388C900"
                "00"
                "00"
            )
        );
    }
}

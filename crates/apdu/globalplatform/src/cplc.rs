//! Card identity from Card Production Life Cycle data
//!
//! The CPLC buffer is the complete GET DATA `9F7F` answer: the `9F 7F 2A`
//! header, 42 bytes of CPLC and the status word. Offsets below index into
//! that buffer.

use bytes::Bytes;
use tps_apdu_core::CardTransport;
use tracing::debug;

use crate::{Error, Result, commands, commands::get_data, constants::get_data as objects};

/// Size of the CPLC buffer
pub const CPLC_RESPONSE_SIZE: usize = 47;
/// Le requesting the CPLC data object
const CPLC_LE: u8 = 0x2D;

/// Read the CPLC buffer from the selected Card Manager
pub fn get_cplc_data(transport: &mut dyn CardTransport) -> Result<Bytes> {
    let response = transport.transmit(&get_data::get_data(objects::CPLC, CPLC_LE))?;
    if !response.check_result() {
        return commands::expect_success("GET DATA CPLC", response);
    }
    let buffer = response.to_bytes();
    if buffer.len() != CPLC_RESPONSE_SIZE {
        return Err(Error::InvalidLength {
            expected: CPLC_RESPONSE_SIZE,
            actual: buffer.len(),
        });
    }
    debug!(cplc = %hex::encode_upper(&buffer), "Read CPLC data");
    Ok(buffer)
}

fn check_size(cplc: &[u8]) -> Result<()> {
    if cplc.len() < CPLC_RESPONSE_SIZE {
        return Err(Error::InvalidLength {
            expected: CPLC_RESPONSE_SIZE,
            actual: cplc.len(),
        });
    }
    Ok(())
}

/// Card unique identifier
///
/// IC fabricator and type, IC batch identifier, IC serial number, in that
/// order.
pub fn extract_cuid(cplc: &[u8]) -> Result<[u8; 10]> {
    check_size(cplc)?;
    let mut cuid = [0u8; 10];
    cuid[..4].copy_from_slice(&cplc[3..7]);
    cuid[4..6].copy_from_slice(&cplc[19..21]);
    cuid[6..].copy_from_slice(&cplc[15..19]);
    Ok(cuid)
}

/// Manufacturing serial number
pub fn extract_msn(cplc: &[u8]) -> Result<[u8; 4]> {
    check_size(cplc)?;
    let mut msn = [0u8; 4];
    msn.copy_from_slice(&cplc[41..45]);
    Ok(msn)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! REQUEST SENSE (6).
//!
//! CDB layout (SPC):
//!   [0] = 0x03 (REQUEST SENSE)
//!   [1] = DESC (bit 0), other bits reserved=0
//!   [2]..[3] = reserved (0)
//!   [4] = ALLOCATION LENGTH (number of bytes to return)
//!   [5] = CONTROL
//!
//! Only the fixed format is produced; a DESC=1 request still gets fixed
//! sense, which SPC allows for devices without descriptor support.

use crate::{
    block_device::BlockDevice,
    control_block::common::{LogicalUnit, Outcome, truncate},
    models::sense_data::SenseData,
};

pub const REQUEST_SENSE: u8 = 0x03;

/// Fill a REQUEST SENSE (6) CDB into `cdb[0..6]`.
#[inline]
pub fn fill_request_sense(
    cdb: &mut [u8; 16],
    desc: bool,
    allocation_len: u8,
    control: u8,
) {
    cdb.fill(0);
    cdb[0] = REQUEST_SENSE;
    cdb[1] = (desc as u8) & 0x01; // DESC bit (bit 0)
    cdb[4] = allocation_len;
    cdb[5] = control;
}

/// Convenience: DESC=0 (fixed format), CONTROL=0.
#[inline]
pub fn fill_request_sense_simple(cdb: &mut [u8; 16], allocation_len: u8) {
    fill_request_sense(cdb, false, allocation_len, 0x00)
}

/// Report and clear the pending sense.
///
/// Precedence: the sense of the last failed command, then a pending unit
/// attention, then the current readiness of the medium.
pub fn request_sense<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    allocation_len: u8,
) -> Result<Outcome, SenseData> {
    let stored = std::mem::take(unit.sense);
    let report = if !stored.is_no_sense() {
        stored
    } else if unit.media.unit_attention {
        unit.media.unit_attention = false;
        SenseData::medium_changed()
    } else if let Err(not_ready) = unit.ensure_ready() {
        not_ready
    } else {
        SenseData::NO_SENSE
    };

    Ok(Outcome::Respond(truncate(
        report.to_fixed_bytes().to_vec(),
        allocation_len as usize,
    )))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! START STOP UNIT (0x1B) and PREVENT ALLOW MEDIUM REMOVAL (0x1E). Both are
//! zero-data; their only effect is on [`MediaState`].
//!
//! [`MediaState`]: crate::control_block::common::MediaState

use tracing::info;

use crate::{
    block_device::BlockDevice,
    control_block::common::{LogicalUnit, Outcome},
    models::sense_data::SenseData,
};

pub const START_STOP_UNIT: u8 = 0x1B;
pub const MEDIUM_REMOVAL: u8 = 0x1E;

const START: u8 = 0x01;
const LOEJ: u8 = 0x02;
const PREVENT: u8 = 0x01;

#[inline]
pub fn fill_start_stop_unit(cdb: &mut [u8; 16], start: bool, load_eject: bool) {
    cdb.fill(0);
    cdb[0] = START_STOP_UNIT;
    cdb[4] = (if start { START } else { 0 }) | (if load_eject { LOEJ } else { 0 });
}

#[inline]
pub fn fill_medium_removal(cdb: &mut [u8; 16], prevent: bool) {
    cdb.fill(0);
    cdb[0] = MEDIUM_REMOVAL;
    cdb[4] = if prevent { PREVENT } else { 0 };
}

/// Decoded byte 4 of START STOP UNIT: (start, load_eject).
#[inline]
pub fn start_stop_bits(cdb: &[u8; 16]) -> (bool, bool) {
    (cdb[4] & START != 0, cdb[4] & LOEJ != 0)
}

#[inline]
pub fn prevent_bit(cdb: &[u8; 16]) -> bool {
    cdb[4] & PREVENT != 0
}

pub fn start_stop_unit<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    start: bool,
    load_eject: bool,
) -> Result<Outcome, SenseData> {
    match (start, load_eject) {
        (false, true) => {
            if unit.media.prevent_removal {
                return Err(SenseData::medium_removal_prevented());
            }
            info!("host ejected the medium");
            unit.media.ejected = true;
        },
        (true, true) => {
            if !unit.device.is_connected() {
                return Err(SenseData::medium_not_present());
            }
            unit.media.ejected = false;
        },
        (true, false) => unit.ensure_ready()?,
        (false, false) => {},
    }
    Ok(Outcome::Complete)
}

pub fn medium_removal<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    prevent: bool,
) -> Result<Outcome, SenseData> {
    if !unit.device.is_connected() {
        return Err(SenseData::medium_not_present());
    }
    unit.media.prevent_removal = prevent;
    Ok(Outcome::Complete)
}

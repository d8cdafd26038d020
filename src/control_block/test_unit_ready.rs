// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    block_device::BlockDevice,
    control_block::common::{LogicalUnit, Outcome},
    models::sense_data::SenseData,
};

/// Build a standard TEST UNIT READY CDB with the given CONTROL byte.
#[inline]
pub fn build_test_unit_ready(cdb: &mut [u8; 16], control: u8) {
    cdb.fill(0);
    cdb[0] = 0; // TEST UNIT READY(6) = 0x00
    cdb[5] = control;
}

/// GOOD when a medium is present, NOT READY / MEDIUM NOT PRESENT otherwise.
pub fn test_unit_ready<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
) -> Result<Outcome, SenseData> {
    unit.ensure_ready()?;
    Ok(Outcome::Complete)
}

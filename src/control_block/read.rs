// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    block_device::BlockDevice,
    control_block::common::{BlockRange, LogicalUnit, Outcome},
    models::sense_data::SenseData,
};

pub const READ_10: u8 = 0x28;

/// Build a padded 16-byte **SCSI READ(10)** CDB.
///
/// Parameters:
/// - `cdb`     : output buffer (will be zeroed; only 10 bytes are used, we keep
///   16 to match the CBWCB field)
/// - `lba`     : 32-bit Logical Block Address to start reading from
/// - `blocks`  : number of logical blocks to transfer (big-endian, 0 => no
///   transfer)
/// - `flags`   : RDPROTECT[7:5] | DPO[4] | FUA[3] (other bits must be zero)
/// - `control` : CONTROL byte
///
/// Layout (SBC):
/// - byte 0      : OPERATION CODE = 0x28
/// - byte 1      : flags (masked to RDPROTECT/DPO/FUA)
/// - bytes 2..5  : LBA (big-endian, 32-bit)
/// - byte 6      : GROUP NUMBER, left 0
/// - bytes 7..8  : TRANSFER LENGTH (big-endian, 16-bit)
/// - byte 9      : CONTROL
#[inline]
pub fn build_read10(cdb: &mut [u8; 16], lba: u32, blocks: u16, flags: u8, control: u8) {
    cdb.fill(0);
    cdb[0] = READ_10;
    cdb[1] = flags & 0b1111_1000; // allow RDPROTECT[7:5], DPO[4], FUA[3]
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb[7..9].copy_from_slice(&blocks.to_be_bytes());
    cdb[9] = control;
}

/// Validate a READ(10) and hand the byte range to the data-in engine.
pub fn read10<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    range: BlockRange,
) -> Result<Outcome, SenseData> {
    unit.ensure_ready()?;
    unit.ensure_in_range(&range)?;
    let block_size = unit.device.block_size();
    let length = u32::try_from(range.byte_len(block_size))
        .map_err(|_| SenseData::invalid_field_in_cdb())?;
    if length == 0 {
        return Ok(Outcome::Complete);
    }
    Ok(Outcome::ReadBlocks {
        offset: range.byte_offset(block_size),
        length,
    })
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Host-to-device commands: WRITE(10), VERIFY(10) and FORMAT UNIT.

use crate::{
    block_device::BlockDevice,
    control_block::common::{BlockRange, LogicalUnit, Outcome, Sink},
    models::sense_data::SenseData,
};

pub const WRITE_10: u8 = 0x2A;
pub const VERIFY_10: u8 = 0x2F;
pub const FORMAT_UNIT: u8 = 0x04;

/// BYTCHK bit of VERIFY(10) byte 1.
const BYTCHK: u8 = 0x02;
/// FMTDATA bit of FORMAT UNIT byte 1.
const FMTDATA: u8 = 0x10;

/// Build a 16-byte SCSI **WRITE(10)** CDB.
///
/// Parameters:
/// - `cdb`     : output buffer (will be zeroed; only 10 bytes are used)
/// - `lba`     : 32-bit Logical Block Address
/// - `blocks`  : number of logical blocks to transfer (0 => no transfer)
/// - `flags`   : WRPROTECT[7:5] | DPO[4] | FUA[3] | FUA_NV[1] (others must be
///   0)
/// - `control` : CONTROL byte
///
/// Layout (SBC):
/// - byte 0  : OPERATION CODE = 0x2A
/// - byte 1  : flags (reserved bits must be 0)
/// - bytes 2..5  : LBA (big-endian, 32-bit)
/// - byte 6  : GROUP NUMBER, left 0
/// - bytes 7..8  : TRANSFER LENGTH (big-endian, 16-bit)
/// - byte 9  : CONTROL
#[inline]
pub fn build_write10(cdb: &mut [u8; 16], lba: u32, blocks: u16, flags: u8, control: u8) {
    cdb.fill(0);
    cdb[0] = WRITE_10;
    cdb[1] = flags & 0b1111_1010; // allow WRPROTECT[7:5], DPO[4], FUA[3], FUA_NV[1]
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb[7..9].copy_from_slice(&blocks.to_be_bytes());
    cdb[9] = control;
}

/// Build a VERIFY(10) CDB; same layout as WRITE(10) with BYTCHK at byte 1.
#[inline]
pub fn build_verify10(cdb: &mut [u8; 16], lba: u32, blocks: u16, byte_check: bool) {
    cdb.fill(0);
    cdb[0] = VERIFY_10;
    cdb[1] = if byte_check { BYTCHK } else { 0 };
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb[7..9].copy_from_slice(&blocks.to_be_bytes());
}

#[inline]
pub fn byte_check(cdb: &[u8; 16]) -> bool {
    cdb[1] & BYTCHK != 0
}

#[inline]
pub fn format_data(cdb: &[u8; 16]) -> bool {
    cdb[1] & FMTDATA != 0
}

fn receive_range<D: BlockDevice>(
    unit: &LogicalUnit<'_, D>,
    range: BlockRange,
    sink: Sink,
) -> Result<Outcome, SenseData> {
    let block_size = unit.device.block_size();
    let length = u32::try_from(range.byte_len(block_size))
        .map_err(|_| SenseData::invalid_field_in_cdb())?;
    if length == 0 {
        return Ok(Outcome::Complete);
    }
    Ok(Outcome::Receive {
        offset: range.byte_offset(block_size),
        length,
        sink,
    })
}

pub fn write10<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    range: BlockRange,
) -> Result<Outcome, SenseData> {
    unit.ensure_ready()?;
    unit.ensure_in_range(&range)?;
    if unit.write_protected {
        return Err(SenseData::write_protected());
    }
    receive_range(unit, range, Sink::Write)
}

/// VERIFY(10). With `with_data` unset (BYTCHK=0 and no data stage) only
/// the medium and range are checked.
pub fn verify10<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    range: BlockRange,
    with_data: bool,
) -> Result<Outcome, SenseData> {
    unit.ensure_ready()?;
    unit.ensure_in_range(&range)?;
    if !with_data {
        return Ok(Outcome::Complete);
    }
    receive_range(unit, range, Sink::Verify)
}

/// FORMAT UNIT: no physical format happens; any parameter list is consumed.
pub fn format_unit<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    parameter_bytes: u32,
) -> Result<Outcome, SenseData> {
    unit.ensure_ready()?;
    if unit.write_protected {
        return Err(SenseData::write_protected());
    }
    if parameter_bytes == 0 {
        return Ok(Outcome::Complete);
    }
    Ok(Outcome::Receive {
        offset: 0,
        length: parameter_bytes,
        sink: Sink::Discard,
    })
}

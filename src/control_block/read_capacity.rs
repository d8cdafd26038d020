// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Result, anyhow};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    byteorder::{BigEndian, U32},
};

use crate::{
    block_device::BlockDevice,
    control_block::common::{LogicalUnit, Outcome},
    models::sense_data::SenseData,
};

pub const READ_CAPACITY_10: u8 = 0x25;

/// Build a padded 16-byte **SCSI READ CAPACITY(10)** CDB (opcode 0x25).
///
/// Parameters:
/// - `cdb`     : output buffer (zeroed; first 10 bytes used)
/// - `lba`     : 32-bit LBA hint (meaningful only when `pmi` = true; else set
///   0)
/// - `pmi`     : Partial Medium Indicator (true => return info for `lba`)
/// - `control` : CONTROL byte
#[inline]
pub fn build_read_capacity10(cdb: &mut [u8; 16], lba: u32, pmi: bool, control: u8) {
    cdb.fill(0);
    cdb[0] = READ_CAPACITY_10;
    cdb[2..6].copy_from_slice(&lba.to_be_bytes()); // only used if PMI=1
    cdb[8] = if pmi { 0x01 } else { 0x00 }; // PMI bit (bit 0)
    cdb[9] = control;
}

/// Raw 8-byte parameter data returned by READ CAPACITY(10) command
///
/// All fields are big-endian as per SBC.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Debug)]
pub struct Rc10Raw {
    /// Last addressable LBA (bytes 0-3)
    pub max_lba: U32<BigEndian>,
    /// Block length in bytes (bytes 4-7)
    pub block_len: U32<BigEndian>,
}

impl Rc10Raw {
    #[inline]
    pub fn total_bytes(&self) -> u64 {
        (self.max_lba.get() as u64 + 1) * self.block_len.get() as u64
    }
}

/// Parse READ CAPACITY(10) parameter data (needs ≥ 8 bytes).
#[inline]
pub fn parse_read_capacity10_zerocopy(buf: &[u8]) -> Result<&Rc10Raw> {
    let (raw, _rest) = Rc10Raw::ref_from_prefix(buf)
        .map_err(|_| anyhow!("READ CAPACITY(10): need ≥ 8 bytes, got {}", buf.len()))?;
    Ok(raw)
}

/// Last LBA and block length of the attached medium.
pub fn read_capacity10<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
) -> Result<Outcome, SenseData> {
    unit.ensure_ready()?;
    let raw = Rc10Raw {
        max_lba: U32::new(unit.device.block_count().saturating_sub(1)),
        block_len: U32::new(unit.device.block_size()),
    };
    Ok(Outcome::Respond(raw.as_bytes().to_vec()))
}

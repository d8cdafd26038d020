// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! READ FORMAT CAPACITIES (0x23), the UFI command Windows issues right
//! after enumeration.
//!
//! Response: a 4-byte capacity list header followed by one 8-byte
//! current/maximum capacity descriptor.
//!
//! ```text
//!   [0..3]  reserved
//!   [3]     capacity list length = 8
//!   [4..8]  number of blocks (BE)
//!   [8]     descriptor code: 0x02 formatted media, 0x03 no media present
//!   [9..12] block length (BE, 24-bit)
//! ```

use crate::{
    block_device::BlockDevice,
    control_block::common::{LogicalUnit, Outcome, truncate},
    models::sense_data::SenseData,
};

pub const READ_FORMAT_CAPACITIES: u8 = 0x23;
pub const FORMAT_CAPACITIES_LEN: usize = 12;

const FORMATTED_MEDIA: u8 = 0x02;
const NO_MEDIA: u8 = 0x03;

/// Fill a READ FORMAT CAPACITIES CDB; allocation length at [7..9].
#[inline]
pub fn fill_read_format_capacities(cdb: &mut [u8; 16], allocation_len: u16) {
    cdb.fill(0);
    cdb[0] = READ_FORMAT_CAPACITIES;
    cdb[7..9].copy_from_slice(&allocation_len.to_be_bytes());
}

/// Never fails: an absent medium is reported through the descriptor code.
pub fn read_format_capacities<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    allocation_len: u16,
) -> Result<Outcome, SenseData> {
    let code = if unit.ensure_ready().is_ok() {
        FORMATTED_MEDIA
    } else {
        NO_MEDIA
    };
    let block_len = unit.device.block_size().to_be_bytes();

    let mut b = vec![0u8; FORMAT_CAPACITIES_LEN];
    b[3] = 0x08;
    b[4..8].copy_from_slice(&unit.device.block_count().to_be_bytes());
    b[8] = code;
    b[9..12].copy_from_slice(&block_len[1..4]);
    Ok(Outcome::Respond(truncate(b, allocation_len as usize)))
}

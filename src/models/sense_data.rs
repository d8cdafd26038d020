// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt;

use anyhow::{Context, Result, anyhow};

/// Sense data must be ≥ 18 bytes for fixed format.
pub const FIXED_MIN_LEN: usize = 18;
/// Current error, fixed format.
pub const RESPONSE_CODE_CURRENT: u8 = 0x70;
/// Bytes following byte 7 in an 18-byte fixed-format record.
const ADDITIONAL_LEN: u8 = (FIXED_MIN_LEN - 8) as u8;

/// SPC-2 sense keys used by a direct-access USB device.
pub mod sense_key {
    pub const NO_SENSE: u8 = 0x0;
    pub const NOT_READY: u8 = 0x2;
    pub const MEDIUM_ERROR: u8 = 0x3;
    pub const ILLEGAL_REQUEST: u8 = 0x5;
    pub const UNIT_ATTENTION: u8 = 0x6;
    pub const DATA_PROTECT: u8 = 0x7;
}

/// SPC-4 Table 43: fixed format sense-data byte layout
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SenseData {
    pub valid: bool,        // bit7 of byte0
    pub response_code: u8,  // low-7 bits of byte0
    pub sense_key: u8,      // low-4 bits of byte2
    pub ili: bool,          // bit5 of byte2
    pub eom: bool,          // bit6 of byte2
    pub filemark: bool,     // bit7 of byte2
    pub information: u32,   // bytes 3-6
    pub additional_len: u8, // byte7
    pub cmd_specific: u32,  // bytes 8-11
    pub asc: u8,            // Additional Sense Code
    pub ascq: u8,           // Additional Sense Code Qualifier
}

impl Default for SenseData {
    fn default() -> Self {
        Self::NO_SENSE
    }
}

impl SenseData {
    pub const NO_SENSE: Self = Self::new(sense_key::NO_SENSE, 0x00, 0x00);

    /// A current, fixed-format record carrying only key / ASC / ASCQ.
    pub const fn new(sense_key: u8, asc: u8, ascq: u8) -> Self {
        Self {
            valid: false,
            response_code: RESPONSE_CODE_CURRENT,
            sense_key,
            ili: false,
            eom: false,
            filemark: false,
            information: 0,
            additional_len: ADDITIONAL_LEN,
            cmd_specific: 0,
            asc,
            ascq,
        }
    }

    pub const fn medium_not_present() -> Self {
        Self::new(sense_key::NOT_READY, 0x3A, 0x00)
    }

    pub const fn invalid_command_opcode() -> Self {
        Self::new(sense_key::ILLEGAL_REQUEST, 0x20, 0x00)
    }

    pub const fn lba_out_of_range() -> Self {
        Self::new(sense_key::ILLEGAL_REQUEST, 0x21, 0x00)
    }

    pub const fn invalid_field_in_cdb() -> Self {
        Self::new(sense_key::ILLEGAL_REQUEST, 0x24, 0x00)
    }

    pub const fn unrecovered_read_error() -> Self {
        Self::new(sense_key::MEDIUM_ERROR, 0x11, 0x00)
    }

    pub const fn write_fault() -> Self {
        Self::new(sense_key::MEDIUM_ERROR, 0x03, 0x00)
    }

    pub const fn write_protected() -> Self {
        Self::new(sense_key::DATA_PROTECT, 0x27, 0x00)
    }

    pub const fn medium_removal_prevented() -> Self {
        Self::new(sense_key::ILLEGAL_REQUEST, 0x53, 0x02)
    }

    /// Not-ready to ready transition, medium may have changed.
    pub const fn medium_changed() -> Self {
        Self::new(sense_key::UNIT_ATTENTION, 0x28, 0x00)
    }

    pub fn is_no_sense(&self) -> bool {
        self.sense_key == sense_key::NO_SENSE && self.asc == 0 && self.ascq == 0
    }

    /// Serialize to the 18-byte fixed format returned by REQUEST SENSE.
    pub fn to_fixed_bytes(&self) -> [u8; FIXED_MIN_LEN] {
        let mut b = [0u8; FIXED_MIN_LEN];
        b[0] = ((self.valid as u8) << 7) | (self.response_code & 0x7F);
        b[2] = ((self.filemark as u8) << 7)
            | ((self.eom as u8) << 6)
            | ((self.ili as u8) << 5)
            | (self.sense_key & 0x0F);
        b[3..7].copy_from_slice(&self.information.to_be_bytes());
        b[7] = self.additional_len;
        b[8..12].copy_from_slice(&self.cmd_specific.to_be_bytes());
        b[12] = self.asc;
        b[13] = self.ascq;
        b
    }

    /// Parse *fixed-format* sense-data (SPC-4 § 4.5.3).
    ///
    /// The buffer must be at least 18 bytes long.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < FIXED_MIN_LEN {
            return Err(anyhow!(
                "sense buffer too small: {} < {FIXED_MIN_LEN}",
                buf.len()
            ));
        }

        let valid = buf[0] & 0x80 != 0;
        let response_code = buf[0] & 0x7F;
        let filemark = buf[2] & 0x80 != 0;
        let eom = buf[2] & 0x40 != 0;
        let ili = buf[2] & 0x20 != 0;
        let sense_key = buf[2] & 0x0F;

        let information = u32::from_be_bytes(
            buf[3..7]
                .try_into()
                .context("failed to read Information field (bytes 3‥6)")?,
        );

        let additional_len = buf[7];

        let cmd_specific = u32::from_be_bytes(
            buf[8..12]
                .try_into()
                .context("failed to read Cmd-specific field (bytes 8‥11)")?,
        );

        Ok(Self {
            valid,
            response_code,
            sense_key,
            ili,
            eom,
            filemark,
            information,
            additional_len,
            cmd_specific,
            asc: buf[12],
            ascq: buf[13],
        })
    }
}

impl fmt::Debug for SenseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenseData")
            .field(
                "response_code",
                &format_args!("{:#04x}", self.response_code),
            )
            .field("sense_key", &format_args!("{:#x}", self.sense_key))
            .field("asc", &format_args!("{:#04x}", self.asc))
            .field("ascq", &format_args!("{:#04x}", self.ascq))
            .field("description", &asc_ascq_to_str(self.asc, self.ascq))
            .finish()
    }
}

/// Return the SPC description for a given ASC/ASCQ pair.
///
/// * If the pair is not present in the table, returns `"UNSPECIFIED /
///   vendor specific"`.
#[inline]
pub fn asc_ascq_to_str(asc: u8, ascq: u8) -> &'static str {
    hot_table(asc, ascq).unwrap_or("UNSPECIFIED / vendor specific")
}

fn hot_table(asc: u8, ascq: u8) -> Option<&'static str> {
    Some(match (asc, ascq) {
        (0x00, 0x00) => "No additional sense information",
        (0x03, 0x00) => "Peripheral device write fault",
        (0x11, 0x00) => "Unrecovered read error",
        (0x1A, 0x00) => "Parameter list length error",
        (0x20, 0x00) => "Invalid command operation code",
        (0x21, 0x00) => "Logical block address out of range",
        (0x24, 0x00) => "Invalid field in CDB",
        (0x25, 0x00) => "Logical unit not supported",
        (0x27, 0x00) => "Write protected",
        (0x28, 0x00) => "Not ready to ready change, medium may have changed",
        (0x3A, 0x00) => "Medium not present",
        (0x53, 0x02) => "Medium removal prevented",
        _ => return None,
    })
}

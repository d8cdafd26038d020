// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Operation codes of the SCSI commands a USB thumb-drive class device is
//! expected to answer (SPC-2 / SBC-2 subset).

use core::fmt;
use std::convert::TryFrom;

use thiserror::Error;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScsiOpcode {
    TestUnitReady = 0x00,
    RequestSense = 0x03,
    FormatUnit = 0x04,
    Inquiry = 0x12,
    ModeSelect6 = 0x15,
    ModeSense6 = 0x1A,
    StartStopUnit = 0x1B,
    /// PREVENT/ALLOW MEDIUM REMOVAL
    MediumRemoval = 0x1E,
    ReadFormatCapacities = 0x23,
    ReadCapacity10 = 0x25,
    Read10 = 0x28,
    Write10 = 0x2A,
    Verify10 = 0x2F,
    ModeSelect10 = 0x55,
    ModeSense10 = 0x5A,
}

/// Returned when the first CDB byte is outside the supported set.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unsupported SCSI opcode: 0x{0:02x}")]
pub struct UnknownOpcode(pub u8);

impl TryFrom<u8> for ScsiOpcode {
    type Error = UnknownOpcode;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0x00 => Self::TestUnitReady,
            0x03 => Self::RequestSense,
            0x04 => Self::FormatUnit,
            0x12 => Self::Inquiry,
            0x15 => Self::ModeSelect6,
            0x1A => Self::ModeSense6,
            0x1B => Self::StartStopUnit,
            0x1E => Self::MediumRemoval,
            0x23 => Self::ReadFormatCapacities,
            0x25 => Self::ReadCapacity10,
            0x28 => Self::Read10,
            0x2A => Self::Write10,
            0x2F => Self::Verify10,
            0x55 => Self::ModeSelect10,
            0x5A => Self::ModeSense10,
            other => return Err(UnknownOpcode(other)),
        })
    }
}

impl From<ScsiOpcode> for u8 {
    #[inline]
    fn from(op: ScsiOpcode) -> u8 {
        op as u8
    }
}

impl fmt::Display for ScsiOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TestUnitReady => "TEST UNIT READY",
            Self::RequestSense => "REQUEST SENSE",
            Self::FormatUnit => "FORMAT UNIT",
            Self::Inquiry => "INQUIRY",
            Self::ModeSelect6 => "MODE SELECT(6)",
            Self::ModeSense6 => "MODE SENSE(6)",
            Self::StartStopUnit => "START STOP UNIT",
            Self::MediumRemoval => "PREVENT ALLOW MEDIUM REMOVAL",
            Self::ReadFormatCapacities => "READ FORMAT CAPACITIES",
            Self::ReadCapacity10 => "READ CAPACITY(10)",
            Self::Read10 => "READ(10)",
            Self::Write10 => "WRITE(10)",
            Self::Verify10 => "VERIFY(10)",
            Self::ModeSelect10 => "MODE SELECT(10)",
            Self::ModeSense10 => "MODE SENSE(10)",
        })
    }
}

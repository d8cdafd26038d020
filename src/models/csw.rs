// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command Status Wrapper (CSW), the 13-byte status packet that closes a
//! Bulk-Only transaction on the bulk IN endpoint.
//!
//! ```text
//!   [0..4]   dCSWSignature    = 0x53425355 ("USBS")
//!   [4..8]   dCSWTag          copy of dCBWTag
//!   [8..12]  dCSWDataResidue  expected minus actually processed bytes
//!   [12]     bCSWStatus       0 passed, 1 failed, 2 phase error
//! ```

use core::fmt;

use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    byteorder::{LittleEndian, U32},
};

use crate::models::cbw::CommandBlockWrapper;

/// "USBS" in little-endian.
pub const CSW_SIGNATURE: u32 = 0x5342_5355;
pub const CSW_LEN: usize = 13;

#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    #[default]
    Success = 0x00,
    Failed = 0x01,
    PhaseError = 0x02,
}

impl TryFrom<u8> for CommandStatus {
    type Error = CswError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0x00 => Self::Success,
            0x01 => Self::Failed,
            0x02 => Self::PhaseError,
            other => return Err(CswError::UnknownStatus(other)),
        })
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CswError {
    #[error("CSW must be exactly {CSW_LEN} bytes, got {0}")]
    WrongLength(usize),
    #[error("invalid CSW signature 0x{0:08X}")]
    BadSignature(u32),
    #[error("unknown CSW status 0x{0:02X}")]
    UnknownStatus(u8),
}

#[repr(C)]
#[derive(Clone, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct CommandStatusWrapper {
    pub signature: U32<LittleEndian>,     // 0..4
    pub tag: U32<LittleEndian>,           // 4..8
    pub data_residue: U32<LittleEndian>,  // 8..12
    pub status: u8,                       // 12
}

const _: () = assert!(core::mem::size_of::<CommandStatusWrapper>() == CSW_LEN);

impl CommandStatusWrapper {
    /// Seed a CSW from the CBW it answers: same tag, residue equal to the
    /// full expected length, status passed.
    pub fn for_command(cbw: &CommandBlockWrapper) -> Self {
        Self {
            signature: U32::new(CSW_SIGNATURE),
            tag: cbw.tag,
            data_residue: cbw.data_transfer_length,
            status: CommandStatus::Success as u8,
        }
    }

    /// Host-side decoder for a received status packet.
    pub fn parse(buf: &[u8]) -> Result<Self, CswError> {
        let csw = Self::read_from_bytes(buf)
            .map_err(|_| CswError::WrongLength(buf.len()))?;
        let signature = csw.signature.get();
        if signature != CSW_SIGNATURE {
            return Err(CswError::BadSignature(signature));
        }
        CommandStatus::try_from(csw.status)?;
        Ok(csw)
    }

    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag.get()
    }

    #[inline]
    pub fn residue(&self) -> u32 {
        self.data_residue.get()
    }

    /// Reduce the residue by `n` processed bytes; never wraps below zero.
    #[inline]
    pub fn consume(&mut self, n: u32) {
        self.data_residue
            .set(self.data_residue.get().saturating_sub(n));
    }

    #[inline]
    pub fn status(&self) -> CommandStatus {
        CommandStatus::try_from(self.status).unwrap_or(CommandStatus::PhaseError)
    }

    #[inline]
    pub fn set_status(&mut self, status: CommandStatus) {
        self.status = status as u8;
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; CSW_LEN] {
        let mut out = [0u8; CSW_LEN];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

impl fmt::Debug for CommandStatusWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStatusWrapper")
            .field("tag", &format_args!("{:#010x}", self.tag.get()))
            .field("data_residue", &self.data_residue.get())
            .field("status", &self.status())
            .finish()
    }
}

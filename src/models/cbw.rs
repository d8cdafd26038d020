// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command Block Wrapper (CBW), the 31-byte envelope that opens every
//! Bulk-Only transaction on the bulk OUT endpoint.
//!
//! Layout (USB MSC BOT 1.0 § 5.1, scalars little-endian):
//!
//! ```text
//!   [0..4]   dCBWSignature            = 0x43425355 ("USBC")
//!   [4..8]   dCBWTag                  echoed back in the CSW
//!   [8..12]  dCBWDataTransferLength   bytes the host expects to move
//!   [12]     bmCBWFlags               bit 7: 1 = device-to-host
//!   [13]     bCBWLUN                  must be 0 (single LUN)
//!   [14]     bCBWCBLength             valid range 1..=16
//!   [15..31] CBWCB                    the SCSI command block
//! ```

use core::fmt;

use bitflags::bitflags;
use thiserror::Error;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    byteorder::{LittleEndian, U32},
};

/// "USBC" in little-endian.
pub const CBW_SIGNATURE: u32 = 0x4342_5355;
/// Exact length of a well-formed CBW packet.
pub const CBW_LEN: usize = 31;
/// Size of the CBWCB field.
pub const CDB_LEN: usize = 16;

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct CbwFlags: u8 {
        /// Data stage flows device-to-host.
        const DATA_IN = 0x80;
    }
}

/// Direction of the data stage as announced by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    /// dCBWDataTransferLength is zero; the direction bit is ignored.
    None,
    /// Device-to-host.
    In,
    /// Host-to-device.
    Out,
}

/// Why a 31-byte candidate was rejected as a CBW.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CbwError {
    #[error("CBW must be exactly {CBW_LEN} bytes, got {0}")]
    WrongLength(usize),
    #[error("invalid CBW signature 0x{0:08X}")]
    BadSignature(u32),
    #[error("CBW addressed to unsupported LUN {0}")]
    InvalidLun(u8),
    #[error("CBW command block length {0} is outside 1..=16")]
    InvalidCommandLength(u8),
}

impl CbwError {
    /// A packet of the wrong size only halts bulk OUT; a full-size packet
    /// that fails validation halts both endpoints.
    #[inline]
    pub fn stalls_in(&self) -> bool {
        !matches!(self, CbwError::WrongLength(_))
    }
}

#[repr(C)]
#[derive(Clone, Default, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct CommandBlockWrapper {
    pub signature: U32<LittleEndian>,            // 0..4
    pub tag: U32<LittleEndian>,                  // 4..8
    pub data_transfer_length: U32<LittleEndian>, // 8..12
    pub flags: u8,                               // 12
    pub lun: u8,                                 // 13
    pub cdb_length: u8,                          // 14
    pub cdb: [u8; CDB_LEN],                      // 15..31
}

const _: () = assert!(core::mem::size_of::<CommandBlockWrapper>() == CBW_LEN);

impl CommandBlockWrapper {
    /// Validate and copy a CBW out of a received OUT packet.
    ///
    /// Checks are applied in wire order: length, signature, LUN, command
    /// block length.
    pub fn parse(buf: &[u8]) -> Result<Self, CbwError> {
        let cbw = Self::read_from_bytes(buf)
            .map_err(|_| CbwError::WrongLength(buf.len()))?;

        let signature = cbw.signature.get();
        if signature != CBW_SIGNATURE {
            return Err(CbwError::BadSignature(signature));
        }
        if cbw.lun != 0 {
            return Err(CbwError::InvalidLun(cbw.lun));
        }
        if cbw.cdb_length == 0 || cbw.cdb_length as usize > CDB_LEN {
            return Err(CbwError::InvalidCommandLength(cbw.cdb_length));
        }
        Ok(cbw)
    }

    /// Host-side constructor. `cdb` is copied into the zero-padded CBWCB.
    pub fn new(
        tag: u32,
        data_transfer_length: u32,
        direction: DataDirection,
        cdb: &[u8],
    ) -> Result<Self, CbwError> {
        if cdb.is_empty() || cdb.len() > CDB_LEN {
            return Err(CbwError::InvalidCommandLength(
                u8::try_from(cdb.len()).unwrap_or(u8::MAX),
            ));
        }
        let mut block = [0u8; CDB_LEN];
        block[..cdb.len()].copy_from_slice(cdb);

        let flags = match direction {
            DataDirection::In => CbwFlags::DATA_IN,
            DataDirection::Out | DataDirection::None => CbwFlags::empty(),
        };

        Ok(Self {
            signature: U32::new(CBW_SIGNATURE),
            tag: U32::new(tag),
            data_transfer_length: U32::new(data_transfer_length),
            flags: flags.bits(),
            lun: 0,
            cdb_length: cdb.len() as u8,
            cdb: block,
        })
    }

    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag.get()
    }

    #[inline]
    pub fn data_transfer_length(&self) -> u32 {
        self.data_transfer_length.get()
    }

    #[inline]
    pub fn flags(&self) -> CbwFlags {
        CbwFlags::from_bits_truncate(self.flags)
    }

    /// Data stage direction; `None` whenever the host expects no data.
    pub fn direction(&self) -> DataDirection {
        if self.data_transfer_length() == 0 {
            DataDirection::None
        } else if self.flags().contains(CbwFlags::DATA_IN) {
            DataDirection::In
        } else {
            DataDirection::Out
        }
    }

    /// The full zero-padded command block. Decoders index into this so
    /// a short `cdb_length` never causes an out-of-bounds read.
    #[inline]
    pub fn command_block(&self) -> &[u8; CDB_LEN] {
        &self.cdb
    }

    #[inline]
    pub fn opcode(&self) -> u8 {
        self.cdb[0]
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; CBW_LEN] {
        let mut out = [0u8; CBW_LEN];
        out.copy_from_slice(self.as_bytes());
        out
    }
}

impl fmt::Debug for CommandBlockWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = (self.cdb_length as usize).min(CDB_LEN);
        f.debug_struct("CommandBlockWrapper")
            .field("signature", &format_args!("{:#010x}", self.signature.get()))
            .field("tag", &format_args!("{:#010x}", self.tag.get()))
            .field("data_transfer_length", &self.data_transfer_length.get())
            .field("direction", &self.direction())
            .field("lun", &self.lun)
            .field("cdb", &hex::encode(&self.cdb[..used]))
            .finish()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{block_device::BlockDevice, models::sense_data::SenseData};

/// Data stage a command implies on its own, independent of the CBW.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPhase {
    None,
    In,
    Out,
}

/// LBA + block count decoded from a 10-byte CDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub lba: u32,
    pub blocks: u16,
}

impl BlockRange {
    /// Decode bytes 2..6 (LBA) and 7..9 (TRANSFER LENGTH), both big-endian.
    #[inline]
    pub fn from_cdb10(cdb: &[u8; 16]) -> Self {
        Self {
            lba: u32::from_be_bytes([cdb[2], cdb[3], cdb[4], cdb[5]]),
            blocks: u16::from_be_bytes([cdb[7], cdb[8]]),
        }
    }

    #[inline]
    pub fn byte_offset(&self, block_size: u32) -> u64 {
        self.lba as u64 * block_size as u64
    }

    #[inline]
    pub fn byte_len(&self, block_size: u32) -> u64 {
        self.blocks as u64 * block_size as u64
    }

    /// Whether every addressed block lies on a medium of `block_count` blocks.
    #[inline]
    pub fn fits(&self, block_count: u32) -> bool {
        self.lba as u64 + self.blocks as u64 <= block_count as u64
    }
}

/// Where host data of an OUT stage ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    /// Committed through [`BlockDevice::write`].
    Write,
    /// Handed to [`BlockDevice::verify`].
    Verify,
    /// Parameter lists we accept and drop (MODE SELECT, FORMAT UNIT).
    Discard,
}

/// What a handler asks the transport to do after a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to move; report success.
    Complete,
    /// Send these bytes on IN (already cut to the allocation length).
    Respond(Vec<u8>),
    /// Stream `length` bytes from the device starting at `offset`.
    ReadBlocks { offset: u64, length: u32 },
    /// Accept `length` bytes from the host into `sink` starting at `offset`.
    Receive { offset: u64, length: u32, sink: Sink },
}

/// Identity strings reported by INQUIRY, already validated for length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: String,
    pub product_id: String,
    pub revision: String,
    pub serial_number: String,
    pub removable: bool,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            vendor_id: "RUST".to_string(),
            product_id: "MSC BOT Disk".to_string(),
            revision: "0100".to_string(),
            serial_number: "000000000001".to_string(),
            removable: true,
        }
    }
}

/// Medium-related state that survives across transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaState {
    /// Set by PREVENT ALLOW MEDIUM REMOVAL.
    pub prevent_removal: bool,
    /// Set by START STOP UNIT with LOEJ=1, START=0.
    pub ejected: bool,
    /// A medium-changed condition waits to be reported.
    pub unit_attention: bool,
}

/// Everything a command handler may touch while one command runs.
pub struct LogicalUnit<'a, D: BlockDevice> {
    pub device: &'a mut D,
    pub identity: &'a DeviceIdentity,
    pub media: &'a mut MediaState,
    pub sense: &'a mut SenseData,
    pub write_protected: bool,
}

impl<D: BlockDevice> LogicalUnit<'_, D> {
    /// Medium present and not ejected by the host.
    pub fn ensure_ready(&self) -> Result<(), SenseData> {
        if !self.device.is_connected() || self.media.ejected {
            return Err(SenseData::medium_not_present());
        }
        Ok(())
    }

    /// Range check shared by READ / WRITE / VERIFY.
    pub fn ensure_in_range(&self, range: &BlockRange) -> Result<(), SenseData> {
        if !range.fits(self.device.block_count()) {
            return Err(SenseData::lba_out_of_range());
        }
        Ok(())
    }
}

/// Cut a response to the host's allocation length.
#[inline]
pub fn truncate(mut data: Vec<u8>, allocation_len: usize) -> Vec<u8> {
    data.truncate(allocation_len);
    data
}

/// Copy `src` into `dst`, space-padding or cutting to `dst.len()`.
#[inline]
pub fn fill_ascii(dst: &mut [u8], src: &str) {
    dst.fill(b' ');
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src.as_bytes()[..n]);
}

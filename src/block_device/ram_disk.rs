// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::trace;

use crate::block_device::{BlockDevice, BlockDeviceError};

/// A zero-filled medium held in memory. Insertion and removal are
/// simulated with [`RamDisk::set_connected`].
#[derive(Debug, Clone)]
pub struct RamDisk {
    block_size: u32,
    block_count: u32,
    data: Vec<u8>,
    connected: bool,
}

impl RamDisk {
    pub fn new(block_size: u32, block_count: u32) -> Self {
        let len = block_size as usize * block_count as usize;
        Self {
            block_size,
            block_count,
            data: vec![0u8; len],
            connected: true,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Raw contents, for inspection.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn span(&self, offset: u64, len: usize) -> Result<std::ops::Range<usize>, BlockDeviceError> {
        if !self.connected {
            return Err(BlockDeviceError::NotConnected);
        }
        let capacity = self.data.len() as u64;
        let end = offset.checked_add(len as u64).filter(|&end| end <= capacity);
        match end {
            Some(end) => Ok(offset as usize..end as usize),
            None => Err(BlockDeviceError::OutOfRange {
                offset,
                len,
                capacity,
            }),
        }
    }
}

impl BlockDevice for RamDisk {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, BlockDeviceError> {
        let range = self.span(offset, buf.len())?;
        trace!(offset, len = buf.len(), "ram disk read");
        buf.copy_from_slice(&self.data[range]);
        Ok(buf.len())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<usize, BlockDeviceError> {
        let range = self.span(offset, data.len())?;
        trace!(offset, len = data.len(), "ram disk write");
        self.data[range].copy_from_slice(data);
        Ok(data.len())
    }
}

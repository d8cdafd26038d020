//! The storage collaborator behind the logical unit.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Volatile in-memory block device.
pub mod ram_disk;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockDeviceError {
    #[error("medium not present")]
    NotConnected,
    #[error("access at byte {offset} (+{len}) is past the end of a {capacity}-byte medium")]
    OutOfRange { offset: u64, len: usize, capacity: u64 },
    #[error("device i/o failed: {0}")]
    Io(String),
}

/// Byte-addressed view over a fixed-geometry medium.
///
/// Offsets are always `lba * block_size`; the engine never issues a
/// transfer that straddles the end of the medium. A transfer may complete
/// short, in which case the returned count is smaller than the buffer and
/// the engine fails the command.
///
/// # Locking
///
/// Implementations are not expected to lock internally. The engine owns
/// its device and calls it from a single task, so one BOT transaction has
/// exclusive access from CBW to CSW. Any other consumer must go through
/// [`crate::state_machine::bot_states::BulkOnlyTransport::device_mut`],
/// which only lends the device out while no transaction is in flight.
pub trait BlockDevice {
    /// Whether a medium is currently present.
    fn is_connected(&self) -> bool;

    fn block_size(&self) -> u32;

    fn block_count(&self) -> u32;

    #[inline]
    fn total_bytes(&self) -> u64 {
        self.block_size() as u64 * self.block_count() as u64
    }

    /// Read up to `buf.len()` bytes starting at `offset`.
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, BlockDeviceError>;

    /// Write `data` starting at `offset`.
    fn write(&mut self, offset: u64, data: &[u8]) -> Result<usize, BlockDeviceError>;

    /// Accept host data for VERIFY(10). The default accepts and discards it.
    fn verify(&mut self, offset: u64, data: &[u8]) -> Result<usize, BlockDeviceError> {
        let _ = offset;
        if !self.is_connected() {
            return Err(BlockDeviceError::NotConnected);
        }
        Ok(data.len())
    }
}

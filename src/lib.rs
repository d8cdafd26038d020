//! This crate provides a device-side implementation of the USB Mass-Storage
//! Bulk-Only Transport (BOT) protocol over an abstract block device.
// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// The storage collaborator the engine reads and writes through.
pub mod block_device;
/// Handles configuration, config-path resolution, and logging.
pub mod cfg;
/// Decoders and response producers for the supported SCSI commands, plus the
/// opcode dispatch table.
pub mod control_block;
/// Defines the byte-exact BOT wire structures (CBW, CSW, sense data).
pub mod models;
/// Async endpoint adapter and simulated host used to drive the engine.
pub mod port;
/// Contains the BOT session state machine and its data-stage engine.
pub mod state_machine;
/// Provides utility functions used throughout the crate.
pub mod utils;

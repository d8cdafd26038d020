//! This module defines the byte-exact wire structures of the Bulk-Only
//! Transport and the SCSI data it carries.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Defines the Command Block Wrapper and its validation.
pub mod cbw;
/// Defines the class-specific control requests (reset, max LUN).
pub mod class_request;
/// Defines the Command Status Wrapper.
pub mod csw;
/// Defines the SCSI opcode enumeration.
pub mod opcode;
/// Defines fixed-format sense data.
pub mod sense_data;

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Mass-storage class requests carried on the default control pipe
//! (BOT § 3.1 / 3.2).

/// bRequest of Bulk-Only Mass Storage Reset.
pub const BULK_ONLY_RESET: u8 = 0xFF;
/// bRequest of Get Max LUN.
pub const GET_MAX_LUN: u8 = 0xFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassRequest {
    BulkOnlyReset,
    GetMaxLun,
    Unsupported(u8),
}

impl From<u8> for ClassRequest {
    fn from(b_request: u8) -> Self {
        match b_request {
            BULK_ONLY_RESET => Self::BulkOnlyReset,
            GET_MAX_LUN => Self::GetMaxLun,
            other => Self::Unsupported(other),
        }
    }
}

/// What the control endpoint should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    /// Single data byte (Get Max LUN).
    Data(u8),
    /// Zero-length status stage.
    Ack,
    /// Protocol stall on the control pipe.
    Stall,
}

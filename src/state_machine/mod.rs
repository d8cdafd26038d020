//! The Bulk-Only Transport session engine and the pieces it is built from.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Idle-tick suspend detection.
pub mod activity;
/// The BOT state machine: CBW intake, data stages, CSW delivery, stalls.
pub mod bot_states;
/// Common structures and traits for state machines.
pub mod common;
/// Endpoint events in, endpoint effects out.
pub mod events;

pub use bot_states::{BotSettings, BotState, BulkOnlyTransport};

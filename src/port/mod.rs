// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Async plumbing around the synchronous engine: a task that owns the
//! [`BulkOnlyTransport`](crate::state_machine::BulkOnlyTransport) and a
//! host-side handle that talks to it the way a USB host controller would.

/// Timeout/cancel helpers shared by both sides.
pub mod common;
/// The task that owns the engine and serializes every endpoint event.
pub mod engine;
/// The simulated host: CBW out, data, CSW in, stall recovery.
pub mod host;

pub use engine::{BusMessage, EngineHandle, EngineSnapshot, spawn_engine};
pub use host::{HostPort, PortError, Transaction};

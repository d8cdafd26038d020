// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::models::csw::CSW_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Bulk IN (device-to-host).
    In,
    /// Bulk OUT (host-to-device).
    Out,
}

/// Hardware-style completion events fed into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A packet arrived on bulk OUT.
    OutReceived(Bytes),
    /// The packet last queued on bulk IN was taken by the host.
    InComplete,
    /// The host cleared the halt feature on an endpoint.
    ClearStall(Endpoint),
    /// Bulk-Only Mass Storage Reset class request.
    Reset,
    /// SET_CONFIGURATION (or bus reset) changed the active configuration.
    ConfigurationChanged,
}

/// Side effects the platform adapter must carry out, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Halt an endpoint.
    Stall(Endpoint),
    /// Queue one data-stage packet on bulk IN.
    SendData(Bytes),
    /// Queue the CSW on bulk IN.
    SendStatus([u8; CSW_LEN]),
    /// (Re-)arm bulk OUT to receive the next CBW.
    ArmOut,
}

/// Halt feature of both bulk endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointHalts {
    pub bulk_in: bool,
    pub bulk_out: bool,
}

impl EndpointHalts {
    #[inline]
    pub fn is_halted(&self, ep: Endpoint) -> bool {
        match ep {
            Endpoint::In => self.bulk_in,
            Endpoint::Out => self.bulk_out,
        }
    }

    #[inline]
    pub fn set(&mut self, ep: Endpoint, halted: bool) {
        match ep {
            Endpoint::In => self.bulk_in = halted,
            Endpoint::Out => self.bulk_out = halted,
        }
    }
}

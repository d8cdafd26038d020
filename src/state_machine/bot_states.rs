// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Bulk-Only Transport session state machine.
//!
//! ```text
//!   Idle ──CBW──▶ CommandReceived ──┬──▶ DataIn  ──┐
//!    ▲                              ├──▶ DataOut ──┼──▶ StatusPending ──CSW taken──▶ Idle
//!    │                              └──────────────┘          ▲
//!    └── Reset / ConfigurationChanged       Stalled ──ClearStall(IN)─┘
//! ```
//!
//! Every event runs through [`BulkOnlyTransport::handle`], which steps the
//! current state until one parks, and returns the side effects the
//! platform must apply. Nothing here blocks or retries.

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use crate::{
    block_device::{BlockDevice, BlockDeviceError},
    cfg::config::Config,
    control_block::{
        self, DecodedCommand, ScsiCommand,
        common::{DataPhase, DeviceIdentity, LogicalUnit, MediaState, Outcome, Sink},
    },
    models::{
        cbw::{CommandBlockWrapper, DataDirection},
        class_request::{ClassRequest, ControlResponse},
        csw::{CommandStatus, CommandStatusWrapper},
        sense_data::SenseData,
    },
    state_machine::{
        activity::ActivityMonitor,
        common::{StateMachine, StateMachineCtx, Transition},
        events::{Effect, Endpoint, EndpointHalts, Event},
    },
    utils::hex_preview,
};

/// Engine parameters fixed for the lifetime of a configuration.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub identity: DeviceIdentity,
    /// wMaxPacketSize of the bulk endpoints.
    pub max_packet_size: usize,
    pub write_protected: bool,
    pub suspend_idle_ticks: u32,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            max_packet_size: 64,
            write_protected: false,
            suspend_idle_ticks: 3,
        }
    }
}

impl From<&Config> for BotSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            identity: cfg.identity(),
            max_packet_size: cfg.transport.max_packet_size as usize,
            write_protected: cfg.device.write_protected.as_bool(),
            suspend_idle_ticks: cfg.transport.suspend_idle_ticks,
        }
    }
}

/// Per-transaction bookkeeping, created from an accepted CBW.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub cbw: CommandBlockWrapper,
    /// Seeded from the CBW; residue counts down as data moves.
    pub csw: CommandStatusWrapper,
    /// Bytes moved so far in the data stage.
    pub transferred: u32,
    /// Device byte offset of the next chunk.
    pub start_location: u64,
    /// Bytes still to move in the data stage.
    pub bytes_to_transfer: u32,
    /// Size of the packet in flight.
    pub packet_size: usize,
}

impl TransferSession {
    pub fn new(cbw: CommandBlockWrapper) -> Self {
        let csw = CommandStatusWrapper::for_command(&cbw);
        Self {
            cbw,
            csw,
            transferred: 0,
            start_location: 0,
            bytes_to_transfer: 0,
            packet_size: 0,
        }
    }

    #[inline]
    pub fn tag(&self) -> u32 {
        self.cbw.tag()
    }

    /// Account for `n` bytes that crossed the bus.
    fn advance(&mut self, n: usize) {
        let n32 = n as u32;
        self.bytes_to_transfer = self.bytes_to_transfer.saturating_sub(n32);
        self.transferred = self.transferred.saturating_add(n32);
        self.start_location += n as u64;
        self.csw.consume(n32);
    }
}

/// Where DataIn packets come from.
#[derive(Debug, Clone)]
enum InSource {
    /// A fixed response produced by the command handler.
    Buffer(Bytes),
    /// Block reads at `start_location`.
    Device,
}

pub struct Idle;

pub struct CommandReceived {
    session: TransferSession,
}

pub struct DataIn {
    session: TransferSession,
    source: InSource,
}

pub struct DataOut {
    session: TransferSession,
    sink: Sink,
}

pub struct StatusPending {
    tag: u32,
}

/// IN is halted with a CSW held back until the host clears it.
pub struct Stalled {
    csw: CommandStatusWrapper,
}

pub enum BotState {
    Idle(Idle),
    CommandReceived(CommandReceived),
    DataIn(DataIn),
    DataOut(DataOut),
    StatusPending(StatusPending),
    Stalled(Stalled),
}

impl Default for BotState {
    fn default() -> Self {
        BotState::Idle(Idle)
    }
}

impl BotState {
    pub fn name(&self) -> &'static str {
        match self {
            BotState::Idle(_) => "Idle",
            BotState::CommandReceived(_) => "CommandReceived",
            BotState::DataIn(_) => "DataIn",
            BotState::DataOut(_) => "DataOut",
            BotState::StatusPending(_) => "StatusPending",
            BotState::Stalled(_) => "Stalled",
        }
    }

    /// The open session, if a data stage is running.
    pub fn session(&self) -> Option<&TransferSession> {
        match self {
            BotState::CommandReceived(s) => Some(&s.session),
            BotState::DataIn(s) => Some(&s.session),
            BotState::DataOut(s) => Some(&s.session),
            _ => None,
        }
    }
}

/// What a state sees while it is stepped.
pub struct BotCtx<'a, D: BlockDevice> {
    pub unit: LogicalUnit<'a, D>,
    pub halts: &'a mut EndpointHalts,
    pub max_packet_size: usize,
    /// The event being handled; taken by the state that consumes it.
    pub event: Option<Event>,
}

type BotStep = Transition<BotState, Vec<Effect>>;

impl<D: BlockDevice> BotCtx<'_, D> {
    fn stall(&mut self, ep: Endpoint, fx: &mut Vec<Effect>) {
        warn!(endpoint = ?ep, "stalling bulk endpoint");
        self.halts.set(ep, true);
        fx.push(Effect::Stall(ep));
    }
}

fn queue_status(csw: &CommandStatusWrapper, mut fx: Vec<Effect>) -> BotStep {
    info!(
        tag = csw.tag(),
        residue = csw.residue(),
        status = ?csw.status(),
        "CSW queued"
    );
    fx.push(Effect::SendStatus(csw.to_bytes()));
    Transition::Wait(StatusPending { tag: csw.tag() }.into(), fx)
}

/// End a transaction whose data stage moved nothing more (or never ran).
///
/// Leftover residue means the host still expects data: on IN the endpoint
/// is halted and the CSW waits for the clear; on OUT the endpoint is halted
/// and the CSW is queued at once.
fn finish<D: BlockDevice>(
    session: TransferSession,
    ctx: &mut BotCtx<'_, D>,
    mut fx: Vec<Effect>,
) -> BotStep {
    if session.csw.residue() == 0 {
        return queue_status(&session.csw, fx);
    }
    match session.cbw.direction() {
        DataDirection::In => {
            ctx.stall(Endpoint::In, &mut fx);
            Transition::Wait(Stalled { csw: session.csw }.into(), fx)
        },
        DataDirection::Out => {
            ctx.stall(Endpoint::Out, &mut fx);
            queue_status(&session.csw, fx)
        },
        DataDirection::None => queue_status(&session.csw, fx),
    }
}

/// Halt both endpoints and hold a PhaseError CSW until IN is cleared.
fn phase_error<D: BlockDevice>(
    mut session: TransferSession,
    ctx: &mut BotCtx<'_, D>,
    reason: &'static str,
) -> BotStep {
    warn!(
        tag = session.tag(),
        dtl = session.cbw.data_transfer_length(),
        reason,
        "phase error"
    );
    let mut fx = Vec::with_capacity(2);
    ctx.stall(Endpoint::Out, &mut fx);
    ctx.stall(Endpoint::In, &mut fx);
    session.csw.set_status(CommandStatus::PhaseError);
    Transition::Wait(Stalled { csw: session.csw }.into(), fx)
}

fn phase_agrees(phase: DataPhase, direction: DataDirection) -> bool {
    matches!(
        (phase, direction),
        (DataPhase::In, DataDirection::In) | (DataPhase::Out, DataDirection::Out)
    )
}

/// Host/device disagreements that BOT resolves with a phase error: a block
/// command whose declared length differs from the CDB, or a data stage in
/// the opposite direction of the command.
fn phase_mismatch(
    cbw: &CommandBlockWrapper,
    decoded: &DecodedCommand,
    block_size: u32,
) -> Option<&'static str> {
    let direction = cbw.direction();
    match decoded.command.implied_length(block_size) {
        Some(implied) => {
            if implied != cbw.data_transfer_length() as u64 {
                Some("declared length differs from CDB transfer length")
            } else if implied > 0 && !phase_agrees(decoded.phase, direction) {
                Some("data stage direction differs from command")
            } else {
                None
            }
        },
        None => match (decoded.phase, direction) {
            (DataPhase::In, DataDirection::Out) | (DataPhase::Out, DataDirection::In) => {
                Some("data stage direction differs from command")
            },
            _ => None,
        },
    }
}

fn device_sense(err: &BlockDeviceError, reading: bool) -> SenseData {
    match err {
        BlockDeviceError::NotConnected => SenseData::medium_not_present(),
        BlockDeviceError::OutOfRange { .. } => SenseData::lba_out_of_range(),
        BlockDeviceError::Io(_) if reading => SenseData::unrecovered_read_error(),
        BlockDeviceError::Io(_) => SenseData::write_fault(),
    }
}

impl<'a, D: BlockDevice> StateMachine<BotCtx<'a, D>, BotStep> for Idle {
    fn step(self, ctx: &mut BotCtx<'a, D>) -> BotStep {
        let Some(Event::OutReceived(packet)) = ctx.event.take() else {
            return Transition::Wait(self.into(), vec![]);
        };

        match CommandBlockWrapper::parse(&packet) {
            Ok(cbw) => {
                debug!(?cbw, "CBW accepted");
                Transition::Next(
                    CommandReceived {
                        session: TransferSession::new(cbw),
                    }
                    .into(),
                    vec![],
                )
            },
            Err(e) => {
                warn!(error = %e, packet = %hex_preview(&packet, 32), "CBW rejected");
                let mut fx = Vec::with_capacity(2);
                ctx.stall(Endpoint::Out, &mut fx);
                if e.stalls_in() {
                    ctx.stall(Endpoint::In, &mut fx);
                }
                Transition::Wait(self.into(), fx)
            },
        }
    }
}

impl<'a, D: BlockDevice> StateMachine<BotCtx<'a, D>, BotStep> for CommandReceived {
    fn step(self, ctx: &mut BotCtx<'a, D>) -> BotStep {
        let mut session = self.session;

        let decoded = match control_block::decode(&session.cbw) {
            Ok(d) => d,
            // Unknown opcodes still complete with a Failed CSW; the
            // transaction is never dropped without status.
            Err(e) => {
                warn!(tag = session.tag(), error = %e, "unsupported command");
                *ctx.unit.sense = SenseData::invalid_command_opcode();
                session.csw.set_status(CommandStatus::Failed);
                return finish(session, ctx, vec![]);
            },
        };

        let block_size = ctx.unit.device.block_size();
        if let Some(reason) = phase_mismatch(&session.cbw, &decoded, block_size) {
            return phase_error(session, ctx, reason);
        }

        if !matches!(decoded.command, ScsiCommand::RequestSense { .. }) {
            *ctx.unit.sense = SenseData::NO_SENSE;
        }

        let dtl = session.cbw.data_transfer_length();
        match control_block::execute(&decoded.command, &mut ctx.unit) {
            Err(sense) => {
                info!(tag = session.tag(), opcode = %decoded.opcode, ?sense, "command failed");
                *ctx.unit.sense = sense;
                session.csw.set_status(CommandStatus::Failed);
                finish(session, ctx, vec![])
            },
            Ok(Outcome::Complete) => finish(session, ctx, vec![]),
            Ok(Outcome::Respond(data)) => {
                let mut data = Bytes::from(data);
                data.truncate(dtl as usize);
                if data.is_empty() {
                    return finish(session, ctx, vec![]);
                }
                session.bytes_to_transfer = data.len() as u32;
                DataIn {
                    session,
                    source: InSource::Buffer(data),
                }
                .send_next(ctx)
            },
            Ok(Outcome::ReadBlocks { offset, length }) => {
                session.start_location = offset;
                session.bytes_to_transfer = length.min(dtl);
                if session.bytes_to_transfer == 0 {
                    return finish(session, ctx, vec![]);
                }
                DataIn {
                    session,
                    source: InSource::Device,
                }
                .send_next(ctx)
            },
            Ok(Outcome::Receive {
                offset,
                length,
                sink,
            }) => {
                session.start_location = offset;
                session.bytes_to_transfer = length.min(dtl);
                if session.bytes_to_transfer == 0 {
                    return finish(session, ctx, vec![]);
                }
                debug!(tag = session.tag(), bytes = session.bytes_to_transfer, ?sink, "data-out stage");
                Transition::Wait(DataOut { session, sink }.into(), vec![])
            },
        }
    }
}

impl DataIn {
    /// Produce the next packet, or fail the command without sending
    /// anything if the device cannot deliver it.
    fn send_next<D: BlockDevice>(mut self, ctx: &mut BotCtx<'_, D>) -> BotStep {
        let chunk = (self.session.bytes_to_transfer as usize).min(ctx.max_packet_size);

        let packet = match &self.source {
            InSource::Buffer(data) => {
                let at = self.session.transferred as usize;
                data.slice(at..at + chunk)
            },
            InSource::Device => {
                let mut buf = vec![0u8; chunk];
                let offset = self.session.start_location;
                match ctx.unit.device.read(offset, &mut buf) {
                    Ok(n) if n == chunk => Bytes::from(buf),
                    res => {
                        let sense = match res {
                            Err(e) => {
                                warn!(offset, error = %e, "device read failed");
                                device_sense(&e, true)
                            },
                            Ok(n) => {
                                warn!(offset, got = n, want = chunk, "short device read");
                                SenseData::unrecovered_read_error()
                            },
                        };
                        *ctx.unit.sense = sense;
                        self.session.csw.set_status(CommandStatus::Failed);
                        let mut fx = Vec::with_capacity(1);
                        ctx.stall(Endpoint::In, &mut fx);
                        return Transition::Wait(
                            Stalled {
                                csw: self.session.csw,
                            }
                            .into(),
                            fx,
                        );
                    },
                }
            },
        };

        self.session.packet_size = packet.len();
        trace!(tag = self.session.tag(), len = packet.len(), "data-in packet");
        Transition::Wait(self.into(), vec![Effect::SendData(packet)])
    }
}

impl<'a, D: BlockDevice> StateMachine<BotCtx<'a, D>, BotStep> for DataIn {
    fn step(mut self, ctx: &mut BotCtx<'a, D>) -> BotStep {
        match ctx.event.take() {
            Some(Event::InComplete) => {},
            Some(Event::OutReceived(p)) => {
                warn!(len = p.len(), "OUT packet during data-in stage, dropped");
                return Transition::Wait(self.into(), vec![]);
            },
            _ => return Transition::Wait(self.into(), vec![]),
        }

        let sent = self.session.packet_size;
        self.session.advance(sent);
        if self.session.bytes_to_transfer > 0 {
            return self.send_next(ctx);
        }

        // A full-size last packet with residue left gives the host no
        // short-packet terminator, so halt IN before the CSW.
        if self.session.csw.residue() > 0 && sent == ctx.max_packet_size {
            let mut fx = Vec::with_capacity(1);
            ctx.stall(Endpoint::In, &mut fx);
            return Transition::Wait(
                Stalled {
                    csw: self.session.csw,
                }
                .into(),
                fx,
            );
        }
        queue_status(&self.session.csw, vec![])
    }
}

impl<'a, D: BlockDevice> StateMachine<BotCtx<'a, D>, BotStep> for DataOut {
    fn step(mut self, ctx: &mut BotCtx<'a, D>) -> BotStep {
        let packet = match ctx.event.take() {
            Some(Event::OutReceived(p)) => p,
            _ => return Transition::Wait(self.into(), vec![]),
        };

        if packet.len() > ctx.max_packet_size {
            return phase_error(self.session, ctx, "OUT packet exceeds max packet size");
        }

        let accepted = packet.len().min(self.session.bytes_to_transfer as usize);
        let data = &packet[..accepted];
        let offset = self.session.start_location;
        let result = match self.sink {
            Sink::Write => ctx.unit.device.write(offset, data),
            Sink::Verify => ctx.unit.device.verify(offset, data),
            Sink::Discard => Ok(accepted),
        };

        let failure = match result {
            Ok(n) if n >= accepted => {
                self.session.advance(accepted);
                None
            },
            Ok(n) => {
                warn!(offset, got = n, want = accepted, "short device write");
                self.session.advance(n);
                Some(SenseData::write_fault())
            },
            Err(e) => {
                warn!(offset, error = %e, "device write failed");
                Some(device_sense(&e, false))
            },
        };

        if let Some(sense) = failure {
            *ctx.unit.sense = sense;
            self.session.csw.set_status(CommandStatus::Failed);
            let mut fx = Vec::with_capacity(2);
            ctx.stall(Endpoint::Out, &mut fx);
            return queue_status(&self.session.csw, fx);
        }

        if self.session.bytes_to_transfer > 0 {
            trace!(tag = self.session.tag(), remaining = self.session.bytes_to_transfer, "data-out packet");
            return Transition::Wait(self.into(), vec![]);
        }
        finish(self.session, ctx, vec![])
    }
}

impl<'a, D: BlockDevice> StateMachine<BotCtx<'a, D>, BotStep> for StatusPending {
    fn step(self, ctx: &mut BotCtx<'a, D>) -> BotStep {
        match ctx.event.take() {
            Some(Event::InComplete) => {
                debug!(tag = self.tag, "CSW delivered");
                Transition::Wait(Idle.into(), vec![])
            },
            Some(Event::OutReceived(p)) => {
                warn!(len = p.len(), "OUT packet before CSW was read, dropped");
                Transition::Wait(self.into(), vec![])
            },
            _ => Transition::Wait(self.into(), vec![]),
        }
    }
}

impl<'a, D: BlockDevice> StateMachine<BotCtx<'a, D>, BotStep> for Stalled {
    fn step(self, ctx: &mut BotCtx<'a, D>) -> BotStep {
        match ctx.event.take() {
            Some(Event::ClearStall(Endpoint::In)) => queue_status(&self.csw, vec![]),
            Some(Event::OutReceived(p)) => {
                warn!(len = p.len(), "OUT packet while IN is halted, dropped");
                Transition::Wait(self.into(), vec![])
            },
            _ => Transition::Wait(self.into(), vec![]),
        }
    }
}

macro_rules! into_state {
    ($($ty:ident),*) => {
        $(impl From<$ty> for BotState {
            #[inline]
            fn from(s: $ty) -> Self {
                BotState::$ty(s)
            }
        })*
    };
}
into_state!(Idle, CommandReceived, DataIn, DataOut, StatusPending, Stalled);

/// A single-LUN Bulk-Only Transport device over `D`.
pub struct BulkOnlyTransport<D: BlockDevice> {
    device: D,
    settings: BotSettings,
    state: BotState,
    halts: EndpointHalts,
    sense: SenseData,
    media: MediaState,
    activity: ActivityMonitor,
    medium_present: bool,
}

impl<D: BlockDevice> BulkOnlyTransport<D> {
    pub fn new(device: D, mut settings: BotSettings) -> Self {
        settings.max_packet_size = settings.max_packet_size.max(8);
        let medium_present = device.is_connected();
        let activity = ActivityMonitor::new(settings.suspend_idle_ticks);
        Self {
            device,
            settings,
            state: BotState::default(),
            halts: EndpointHalts::default(),
            sense: SenseData::NO_SENSE,
            media: MediaState::default(),
            activity,
            medium_present,
        }
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, BotState::Idle(_))
    }

    pub fn halts(&self) -> EndpointHalts {
        self.halts
    }

    /// Sense data that the next REQUEST SENSE would report.
    pub fn sense(&self) -> &SenseData {
        &self.sense
    }

    pub fn media_state(&self) -> MediaState {
        self.media
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Lend the device to another consumer. Only possible between
    /// transactions, so a CBW..CSW sequence always sees the medium
    /// undisturbed.
    pub fn device_mut(&mut self) -> Option<&mut D> {
        if self.is_idle() {
            Some(&mut self.device)
        } else {
            None
        }
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Abort the open transaction, if any. Endpoint halts are left for the
    /// host to clear.
    pub fn reset(&mut self) {
        if !self.is_idle() {
            info!(state = self.state.name(), "bulk-only reset aborts transaction");
        }
        self.state = BotState::default();
    }

    /// Answer a class-specific control request.
    pub fn control_request(&mut self, request: ClassRequest) -> ControlResponse {
        self.activity.record();
        match request {
            ClassRequest::GetMaxLun => ControlResponse::Data(0),
            ClassRequest::BulkOnlyReset => {
                self.reset();
                ControlResponse::Ack
            },
            ClassRequest::Unsupported(b_request) => {
                warn!(b_request, "unsupported class request");
                ControlResponse::Stall
            },
        }
    }

    /// Sample medium presence. A medium that comes back raises a unit
    /// attention for the next command; one that goes away drops any
    /// removal lock.
    pub fn poll_media(&mut self) -> bool {
        let present = self.device.is_connected();
        if present != self.medium_present {
            info!(present, "medium presence changed");
            if present {
                self.media.unit_attention = true;
                self.media.ejected = false;
            } else {
                self.media.prevent_removal = false;
            }
            self.medium_present = present;
        }
        present
    }

    /// One idle-timer period; returns whether the link is suspended.
    pub fn timer_tick(&mut self) -> bool {
        self.activity.tick()
    }

    pub fn is_suspended(&self) -> bool {
        self.activity.is_suspended()
    }

    fn step_until_parked(&mut self, event: Event) -> Vec<Effect> {
        let mut ctx = BotCtx {
            unit: LogicalUnit {
                device: &mut self.device,
                identity: &self.settings.identity,
                media: &mut self.media,
                sense: &mut self.sense,
                write_protected: self.settings.write_protected,
            },
            halts: &mut self.halts,
            max_packet_size: self.settings.max_packet_size,
            event: Some(event),
        };

        let mut state = std::mem::take(&mut self.state);
        let mut effects = Vec::new();
        loop {
            let from = state.name();
            let step = match state {
                BotState::Idle(s) => s.step(&mut ctx),
                BotState::CommandReceived(s) => s.step(&mut ctx),
                BotState::DataIn(s) => s.step(&mut ctx),
                BotState::DataOut(s) => s.step(&mut ctx),
                BotState::StatusPending(s) => s.step(&mut ctx),
                BotState::Stalled(s) => s.step(&mut ctx),
            };
            let (next, mut fx, parked) = match step {
                Transition::Next(next, fx) => (next, fx, false),
                Transition::Wait(next, fx) => (next, fx, true),
            };
            if from != next.name() {
                debug!(from, to = next.name(), "BOT transition");
            }
            effects.append(&mut fx);
            state = next;
            if parked {
                break;
            }
        }
        self.state = state;
        effects
    }
}

impl<D: BlockDevice> StateMachineCtx<Event, Vec<Effect>> for BulkOnlyTransport<D> {
    /// Apply one endpoint event and return the effects to carry out.
    fn handle(&mut self, event: Event) -> Vec<Effect> {
        self.activity.record();
        match event {
            Event::Reset => {
                self.reset();
                vec![]
            },
            Event::ConfigurationChanged => {
                info!("configuration changed, session reset");
                self.state = BotState::default();
                self.halts = EndpointHalts::default();
                vec![Effect::ArmOut]
            },
            Event::ClearStall(ep) => {
                debug!(endpoint = ?ep, "halt cleared");
                self.halts.set(ep, false);
                self.step_until_parked(event)
            },
            Event::OutReceived(ref p) if self.halts.bulk_out => {
                warn!(len = p.len(), "bulk OUT is halted, packet dropped");
                vec![]
            },
            event => self.step_until_parked(event),
        }
    }
}

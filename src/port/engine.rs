// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    block_device::BlockDevice,
    control_block::common::MediaState,
    models::{
        class_request::{ClassRequest, ControlResponse},
        sense_data::SenseData,
    },
    state_machine::{
        BulkOnlyTransport,
        common::StateMachineCtx,
        events::{Effect, EndpointHalts, Event},
    },
};

/// Everything the bus can ask of the engine task.
#[derive(Debug)]
pub enum BusMessage {
    /// An endpoint event; the reply carries the effects it produced.
    Event(Event, oneshot::Sender<Vec<Effect>>),
    /// A class-specific control request on endpoint 0.
    Control(ClassRequest, oneshot::Sender<ControlResponse>),
    /// Read-only view of the engine, for diagnostics and tests.
    Snapshot(oneshot::Sender<EngineSnapshot>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub state: &'static str,
    pub halts: EndpointHalts,
    pub sense: SenseData,
    pub media: MediaState,
    pub suspended: bool,
}

impl<D: BlockDevice> From<&BulkOnlyTransport<D>> for EngineSnapshot {
    fn from(engine: &BulkOnlyTransport<D>) -> Self {
        Self {
            state: engine.state().name(),
            halts: engine.halts(),
            sense: *engine.sense(),
            media: engine.media_state(),
            suspended: engine.is_suspended(),
        }
    }
}

/// Serve bus messages until `cancel` fires or every sender is dropped.
///
/// Events are applied strictly one at a time, so the engine never sees
/// two completions race. Each timer period advances suspend detection
/// and samples medium presence.
pub async fn run_engine<D: BlockDevice>(
    mut engine: BulkOnlyTransport<D>,
    mut rx: mpsc::Receiver<BusMessage>,
    idle_tick: Duration,
    cancel: CancellationToken,
) -> BulkOnlyTransport<D> {
    let mut ticker = interval(idle_tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("engine task cancelled");
                break;
            }
            msg = rx.recv() => {
                let Some(msg) = msg else {
                    debug!("bus closed");
                    break;
                };
                match msg {
                    BusMessage::Event(event, reply) => {
                        let effects = engine.handle(event);
                        let _ = reply.send(effects);
                    },
                    BusMessage::Control(request, reply) => {
                        let _ = reply.send(engine.control_request(request));
                    },
                    BusMessage::Snapshot(reply) => {
                        let _ = reply.send(EngineSnapshot::from(&engine));
                    },
                }
            }
            _ = ticker.tick() => {
                engine.poll_media();
                engine.timer_tick();
            }
        }
    }
    engine
}

/// Owner side of a spawned engine task.
pub struct EngineHandle<D: BlockDevice> {
    tx: mpsc::Sender<BusMessage>,
    cancel: CancellationToken,
    join: JoinHandle<BulkOnlyTransport<D>>,
}

impl<D: BlockDevice> EngineHandle<D> {
    pub fn sender(&self) -> mpsc::Sender<BusMessage> {
        self.tx.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the task and take the engine (and so the device) back.
    pub async fn shutdown(self) -> Result<BulkOnlyTransport<D>> {
        self.cancel.cancel();
        self.join.await.context("engine task panicked")
    }
}

/// Move `engine` onto its own task.
pub fn spawn_engine<D>(engine: BulkOnlyTransport<D>, idle_tick: Duration) -> EngineHandle<D>
where
    D: BlockDevice + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    info!(
        max_packet_size = engine.settings().max_packet_size,
        "engine task started"
    );
    let join = tokio::spawn(run_engine(engine, rx, idle_tick, cancel.clone()));
    EngineHandle { tx, cancel, join }
}

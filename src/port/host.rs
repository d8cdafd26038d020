// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    control_block::{
        inquiry::fill_inquiry_standard,
        read::build_read10,
        read_capacity::{build_read_capacity10, parse_read_capacity10_zerocopy},
        request_sense::fill_request_sense_simple,
        test_unit_ready::build_test_unit_ready,
        write::build_write10,
    },
    models::{
        cbw::{CbwError, CommandBlockWrapper, DataDirection},
        class_request::{ClassRequest, ControlResponse},
        csw::{CSW_LEN, CommandStatus, CommandStatusWrapper, CswError},
        sense_data::SenseData,
    },
    port::{
        common::reply_with_timeout,
        engine::{BusMessage, EngineSnapshot},
    },
    state_machine::events::{Effect, Endpoint, EndpointHalts, Event},
};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("engine task is gone")]
    Closed,
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("CBW rejected, bulk OUT halted")]
    CommandRejected,
    #[error("device sent no status")]
    NoStatus,
    #[error("CSW tag {got:#010x} does not answer CBW tag {want:#010x}")]
    TagMismatch { want: u32, got: u32 },
    #[error("malformed response: {0}")]
    BadResponse(String),
    #[error(transparent)]
    Csw(#[from] CswError),
    #[error(transparent)]
    Cbw(#[from] CbwError),
}

/// Outcome of one CBW..CSW exchange as the host saw it.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Everything received in the data-in stage.
    pub data: Vec<u8>,
    pub csw: CommandStatusWrapper,
    /// The host had to clear a bulk IN halt to get the CSW.
    pub stalled_in: bool,
    /// Bulk OUT was halted during the exchange (and has been cleared).
    pub stalled_out: bool,
}

impl Transaction {
    #[inline]
    pub fn status(&self) -> CommandStatus {
        self.csw.status()
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.status() == CommandStatus::Success
    }
}

/// What sits in the bulk IN FIFO.
#[derive(Debug, Clone)]
enum InPacket {
    Data(Bytes),
    Status([u8; CSW_LEN]),
}

/// Host end of the bus. Drives the engine task one packet at a time and
/// keeps the IN FIFO and the halt bits as a host controller would see
/// them.
pub struct HostPort {
    tx: mpsc::Sender<BusMessage>,
    cancel: CancellationToken,
    max_packet_size: usize,
    response_timeout: Duration,
    tag: AtomicU32,
    in_fifo: VecDeque<InPacket>,
    halts: EndpointHalts,
}

impl HostPort {
    pub fn new(
        tx: mpsc::Sender<BusMessage>,
        cancel: CancellationToken,
        max_packet_size: usize,
        response_timeout: Duration,
    ) -> Self {
        Self {
            tx,
            cancel,
            max_packet_size: max_packet_size.max(8),
            response_timeout,
            tag: AtomicU32::new(1),
            in_fifo: VecDeque::new(),
            halts: EndpointHalts::default(),
        }
    }

    /// Next CBW tag.
    pub fn next_tag(&self) -> u32 {
        self.tag.fetch_add(1, Ordering::SeqCst)
    }

    pub fn halts(&self) -> EndpointHalts {
        self.halts
    }

    async fn request<T>(
        &self,
        label: &'static str,
        make: impl FnOnce(oneshot::Sender<T>) -> BusMessage,
    ) -> Result<T, PortError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| PortError::Closed)?;
        reply_with_timeout(label, reply_rx, self.response_timeout, &self.cancel).await
    }

    /// Deliver one endpoint event and apply the effects to the host view.
    pub async fn send_event(&mut self, event: Event) -> Result<(), PortError> {
        let effects = self.request("event", |tx| BusMessage::Event(event, tx)).await?;
        for fx in effects {
            match fx {
                Effect::Stall(ep) => self.halts.set(ep, true),
                Effect::SendData(data) => self.in_fifo.push_back(InPacket::Data(data)),
                Effect::SendStatus(csw) => self.in_fifo.push_back(InPacket::Status(csw)),
                Effect::ArmOut => debug!("bulk OUT armed"),
            }
        }
        Ok(())
    }

    /// CLEAR_FEATURE(ENDPOINT_HALT).
    pub async fn clear_halt(&mut self, ep: Endpoint) -> Result<(), PortError> {
        self.halts.set(ep, false);
        self.send_event(Event::ClearStall(ep)).await
    }

    pub async fn control(&self, request: ClassRequest) -> Result<ControlResponse, PortError> {
        self.request("control request", |tx| BusMessage::Control(request, tx))
            .await
    }

    pub async fn get_max_lun(&self) -> Result<u8, PortError> {
        match self.control(ClassRequest::GetMaxLun).await? {
            ControlResponse::Data(n) => Ok(n),
            other => Err(PortError::BadResponse(format!("GET MAX LUN answered {other:?}"))),
        }
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot, PortError> {
        self.request("snapshot", BusMessage::Snapshot).await
    }

    /// Reset recovery: Bulk-Only Mass Storage Reset, then clear both halts.
    pub async fn reset_recovery(&mut self) -> Result<(), PortError> {
        match self.control(ClassRequest::BulkOnlyReset).await? {
            ControlResponse::Ack => {},
            other => {
                return Err(PortError::BadResponse(format!("reset answered {other:?}")));
            },
        }
        self.in_fifo.clear();
        self.clear_halt(Endpoint::In).await?;
        self.clear_halt(Endpoint::Out).await?;
        Ok(())
    }

    /// Run one full command: CBW, optional data stage, CSW.
    ///
    /// Halts are cleared as a host would: IN before reading the CSW, OUT
    /// once the CSW is in.
    pub async fn execute(
        &mut self,
        cbw: &CommandBlockWrapper,
        data_out: &[u8],
    ) -> Result<Transaction, PortError> {
        debug!(?cbw, "CBW out");
        self.send_event(Event::OutReceived(Bytes::copy_from_slice(&cbw.to_bytes())))
            .await?;
        if self.halts.bulk_out && !self.halts.bulk_in && self.in_fifo.is_empty() {
            return Err(PortError::CommandRejected);
        }

        if cbw.direction() == DataDirection::Out {
            let want = (cbw.data_transfer_length() as usize).min(data_out.len());
            for chunk in data_out[..want].chunks(self.max_packet_size) {
                if self.halts.bulk_out || !self.in_fifo.is_empty() {
                    break;
                }
                self.send_event(Event::OutReceived(Bytes::copy_from_slice(chunk)))
                    .await?;
            }
        }

        let mut data = Vec::new();
        let mut stalled_in = false;
        let stalled_out = self.halts.bulk_out;
        let csw = loop {
            match self.in_fifo.pop_front() {
                Some(InPacket::Data(packet)) => {
                    data.extend_from_slice(&packet);
                    self.send_event(Event::InComplete).await?;
                },
                Some(InPacket::Status(raw)) => {
                    self.send_event(Event::InComplete).await?;
                    break CommandStatusWrapper::parse(&raw)?;
                },
                None if self.halts.bulk_in => {
                    stalled_in = true;
                    self.clear_halt(Endpoint::In).await?;
                },
                None => return Err(PortError::NoStatus),
            }
        };

        if self.halts.bulk_out {
            self.clear_halt(Endpoint::Out).await?;
        }

        if csw.tag() != cbw.tag() {
            return Err(PortError::TagMismatch {
                want: cbw.tag(),
                got: csw.tag(),
            });
        }
        if csw.status() != CommandStatus::Success {
            warn!(tag = csw.tag(), status = ?csw.status(), residue = csw.residue(), "command not successful");
        }
        Ok(Transaction {
            data,
            csw,
            stalled_in,
            stalled_out: stalled_out || self.halts.bulk_out,
        })
    }

    fn cbw(
        &self,
        dtl: u32,
        direction: DataDirection,
        cdb: &[u8],
    ) -> Result<CommandBlockWrapper, PortError> {
        Ok(CommandBlockWrapper::new(self.next_tag(), dtl, direction, cdb)?)
    }

    pub async fn test_unit_ready(&mut self) -> Result<Transaction, PortError> {
        let mut cdb = [0u8; 16];
        build_test_unit_ready(&mut cdb, 0);
        let cbw = self.cbw(0, DataDirection::None, &cdb[..6])?;
        self.execute(&cbw, &[]).await
    }

    pub async fn inquiry(&mut self, allocation_len: u16) -> Result<Transaction, PortError> {
        let mut cdb = [0u8; 16];
        fill_inquiry_standard(&mut cdb, allocation_len, 0);
        let cbw = self.cbw(allocation_len as u32, DataDirection::In, &cdb[..6])?;
        self.execute(&cbw, &[]).await
    }

    /// READ CAPACITY(10); returns `(last_lba, block_len)` on success.
    pub async fn read_capacity(&mut self) -> Result<(Transaction, Option<(u32, u32)>), PortError> {
        let mut cdb = [0u8; 16];
        build_read_capacity10(&mut cdb, 0, false, 0);
        let cbw = self.cbw(8, DataDirection::In, &cdb[..10])?;
        let tx = self.execute(&cbw, &[]).await?;
        let capacity = if tx.is_success() {
            let raw = parse_read_capacity10_zerocopy(&tx.data)
                .map_err(|e| PortError::BadResponse(e.to_string()))?;
            Some((raw.max_lba.get(), raw.block_len.get()))
        } else {
            None
        };
        Ok((tx, capacity))
    }

    pub async fn read10(
        &mut self,
        lba: u32,
        blocks: u16,
        block_size: u32,
    ) -> Result<Transaction, PortError> {
        let mut cdb = [0u8; 16];
        build_read10(&mut cdb, lba, blocks, 0, 0);
        let dtl = blocks as u32 * block_size;
        let cbw = self.cbw(dtl, DataDirection::In, &cdb[..10])?;
        self.execute(&cbw, &[]).await
    }

    pub async fn write10(
        &mut self,
        lba: u32,
        blocks: u16,
        data: &[u8],
    ) -> Result<Transaction, PortError> {
        let mut cdb = [0u8; 16];
        build_write10(&mut cdb, lba, blocks, 0, 0);
        let cbw = self.cbw(data.len() as u32, DataDirection::Out, &cdb[..10])?;
        self.execute(&cbw, data).await
    }

    /// REQUEST SENSE with an 18-byte allocation; returns the decoded sense.
    pub async fn request_sense(&mut self) -> Result<SenseData, PortError> {
        let mut cdb = [0u8; 16];
        fill_request_sense_simple(&mut cdb, 18);
        let cbw = self.cbw(18, DataDirection::In, &cdb[..6])?;
        let tx = self.execute(&cbw, &[]).await?;
        SenseData::parse(&tx.data).map_err(|e| PortError::BadResponse(e.to_string()))
    }
}

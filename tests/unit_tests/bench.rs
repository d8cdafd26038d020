// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A synchronous host for driving the engine packet by packet.

use std::{collections::VecDeque, fs};

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use hex::FromHex;
use usb_msc_bot::{
    block_device::{BlockDevice, BlockDeviceError, ram_disk::RamDisk},
    models::{
        cbw::{CommandBlockWrapper, DataDirection},
        csw::CommandStatusWrapper,
    },
    state_machine::{
        BotSettings, BulkOnlyTransport,
        common::StateMachineCtx,
        events::{Effect, Endpoint, Event},
    },
};

pub const BLOCK_SIZE: u32 = 512;
pub const BLOCK_COUNT: u32 = 16;
pub const MPS: usize = 64;

pub fn load_fixture(path: &str) -> Result<Vec<u8>> {
    let s = fs::read_to_string(path).with_context(|| format!("fixture {path}"))?;
    let cleaned = s.trim().replace(|c: char| c.is_whitespace(), "");
    Ok(Vec::from_hex(&cleaned)?)
}

pub fn settings() -> BotSettings {
    BotSettings {
        max_packet_size: MPS,
        ..BotSettings::default()
    }
}

pub fn engine() -> BulkOnlyTransport<RamDisk> {
    BulkOnlyTransport::new(RamDisk::new(BLOCK_SIZE, BLOCK_COUNT), settings())
}

/// A [`RamDisk`] that can be told to fail or come up short.
#[derive(Debug, Clone)]
pub struct FaultyDisk {
    pub inner: RamDisk,
    pub fail_reads: bool,
    pub fail_writes: bool,
    /// Bytes the device reports as not transferred on every call.
    pub short_by: usize,
}

impl FaultyDisk {
    pub fn new() -> Self {
        Self {
            inner: RamDisk::new(BLOCK_SIZE, BLOCK_COUNT),
            fail_reads: false,
            fail_writes: false,
            short_by: 0,
        }
    }
}

impl BlockDevice for FaultyDisk {
    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn block_size(&self) -> u32 {
        self.inner.block_size()
    }

    fn block_count(&self) -> u32 {
        self.inner.block_count()
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, BlockDeviceError> {
        if self.fail_reads {
            return Err(BlockDeviceError::Io("injected read failure".into()));
        }
        let n = self.inner.read(offset, buf)?;
        Ok(n.saturating_sub(self.short_by))
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> Result<usize, BlockDeviceError> {
        if self.fail_writes {
            return Err(BlockDeviceError::Io("injected write failure".into()));
        }
        let n = self.inner.write(offset, data)?;
        Ok(n.saturating_sub(self.short_by))
    }
}

fn absorb(fx: Vec<Effect>, fifo: &mut VecDeque<Effect>, si: &mut bool, so: &mut bool) {
    for e in fx {
        match e {
            Effect::Stall(Endpoint::In) => *si = true,
            Effect::Stall(Endpoint::Out) => *so = true,
            Effect::ArmOut => {},
            other => fifo.push_back(other),
        }
    }
}

/// What the host saw for one exchange.
#[derive(Debug)]
pub struct Exchange {
    pub data: Vec<u8>,
    pub csw: CommandStatusWrapper,
    pub stalled_in: bool,
    pub stalled_out: bool,
    /// IN packet sizes in arrival order.
    pub packet_sizes: Vec<usize>,
}

pub struct Host<D: BlockDevice> {
    pub engine: BulkOnlyTransport<D>,
    next_tag: u32,
}

impl<D: BlockDevice> Host<D> {
    pub fn new(engine: BulkOnlyTransport<D>) -> Self {
        Self {
            engine,
            next_tag: 0x100,
        }
    }

    pub fn cbw(&mut self, dtl: u32, dir: DataDirection, cdb: &[u8]) -> CommandBlockWrapper {
        self.next_tag += 1;
        CommandBlockWrapper::new(self.next_tag, dtl, dir, cdb).expect("cbw")
    }

    pub fn out(&mut self, packet: &[u8]) -> Vec<Effect> {
        self.engine
            .handle(Event::OutReceived(Bytes::copy_from_slice(packet)))
    }

    /// CBW, data, CSW, with halt clearing the way a host does it.
    pub fn run(&mut self, cbw: &CommandBlockWrapper, data_out: &[u8]) -> Result<Exchange> {
        let mut fifo = VecDeque::new();
        let mut stalled_in = false;
        let mut stalled_out = false;

        let fx = self.out(&cbw.to_bytes());
        absorb(fx, &mut fifo, &mut stalled_in, &mut stalled_out);

        if cbw.direction() == DataDirection::Out {
            for chunk in data_out.chunks(MPS) {
                if stalled_out || !fifo.is_empty() {
                    break;
                }
                let fx = self.out(chunk);
                absorb(fx, &mut fifo, &mut stalled_in, &mut stalled_out);
            }
        }

        let mut data = Vec::new();
        let mut packet_sizes = Vec::new();
        let mut cleared_in = false;
        let csw = loop {
            match fifo.pop_front() {
                Some(Effect::SendData(p)) => {
                    packet_sizes.push(p.len());
                    data.extend_from_slice(&p);
                    let fx = self.engine.handle(Event::InComplete);
                    absorb(fx, &mut fifo, &mut stalled_in, &mut stalled_out);
                },
                Some(Effect::SendStatus(raw)) => {
                    let fx = self.engine.handle(Event::InComplete);
                    absorb(fx, &mut fifo, &mut stalled_in, &mut stalled_out);
                    break CommandStatusWrapper::parse(&raw)?;
                },
                Some(other) => bail!("unexpected effect {other:?}"),
                None if stalled_in && !cleared_in => {
                    cleared_in = true;
                    let fx = self.engine.handle(Event::ClearStall(Endpoint::In));
                    absorb(fx, &mut fifo, &mut stalled_in, &mut stalled_out);
                },
                None => bail!("no CSW (state {})", self.engine.state().name()),
            }
        };

        if stalled_out {
            let fx = self.engine.handle(Event::ClearStall(Endpoint::Out));
            absorb(fx, &mut fifo, &mut stalled_in, &mut stalled_out);
        }

        Ok(Exchange {
            data,
            csw,
            stalled_in,
            stalled_out,
            packet_sizes,
        })
    }
}

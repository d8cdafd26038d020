// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result, ensure};
use tokio::main;
use tracing::info;
use usb_msc_bot::{
    block_device::ram_disk::RamDisk,
    cfg::{
        cli::{config_arg, resolve_config_path},
        config::Config,
        logger::init_logger,
    },
    control_block::inquiry::parse_inquiry_standard,
    port::{HostPort, spawn_engine},
    state_machine::{BotSettings, BulkOnlyTransport},
};

#[main]
async fn main() -> Result<()> {
    let config_path = resolve_config_path(&config_arg())?;
    let config_str = config_path.to_string_lossy().into_owned();
    let _init_logger = init_logger(&config_str)?;

    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("failed to load {config_str}"))?;
    info!(serial = %config.device.serial_number, "config loaded");

    let disk = RamDisk::new(config.storage.block_size, config.storage.block_count);
    let engine = BulkOnlyTransport::new(disk, BotSettings::from(&config));
    let handle = spawn_engine(engine, config.transport.idle_tick);

    let mut host = HostPort::new(
        handle.sender(),
        handle.cancel_token(),
        config.transport.max_packet_size as usize,
        config.transport.response_timeout,
    );

    info!(max_lun = host.get_max_lun().await?, "GET MAX LUN");

    let tur = host.test_unit_ready().await?;
    info!(csw = ?tur.csw, "TEST UNIT READY");

    let inq = host.inquiry(36).await?;
    let std_inq = parse_inquiry_standard(&inq.data)?;
    info!(csw = ?inq.csw, inquiry = ?std_inq, "INQUIRY");

    let (cap, capacity) = host.read_capacity().await?;
    let (last_lba, block_len) = capacity.context("READ CAPACITY failed")?;
    info!(csw = ?cap.csw, last_lba, block_len, "READ CAPACITY(10)");

    let pattern: Vec<u8> = (0..block_len * 2).map(|i| (i % 251) as u8).collect();
    let wr = host.write10(1, 2, &pattern).await?;
    info!(csw = ?wr.csw, "WRITE(10) lba=1 blocks=2");

    let rd = host.read10(1, 2, block_len).await?;
    info!(csw = ?rd.csw, bytes = rd.data.len(), "READ(10) lba=1 blocks=2");
    ensure!(rd.data == pattern, "read back differs from written pattern");

    let engine = handle.shutdown().await?;
    info!(state = engine.state().name(), "demo finished");
    Ok(())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use usb_msc_bot::{block_device::BlockDevice, cfg::logger::init_logger};

use crate::integration_tests::common::{attach, load_config, test_path};

#[tokio::test]
async fn capacity_write_read_roundtrip() -> Result<()> {
    let _ = init_logger(&test_path());

    let cfg = load_config()?;
    let (handle, mut host) = attach(&cfg);

    let (tx, capacity) = host.read_capacity().await?;
    assert!(tx.is_success());
    let (last_lba, block_len) = capacity.context("no capacity data")?;
    assert_eq!(last_lba, cfg.storage.block_count - 1);
    assert_eq!(block_len, cfg.storage.block_size);

    // ---- WRITE(10) the last 4 blocks, READ(10) them back ----
    let blocks = 4u16;
    let lba = last_lba + 1 - blocks as u32;
    let payload: Vec<u8> = (0..blocks as u32 * block_len)
        .map(|i| (i.wrapping_mul(31) >> 3) as u8)
        .collect();

    let wr = host.write10(lba, blocks, &payload).await?;
    assert!(wr.is_success(), "write failed: {:?}", wr.csw);
    assert_eq!(wr.csw.residue(), 0);

    let rd = host.read10(lba, blocks, block_len).await?;
    assert!(rd.is_success(), "read failed: {:?}", rd.csw);
    assert_eq!(rd.data, payload);

    // ---- one block past the end is refused ----
    let past = host.read10(last_lba, 2, block_len).await?;
    assert!(!past.is_success());
    assert!(past.stalled_in);
    let sense = host.request_sense().await?;
    assert_eq!((sense.sense_key, sense.asc), (0x05, 0x21));

    let engine = handle.shutdown().await?;
    let disk = engine.into_device();
    let start = lba as usize * block_len as usize;
    assert_eq!(&disk.as_slice()[start..start + payload.len()], &payload[..]);
    assert_eq!(disk.block_count(), cfg.storage.block_count);
    Ok(())
}

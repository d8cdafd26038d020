// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use usb_msc_bot::{
    cfg::logger::init_logger,
    models::{
        cbw::{CommandBlockWrapper, DataDirection},
        csw::CommandStatus,
        sense_data::asc_ascq_to_str,
    },
};

use crate::integration_tests::common::{attach, load_config, test_path};

/// unknown opcode (expect CC) -> REQUEST SENSE (05/20) -> REQUEST SENSE
/// (NO SENSE) -> TUR (GOOD)
#[tokio::test]
async fn unsupported_opcode_then_request_sense() -> Result<()> {
    let _ = init_logger(&test_path());

    let cfg = load_config()?;
    let (handle, mut host) = attach(&cfg);

    // REPORT LUNS
    let cdb = [0xA0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0];
    let cbw = CommandBlockWrapper::new(host.next_tag(), 16, DataDirection::In, &cdb)?;
    let tx = host.execute(&cbw, &[]).await?;
    assert_eq!(tx.status(), CommandStatus::Failed);
    assert_eq!(tx.csw.residue(), 16);

    let snap = host.snapshot().await?;
    assert_eq!(snap.sense.asc, 0x20);

    let sense = host.request_sense().await?;
    assert_eq!((sense.sense_key, sense.asc, sense.ascq), (0x05, 0x20, 0x00));
    assert_eq!(asc_ascq_to_str(sense.asc, sense.ascq), "Invalid command operation code");

    let sense = host.request_sense().await?;
    assert_eq!(sense.sense_key, 0x00);

    assert!(host.test_unit_ready().await?.is_success());

    handle.shutdown().await?;
    Ok(())
}

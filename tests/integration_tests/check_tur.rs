// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use usb_msc_bot::{cfg::logger::init_logger, models::csw::CommandStatus};

use crate::integration_tests::common::{attach, load_config, test_path};

#[tokio::test]
async fn get_max_lun_and_tur() -> Result<()> {
    let _ = init_logger(&test_path());

    let cfg = load_config()?;
    let (handle, mut host) = attach(&cfg);

    assert_eq!(host.get_max_lun().await?, 0);

    // ---- TEST UNIT READY twice, tags must follow the CBW ----
    let first = host.test_unit_ready().await?;
    let second = host.test_unit_ready().await?;
    assert_eq!(first.status(), CommandStatus::Success);
    assert_eq!(second.status(), CommandStatus::Success);
    assert_eq!(second.csw.tag(), first.csw.tag() + 1);

    let snap = host.snapshot().await?;
    assert_eq!(snap.state, "Idle");

    handle.shutdown().await?;
    Ok(())
}

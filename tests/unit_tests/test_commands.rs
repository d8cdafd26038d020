// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use usb_msc_bot::{
    control_block::{
        inquiry::{
            VpdPage, fill_inquiry_standard, fill_inquiry_vpd, parse_inquiry_standard,
            parse_vpd_unit_serial,
        },
        mode_sense::{PageControl, fill_mode_select6, fill_mode_sense6, fill_mode_sense10},
        read_capacity::{build_read_capacity10, parse_read_capacity10_zerocopy},
        read_format_capacities::fill_read_format_capacities,
        request_sense::fill_request_sense_simple,
        test_unit_ready::build_test_unit_ready,
    },
    models::{cbw::DataDirection, csw::CommandStatus, sense_data::SenseData},
};

use crate::unit_tests::bench::{BLOCK_COUNT, BLOCK_SIZE, Host, engine, load_fixture};

#[test]
fn test_tur_on_ready_medium() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    build_test_unit_ready(&mut cdb, 0);
    let cbw = host.cbw(0, DataDirection::None, &cdb[..6]);

    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.csw.tag(), cbw.tag());
    assert_eq!(ex.csw.residue(), 0);
    assert!(host.engine.is_idle());
    Ok(())
}

#[test]
fn test_unsupported_opcode_reports_invalid_command() -> Result<()> {
    let mut host = Host::new(engine());
    // REPORT LUNS is not in the command set
    let cdb = [0xA0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0];
    let cbw = host.cbw(0, DataDirection::None, &cdb);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert!(!ex.stalled_in);

    let mut cdb = [0u8; 16];
    fill_request_sense_simple(&mut cdb, 18);
    let cbw = host.cbw(18, DataDirection::In, &cdb[..6]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);

    let expected = load_fixture("tests/unit_tests/fixtures/sense_invalid_opcode.hex")?;
    assert_eq!(ex.data, expected);
    Ok(())
}

#[test]
fn test_unsupported_opcode_with_data_in_stalls() -> Result<()> {
    let mut host = Host::new(engine());
    let cdb = [0xA0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0];
    let cbw = host.cbw(16, DataDirection::In, &cdb);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert_eq!(ex.csw.residue(), 16);
    assert!(ex.stalled_in);
    assert!(ex.data.is_empty());
    Ok(())
}

#[test]
fn test_request_sense_clears_after_read() -> Result<()> {
    let mut host = Host::new(engine());
    let cdb = [0xA0u8, 0, 0, 0, 0, 0];
    let cbw = host.cbw(0, DataDirection::None, &cdb);
    host.run(&cbw, &[])?;
    assert_eq!(*host.engine.sense(), SenseData::invalid_command_opcode());

    let mut cdb = [0u8; 16];
    fill_request_sense_simple(&mut cdb, 18);
    for expected_key in [0x05u8, 0x00] {
        let cbw = host.cbw(18, DataDirection::In, &cdb[..6]);
        let ex = host.run(&cbw, &[])?;
        let sense = SenseData::parse(&ex.data)?;
        assert_eq!(sense.sense_key, expected_key);
    }
    Ok(())
}

#[test]
fn test_request_sense_honours_allocation_length() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_request_sense_simple(&mut cdb, 8);
    let cbw = host.cbw(8, DataDirection::In, &cdb[..6]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.data.len(), 8);
    assert_eq!(ex.data[0], 0x70);
    assert_eq!(ex.csw.residue(), 0);
    Ok(())
}

#[test]
fn test_inquiry_standard_data() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_inquiry_standard(&mut cdb, 36, 0);
    let cbw = host.cbw(36, DataDirection::In, &cdb[..6]);
    let ex = host.run(&cbw, &[])?;

    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.data.len(), 36);
    assert_eq!(ex.packet_sizes, vec![36]);
    assert_eq!(ex.data[1], 0x80, "RMB");
    assert_eq!(ex.data[4], 31);
    assert_eq!(&ex.data[8..16], b"RUST    ");

    let inq = parse_inquiry_standard(&ex.data)?;
    assert_eq!(inq.product_id.trim_end(), "MSC BOT Disk");
    Ok(())
}

#[test]
fn test_inquiry_replay_is_byte_identical() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_inquiry_standard(&mut cdb, 36, 0);
    let cbw = host.cbw(36, DataDirection::In, &cdb[..6]);

    let first = host.run(&cbw, &[])?;
    let second = host.run(&cbw, &[])?;
    assert_eq!(first.csw.status(), CommandStatus::Success);
    assert_eq!(first.data, second.data);
    assert_eq!(first.csw.to_bytes(), second.csw.to_bytes());
    Ok(())
}

#[test]
fn test_inquiry_short_response_leaves_residue() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_inquiry_standard(&mut cdb, 96, 0);
    let cbw = host.cbw(96, DataDirection::In, &cdb[..6]);
    let ex = host.run(&cbw, &[])?;

    // 36 < 64 is a short packet, so no stall is needed
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.csw.residue(), 60);
    assert!(!ex.stalled_in);
    Ok(())
}

#[test]
fn test_inquiry_unit_serial_page() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_inquiry_vpd(&mut cdb, VpdPage::UnitSerial, 64, 0);
    let cbw = host.cbw(64, DataDirection::In, &cdb[..6]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(parse_vpd_unit_serial(&ex.data)?, "000000000001");
    Ok(())
}

#[test]
fn test_inquiry_page_without_evpd_is_invalid_field() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_inquiry_standard(&mut cdb, 36, 0);
    cdb[2] = 0x80;
    let cbw = host.cbw(36, DataDirection::In, &cdb[..6]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert_eq!(*host.engine.sense(), SenseData::invalid_field_in_cdb());
    Ok(())
}

#[test]
fn test_read_capacity() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    build_read_capacity10(&mut cdb, 0, false, 0);
    let cbw = host.cbw(8, DataDirection::In, &cdb[..10]);
    let ex = host.run(&cbw, &[])?;
    let rc = parse_read_capacity10_zerocopy(&ex.data)?;
    assert_eq!(rc.max_lba.get(), BLOCK_COUNT - 1);
    assert_eq!(rc.block_len.get(), BLOCK_SIZE);
    assert_eq!(rc.total_bytes(), (BLOCK_COUNT * BLOCK_SIZE) as u64);
    Ok(())
}

#[test]
fn test_read_format_capacities() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_read_format_capacities(&mut cdb, 12);
    let cbw = host.cbw(12, DataDirection::In, &cdb[..10]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.data.len(), 12);
    assert_eq!(ex.data[3], 8);
    assert_eq!(
        u32::from_be_bytes([ex.data[4], ex.data[5], ex.data[6], ex.data[7]]),
        BLOCK_COUNT
    );
    assert_eq!(ex.data[8], 0x02, "formatted media");
    assert_eq!(&ex.data[9..12], &[0x00, 0x02, 0x00]);
    Ok(())
}

#[test]
fn test_mode_sense6_all_pages() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_mode_sense6(&mut cdb, true, PageControl::Current, 0x3F, 0xC0);
    let cbw = host.cbw(0xC0, DataDirection::In, &cdb[..6]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.data.len(), 24);
    assert_eq!(ex.data[0] as usize, ex.data.len() - 1, "mode data length");
    assert_eq!(ex.data[2] & 0x80, 0, "not write protected");
    assert_eq!(ex.data[4], 0x08, "caching page");
    Ok(())
}

#[test]
fn test_mode_sense10_header_only() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_mode_sense10(&mut cdb, true, PageControl::Current, 0x00, 8);
    let cbw = host.cbw(8, DataDirection::In, &cdb[..10]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.data.len(), 8);
    assert_eq!(u16::from_be_bytes([ex.data[0], ex.data[1]]), 6);
    Ok(())
}

#[test]
fn test_mode_sense_unknown_page_fails() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_mode_sense6(&mut cdb, true, PageControl::Current, 0x1C, 0xC0);
    let cbw = host.cbw(0xC0, DataDirection::In, &cdb[..6]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert!(ex.stalled_in);
    assert_eq!(*host.engine.sense(), SenseData::invalid_field_in_cdb());
    Ok(())
}

#[test]
fn test_mode_select_parameters_are_consumed() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_mode_select6(&mut cdb, 12);
    let cbw = host.cbw(12, DataDirection::Out, &cdb[..6]);
    let ex = host.run(&cbw, &[0u8; 12])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.csw.residue(), 0);
    assert!(!ex.stalled_out);
    Ok(())
}

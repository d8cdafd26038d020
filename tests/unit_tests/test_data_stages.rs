// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use usb_msc_bot::{
    block_device::{BlockDevice, ram_disk::RamDisk},
    control_block::{
        inquiry::fill_inquiry_standard,
        read::build_read10,
        write::{build_verify10, build_write10},
    },
    models::{
        cbw::{CommandBlockWrapper, DataDirection},
        csw::{CommandStatus, CommandStatusWrapper},
        sense_data::SenseData,
    },
    state_machine::{
        BulkOnlyTransport,
        common::StateMachineCtx,
        events::{Effect, Endpoint, Event},
    },
};

use crate::unit_tests::bench::{
    BLOCK_COUNT, BLOCK_SIZE, FaultyDisk, Host, MPS, engine, settings,
};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

fn write_cbw<D: BlockDevice>(
    host: &mut Host<D>,
    lba: u32,
    blocks: u16,
    dtl: u32,
) -> CommandBlockWrapper {
    let mut cdb = [0u8; 16];
    build_write10(&mut cdb, lba, blocks, 0, 0);
    host.cbw(dtl, DataDirection::Out, &cdb[..10])
}

fn read_cbw<D: BlockDevice>(
    host: &mut Host<D>,
    lba: u32,
    blocks: u16,
    dtl: u32,
) -> CommandBlockWrapper {
    let mut cdb = [0u8; 16];
    build_read10(&mut cdb, lba, blocks, 0, 0);
    host.cbw(dtl, DataDirection::In, &cdb[..10])
}

#[test]
fn test_write_then_read_back() -> Result<()> {
    let mut host = Host::new(engine());
    let data = pattern(2 * BLOCK_SIZE as usize, 3);

    let cbw = write_cbw(&mut host, 4, 2, data.len() as u32);
    let ex = host.run(&cbw, &data)?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.csw.residue(), 0);

    let disk = host.engine.device().as_slice();
    assert_eq!(&disk[4 * 512..6 * 512], &data[..]);

    let cbw = read_cbw(&mut host, 4, 2, data.len() as u32);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.data, data);
    assert_eq!(ex.packet_sizes.len(), data.len() / MPS);
    assert!(ex.packet_sizes.iter().all(|&n| n == MPS));
    Ok(())
}

#[test]
fn test_read_streams_one_packet_per_completion() -> Result<()> {
    let mut host = Host::new(engine());
    let cbw = read_cbw(&mut host, 0, 1, BLOCK_SIZE);

    let fx = host.out(&cbw.to_bytes());
    assert!(matches!(fx.as_slice(), [Effect::SendData(p)] if p.len() == MPS));
    assert_eq!(host.engine.state().name(), "DataIn");

    let session = host.engine.state().session().expect("session");
    assert_eq!(session.transferred, 0);
    assert_eq!(session.bytes_to_transfer, BLOCK_SIZE);
    Ok(())
}

#[test]
fn test_read_out_of_range_fails_with_stall() -> Result<()> {
    let mut host = Host::new(engine());
    let cbw = read_cbw(&mut host, BLOCK_COUNT - 1, 2, 2 * BLOCK_SIZE);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert_eq!(ex.csw.residue(), 2 * BLOCK_SIZE);
    assert!(ex.stalled_in);
    assert!(ex.data.is_empty());
    assert_eq!(*host.engine.sense(), SenseData::lba_out_of_range());
    Ok(())
}

#[test]
fn test_read_length_mismatch_is_phase_error() -> Result<()> {
    let mut host = Host::new(engine());
    // host expects more than the CDB asks for
    let cbw = read_cbw(&mut host, 0, 1, 2 * BLOCK_SIZE);
    let fx = host.out(&cbw.to_bytes());
    assert_eq!(
        fx,
        vec![Effect::Stall(Endpoint::Out), Effect::Stall(Endpoint::In)]
    );
    assert_eq!(host.engine.state().name(), "Stalled");

    let fx = host.engine.handle(Event::ClearStall(Endpoint::In));
    match fx.as_slice() {
        [Effect::SendStatus(raw)] => {
            let csw = CommandStatusWrapper::parse(raw)?;
            assert_eq!(csw.status(), CommandStatus::PhaseError);
        },
        other => panic!("expected CSW, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_read_with_short_transfer_length_is_phase_error() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    build_read10(&mut cdb, 0, 1, 0, 0);
    let cbw = CommandBlockWrapper::new(0x0102_0304, 256, DataDirection::In, &cdb[..10])?;
    let ex = host.run(&cbw, &[])?;

    assert!(ex.data.is_empty());
    assert!(ex.packet_sizes.is_empty());
    assert_eq!(ex.csw.tag(), 0x0102_0304);
    assert_eq!(ex.csw.residue(), 256);
    assert_eq!(ex.csw.status(), CommandStatus::PhaseError);
    assert!(ex.stalled_in && ex.stalled_out);
    Ok(())
}

#[test]
fn test_read_with_out_direction_is_phase_error() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    build_read10(&mut cdb, 0, 1, 0, 0);
    let cbw = host.cbw(BLOCK_SIZE, DataDirection::Out, &cdb[..10]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::PhaseError);
    assert!(ex.stalled_in);
    assert!(ex.stalled_out);
    Ok(())
}

#[test]
fn test_inquiry_with_out_direction_is_phase_error() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    fill_inquiry_standard(&mut cdb, 36, 0);
    let cbw = host.cbw(36, DataDirection::Out, &cdb[..6]);
    let ex = host.run(&cbw, &[0u8; 36])?;
    assert_eq!(ex.csw.status(), CommandStatus::PhaseError);
    Ok(())
}

#[test]
fn test_zero_block_read_completes_without_data() -> Result<()> {
    let mut host = Host::new(engine());
    let cbw = read_cbw(&mut host, 0, 0, 0);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert!(ex.packet_sizes.is_empty());
    Ok(())
}

#[test]
fn test_oversized_out_packet_is_phase_error() -> Result<()> {
    let mut host = Host::new(engine());
    let cbw = write_cbw(&mut host, 0, 1, BLOCK_SIZE);
    assert!(host.out(&cbw.to_bytes()).is_empty());
    assert_eq!(host.engine.state().name(), "DataOut");

    let fx = host.out(&[0u8; MPS + 1]);
    assert_eq!(
        fx,
        vec![Effect::Stall(Endpoint::Out), Effect::Stall(Endpoint::In)]
    );
    Ok(())
}

#[test]
fn test_write_protected_unit_refuses_writes() -> Result<()> {
    let mut s = settings();
    s.write_protected = true;
    let mut host = Host::new(BulkOnlyTransport::new(
        RamDisk::new(BLOCK_SIZE, BLOCK_COUNT),
        s,
    ));
    let cbw = write_cbw(&mut host, 0, 1, BLOCK_SIZE);
    let ex = host.run(&cbw, &pattern(BLOCK_SIZE as usize, 1))?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert!(ex.stalled_out);
    assert_eq!(ex.csw.residue(), BLOCK_SIZE);
    assert_eq!(*host.engine.sense(), SenseData::write_protected());
    assert!(host.engine.device().as_slice().iter().all(|&b| b == 0));
    Ok(())
}

#[test]
fn test_device_read_failure() -> Result<()> {
    let mut disk = FaultyDisk::new();
    disk.fail_reads = true;
    let mut host = Host::new(BulkOnlyTransport::new(disk, settings()));
    let cbw = read_cbw(&mut host, 0, 1, BLOCK_SIZE);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert!(ex.stalled_in);
    assert!(ex.data.is_empty());
    assert_eq!(*host.engine.sense(), SenseData::unrecovered_read_error());
    Ok(())
}

#[test]
fn test_short_device_read_fails_command() -> Result<()> {
    let mut disk = FaultyDisk::new();
    disk.short_by = 1;
    let mut host = Host::new(BulkOnlyTransport::new(disk, settings()));
    let cbw = read_cbw(&mut host, 0, 1, BLOCK_SIZE);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert_eq!(ex.csw.residue(), BLOCK_SIZE);
    assert!(ex.stalled_in);
    assert!(ex.data.is_empty(), "no partial block reaches the host");
    assert_eq!(*host.engine.sense(), SenseData::unrecovered_read_error());
    Ok(())
}

#[test]
fn test_short_device_write_leaves_residue() -> Result<()> {
    let mut disk = FaultyDisk::new();
    disk.short_by = 1;
    let mut host = Host::new(BulkOnlyTransport::new(disk, settings()));
    let cbw = write_cbw(&mut host, 0, 1, BLOCK_SIZE);
    let ex = host.run(&cbw, &pattern(BLOCK_SIZE as usize, 2))?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    // the first packet lost one byte at the device
    assert_eq!(ex.csw.residue(), BLOCK_SIZE - (MPS as u32 - 1));
    assert!(ex.stalled_out);
    assert_eq!(*host.engine.sense(), SenseData::write_fault());
    assert!(host.engine.is_idle());
    Ok(())
}

#[test]
fn test_device_write_failure() -> Result<()> {
    let mut disk = FaultyDisk::new();
    disk.fail_writes = true;
    let mut host = Host::new(BulkOnlyTransport::new(disk, settings()));
    let cbw = write_cbw(&mut host, 0, 1, BLOCK_SIZE);
    let ex = host.run(&cbw, &pattern(BLOCK_SIZE as usize, 9))?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    assert!(ex.stalled_out);
    assert_eq!(ex.csw.residue(), BLOCK_SIZE);
    assert_eq!(*host.engine.sense(), SenseData::write_fault());
    Ok(())
}

#[test]
fn test_verify_without_data_checks_range_only() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    build_verify10(&mut cdb, 0, 4, false);
    let cbw = host.cbw(0, DataDirection::None, &cdb[..10]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);

    build_verify10(&mut cdb, BLOCK_COUNT, 1, false);
    let cbw = host.cbw(0, DataDirection::None, &cdb[..10]);
    let ex = host.run(&cbw, &[])?;
    assert_eq!(ex.csw.status(), CommandStatus::Failed);
    Ok(())
}

#[test]
fn test_verify_with_bytchk_consumes_data() -> Result<()> {
    let mut host = Host::new(engine());
    let mut cdb = [0u8; 16];
    build_verify10(&mut cdb, 2, 1, true);
    let cbw = host.cbw(BLOCK_SIZE, DataDirection::Out, &cdb[..10]);
    let ex = host.run(&cbw, &pattern(BLOCK_SIZE as usize, 5))?;
    assert_eq!(ex.csw.status(), CommandStatus::Success);
    assert_eq!(ex.csw.residue(), 0);
    // verify never writes
    assert!(host.engine.device().as_slice().iter().all(|&b| b == 0));
    Ok(())
}

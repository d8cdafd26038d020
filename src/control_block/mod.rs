// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SCSI command layer. Each supported opcode has one row in a static
//! table giving its data phase and a decoder that turns the raw CBWCB into
//! a typed [`ScsiCommand`]; [`execute`] then routes the typed command to the
//! handler in the per-command module.

pub mod common;
pub mod inquiry;
pub mod mode_sense;
pub mod read;
pub mod read_capacity;
pub mod read_format_capacities;
pub mod request_sense;
pub mod start_stop;
pub mod test_unit_ready;
pub mod write;

use tracing::debug;

use crate::{
    block_device::BlockDevice,
    control_block::common::{BlockRange, DataPhase, LogicalUnit, Outcome},
    models::{
        cbw::CommandBlockWrapper,
        opcode::{ScsiOpcode, UnknownOpcode},
        sense_data::SenseData,
    },
};

/// A decoded command descriptor block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScsiCommand {
    TestUnitReady,
    RequestSense { allocation_len: u8 },
    FormatUnit { parameter_bytes: u32 },
    Inquiry { evpd: bool, page_code: u8, allocation_len: u16 },
    ModeSelect { parameter_list_len: u32 },
    ModeSense6 { page_byte: u8, allocation_len: u8 },
    ModeSense10 { page_byte: u8, allocation_len: u16 },
    StartStopUnit { start: bool, load_eject: bool },
    MediumRemoval { prevent: bool },
    ReadFormatCapacities { allocation_len: u16 },
    ReadCapacity10,
    Read10(BlockRange),
    Write10(BlockRange),
    /// `with_data` is set when BYTCHK=1 or the host announced a data stage.
    Verify10 { range: BlockRange, with_data: bool },
}

impl ScsiCommand {
    /// Exact transfer size a block command implies. The CBW must declare
    /// this many bytes or the transaction is a phase error. Other commands
    /// are bounded by their allocation length instead and return `None`.
    pub fn implied_length(&self, block_size: u32) -> Option<u64> {
        match self {
            Self::Read10(range) | Self::Write10(range) => Some(range.byte_len(block_size)),
            Self::Verify10 { range, with_data } => {
                Some(if *with_data { range.byte_len(block_size) } else { 0 })
            },
            _ => None,
        }
    }

    /// INQUIRY and REQUEST SENSE are answered even with a pending unit
    /// attention.
    #[inline]
    fn bypasses_unit_attention(&self) -> bool {
        matches!(self, Self::Inquiry { .. } | Self::RequestSense { .. })
    }
}

/// One row of the dispatch table.
pub struct CommandSpec {
    pub opcode: ScsiOpcode,
    pub phase: DataPhase,
    decode: fn(&CommandBlockWrapper) -> ScsiCommand,
}

impl CommandSpec {
    #[inline]
    pub fn decode(&self, cbw: &CommandBlockWrapper) -> ScsiCommand {
        (self.decode)(cbw)
    }
}

/// A command after table lookup and decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCommand {
    pub opcode: ScsiOpcode,
    pub phase: DataPhase,
    pub command: ScsiCommand,
}

fn decode_tur(_: &CommandBlockWrapper) -> ScsiCommand {
    ScsiCommand::TestUnitReady
}

fn decode_request_sense(cbw: &CommandBlockWrapper) -> ScsiCommand {
    ScsiCommand::RequestSense {
        allocation_len: cbw.command_block()[4],
    }
}

fn decode_format_unit(cbw: &CommandBlockWrapper) -> ScsiCommand {
    let parameter_bytes = if write::format_data(cbw.command_block()) {
        cbw.data_transfer_length()
    } else {
        0
    };
    ScsiCommand::FormatUnit { parameter_bytes }
}

fn decode_inquiry(cbw: &CommandBlockWrapper) -> ScsiCommand {
    let cdb = cbw.command_block();
    ScsiCommand::Inquiry {
        evpd: cdb[1] & 0x01 != 0,
        page_code: cdb[2],
        allocation_len: u16::from_be_bytes([cdb[3], cdb[4]]),
    }
}

fn decode_mode_select6(cbw: &CommandBlockWrapper) -> ScsiCommand {
    ScsiCommand::ModeSelect {
        parameter_list_len: cbw.command_block()[4] as u32,
    }
}

fn decode_mode_select10(cbw: &CommandBlockWrapper) -> ScsiCommand {
    let cdb = cbw.command_block();
    ScsiCommand::ModeSelect {
        parameter_list_len: u16::from_be_bytes([cdb[7], cdb[8]]) as u32,
    }
}

fn decode_mode_sense6(cbw: &CommandBlockWrapper) -> ScsiCommand {
    let cdb = cbw.command_block();
    ScsiCommand::ModeSense6 {
        page_byte: cdb[2],
        allocation_len: cdb[4],
    }
}

fn decode_mode_sense10(cbw: &CommandBlockWrapper) -> ScsiCommand {
    let cdb = cbw.command_block();
    ScsiCommand::ModeSense10 {
        page_byte: cdb[2],
        allocation_len: u16::from_be_bytes([cdb[7], cdb[8]]),
    }
}

fn decode_start_stop(cbw: &CommandBlockWrapper) -> ScsiCommand {
    let (start, load_eject) = start_stop::start_stop_bits(cbw.command_block());
    ScsiCommand::StartStopUnit { start, load_eject }
}

fn decode_medium_removal(cbw: &CommandBlockWrapper) -> ScsiCommand {
    ScsiCommand::MediumRemoval {
        prevent: start_stop::prevent_bit(cbw.command_block()),
    }
}

fn decode_read_format_capacities(cbw: &CommandBlockWrapper) -> ScsiCommand {
    let cdb = cbw.command_block();
    ScsiCommand::ReadFormatCapacities {
        allocation_len: u16::from_be_bytes([cdb[7], cdb[8]]),
    }
}

fn decode_read_capacity(_: &CommandBlockWrapper) -> ScsiCommand {
    ScsiCommand::ReadCapacity10
}

fn decode_read10(cbw: &CommandBlockWrapper) -> ScsiCommand {
    ScsiCommand::Read10(BlockRange::from_cdb10(cbw.command_block()))
}

fn decode_write10(cbw: &CommandBlockWrapper) -> ScsiCommand {
    ScsiCommand::Write10(BlockRange::from_cdb10(cbw.command_block()))
}

fn decode_verify10(cbw: &CommandBlockWrapper) -> ScsiCommand {
    let cdb = cbw.command_block();
    ScsiCommand::Verify10 {
        range: BlockRange::from_cdb10(cdb),
        with_data: write::byte_check(cdb) || cbw.data_transfer_length() != 0,
    }
}

const fn row(
    opcode: ScsiOpcode,
    phase: DataPhase,
    decode: fn(&CommandBlockWrapper) -> ScsiCommand,
) -> CommandSpec {
    CommandSpec {
        opcode,
        phase,
        decode,
    }
}

static COMMAND_TABLE: [CommandSpec; 15] = [
    row(ScsiOpcode::TestUnitReady, DataPhase::None, decode_tur),
    row(ScsiOpcode::RequestSense, DataPhase::In, decode_request_sense),
    row(ScsiOpcode::FormatUnit, DataPhase::Out, decode_format_unit),
    row(ScsiOpcode::Inquiry, DataPhase::In, decode_inquiry),
    row(ScsiOpcode::ModeSelect6, DataPhase::Out, decode_mode_select6),
    row(ScsiOpcode::ModeSense6, DataPhase::In, decode_mode_sense6),
    row(ScsiOpcode::StartStopUnit, DataPhase::None, decode_start_stop),
    row(ScsiOpcode::MediumRemoval, DataPhase::None, decode_medium_removal),
    row(
        ScsiOpcode::ReadFormatCapacities,
        DataPhase::In,
        decode_read_format_capacities,
    ),
    row(ScsiOpcode::ReadCapacity10, DataPhase::In, decode_read_capacity),
    row(ScsiOpcode::Read10, DataPhase::In, decode_read10),
    row(ScsiOpcode::Write10, DataPhase::Out, decode_write10),
    row(ScsiOpcode::Verify10, DataPhase::Out, decode_verify10),
    row(ScsiOpcode::ModeSelect10, DataPhase::Out, decode_mode_select10),
    row(ScsiOpcode::ModeSense10, DataPhase::In, decode_mode_sense10),
];

/// Table row for a raw opcode byte.
pub fn lookup(opcode: u8) -> Result<&'static CommandSpec, UnknownOpcode> {
    let op = ScsiOpcode::try_from(opcode)?;
    COMMAND_TABLE
        .iter()
        .find(|spec| spec.opcode == op)
        .ok_or(UnknownOpcode(opcode))
}

/// Look up and decode the command carried by `cbw`.
pub fn decode(cbw: &CommandBlockWrapper) -> Result<DecodedCommand, UnknownOpcode> {
    let spec = lookup(cbw.opcode())?;
    let command = spec.decode(cbw);
    debug!(opcode = %spec.opcode, ?command, "decoded SCSI command");
    Ok(DecodedCommand {
        opcode: spec.opcode,
        phase: spec.phase,
        command,
    })
}

/// Run a decoded command against the logical unit.
///
/// `Err` carries the sense data for a CHECK CONDITION; the caller records
/// it and reports a failed CSW.
pub fn execute<D: BlockDevice>(
    command: &ScsiCommand,
    unit: &mut LogicalUnit<'_, D>,
) -> Result<Outcome, SenseData> {
    if unit.media.unit_attention && !command.bypasses_unit_attention() {
        unit.media.unit_attention = false;
        return Err(SenseData::medium_changed());
    }

    match *command {
        ScsiCommand::TestUnitReady => test_unit_ready::test_unit_ready(unit),
        ScsiCommand::RequestSense { allocation_len } => {
            request_sense::request_sense(unit, allocation_len)
        },
        ScsiCommand::FormatUnit { parameter_bytes } => {
            write::format_unit(unit, parameter_bytes)
        },
        ScsiCommand::Inquiry {
            evpd,
            page_code,
            allocation_len,
        } => inquiry::inquiry(unit, evpd, page_code, allocation_len),
        ScsiCommand::ModeSelect { parameter_list_len } => {
            mode_sense::mode_select(parameter_list_len)
        },
        ScsiCommand::ModeSense6 {
            page_byte,
            allocation_len,
        } => mode_sense::mode_sense6(unit, page_byte, allocation_len),
        ScsiCommand::ModeSense10 {
            page_byte,
            allocation_len,
        } => mode_sense::mode_sense10(unit, page_byte, allocation_len),
        ScsiCommand::StartStopUnit { start, load_eject } => {
            start_stop::start_stop_unit(unit, start, load_eject)
        },
        ScsiCommand::MediumRemoval { prevent } => {
            start_stop::medium_removal(unit, prevent)
        },
        ScsiCommand::ReadFormatCapacities { allocation_len } => {
            read_format_capacities::read_format_capacities(unit, allocation_len)
        },
        ScsiCommand::ReadCapacity10 => read_capacity::read_capacity10(unit),
        ScsiCommand::Read10(range) => read::read10(unit, range),
        ScsiCommand::Write10(range) => write::write10(unit, range),
        ScsiCommand::Verify10 { range, with_data } => {
            write::verify10(unit, range, with_data)
        },
    }
}

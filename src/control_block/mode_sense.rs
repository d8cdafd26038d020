// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! MODE SENSE / MODE SELECT (6 / 10).
//!
//! The device exposes no block descriptors and a single mode page, the
//! caching page (0x08), which reports write caching disabled. The
//! device-specific parameter byte carries WP (bit 7) when the unit is
//! write-protected. MODE SELECT parameter lists are accepted and dropped.

use crate::{
    block_device::BlockDevice,
    control_block::common::{LogicalUnit, Outcome, Sink, truncate},
    models::sense_data::SenseData,
};

pub const MODE_SENSE_6: u8 = 0x1A;
pub const MODE_SENSE_10: u8 = 0x5A;
pub const MODE_SELECT_6: u8 = 0x15;
pub const MODE_SELECT_10: u8 = 0x55;

pub const CACHING_PAGE: u8 = 0x08;
pub const ALL_PAGES: u8 = 0x3F;
const CACHING_PAGE_LEN: usize = 20;

/// Page Control (PC) for MODE SENSE byte 2 (bits 7..6).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum PageControl {
    Current = 0b00,
    Changeable = 0b01,
    Default = 0b10,
    Saved = 0b11,
}

impl PageControl {
    #[inline]
    pub fn from_cdb_byte(b: u8) -> Self {
        match b >> 6 {
            0b00 => Self::Current,
            0b01 => Self::Changeable,
            0b10 => Self::Default,
            _ => Self::Saved,
        }
    }
}

#[inline]
fn pc_bits(pc: PageControl) -> u8 {
    (pc as u8) << 6
}

/// Fill a MODE SENSE(6) CDB into `cdb[0..6]`.
/// Layout:
///   [0]=0x1A, [1]=DBD<<3, [2]=PC(7..6)|PAGE(5..0), [3]=SUBPAGE, [4]=ALLOC_LEN,
/// [5]=CONTROL
#[inline]
pub fn fill_mode_sense6(
    cdb: &mut [u8; 16],
    dbd: bool,
    pc: PageControl,
    page_code: u8,
    allocation_len: u8,
) {
    cdb.fill(0);
    cdb[0] = MODE_SENSE_6;
    cdb[1] = ((dbd as u8) << 3) & 0b0000_1000;
    cdb[2] = pc_bits(pc) | (page_code & 0x3F);
    cdb[4] = allocation_len;
}

/// Fill a MODE SENSE(10) CDB into `cdb[0..10]`.
/// Layout:
///   [0]=0x5A, [1]=LLBAA<<4 | DBD<<3, [2]=PC(7..6)|PAGE(5..0), [3]=SUBPAGE,
///   [4..6]=0, [7..8]=ALLOC_LEN(be), [9]=CONTROL
#[inline]
pub fn fill_mode_sense10(
    cdb: &mut [u8; 16],
    dbd: bool,
    pc: PageControl,
    page_code: u8,
    allocation_len: u16,
) {
    cdb.fill(0);
    cdb[0] = MODE_SENSE_10;
    cdb[1] = (dbd as u8) << 3;
    cdb[2] = pc_bits(pc) | (page_code & 0x3F);
    cdb[7..9].copy_from_slice(&allocation_len.to_be_bytes());
}

/// Fill a MODE SELECT(6) CDB with PF=1 and the given parameter list length.
#[inline]
pub fn fill_mode_select6(cdb: &mut [u8; 16], parameter_list_len: u8) {
    cdb.fill(0);
    cdb[0] = MODE_SELECT_6;
    cdb[1] = 0x10; // PF
    cdb[4] = parameter_list_len;
}

/// Mode pages selected by the PC/PAGE CODE byte, or `None` for a page we
/// do not have. Saved values are not supported.
fn mode_pages(page_byte: u8) -> Option<Vec<u8>> {
    if PageControl::from_cdb_byte(page_byte) == PageControl::Saved {
        return None;
    }
    match page_byte & 0x3F {
        // vendor page 0: header only
        0x00 => Some(Vec::new()),
        CACHING_PAGE | ALL_PAGES => {
            let mut page = vec![0u8; CACHING_PAGE_LEN];
            page[0] = CACHING_PAGE;
            page[1] = (CACHING_PAGE_LEN - 2) as u8;
            // WCE=0, RCD=0; nothing in the page is changeable
            Some(page)
        },
        _ => None,
    }
}

#[inline]
fn device_specific(write_protected: bool) -> u8 {
    if write_protected { 0x80 } else { 0x00 }
}

/// MODE SENSE(6): 4-byte header followed by the selected pages.
pub fn mode_sense6<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    page_byte: u8,
    allocation_len: u8,
) -> Result<Outcome, SenseData> {
    let pages = mode_pages(page_byte)
        .ok_or(SenseData::invalid_field_in_cdb())?;

    let mut out = Vec::with_capacity(4 + pages.len());
    out.push((3 + pages.len()) as u8); // MODE DATA LENGTH
    out.push(0x00); // medium type
    out.push(device_specific(unit.write_protected));
    out.push(0x00); // block descriptor length
    out.extend_from_slice(&pages);
    Ok(Outcome::Respond(truncate(out, allocation_len as usize)))
}

/// MODE SENSE(10): 8-byte header followed by the selected pages.
pub fn mode_sense10<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    page_byte: u8,
    allocation_len: u16,
) -> Result<Outcome, SenseData> {
    let pages = mode_pages(page_byte)
        .ok_or(SenseData::invalid_field_in_cdb())?;

    let mode_data_len = (6 + pages.len()) as u16;
    let mut out = Vec::with_capacity(8 + pages.len());
    out.extend_from_slice(&mode_data_len.to_be_bytes());
    out.push(0x00); // medium type
    out.push(device_specific(unit.write_protected));
    out.extend_from_slice(&[0x00, 0x00]); // reserved
    out.extend_from_slice(&[0x00, 0x00]); // block descriptor length
    out.extend_from_slice(&pages);
    Ok(Outcome::Respond(truncate(out, allocation_len as usize)))
}

/// MODE SELECT(6/10): consume the parameter list, change nothing.
pub fn mode_select(parameter_list_len: u32) -> Result<Outcome, SenseData> {
    if parameter_list_len == 0 {
        return Ok(Outcome::Complete);
    }
    Ok(Outcome::Receive {
        offset: 0,
        length: parameter_list_len,
        sink: Sink::Discard,
    })
}

/// Parsed MODE SENSE header, host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeParameterHeader {
    pub mode_data_length: u16,
    pub medium_type: u8,
    pub write_protected: bool,
    pub block_descriptor_length: u16,
}

/// Parse a MODE SENSE(6) or (10) header from `buf`.
pub fn parse_mode_header(buf: &[u8], ten: bool) -> anyhow::Result<ModeParameterHeader> {
    if ten {
        anyhow::ensure!(buf.len() >= 8, "MODE SENSE(10) header needs 8 bytes, got {}", buf.len());
        Ok(ModeParameterHeader {
            mode_data_length: u16::from_be_bytes([buf[0], buf[1]]),
            medium_type: buf[2],
            write_protected: buf[3] & 0x80 != 0,
            block_descriptor_length: u16::from_be_bytes([buf[6], buf[7]]),
        })
    } else {
        anyhow::ensure!(buf.len() >= 4, "MODE SENSE(6) header needs 4 bytes, got {}", buf.len());
        Ok(ModeParameterHeader {
            mode_data_length: buf[0] as u16,
            medium_type: buf[1],
            write_protected: buf[2] & 0x80 != 0,
            block_descriptor_length: buf[3] as u16,
        })
    }
}

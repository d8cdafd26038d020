// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! INQUIRY (6): CDB fillers, the device-side responses and host-side
//! parsers.
//!
//! CDB layout (SPC-4):
//!   [0]    = 0x12 (INQUIRY)
//!   [1]    = EVPD (bit 0); other bits reserved (CMDDT obsolete → 0)
//!   [2]    = Page Code (only when EVPD=1; else 0)
//!   [3..5] = Allocation Length (big-endian u16; SPC-2 hosts leave [3] = 0)
//!   [5]    = Control

use anyhow::{Result, bail};

use crate::{
    block_device::BlockDevice,
    control_block::common::{DeviceIdentity, LogicalUnit, Outcome, fill_ascii, truncate},
    models::sense_data::SenseData,
};

pub const INQUIRY_OPCODE: u8 = 0x12;
/// Length of the standard INQUIRY data we return.
pub const STANDARD_INQUIRY_LEN: usize = 36;

/// VPD pages this device serves.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VpdPage {
    SupportedPages = 0x00,
    UnitSerial = 0x80,
}

impl From<VpdPage> for u8 {
    #[inline]
    fn from(p: VpdPage) -> u8 {
        p as u8
    }
}

impl TryFrom<u8> for VpdPage {
    type Error = anyhow::Error;

    #[inline]
    fn try_from(v: u8) -> Result<Self> {
        Ok(match v {
            0x00 => VpdPage::SupportedPages,
            0x80 => VpdPage::UnitSerial,
            _ => bail!("invalid vpd page: {v}"),
        })
    }
}

/// Fill a **Standard INQUIRY (EVPD=0)** CDB.
#[inline]
pub fn fill_inquiry_standard(cdb: &mut [u8; 16], allocation_len: u16, control: u8) {
    cdb.fill(0);
    cdb[0] = INQUIRY_OPCODE;
    cdb[1] = 0x00; // EVPD=0
    cdb[2] = 0x00; // page code ignored when EVPD=0
    cdb[3..5].copy_from_slice(&allocation_len.to_be_bytes());
    cdb[5] = control;
}

/// Fill a **VPD INQUIRY (EVPD=1)** CDB.
#[inline]
pub fn fill_inquiry_vpd(
    cdb: &mut [u8; 16],
    page: VpdPage,
    allocation_len: u16,
    control: u8,
) {
    cdb.fill(0);
    cdb[0] = INQUIRY_OPCODE;
    cdb[1] = 0x01; // EVPD=1
    cdb[2] = page.into();
    cdb[3..5].copy_from_slice(&allocation_len.to_be_bytes());
    cdb[5] = control;
}

/// Serve an INQUIRY. A page code with EVPD=0, or an unknown VPD page, is
/// an ILLEGAL REQUEST / INVALID FIELD IN CDB.
pub fn inquiry<D: BlockDevice>(
    unit: &mut LogicalUnit<'_, D>,
    evpd: bool,
    page_code: u8,
    allocation_len: u16,
) -> Result<Outcome, SenseData> {
    let data = match (evpd, page_code) {
        (false, 0x00) => standard_inquiry(unit.identity).to_vec(),
        (false, _) => return Err(SenseData::invalid_field_in_cdb()),
        (true, code) => match VpdPage::try_from(code) {
            Ok(page) => vpd_page(unit.identity, page),
            Err(_) => return Err(SenseData::invalid_field_in_cdb()),
        },
    };
    Ok(Outcome::Respond(truncate(data, allocation_len as usize)))
}

/// The 36-byte standard INQUIRY data for a direct-access device.
pub fn standard_inquiry(identity: &DeviceIdentity) -> [u8; STANDARD_INQUIRY_LEN] {
    let mut b = [0u8; STANDARD_INQUIRY_LEN];
    b[0] = 0x00; // PQ=0, direct-access block device
    b[1] = if identity.removable { 0x80 } else { 0x00 }; // RMB
    b[2] = 0x02; // VERSION
    b[3] = 0x02; // response data format
    b[4] = (STANDARD_INQUIRY_LEN - 5) as u8; // ADDITIONAL LENGTH
    fill_ascii(&mut b[8..16], &identity.vendor_id);
    fill_ascii(&mut b[16..32], &identity.product_id);
    fill_ascii(&mut b[32..36], &identity.revision);
    b
}

fn vpd_page(identity: &DeviceIdentity, page: VpdPage) -> Vec<u8> {
    let payload: Vec<u8> = match page {
        VpdPage::SupportedPages => {
            vec![VpdPage::SupportedPages.into(), VpdPage::UnitSerial.into()]
        },
        VpdPage::UnitSerial => identity.serial_number.as_bytes().to_vec(),
    };
    let len = u16::try_from(payload.len()).unwrap_or(u16::MAX);
    let mut out = Vec::with_capacity(4 + payload.len());
    out.push(0x00); // PQ/DT
    out.push(page.into());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&payload[..len as usize]);
    out
}

/// Parsed Standard INQUIRY (EVPD=0) data.
#[derive(Debug, Clone)]
pub struct InquiryStandard {
    pub peripheral_qualifier: u8, // bits 7..5 of byte0
    pub device_type: u8,          // bits 4..0 of byte0
    pub rmb: bool,                // byte1 bit7
    pub version: u8,              // byte2
    pub response_data_format: u8, // byte3 low nibble
    pub additional_length: u8,    // byte4
    pub vendor_id: String,        // bytes 8..16
    pub product_id: String,       // bytes 16..32
    pub product_rev: String,      // bytes 32..36
}

/// Parse a Standard INQUIRY (EVPD=0) response (minimum 36 bytes).
pub fn parse_inquiry_standard(buf: &[u8]) -> Result<InquiryStandard> {
    if buf.len() < STANDARD_INQUIRY_LEN {
        bail!("INQUIRY buffer too short: {}", buf.len());
    }
    let b0 = buf[0];

    Ok(InquiryStandard {
        peripheral_qualifier: (b0 >> 5) & 0x07,
        device_type: b0 & 0x1F,
        rmb: (buf[1] & 0x80) != 0,
        version: buf[2],
        response_data_format: buf[3] & 0x0F,
        additional_length: buf[4],
        vendor_id: trim_ascii(&buf[8..16]),
        product_id: trim_ascii(&buf[16..32]),
        product_rev: trim_ascii(&buf[32..36]),
    })
}

/// Generic VPD header view: returns (page_code, payload)
fn vpd_payload(buf: &[u8]) -> Result<(u8, &[u8])> {
    if buf.len() < 4 {
        bail!("VPD buffer too short: {}", buf.len());
    }
    // byte0: PQ/DT (ignored here), byte1: page code, byte2..3: page length (BE)
    let page_code = buf[1];
    let len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    if buf.len() < 4 + len {
        bail!(
            "VPD truncated: header says {} bytes, have {}",
            len,
            buf.len().saturating_sub(4)
        );
    }
    Ok((page_code, &buf[4..4 + len]))
}

/// VPD 0x00: Supported VPD Pages
pub fn parse_vpd_supported_pages(buf: &[u8]) -> Result<Vec<u8>> {
    let (pc, payload) = vpd_payload(buf)?;
    if pc != 0x00 {
        bail!("expected VPD page 0x00, got 0x{:02X}", pc);
    }
    Ok(payload.to_vec())
}

/// VPD 0x80: Unit Serial Number (ASCII, space-padded)
pub fn parse_vpd_unit_serial(buf: &[u8]) -> Result<String> {
    let (pc, payload) = vpd_payload(buf)?;
    if pc != 0x80 {
        bail!("expected VPD page 0x80, got 0x{:02X}", pc);
    }
    Ok(trim_ascii(payload))
}

fn trim_ascii(bytes: &[u8]) -> String {
    let s: String = bytes
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect();
    s.trim().to_string()
}

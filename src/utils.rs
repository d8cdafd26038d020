// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fmt::Write;

use rand::RngExt;

/// Generates a random 12-digit unit serial number and returns:
/// - `[u8; 6]` raw bytes
/// - `String` containing its upper-case hexadecimal representation, suitable
///   for the INQUIRY unit serial number page
pub fn generate_serial_number() -> ([u8; 6], String) {
    let mut raw = [0u8; 6];
    rand::rng().fill(&mut raw);

    let mut hex = String::with_capacity(12);
    for byte in &raw {
        let _ = write!(&mut hex, "{byte:02X}");
    }

    (raw, hex)
}

/// Short hex preview of a packet for log fields; longer packets are cut
/// to `max` bytes and marked with `..`.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    if data.len() <= max {
        hex::encode(data)
    } else {
        format!("{}..", hex::encode(&data[..max]))
    }
}

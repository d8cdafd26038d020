// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::YesNo, control_block::common::DeviceIdentity,
    utils::generate_serial_number,
};

/// Max packet sizes a bulk endpoint may declare (full speed 8..64, high
/// speed 512).
pub const VALID_MAX_PACKET_SIZES: [u16; 5] = [8, 16, 32, 64, 512];

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// What the logical unit reports about itself.
    pub device: DeviceConfig,
    /// Bulk endpoint and link parameters.
    pub transport: TransportConfig,
    /// Geometry of the backing medium.
    pub storage: StorageConfig,
}

/// Identity and policy of the logical unit.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DeviceConfig {
    #[serde(rename = "VendorId")]
    /// T10 vendor identification, up to 8 ASCII characters.
    pub vendor_id: String,

    #[serde(rename = "ProductId")]
    /// Product identification, up to 16 ASCII characters.
    pub product_id: String,

    #[serde(rename = "Revision")]
    /// Product revision level, up to 4 ASCII characters.
    pub revision: String,

    #[serde(default, rename = "SerialNumber")]
    /// Unit serial number; generated when left empty.
    pub serial_number: String,

    #[serde(default, rename = "Removable")]
    /// RMB bit of the INQUIRY data.
    pub removable: YesNo,

    #[serde(default, rename = "WriteProtected")]
    /// Refuse WRITE(10) / FORMAT UNIT with DATA PROTECT.
    pub write_protected: YesNo,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TransportConfig {
    #[serde(rename = "MaxPacketSize")]
    /// wMaxPacketSize of both bulk endpoints.
    pub max_packet_size: u16,

    #[serde(default = "default_idle_ticks", rename = "SuspendIdleTicks")]
    /// Idle timer ticks after which the link counts as suspended.
    pub suspend_idle_ticks: u32,

    #[serde(default = "default_tick", rename = "IdleTickMs", with = "serde_millis")]
    /// Period of the idle timer.
    pub idle_tick: Duration,

    #[serde(
        default = "default_response_timeout",
        rename = "ResponseTimeout",
        with = "serde_secs"
    )]
    /// How long the simulated host waits for the device to answer.
    pub response_timeout: Duration,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StorageConfig {
    #[serde(rename = "BlockSize")]
    /// Logical block length in bytes.
    pub block_size: u32,

    #[serde(rename = "BlockCount")]
    /// Number of logical blocks.
    pub block_count: u32,
}

fn default_idle_ticks() -> u32 {
    3
}

fn default_tick() -> Duration {
    Duration::from_millis(100)
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        let d = &mut self.device;
        for (name, value, max) in [
            ("VendorId", &mut d.vendor_id, 8usize),
            ("ProductId", &mut d.product_id, 16),
            ("Revision", &mut d.revision, 4),
        ] {
            let trimmed = value.trim_end().to_string();
            *value = trimmed;
            ensure!(!value.is_empty(), "{name} must not be empty");
            ensure!(
                value.len() <= max,
                "{name} is limited to {max} characters, got {}",
                value.len()
            );
            ensure!(
                value.bytes().all(|b| b.is_ascii_graphic() || b == b' '),
                "{name} must be printable ASCII"
            );
        }

        // Unset serial numbers get a random one, as a factory would.
        if d.serial_number.trim().is_empty() {
            d.serial_number = generate_serial_number().1;
        }
        ensure!(
            d.serial_number.bytes().all(|b| b.is_ascii_graphic()),
            "SerialNumber must be printable ASCII without spaces"
        );

        ensure!(
            VALID_MAX_PACKET_SIZES.contains(&self.transport.max_packet_size),
            "MaxPacketSize must be one of {:?}, got {}",
            VALID_MAX_PACKET_SIZES,
            self.transport.max_packet_size
        );
        ensure!(
            self.transport.suspend_idle_ticks >= 1,
            "SuspendIdleTicks must be >= 1"
        );

        let s = &self.storage;
        ensure!(
            s.block_size >= 512 && s.block_size.is_power_of_two(),
            "BlockSize must be a power of two >= 512, got {}",
            s.block_size
        );
        ensure!(s.block_count >= 1, "BlockCount must be >= 1");

        Ok(())
    }

    /// Identity block for INQUIRY.
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            vendor_id: self.device.vendor_id.clone(),
            product_id: self.device.product_id.clone(),
            revision: self.device.revision.clone(),
            serial_number: self.device.serial_number.clone(),
            removable: self.device.removable.as_bool(),
        }
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Same as [`serde_secs`] with millisecond resolution.
mod serde_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

//! System configuration parameters
//!
//! Installation-wide settings for the controller.  Persisted as the
//! `System` slot record; exportable as JSON for diagnostics.

use serde::{Deserialize, Serialize};

use crate::bus::address::AddressingMode;
use crate::error::ConfigError;
use crate::storage::record::{ByteReader, ByteWriter, RecordPayload};
use crate::storage::schema::{MAX_GATES, MAX_LIGHTS};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Bus ---
    /// Wire protocol used for every endpoint address
    pub addressing: AddressingMode,
    /// Serial bus baud rate
    pub bus_baud: u32,

    // --- Timing ---
    /// Main loop period (milliseconds)
    pub loop_period_ms: u16,

    // --- Installed devices ---
    /// Gates/locks in use (0..=MAX_GATES)
    pub gate_count: u8,
    /// Lights in use (0..=MAX_LIGHTS)
    pub light_count: u8,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            addressing: AddressingMode::Absolute,
            bus_baud: 57_600,
            loop_period_ms: 10, // 100 Hz
            gate_count: 1,
            light_count: 0,
        }
    }
}

impl RecordPayload for SystemConfig {
    const SIZE: usize = 1 + 4 + 2 + 1 + 1;

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_u8(self.addressing as u8);
        w.put_u32(self.bus_baud);
        w.put_u16(self.loop_period_ms);
        w.put_u8(self.gate_count);
        w.put_u8(self.light_count);
    }

    fn decode(r: &mut ByteReader<'_>) -> Option<Self> {
        let cfg = Self {
            addressing: AddressingMode::from_u8(r.u8()?)?,
            bus_baud: r.u32()?,
            loop_period_ms: r.u16()?,
            gate_count: r.u8()?,
            light_count: r.u8()?,
        };
        validate_config(&cfg).ok()?;
        Some(cfg)
    }
}

const BAUD_RATES: [u32; 5] = [9_600, 19_200, 38_400, 57_600, 115_200];

/// Range-check every field.  Invalid values are rejected, not clamped.
pub fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !BAUD_RATES.contains(&cfg.bus_baud) {
        return Err(ConfigError::ValidationFailed(
            "bus_baud must be one of 9600/19200/38400/57600/115200",
        ));
    }
    if !(1..=1000).contains(&cfg.loop_period_ms) {
        return Err(ConfigError::ValidationFailed(
            "loop_period_ms must be 1–1000",
        ));
    }
    if cfg.gate_count as usize > MAX_GATES {
        return Err(ConfigError::ValidationFailed("gate_count exceeds MAX_GATES"));
    }
    if cfg.light_count as usize > MAX_LIGHTS {
        return Err(ConfigError::ValidationFailed(
            "light_count exceeds MAX_LIGHTS",
        ));
    }
    Ok(())
}

impl SystemConfig {
    /// Pretty JSON dump for the diagnostics page.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self)
            .map_err(|_| ConfigError::ValidationFailed("config not serialisable"))
    }
}

//! Versioned slot schema.
//!
//! Every persisted module owns one fixed-size slot, so growing or adding a
//! record never moves the address of an unrelated one.  A header record at
//! address 0 carries the schema version.
//!
//! ```text
//!  v2 (current)                          v1 (legacy, no header)
//!  ┌──────────┐ 0x000                    ┌──────────┐ 0x000
//!  │ Header   │                          │ System   │  ← cumulative
//!  ├──────────┤ 0x040                    ├──────────┤    record sizes
//!  │ System   │                          │ Gate 0…3 │
//!  ├──────────┤ 0x080                    ├──────────┤
//!  │ Gate 0…3 │                          │ Light 0…7│
//!  ├──────────┤ 0x180                    └──────────┘
//!  │ Light 0…7│
//!  └──────────┘ 0x380
//! ```
//!
//! Boot runs [`prepare`]: a current header is accepted as-is, a v1 image is
//! relocated slot by slot, anything else is formatted to factory defaults.

use log::{info, warn};

use super::Storage;
use super::record::{
    ByteReader, ByteWriter, MAX_RECORD_BYTES, RecordFault, RecordPayload, record_len,
};
use crate::app::ports::EepromPort;
use crate::config::SystemConfig;
use crate::devices::gate::GateConfig;
use crate::devices::light::LightConfig;

/// Layout version written by this firmware.
pub const SCHEMA_VERSION: u16 = 2;

/// Packed cumulative-offset layout used before slots existed.
pub const LEGACY_SCHEMA_VERSION: u16 = 1;

/// Bytes reserved per slot.
pub const SLOT_SIZE: usize = 64;

pub const MAX_GATES: usize = 4;
pub const MAX_LIGHTS: usize = 8;

/// Header + system + devices.
pub const SLOT_COUNT: usize = 2 + MAX_GATES + MAX_LIGHTS;

/// Minimum storage capacity for the full schema.
pub const REQUIRED_CAPACITY: usize = SLOT_COUNT * SLOT_SIZE;

const _: () = assert!(SLOT_SIZE <= MAX_RECORD_BYTES);
const _: () = assert!(record_len::<SchemaHeader>() <= SLOT_SIZE);
const _: () = assert!(record_len::<SystemConfig>() <= SLOT_SIZE);
const _: () = assert!(record_len::<GateConfig>() <= SLOT_SIZE);
const _: () = assert!(record_len::<LightConfig>() <= SLOT_SIZE);

/// Persisted module identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotId {
    Header,
    System,
    Gate(u8),
    Light(u8),
}

impl SlotId {
    /// Fixed slot index, or `None` for a device index outside the table.
    pub const fn index(self) -> Option<usize> {
        match self {
            Self::Header => Some(0),
            Self::System => Some(1),
            Self::Gate(i) if (i as usize) < MAX_GATES => Some(2 + i as usize),
            Self::Light(i) if (i as usize) < MAX_LIGHTS => Some(2 + MAX_GATES + i as usize),
            _ => None,
        }
    }

    /// Address of the slot in the current layout.
    pub fn address(self) -> Option<u16> {
        self.index().map(|i| (i * SLOT_SIZE) as u16)
    }

    /// Address the same record had in the v1 cumulative layout.
    pub fn legacy_address(self) -> Option<u16> {
        const SYS: usize = record_len::<SystemConfig>();
        const GATE: usize = record_len::<GateConfig>();
        const LIGHT: usize = record_len::<LightConfig>();
        let offset = match self {
            Self::Header => return None,
            Self::System => 0,
            Self::Gate(i) if (i as usize) < MAX_GATES => SYS + i as usize * GATE,
            Self::Light(i) if (i as usize) < MAX_LIGHTS => {
                SYS + MAX_GATES * GATE + i as usize * LIGHT
            }
            _ => return None,
        };
        Some(offset as u16)
    }
}

/// Header record stored in [`SlotId::Header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaHeader {
    pub version: u16,
}

impl Default for SchemaHeader {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
        }
    }
}

impl RecordPayload for SchemaHeader {
    const SIZE: usize = 2;

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_u16(self.version);
    }

    fn decode(r: &mut ByteReader<'_>) -> Option<Self> {
        Some(Self { version: r.u16()? })
    }
}

/// What [`prepare`] found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootLayout {
    /// Header present with the current version.
    Current,
    /// Header was damaged but the slotted layout was intact; header rewritten.
    HeaderRepaired,
    /// Legacy image relocated into slots.
    Migrated { from: u16 },
    /// Blank, unknown or newer image; every slot reset to defaults.
    Formatted { found: Option<u16> },
    /// Header could not be read; storage left as found.
    Unreadable,
}

/// Bring storage to the current schema before any record is loaded.
pub fn prepare<E: EepromPort>(storage: &mut Storage<E>) -> BootLayout {
    if storage.eeprom().capacity() < REQUIRED_CAPACITY {
        warn!(
            "storage capacity {} below schema requirement {}",
            storage.eeprom().capacity(),
            REQUIRED_CAPACITY
        );
    }

    let header_addr = SlotId::Header.address().unwrap_or(0);
    let layout = match storage.peek::<SchemaHeader>(header_addr) {
        Ok(h) if h.version == SCHEMA_VERSION => BootLayout::Current,
        Ok(h) => {
            warn!(
                "schema v{} not supported by this firmware (v{}), formatting",
                h.version, SCHEMA_VERSION
            );
            format(storage);
            BootLayout::Formatted {
                found: Some(h.version),
            }
        }
        Err(RecordFault::ReadFailed) => {
            warn!("schema header unreadable, leaving storage untouched");
            BootLayout::Unreadable
        }
        Err(_) if legacy_image_present(storage) => {
            migrate_v1(storage);
            BootLayout::Migrated {
                from: LEGACY_SCHEMA_VERSION,
            }
        }
        Err(_) if slotted_image_present(storage) => {
            warn!("schema header damaged, slot layout intact; rewriting header");
            write_header(storage);
            BootLayout::HeaderRepaired
        }
        Err(_) => {
            info!("no schema header, formatting storage");
            format(storage);
            BootLayout::Formatted { found: None }
        }
    };
    info!("storage layout: {layout:?}");
    layout
}

fn legacy_image_present<E: EepromPort>(storage: &mut Storage<E>) -> bool {
    SlotId::System
        .legacy_address()
        .is_some_and(|a| storage.peek::<SystemConfig>(a).is_ok())
}

fn slotted_image_present<E: EepromPort>(storage: &mut Storage<E>) -> bool {
    SlotId::System
        .address()
        .is_some_and(|a| storage.peek::<SystemConfig>(a).is_ok())
}

fn write_header<E: EepromPort>(storage: &mut Storage<E>) {
    if let Err(e) = storage.save_slot(SlotId::Header, &SchemaHeader::default()) {
        warn!("schema header write failed: {e}");
    }
}

/// Reset every slot to factory defaults, header last.
fn format<E: EepromPort>(storage: &mut Storage<E>) {
    write_slots(
        storage,
        &SystemConfig::default(),
        &core::array::from_fn::<Option<GateConfig>, MAX_GATES, _>(|_| None),
        &core::array::from_fn::<Option<LightConfig>, MAX_LIGHTS, _>(|_| None),
    );
}

/// Relocate a v1 image.  Everything is read before anything is written
/// because the two layouts overlap.  The header goes last, so an interrupted
/// migration is retried on the next boot; records already overwritten by
/// then fall back to defaults.
fn migrate_v1<E: EepromPort>(storage: &mut Storage<E>) {
    let system = SlotId::System
        .legacy_address()
        .and_then(|a| storage.peek::<SystemConfig>(a).ok())
        .unwrap_or_default();
    let gates: [Option<GateConfig>; MAX_GATES] = core::array::from_fn(|i| {
        SlotId::Gate(i as u8)
            .legacy_address()
            .and_then(|a| storage.peek::<GateConfig>(a).ok())
    });
    let lights: [Option<LightConfig>; MAX_LIGHTS] = core::array::from_fn(|i| {
        SlotId::Light(i as u8)
            .legacy_address()
            .and_then(|a| storage.peek::<LightConfig>(a).ok())
    });

    info!(
        "migrating schema v{} -> v{} ({} gates, {} lights recovered)",
        LEGACY_SCHEMA_VERSION,
        SCHEMA_VERSION,
        gates.iter().flatten().count(),
        lights.iter().flatten().count()
    );
    write_slots(storage, &system, &gates, &lights);
}

fn write_slots<E: EepromPort>(
    storage: &mut Storage<E>,
    system: &SystemConfig,
    gates: &[Option<GateConfig>; MAX_GATES],
    lights: &[Option<LightConfig>; MAX_LIGHTS],
) {
    let mut failures = 0u8;
    if storage.save_slot(SlotId::System, system).is_err() {
        failures += 1;
    }
    for (i, gate) in gates.iter().enumerate() {
        let value = gate.clone().unwrap_or_default();
        if storage.save_slot(SlotId::Gate(i as u8), &value).is_err() {
            failures += 1;
        }
    }
    for (i, light) in lights.iter().enumerate() {
        let value = light.clone().unwrap_or_default();
        if storage.save_slot(SlotId::Light(i as u8), &value).is_err() {
            failures += 1;
        }
    }
    if failures > 0 {
        warn!("{failures} slot writes failed; affected records heal on next load");
    }
    write_header(storage);
}

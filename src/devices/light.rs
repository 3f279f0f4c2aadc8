//! Light module: on/off and dimmed outputs.
//!
//! A small substrate consumer.  Switching goes out on the `Binary` queue,
//! levels on the `Dimmer` queue; the reported brightness is authoritative.

use heapless::String;
use log::{debug, info};

use crate::app::ports::EepromPort;
use crate::bus::address::{ADDRESS_FIELD_SIZE, Address, AddressingMode};
use crate::bus::command::{Command, CommandCategory};
use crate::bus::frame::{BusEvent, EventKind};
use crate::bus::transport::{BusEventHandler, CommandSink};
use crate::error::{ConfigError, StorageError};
use crate::storage::Storage;
use crate::storage::record::{ByteReader, ByteWriter, LoadStatus, RecordPayload};
use crate::storage::schema::SlotId;
use crate::udsm::Outcome;

use super::gate::LABEL_LEN;

/// Full brightness.
pub const MAX_LEVEL: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightConfig {
    pub label: String<LABEL_LEN>,
    pub output: Option<Address>,
    pub dimmable: bool,
    /// Level used when switched on from off.
    pub default_level: u8,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            output: None,
            dimmable: false,
            default_level: MAX_LEVEL,
        }
    }
}

impl LightConfig {
    pub fn set_label(&mut self, label: &str) -> Result<(), ConfigError> {
        let mut s = String::new();
        s.push_str(label).map_err(|_| ConfigError::LabelTooLong)?;
        self.label = s;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_level == 0 || self.default_level > MAX_LEVEL {
            return Err(ConfigError::ValidationFailed("default_level must be 1–100"));
        }
        Ok(())
    }
}

impl RecordPayload for LightConfig {
    const SIZE: usize = LABEL_LEN + ADDRESS_FIELD_SIZE + 1 + 1;

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_str_fixed(&self.label, LABEL_LEN);
        Address::encode_field(self.output, w);
        w.put_bool(self.dimmable);
        w.put_u8(self.default_level);
    }

    fn decode(r: &mut ByteReader<'_>) -> Option<Self> {
        let cfg = Self {
            label: r.str_fixed(LABEL_LEN)?,
            output: Address::decode_field(r)?,
            dimmable: r.bool()?,
            default_level: r.u8()?,
        };
        cfg.validate().ok()?;
        Some(cfg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightAction {
    On,
    Off,
    Toggle,
    Level(u8),
}

pub struct LightDevice {
    index: u8,
    config: LightConfig,
    level: u8,
}

impl LightDevice {
    pub fn new(index: u8, config: LightConfig) -> Self {
        Self {
            index,
            config,
            level: 0,
        }
    }

    pub fn load<E: EepromPort>(index: u8, storage: &mut Storage<E>) -> (Self, LoadStatus) {
        let mut config = LightConfig::default();
        let status = storage.load_slot(SlotId::Light(index), &mut config);
        info!("light {index} '{}' loaded: {status:?}", config.label);
        (Self::new(index, config), status)
    }

    pub fn save<E: EepromPort>(&self, storage: &mut Storage<E>) -> Result<(), StorageError> {
        storage.save_slot(SlotId::Light(self.index), &self.config)
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn config(&self) -> &LightConfig {
        &self.config
    }

    /// Last known brightness, 0 = off.
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_on(&self) -> bool {
        self.level > 0
    }

    pub fn apply(&mut self, action: LightAction, sink: &mut dyn CommandSink) -> Outcome {
        match action {
            LightAction::On => self.set_level(self.config.default_level, sink),
            LightAction::Off => self.set_level(0, sink),
            LightAction::Toggle if self.is_on() => self.set_level(0, sink),
            LightAction::Toggle => self.set_level(self.config.default_level, sink),
            LightAction::Level(level) => self.set_level(level, sink),
        }
    }

    /// Dimmable lights get a `Dimmer` command; others switch on any
    /// non-zero level.
    pub fn set_level(&mut self, level: u8, sink: &mut dyn CommandSink) -> Outcome {
        let Some(address) = self.config.output else {
            debug!("light {} has no output address", self.index);
            return Outcome::NotApplicable;
        };
        let level = level.min(MAX_LEVEL);
        let (category, value, target) = if self.config.dimmable {
            (CommandCategory::Dimmer, level, level)
        } else {
            let on = level > 0;
            (CommandCategory::Binary, u8::from(on), if on { MAX_LEVEL } else { 0 })
        };

        let cmd = match Command::addressed(category, address, sink.addressing(), &[value]) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!("light {} at {address}: {e}", self.index);
                return Outcome::NotApplicable;
            }
        };
        if !sink.submit(cmd) {
            return Outcome::Dropped;
        }
        self.level = target;
        Outcome::Executed
    }

    pub fn configure(&mut self, config: LightConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn stale_addresses(&self, mode: AddressingMode) -> Option<Address> {
        self.config.output.filter(|a| a.mode() != mode)
    }
}

impl BusEventHandler for LightDevice {
    fn on_bus_event(
        &mut self,
        event: &BusEvent,
        _now_ms: u64,
        _sink: &mut dyn CommandSink,
    ) -> bool {
        if self.config.output != Some(event.source) {
            return false;
        }
        match event.kind {
            EventKind::StateReport { value } => {
                self.level = value.min(MAX_LEVEL);
                true
            }
            EventKind::DigitalInputChanged { level } => {
                self.level = if level { self.level.max(1) } else { 0 };
                true
            }
            EventKind::FirmwareChunk(_) => false,
        }
    }
}

//! Application service: the hexagonal core.
//!
//! [`Controller`] owns storage, the bus transport and every device module.
//! It is built once at boot and passed by reference; there are no globals.
//! All I/O flows through port traits injected at call sites, making the
//! entire service testable with mock adapters.
//!
//! ```text
//!  RxMailbox ──▶ ┌──────────────────────────┐ ──▶ EventSink
//!                │        Controller        │
//!  EepromPort ◀─▶│ Storage · Bus · Devices  │ ──▶ BusLink
//!                └──────────────────────────┘
//! ```

use heapless::Vec;
use log::{debug, info, warn};

use crate::bus::address::{
    Address, AddressingMode, MAX_BACKUP_ENTRIES, TaggedAddress, encode_backup,
};
use crate::bus::frame::BusEvent;
use crate::bus::mailbox::RxMailbox;
use crate::bus::transport::{BusEventHandler, BusStats, BusTransport, dispatch};
use crate::config::{SystemConfig, validate_config};
use crate::devices::gate::GateDevice;
use crate::devices::light::LightDevice;
use crate::error::{BusError, ConfigError, Error, Result, StorageError};
use crate::storage::Storage;
use crate::storage::record::LoadStatus;
use crate::storage::schema::{self, BootLayout, MAX_GATES, MAX_LIGHTS, SlotId};
use crate::udsm::{Outcome, State};

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{BusLink, EepromPort, EventSink};

const MAX_HANDLERS: usize = MAX_GATES + MAX_LIGHTS;

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

pub struct Controller<'m, E: EepromPort> {
    storage: Storage<E>,
    config: SystemConfig,
    bus: BusTransport,
    gates: Vec<GateDevice, MAX_GATES>,
    lights: Vec<LightDevice, MAX_LIGHTS>,
    mailbox: &'m RxMailbox,
    layout: BootLayout,
    /// Last reported gate states, for transition events.
    seen_states: [State; MAX_GATES],
    /// Last reported light levels.
    seen_levels: [u8; MAX_LIGHTS],
}

impl<'m, E: EepromPort> Controller<'m, E> {
    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring storage to the current schema, load every record and build the
    /// device tables.  Never fails: bad records fall back to defaults.
    pub fn boot(eeprom: E, mailbox: &'m RxMailbox, sink: &mut impl EventSink) -> Self {
        let mut storage = Storage::new(eeprom);
        let layout = schema::prepare(&mut storage);

        let mut config = SystemConfig::default();
        let status = storage.load_slot(SlotId::System, &mut config);
        report_load(SlotId::System, status, sink);

        let mut ctrl = Self {
            storage,
            bus: BusTransport::new(config.addressing),
            config,
            gates: Vec::new(),
            lights: Vec::new(),
            mailbox,
            layout,
            seen_states: [State::Undefined; MAX_GATES],
            seen_levels: [0; MAX_LIGHTS],
        };
        ctrl.install_devices(sink);

        info!(
            "controller up: {:?} addressing, {} gates, {} lights",
            ctrl.config.addressing,
            ctrl.gates.len(),
            ctrl.lights.len()
        );
        sink.emit(&AppEvent::Started {
            layout,
            gates: ctrl.gates.len() as u8,
            lights: ctrl.lights.len() as u8,
        });
        ctrl
    }

    /// Grow or shrink the device tables to the configured counts, loading
    /// newly installed devices from their slots.
    fn install_devices(&mut self, sink: &mut impl EventSink) {
        let gate_count = usize::from(self.config.gate_count).min(MAX_GATES);
        self.gates.truncate(gate_count);
        while self.gates.len() < gate_count {
            let index = self.gates.len() as u8;
            let (gate, status) = GateDevice::load(index, &mut self.storage);
            report_load(SlotId::Gate(index), status, sink);
            self.seen_states[usize::from(index)] = gate.state();
            report_stale(SlotId::Gate(index), gate.stale_addresses(self.config.addressing), sink);
            if self.gates.push(gate).is_err() {
                break;
            }
        }

        let light_count = usize::from(self.config.light_count).min(MAX_LIGHTS);
        self.lights.truncate(light_count);
        while self.lights.len() < light_count {
            let index = self.lights.len() as u8;
            let (light, status) = LightDevice::load(index, &mut self.storage);
            report_load(SlotId::Light(index), status, sink);
            self.seen_levels[usize::from(index)] = light.level();
            report_stale(
                SlotId::Light(index),
                light.stale_addresses(self.config.addressing),
                sink,
            );
            if self.lights.push(light).is_err() {
                break;
            }
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One pass of the main loop: drain received frames and route them,
    /// run device timers, then transmit at most one queued command.
    pub fn tick<L: BusLink>(&mut self, now_ms: u64, link: &mut L, sink: &mut impl EventSink) {
        while let Some(frame) = self.mailbox.take() {
            if let Some(event) = self.bus.on_frame_received(&frame) {
                self.route(&event, now_ms);
            }
        }

        for gate in self.gates.iter_mut() {
            gate.tick(now_ms, &mut self.bus);
        }
        self.report_changes(sink);

        if let Some(category) = self.bus.service_tick(link) {
            debug!("sent {category:?} command");
        }
        self.bus.drain_drops(|category, count| {
            sink.emit(&AppEvent::CommandDropped { category, count });
        });
    }

    fn route(&mut self, event: &BusEvent, now_ms: u64) -> usize {
        let mut handlers: Vec<&mut dyn BusEventHandler, MAX_HANDLERS> = Vec::new();
        for gate in self.gates.iter_mut() {
            let _ = handlers.push(gate);
        }
        for light in self.lights.iter_mut() {
            let _ = handlers.push(light);
        }
        dispatch(event, now_ms, &mut self.bus, &mut handlers)
    }

    /// Emit transition and level events for anything that moved since the
    /// last call.
    fn report_changes(&mut self, sink: &mut impl EventSink) {
        for gate in &self.gates {
            let i = usize::from(gate.index());
            let from = self.seen_states[i];
            let to = gate.state();
            if from == to {
                continue;
            }
            self.seen_states[i] = to;
            sink.emit(&AppEvent::StateChanged {
                gate: gate.index(),
                from,
                to,
            });
            if let Some(cause) = gate.fault_cause() {
                if to == State::Fault {
                    sink.emit(&AppEvent::FaultRaised {
                        gate: gate.index(),
                        cause,
                    });
                }
            }
        }
        for light in &self.lights {
            let i = usize::from(light.index());
            if self.seen_levels[i] != light.level() {
                self.seen_levels[i] = light.level();
                sink.emit(&AppEvent::LightLevel {
                    light: light.index(),
                    level: light.level(),
                });
            }
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.  Device commands report their
    /// [`Outcome`]; configuration and persistence commands report
    /// `Executed` or an error.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        now_ms: u64,
        sink: &mut impl EventSink,
    ) -> Result<Outcome> {
        let outcome = match cmd {
            AppCommand::Gate { index, command } => {
                let gate = gate_mut(&mut self.gates, index)?;
                let outcome = gate.command(command, now_ms, &mut self.bus);
                if outcome != Outcome::Executed {
                    sink.emit(&AppEvent::CommandIgnored {
                        gate: index,
                        command,
                        outcome,
                    });
                }
                outcome
            }
            AppCommand::AcknowledgeFault { index } => {
                if gate_mut(&mut self.gates, index)?.acknowledge_fault() {
                    sink.emit(&AppEvent::FaultAcknowledged { gate: index });
                    Outcome::Executed
                } else {
                    Outcome::NotApplicable
                }
            }
            AppCommand::SetDisplayState { index, state } => {
                gate_mut(&mut self.gates, index)?.set_display_state(state);
                Outcome::Executed
            }
            AppCommand::ConfigureGate { index, config } => {
                let gate = gate_mut(&mut self.gates, index)?;
                gate.configure(config, &mut self.bus)?;
                report_stale(
                    SlotId::Gate(index),
                    gate.stale_addresses(self.config.addressing),
                    sink,
                );
                Outcome::Executed
            }
            AppCommand::Light { index, action } => {
                light_mut(&mut self.lights, index)?.apply(action, &mut self.bus)
            }
            AppCommand::ConfigureLight { index, config } => {
                let light = light_mut(&mut self.lights, index)?;
                light.configure(config)?;
                report_stale(
                    SlotId::Light(index),
                    light.stale_addresses(self.config.addressing),
                    sink,
                );
                Outcome::Executed
            }
            AppCommand::ConfigureSystem(config) => {
                self.configure_system(config, sink)?;
                Outcome::Executed
            }
            AppCommand::SetAddressing(mode) => {
                let config = SystemConfig {
                    addressing: mode,
                    ..self.config.clone()
                };
                self.configure_system(config, sink)?;
                Outcome::Executed
            }
            AppCommand::SaveGate { index } => {
                let result = gate_mut(&mut self.gates, index)?.save(&mut self.storage);
                report_save(SlotId::Gate(index), result, sink)?;
                Outcome::Executed
            }
            AppCommand::SaveLight { index } => {
                let result = light_mut(&mut self.lights, index)?.save(&mut self.storage);
                report_save(SlotId::Light(index), result, sink)?;
                Outcome::Executed
            }
            AppCommand::SaveSystem => {
                let result = self.storage.save_slot(SlotId::System, &self.config);
                report_save(SlotId::System, result, sink)?;
                Outcome::Executed
            }
            AppCommand::SaveAll => {
                self.save_all(sink)?;
                Outcome::Executed
            }
        };
        self.report_changes(sink);
        Ok(outcome)
    }

    /// Validate, apply and persist new system settings.  A protocol change
    /// discards pending commands and reports every address left stale.
    fn configure_system(&mut self, config: SystemConfig, sink: &mut impl EventSink) -> Result<()> {
        validate_config(&config)?;
        let previous = self.config.addressing;
        self.config = config;

        if previous != self.config.addressing {
            self.bus.set_addressing(self.config.addressing);
            sink.emit(&AppEvent::AddressingChanged {
                from: previous,
                to: self.config.addressing,
            });
            self.report_all_stale(sink);
        }
        self.install_devices(sink);

        let result = self.storage.save_slot(SlotId::System, &self.config);
        report_save(SlotId::System, result, sink)
    }

    /// Write every record.  Continues past failures and returns the first.
    fn save_all(&mut self, sink: &mut impl EventSink) -> Result<()> {
        let mut first: Option<Error> = None;
        let result = self.storage.save_slot(SlotId::System, &self.config);
        if let Err(e) = report_save(SlotId::System, result, sink) {
            first.get_or_insert(e);
        }
        for gate in &self.gates {
            let result = gate.save(&mut self.storage);
            if let Err(e) = report_save(SlotId::Gate(gate.index()), result, sink) {
                first.get_or_insert(e);
            }
        }
        for light in &self.lights {
            let result = light.save(&mut self.storage);
            if let Err(e) = report_save(SlotId::Light(light.index()), result, sink) {
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn report_all_stale(&self, sink: &mut impl EventSink) {
        let mode = self.config.addressing;
        for gate in &self.gates {
            report_stale(SlotId::Gate(gate.index()), gate.stale_addresses(mode), sink);
        }
        for light in &self.lights {
            report_stale(SlotId::Light(light.index()), light.stale_addresses(mode), sink);
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn layout(&self) -> BootLayout {
        self.layout
    }

    pub fn gates(&self) -> &[GateDevice] {
        &self.gates
    }

    pub fn gate(&self, index: u8) -> Option<&GateDevice> {
        self.gates.get(usize::from(index))
    }

    pub fn lights(&self) -> &[LightDevice] {
        &self.lights
    }

    pub fn light(&self, index: u8) -> Option<&LightDevice> {
        self.lights.get(usize::from(index))
    }

    pub fn bus(&self) -> &BusTransport {
        &self.bus
    }

    pub fn bus_stats(&self) -> BusStats {
        self.bus.stats()
    }

    /// Frames the receive path could not hand over.
    pub fn rx_overruns(&self) -> u32 {
        self.mailbox.overruns()
    }

    pub fn storage(&self) -> &Storage<E> {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Storage<E> {
        &mut self.storage
    }

    /// Every configured address, tagged with its protocol, as a postcard
    /// blob for backup.
    pub fn export_addresses(&self) -> core::result::Result<std::vec::Vec<u8>, BusError> {
        let mut tagged: Vec<TaggedAddress, MAX_BACKUP_ENTRIES> = Vec::new();
        let gate_addresses = self.gates.iter().flat_map(|g| g.config().addresses());
        let light_addresses = self.lights.iter().filter_map(|l| l.config().output);
        for address in gate_addresses.chain(light_addresses) {
            tagged
                .push(TaggedAddress::new(address))
                .map_err(|_| BusError::PayloadTooLarge)?;
        }
        encode_backup(&tagged)
    }

    /// System settings as pretty JSON for the diagnostics page.
    pub fn config_json(&self) -> core::result::Result<String, ConfigError> {
        self.config.to_json()
    }

    /// Tear down and hand back the storage device.
    pub fn into_storage(self) -> E {
        self.storage.into_inner()
    }
}

// ───────────────────────────────────────────────────────────────
// Helpers
// ───────────────────────────────────────────────────────────────

fn gate_mut(gates: &mut [GateDevice], index: u8) -> Result<&mut GateDevice> {
    gates
        .get_mut(usize::from(index))
        .ok_or(Error::Config(ConfigError::NoSuchDevice))
}

fn light_mut(lights: &mut [LightDevice], index: u8) -> Result<&mut LightDevice> {
    lights
        .get_mut(usize::from(index))
        .ok_or(Error::Config(ConfigError::NoSuchDevice))
}

fn report_load(slot: SlotId, status: LoadStatus, sink: &mut impl EventSink) {
    if status != LoadStatus::Valid {
        sink.emit(&AppEvent::RecordRecovered { slot, status });
    }
}

fn report_stale(slot: SlotId, stale: impl IntoIterator<Item = Address>, sink: &mut impl EventSink) {
    for address in stale {
        sink.emit(&AppEvent::StaleAddress { slot, address });
    }
}

fn report_save(
    slot: SlotId,
    result: core::result::Result<(), StorageError>,
    sink: &mut impl EventSink,
) -> Result<()> {
    match result {
        Ok(()) => {
            sink.emit(&AppEvent::Saved { slot });
            Ok(())
        }
        Err(error) => {
            warn!("{slot:?} save failed: {error}");
            sink.emit(&AppEvent::SaveFailed { slot, error });
            Err(error.into())
        }
    }
}

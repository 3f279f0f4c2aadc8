//! Gate / lock / barrier module: the reference UDSM instantiation.
//!
//! Persists a [`GateConfig`] record in its own slot and binds the profile's
//! 1-based output numbers to bus addresses.  Every output change becomes a
//! `Binary` command `[address · level]`.

use heapless::String;
use log::{debug, info, warn};

use crate::app::ports::EepromPort;
use crate::bus::address::{ADDRESS_FIELD_SIZE, Address, AddressingMode};
use crate::bus::command::{Command, CommandCategory};
use crate::bus::frame::{BusEvent, EventKind};
use crate::bus::transport::{BusEventHandler, CommandSink};
use crate::error::{ConfigError, StorageError};
use crate::storage::Storage;
use crate::storage::record::{ByteReader, ByteWriter, LoadStatus, RecordPayload};
use crate::storage::schema::SlotId;
use crate::udsm::profile::{self, BehaviorProfile, DEFAULT_PROFILE_ID, UiCommand};
use crate::udsm::{
    DriveResult, FaultCause, INPUT_COUNT, Outcome, OutputDriver, State, Timings, Udsm,
};

pub const LABEL_LEN: usize = 16;
pub const MAX_OUTPUTS: usize = 4;
pub const MAX_INPUTS: usize = INPUT_COUNT;

// ---------------------------------------------------------------------------
// Persisted configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub label: String<LABEL_LEN>,
    pub profile_id: u8,
    /// Icon set shown by the GUI.
    pub appearance: u8,
    pub outputs: [Option<Address>; MAX_OUTPUTS],
    /// Open limit, closed limit, obstruction.
    pub inputs: [Option<Address>; MAX_INPUTS],
    pub cycle_timeout_s: u16,
    pub pedestrian_timeout_s: u16,
    pub pulse_ms: u16,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            label: String::new(),
            profile_id: DEFAULT_PROFILE_ID,
            appearance: 0,
            outputs: [None; MAX_OUTPUTS],
            inputs: [None; MAX_INPUTS],
            cycle_timeout_s: 60,
            pedestrian_timeout_s: 30,
            pulse_ms: 500,
        }
    }
}

impl GateConfig {
    pub fn set_label(&mut self, label: &str) -> Result<(), ConfigError> {
        let mut s = String::new();
        s.push_str(label).map_err(|_| ConfigError::LabelTooLong)?;
        self.label = s;
        Ok(())
    }

    pub fn profile(&self) -> Option<&'static BehaviorProfile> {
        profile::profile(self.profile_id)
    }

    pub fn timings(&self) -> Timings {
        Timings {
            cycle_ms: u32::from(self.cycle_timeout_s) * 1000,
            pedestrian_ms: u32::from(self.pedestrian_timeout_s) * 1000,
            pulse_ms: u32::from(self.pulse_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile().is_none() {
            return Err(ConfigError::ValidationFailed("unknown profile_id"));
        }
        if self.pulse_ms == 0 {
            return Err(ConfigError::ValidationFailed("pulse_ms must be > 0"));
        }
        Ok(())
    }

    /// Every configured address, outputs first.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.outputs.iter().chain(self.inputs.iter()).flatten().copied()
    }

    /// Addresses stored under a protocol other than `mode`.
    pub fn stale_addresses(&self, mode: AddressingMode) -> impl Iterator<Item = Address> + '_ {
        self.addresses().filter(move |a| a.mode() != mode)
    }
}

impl RecordPayload for GateConfig {
    const SIZE: usize = LABEL_LEN
        + 1
        + 1
        + (MAX_OUTPUTS + MAX_INPUTS) * ADDRESS_FIELD_SIZE
        + 2
        + 2
        + 2;

    fn encode(&self, w: &mut ByteWriter<'_>) {
        w.put_str_fixed(&self.label, LABEL_LEN);
        w.put_u8(self.profile_id);
        w.put_u8(self.appearance);
        for a in self.outputs.iter().chain(self.inputs.iter()) {
            Address::encode_field(*a, w);
        }
        w.put_u16(self.cycle_timeout_s);
        w.put_u16(self.pedestrian_timeout_s);
        w.put_u16(self.pulse_ms);
    }

    fn decode(r: &mut ByteReader<'_>) -> Option<Self> {
        let label = r.str_fixed(LABEL_LEN)?;
        let profile_id = r.u8()?;
        let appearance = r.u8()?;
        let mut outputs = [None; MAX_OUTPUTS];
        for slot in &mut outputs {
            *slot = Address::decode_field(r)?;
        }
        let mut inputs = [None; MAX_INPUTS];
        for slot in &mut inputs {
            *slot = Address::decode_field(r)?;
        }
        let cfg = Self {
            label,
            profile_id,
            appearance,
            outputs,
            inputs,
            cycle_timeout_s: r.u16()?,
            pedestrian_timeout_s: r.u16()?,
            pulse_ms: r.u16()?,
        };
        cfg.validate().ok()?;
        Some(cfg)
    }
}

// ---------------------------------------------------------------------------
// Output binding
// ---------------------------------------------------------------------------

/// Maps profile output numbers onto `Binary` bus commands.
struct BusOutputs<'a> {
    outputs: &'a [Option<Address>; MAX_OUTPUTS],
    sink: &'a mut dyn CommandSink,
}

impl BusOutputs<'_> {
    fn command(&self, output: u8, asserted: bool) -> Option<Command> {
        let address = output
            .checked_sub(1)
            .and_then(|i| self.outputs.get(i as usize))
            .copied()
            .flatten()?;
        let mode = self.sink.addressing();
        Command::addressed(CommandCategory::Binary, address, mode, &[u8::from(asserted)])
            .inspect_err(|e| debug!("output {output} at {address}: {e}"))
            .ok()
    }
}

impl OutputDriver for BusOutputs<'_> {
    fn drive(&mut self, output: u8, asserted: bool) -> DriveResult {
        let Some(cmd) = self.command(output, asserted) else {
            return DriveResult::NotConfigured;
        };
        if self.sink.submit(cmd) {
            DriveResult::Sent
        } else {
            DriveResult::Dropped
        }
    }

    fn can_drive(&mut self, output: u8, frames: usize) -> DriveResult {
        if self.command(output, true).is_none() {
            DriveResult::NotConfigured
        } else if self.sink.room(CommandCategory::Binary) < frames {
            self.sink.count_drop(CommandCategory::Binary);
            DriveResult::Dropped
        } else {
            DriveResult::Sent
        }
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

pub struct GateDevice {
    index: u8,
    config: GateConfig,
    udsm: Udsm,
}

/// Profile for `config`, falling back to the default for unknown ids.
fn resolve_profile(config: &GateConfig) -> &'static BehaviorProfile {
    config
        .profile()
        .or_else(|| profile::profile(DEFAULT_PROFILE_ID))
        .unwrap_or(&profile::PROFILES[0])
}

impl GateDevice {
    pub fn new(index: u8, config: GateConfig) -> Self {
        let udsm = Udsm::new(resolve_profile(&config), config.timings());
        Self {
            index,
            config,
            udsm,
        }
    }

    /// Load gate `index` from its slot; the runtime starts `Undefined`.
    pub fn load<E: EepromPort>(index: u8, storage: &mut Storage<E>) -> (Self, LoadStatus) {
        let mut config = GateConfig::default();
        let status = storage.load_slot(SlotId::Gate(index), &mut config);
        let gate = Self::new(index, config);
        info!(
            "gate {index} '{}' ({}) loaded: {status:?}",
            gate.config.label,
            gate.udsm.profile().display_name
        );
        (gate, status)
    }

    pub fn save<E: EepromPort>(&self, storage: &mut Storage<E>) -> Result<(), StorageError> {
        storage.save_slot(SlotId::Gate(self.index), &self.config)
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.udsm.state()
    }

    pub fn fault_cause(&self) -> Option<FaultCause> {
        self.udsm.fault_cause()
    }

    pub fn udsm(&self) -> &Udsm {
        &self.udsm
    }

    pub fn display_state(&self) -> State {
        self.udsm.display_state()
    }

    pub fn set_display_state(&mut self, state: State) {
        self.udsm.set_display_state(state);
    }

    pub fn command(&mut self, cmd: UiCommand, now_ms: u64, sink: &mut dyn CommandSink) -> Outcome {
        let mut out = BusOutputs {
            outputs: &self.config.outputs,
            sink,
        };
        self.udsm.handle(cmd, now_ms, &mut out)
    }

    pub fn tick(&mut self, now_ms: u64, sink: &mut dyn CommandSink) {
        let mut out = BusOutputs {
            outputs: &self.config.outputs,
            sink,
        };
        self.udsm.tick(now_ms, &mut out);
    }

    pub fn acknowledge_fault(&mut self) -> bool {
        self.udsm.acknowledge_fault()
    }

    /// Replace the configuration in RAM.  Persist with [`save`](Self::save).
    pub fn configure(
        &mut self,
        config: GateConfig,
        sink: &mut dyn CommandSink,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        let profile = resolve_profile(&config);
        // Release anything held on the old wiring before swapping it out.
        let mut out = BusOutputs {
            outputs: &self.config.outputs,
            sink,
        };
        self.udsm.reconfigure(profile, config.timings(), &mut out);
        self.config = config;
        info!("gate {} reconfigured ({})", self.index, profile.display_name);
        Ok(())
    }

    /// Addresses that were stored under the other protocol.
    pub fn stale_addresses(&self, mode: AddressingMode) -> heapless::Vec<Address, 7> {
        let stale: heapless::Vec<Address, 7> = self.config.stale_addresses(mode).collect();
        for a in &stale {
            warn!("gate {} address {a} belongs to the inactive protocol", self.index);
        }
        stale
    }

    fn input_index(&self, source: Address) -> Option<u8> {
        self.config
            .inputs
            .iter()
            .position(|a| *a == Some(source))
            .map(|i| i as u8)
    }
}

impl BusEventHandler for GateDevice {
    fn on_bus_event(
        &mut self,
        event: &BusEvent,
        _now_ms: u64,
        sink: &mut dyn CommandSink,
    ) -> bool {
        match event.kind {
            EventKind::DigitalInputChanged { level } => {
                let Some(index) = self.input_index(event.source) else {
                    return false;
                };
                let mut out = BusOutputs {
                    outputs: &self.config.outputs,
                    sink,
                };
                self.udsm.on_input(index, level, &mut out);
                true
            }
            EventKind::StateReport { value } => {
                if !self.config.outputs.contains(&Some(event.source)) {
                    return false;
                }
                debug!("gate {} output {} reports {value}", self.index, event.source);
                true
            }
            EventKind::FirmwareChunk(_) => false,
        }
    }
}

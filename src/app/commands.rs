//! Inbound commands to the controller.
//!
//! These represent actions requested by the outside world (the touch GUI,
//! a scene, a diagnostics console) that the
//! [`Controller`](super::service::Controller) interprets and acts upon.
//! All device commands are fire-and-forget: the outcome is observed through
//! state changes and events, not through an acknowledgement.

use crate::bus::address::AddressingMode;
use crate::config::SystemConfig;
use crate::devices::gate::GateConfig;
use crate::devices::light::{LightAction, LightConfig};
use crate::udsm::State;
use crate::udsm::profile::UiCommand;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Send a UI command to a gate/lock.
    Gate { index: u8, command: UiCommand },

    /// Clear a gate fault.  Nothing moves until the next UI command.
    AcknowledgeFault { index: u8 },

    /// Optimistic display override for a gate (GUI feedback only).
    SetDisplayState { index: u8, state: State },

    /// Replace a gate configuration in RAM.
    ConfigureGate { index: u8, config: GateConfig },

    /// Switch or dim a light.
    Light { index: u8, action: LightAction },

    /// Replace a light configuration in RAM.
    ConfigureLight { index: u8, config: LightConfig },

    /// Replace the installation-wide settings and persist them.
    ConfigureSystem(SystemConfig),

    /// Change the wire protocol and persist it.  Stored addresses are not
    /// translated.
    SetAddressing(AddressingMode),

    /// Persist one gate record.
    SaveGate { index: u8 },

    /// Persist one light record.
    SaveLight { index: u8 },

    /// Persist the system record.
    SaveSystem,

    /// Persist every record.
    SaveAll,
}

//! Outbound application events.
//!
//! The [`Controller`](super::service::Controller) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, refresh the GUI,
//! count them for diagnostics.

use crate::bus::address::{Address, AddressingMode};
use crate::bus::command::CommandCategory;
use crate::error::StorageError;
use crate::storage::record::LoadStatus;
use crate::storage::schema::{BootLayout, SlotId};
use crate::udsm::profile::UiCommand;
use crate::udsm::{FaultCause, Outcome, State};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Boot finished.
    Started {
        layout: BootLayout,
        gates: u8,
        lights: u8,
    },

    /// A gate changed authoritative state.
    StateChanged { gate: u8, from: State, to: State },

    /// A gate entered `Fault`.
    FaultRaised { gate: u8, cause: FaultCause },

    /// A fault was cleared by the user.
    FaultAcknowledged { gate: u8 },

    /// A UI command had no effect.
    CommandIgnored {
        gate: u8,
        command: UiCommand,
        outcome: Outcome,
    },

    /// Commands were lost to a full queue since the last report.
    CommandDropped { category: CommandCategory, count: u32 },

    /// A record failed validation at boot and was reset to defaults.
    RecordRecovered { slot: SlotId, status: LoadStatus },

    /// A record was written.
    Saved { slot: SlotId },

    /// A record could not be written.
    SaveFailed { slot: SlotId, error: StorageError },

    /// A stored address belongs to the inactive protocol and is ignored.
    StaleAddress { slot: SlotId, address: Address },

    /// The bus protocol changed.
    AddressingChanged {
        from: AddressingMode,
        to: AddressingMode,
    },

    /// A light's known brightness changed.
    LightLevel { light: u8, level: u8 },
}

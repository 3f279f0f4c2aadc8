//! Compiled-in behavior profile library.
//!
//! A profile is pure data: for each abstract UI command, which physical
//! output to drive and whether to pulse it or hold it.  Output numbers are
//! 1-based indices into the device's output address table; 0 means the
//! command is not supported by the profile.

/// Abstract commands the UI, scenes and timers issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UiCommand {
    SmartToggle = 0,
    OpenFully = 1,
    CloseFully = 2,
    Pedestrian = 3,
    Stop = 4,
    Unlock = 5,
}

impl UiCommand {
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::SmartToggle,
        Self::OpenFully,
        Self::CloseFully,
        Self::Pedestrian,
        Self::Stop,
        Self::Unlock,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One command-map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalAction {
    /// 1-based output index, 0 = none.
    pub target_output: u8,
    /// Pulse for the configured duration instead of holding.
    pub is_pulsed: bool,
}

impl PhysicalAction {
    pub const NONE: Self = Self {
        target_output: 0,
        is_pulsed: false,
    };

    pub const fn pulse(output: u8) -> Self {
        Self {
            target_output: output,
            is_pulsed: true,
        }
    }

    pub const fn hold(output: u8) -> Self {
        Self {
            target_output: output,
            is_pulsed: false,
        }
    }

    pub const fn is_none(self) -> bool {
        self.target_output == 0
    }
}

/// Settings the configuration screen shows for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsMask(pub u8);

impl SettingsMask {
    pub const CYCLE_TIMEOUT: Self = Self(1 << 0);
    pub const PEDESTRIAN_TIMEOUT: Self = Self(1 << 1);
    pub const PULSE_LENGTH: Self = Self(1 << 2);
    pub const FEEDBACK_INPUTS: Self = Self(1 << 3);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Immutable device behavior descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorProfile {
    pub id: u8,
    pub display_name: &'static str,
    pub visible_settings: SettingsMask,
    pub command_map: [PhysicalAction; UiCommand::COUNT],
}

impl BehaviorProfile {
    /// Mapped action, or `None` for an unsupported command.
    pub fn action(&self, cmd: UiCommand) -> Option<PhysicalAction> {
        let action = self.command_map[cmd.index()];
        (!action.is_none()).then_some(action)
    }

    pub fn supports(&self, cmd: UiCommand) -> bool {
        self.action(cmd).is_some()
    }

    /// Highest output index any entry references.
    pub fn outputs_used(&self) -> u8 {
        self.command_map
            .iter()
            .map(|a| a.target_output)
            .max()
            .unwrap_or(0)
    }
}

// ── Library ──────────────────────────────────────────────────

const N: PhysicalAction = PhysicalAction::NONE;

const fn map(
    toggle: PhysicalAction,
    open: PhysicalAction,
    close: PhysicalAction,
    pedestrian: PhysicalAction,
    stop: PhysicalAction,
    unlock: PhysicalAction,
) -> [PhysicalAction; UiCommand::COUNT] {
    [toggle, open, close, pedestrian, stop, unlock]
}

const ALL_TIMERS: SettingsMask = SettingsMask::CYCLE_TIMEOUT
    .union(SettingsMask::PEDESTRIAN_TIMEOUT)
    .union(SettingsMask::PULSE_LENGTH)
    .union(SettingsMask::FEEDBACK_INPUTS);

pub const PROFILE_STEP_BY_STEP: u8 = 1;
pub const PROFILE_OPEN_CLOSE_IMPULSE: u8 = 2;
pub const PROFILE_BARRIER: u8 = 3;
pub const PROFILE_ELECTRIC_LOCK: u8 = 4;
pub const PROFILE_MOTOR_DOOR: u8 = 5;

pub const DEFAULT_PROFILE_ID: u8 = PROFILE_STEP_BY_STEP;

pub static PROFILES: [BehaviorProfile; 5] = [
    BehaviorProfile {
        // One button on the gate controller cycles open/stop/close.
        id: PROFILE_STEP_BY_STEP,
        display_name: "Step-by-step gate",
        visible_settings: ALL_TIMERS,
        command_map: map(
            PhysicalAction::pulse(1),
            N,
            N,
            PhysicalAction::pulse(2),
            N,
            N,
        ),
    },
    BehaviorProfile {
        id: PROFILE_OPEN_CLOSE_IMPULSE,
        display_name: "Gate, open/close impulses",
        visible_settings: ALL_TIMERS,
        command_map: map(
            N,
            PhysicalAction::pulse(1),
            PhysicalAction::pulse(2),
            PhysicalAction::pulse(4),
            PhysicalAction::pulse(3),
            N,
        ),
    },
    BehaviorProfile {
        id: PROFILE_BARRIER,
        display_name: "Barrier ramp",
        visible_settings: SettingsMask::CYCLE_TIMEOUT
            .union(SettingsMask::PULSE_LENGTH)
            .union(SettingsMask::FEEDBACK_INPUTS),
        command_map: map(
            N,
            PhysicalAction::pulse(1),
            PhysicalAction::pulse(2),
            N,
            N,
            N,
        ),
    },
    BehaviorProfile {
        id: PROFILE_ELECTRIC_LOCK,
        display_name: "Electric lock",
        visible_settings: SettingsMask::PULSE_LENGTH,
        command_map: map(N, N, N, N, N, PhysicalAction::pulse(1)),
    },
    BehaviorProfile {
        // Outputs are held for the whole travel; stop releases them.
        id: PROFILE_MOTOR_DOOR,
        display_name: "Motor door, continuous",
        visible_settings: SettingsMask::CYCLE_TIMEOUT
            .union(SettingsMask::PULSE_LENGTH)
            .union(SettingsMask::FEEDBACK_INPUTS),
        command_map: map(
            N,
            PhysicalAction::hold(1),
            PhysicalAction::hold(2),
            N,
            PhysicalAction::pulse(3),
            N,
        ),
    },
];

/// Look up a profile by id.
pub fn profile(id: u8) -> Option<&'static BehaviorProfile> {
    PROFILES.iter().find(|p| p.id == id)
}

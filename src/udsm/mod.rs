//! Universal Device State Machine.
//!
//! A small interpreter that turns a [`BehaviorProfile`] into concrete
//! open/close/stop/timeout/fault behavior.  It never branches on the device
//! type; everything device-specific lives in the profile table.
//!
//! ```text
//!                 ┌──────────┐
//!        ┌───────▶│ Undefined│◀──────── acknowledge_fault
//!        │        └────┬─────┘
//!        │   open/close│
//!        │             ▼
//!  ┌─────┴─┐  limit  ┌─────────┐  timeout / both limits / obstruction
//!  │ Open  │◀────────│ Opening │───────────────────────┐
//!  └───────┘         └─────────┘                       ▼
//!  ┌───────┐  limit  ┌─────────┐                  ┌────────┐
//!  │Closed │◀────────│ Closing │─────────────────▶│ Fault  │
//!  └───────┘         └─────────┘                  └────────┘
//!        stop while moving ──▶ PartiallyOpen
//! ```
//!
//! Time is passed in as a monotonic millisecond value; the machine only
//! compares deadlines and never reads a clock itself.

pub mod profile;

use log::{debug, info, warn};

use profile::{BehaviorProfile, PhysicalAction, UiCommand};

// ---------------------------------------------------------------------------
// Runtime types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum State {
    #[default]
    Undefined = 0,
    Closed = 1,
    Open = 2,
    Opening = 3,
    Closing = 4,
    PartiallyOpen = 5,
    Fault = 6,
}

impl State {
    pub const fn is_moving(self) -> bool {
        matches!(self, Self::Opening | Self::Closing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Full open/close travel must be confirmed before this expires.
    Cycle,
    /// Pedestrian opening auto-closes on expiry.
    Pedestrian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    CycleTimeout,
    /// Open and closed limits active at the same time.
    ContradictoryFeedback,
    Obstruction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Opening,
    Closing,
}

/// Feedback input slots (0-based index into the device input table).
pub const INPUT_OPEN_LIMIT: u8 = 0;
pub const INPUT_CLOSED_LIMIT: u8 = 1;
pub const INPUT_OBSTRUCTION: u8 = 2;
pub const INPUT_COUNT: usize = 3;

/// Per-device timing, already converted to milliseconds.  Zero disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub cycle_ms: u32,
    pub pedestrian_ms: u32,
    pub pulse_ms: u32,
}

/// Result of asking the driver to change an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveResult {
    Sent,
    /// The output has no usable address.
    NotConfigured,
    /// The bus queue rejected the command.
    Dropped,
}

/// Physical side of the machine.  Output numbers are 1-based.
pub trait OutputDriver {
    fn drive(&mut self, output: u8, asserted: bool) -> DriveResult;

    /// Whether `frames` commands, the first one to `output`, would all be
    /// accepted now.  Sends nothing; a `Dropped` answer counts as one drop.
    fn can_drive(&mut self, output: u8, frames: usize) -> DriveResult;
}

/// What happened to a UI command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Executed,
    /// Unsupported by the profile or the output is unconfigured.
    NotApplicable,
    /// Not allowed in the current state.
    Ignored,
    /// Accepted but the bus queue was full.
    Dropped,
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

pub struct Udsm {
    profile: &'static BehaviorProfile,
    timings: Timings,
    state: State,
    fault: Option<FaultCause>,
    last_direction: Option<Direction>,
    /// Continuous output currently asserted.
    held_output: Option<u8>,
    /// Pulsed output awaiting release at the deadline.
    pulse_release: Option<(u8, u64)>,
    timer: Option<(TimerKind, u64)>,
    inputs: [bool; INPUT_COUNT],
    display_override: Option<State>,
}

impl Udsm {
    pub fn new(profile: &'static BehaviorProfile, timings: Timings) -> Self {
        Self {
            profile,
            timings,
            state: State::Undefined,
            fault: None,
            last_direction: None,
            held_output: None,
            pulse_release: None,
            timer: None,
            inputs: [false; INPUT_COUNT],
            display_override: None,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> State {
        self.state
    }

    pub fn fault_cause(&self) -> Option<FaultCause> {
        self.fault
    }

    pub fn profile(&self) -> &'static BehaviorProfile {
        self.profile
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    pub fn armed_timer(&self) -> Option<(TimerKind, u64)> {
        self.timer
    }

    pub fn held_output(&self) -> Option<u8> {
        self.held_output
    }

    pub fn pulse_pending(&self) -> bool {
        self.pulse_release.is_some()
    }

    pub fn input(&self, index: u8) -> bool {
        self.inputs.get(index as usize).copied().unwrap_or(false)
    }

    // ── Display-only override ─────────────────────────────────

    /// Show `state` on screen until the next authoritative update.
    /// Never consulted for control decisions.
    pub fn set_display_state(&mut self, state: State) {
        self.display_override = Some(state);
    }

    pub fn display_state(&self) -> State {
        self.display_override.unwrap_or(self.state)
    }

    // ── Commands ──────────────────────────────────────────────

    /// Execute a UI command against the active profile.
    pub fn handle(&mut self, cmd: UiCommand, now_ms: u64, out: &mut dyn OutputDriver) -> Outcome {
        if self.state == State::Fault && !matches!(cmd, UiCommand::Stop | UiCommand::Unlock) {
            debug!("{cmd:?} ignored while in Fault");
            return Outcome::Ignored;
        }

        let resolved = if cmd == UiCommand::SmartToggle {
            match self.resolve_toggle() {
                Some(c) => c,
                None => return Outcome::Ignored,
            }
        } else {
            cmd
        };

        // Single-button profiles route every toggle step to the toggle output.
        let action = self.profile.action(resolved).or_else(|| {
            (cmd == UiCommand::SmartToggle)
                .then(|| self.profile.action(UiCommand::SmartToggle))
                .flatten()
        });
        let Some(action) = action else {
            debug!("{resolved:?} not supported by '{}'", self.profile.display_name);
            return Outcome::NotApplicable;
        };

        match self.execute(action, resolved == UiCommand::Stop, now_ms, out) {
            DriveResult::Sent => {}
            DriveResult::NotConfigured => {
                debug!(
                    "{resolved:?} targets unconfigured output {}",
                    action.target_output
                );
                return Outcome::NotApplicable;
            }
            DriveResult::Dropped => return Outcome::Dropped,
        }

        if self.state != State::Fault {
            self.apply(resolved, now_ms);
        }
        Outcome::Executed
    }

    /// Next step of the open → stop → close cycle.
    fn resolve_toggle(&self) -> Option<UiCommand> {
        Some(match self.state {
            State::Open => UiCommand::CloseFully,
            State::Closed | State::Undefined => UiCommand::OpenFully,
            State::Opening | State::Closing => UiCommand::Stop,
            State::PartiallyOpen => match self.last_direction {
                Some(Direction::Opening) => UiCommand::CloseFully,
                Some(Direction::Closing) | None => UiCommand::OpenFully,
            },
            State::Fault => return None,
        })
    }

    fn execute(
        &mut self,
        action: PhysicalAction,
        is_stop: bool,
        now_ms: u64,
        out: &mut dyn OutputDriver,
    ) -> DriveResult {
        let target = action.target_output;
        let release_held = self
            .held_output
            .is_some_and(|held| held != target || is_stop);
        let release_pulse = self
            .pulse_release
            .is_some_and(|(pending, _)| pending != target);
        let frames = 1 + usize::from(release_held) + usize::from(release_pulse);
        // Nothing moves unless the whole sequence fits.
        let ready = out.can_drive(target, frames);
        if ready != DriveResult::Sent {
            return ready;
        }

        if let Some(held) = self.held_output {
            if held != target || is_stop {
                out.drive(held, false);
                self.held_output = None;
            }
        }
        if let Some((pending, _)) = self.pulse_release {
            if pending != target {
                out.drive(pending, false);
                self.pulse_release = None;
            }
        }

        let result = out.drive(target, true);
        if result != DriveResult::Sent {
            return result;
        }
        if action.is_pulsed {
            self.pulse_release = Some((target, now_ms + u64::from(self.timings.pulse_ms)));
        } else {
            self.held_output = Some(target);
        }
        result
    }

    fn apply(&mut self, cmd: UiCommand, now_ms: u64) {
        match cmd {
            UiCommand::OpenFully => {
                self.start_move(Direction::Opening);
                self.arm(TimerKind::Cycle, self.timings.cycle_ms, now_ms);
            }
            UiCommand::CloseFully => {
                self.start_move(Direction::Closing);
                self.arm(TimerKind::Cycle, self.timings.cycle_ms, now_ms);
            }
            UiCommand::Pedestrian => {
                self.start_move(Direction::Opening);
                self.arm(TimerKind::Pedestrian, self.timings.pedestrian_ms, now_ms);
            }
            UiCommand::Stop => {
                self.timer = None;
                if self.state.is_moving() {
                    self.transition(State::PartiallyOpen);
                }
            }
            UiCommand::Unlock | UiCommand::SmartToggle => {}
        }
    }

    fn start_move(&mut self, dir: Direction) {
        self.last_direction = Some(dir);
        let (moving, limit, reached) = match dir {
            Direction::Opening => (State::Opening, INPUT_OPEN_LIMIT, State::Open),
            Direction::Closing => (State::Closing, INPUT_CLOSED_LIMIT, State::Closed),
        };
        if self.input(limit) {
            // Already at the requested end stop.
            self.transition(reached);
        } else {
            self.transition(moving);
        }
    }

    fn arm(&mut self, kind: TimerKind, duration_ms: u32, now_ms: u64) {
        self.timer = (duration_ms > 0 && self.state.is_moving())
            .then(|| (kind, now_ms + u64::from(duration_ms)));
    }

    fn transition(&mut self, next: State) {
        self.display_override = None;
        if next != self.state {
            debug!("udsm {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    fn raise_fault(&mut self, cause: FaultCause, out: &mut dyn OutputDriver) {
        warn!(
            "'{}' fault: {cause:?} (was {:?})",
            self.profile.display_name, self.state
        );
        if let Some(held) = self.held_output.take() {
            out.drive(held, false);
        }
        self.timer = None;
        self.fault = Some(cause);
        self.transition(State::Fault);
    }

    /// Clear a fault.  The machine returns to `Undefined`; nothing is
    /// re-issued.  Returns `false` if there was no fault.
    pub fn acknowledge_fault(&mut self) -> bool {
        if self.state != State::Fault {
            return false;
        }
        info!("'{}' fault acknowledged", self.profile.display_name);
        self.fault = None;
        self.timer = None;
        self.transition(State::Undefined);
        true
    }

    // ── Feedback ──────────────────────────────────────────────

    /// Apply a feedback input level.  Feedback is authoritative except that
    /// it never clears a fault.
    pub fn on_input(&mut self, index: u8, level: bool, out: &mut dyn OutputDriver) {
        let Some(slot) = self.inputs.get_mut(index as usize) else {
            return;
        };
        *slot = level;
        if self.state == State::Fault {
            return;
        }

        if index == INPUT_OBSTRUCTION {
            if level && self.state.is_moving() {
                self.raise_fault(FaultCause::Obstruction, out);
            }
            return;
        }

        let open = self.inputs[INPUT_OPEN_LIMIT as usize];
        let closed = self.inputs[INPUT_CLOSED_LIMIT as usize];
        match (open, closed) {
            (true, true) => self.raise_fault(FaultCause::ContradictoryFeedback, out),
            (true, false) => {
                if matches!(self.timer, Some((TimerKind::Cycle, _))) {
                    self.timer = None;
                }
                self.release_held(out);
                self.transition(State::Open);
            }
            (false, true) => {
                self.timer = None;
                self.release_held(out);
                self.transition(State::Closed);
            }
            (false, false) => {
                // A limit let go without a commanded move.
                if matches!(self.state, State::Open | State::Closed) {
                    self.transition(State::PartiallyOpen);
                }
            }
        }
    }

    fn release_held(&mut self, out: &mut dyn OutputDriver) {
        if let Some(held) = self.held_output.take() {
            out.drive(held, false);
        }
    }

    // ── Time ──────────────────────────────────────────────────

    /// Expire pulse and device timers.
    pub fn tick(&mut self, now_ms: u64, out: &mut dyn OutputDriver) {
        if let Some((output, deadline)) = self.pulse_release {
            if now_ms >= deadline {
                self.pulse_release = None;
                out.drive(output, false);
            }
        }

        let Some((kind, deadline)) = self.timer else {
            return;
        };
        if now_ms < deadline {
            return;
        }
        self.timer = None;
        match kind {
            TimerKind::Cycle => {
                if self.state.is_moving() {
                    self.raise_fault(FaultCause::CycleTimeout, out);
                }
            }
            TimerKind::Pedestrian => {
                debug!("pedestrian timeout, closing");
                self.handle(UiCommand::CloseFully, now_ms, out);
            }
        }
    }

    /// Swap profile and timings.  Runtime state restarts from `Undefined`.
    pub fn reconfigure(
        &mut self,
        profile: &'static BehaviorProfile,
        timings: Timings,
        out: &mut dyn OutputDriver,
    ) {
        self.release_held(out);
        if let Some((output, _)) = self.pulse_release.take() {
            out.drive(output, false);
        }
        *self = Self {
            inputs: self.inputs,
            ..Self::new(profile, timings)
        };
    }
}

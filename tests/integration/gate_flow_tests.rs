//! End-to-end gate behavior: UI commands in, frames out, feedback frames
//! back through the mailbox.

use crate::mock_hw::{CollectSink, ManualClock, MockEeprom, MockLink};

use domotouch::app::commands::AppCommand;
use domotouch::app::events::AppEvent;
use domotouch::app::ports::ClockPort;
use domotouch::app::service::Controller;
use domotouch::bus::address::{Address, AddressingMode};
use domotouch::bus::frame::{BusEvent, EventKind, encode_event};
use domotouch::bus::mailbox::RxMailbox;
use domotouch::devices::gate::GateConfig;
use domotouch::udsm::profile::{PROFILE_OPEN_CLOSE_IMPULSE, PROFILE_STEP_BY_STEP, UiCommand};
use domotouch::udsm::{FaultCause, Outcome, State, TimerKind};

const OPEN_LIMIT: Address = Address::Absolute(21);
const CLOSED_LIMIT: Address = Address::Absolute(22);

struct Rig<'m> {
    ctrl: Controller<'m, MockEeprom>,
    mailbox: &'m RxMailbox,
    link: MockLink,
    clock: ManualClock,
    sink: CollectSink,
}

impl<'m> Rig<'m> {
    fn new(mailbox: &'m RxMailbox, profile_id: u8) -> Self {
        let mut sink = CollectSink::new();
        let mut ctrl = Controller::boot(MockEeprom::blank(), mailbox, &mut sink);
        let config = GateConfig {
            profile_id,
            outputs: [
                Some(Address::Absolute(11)),
                Some(Address::Absolute(12)),
                Some(Address::Absolute(13)),
                Some(Address::Absolute(14)),
            ],
            inputs: [Some(OPEN_LIMIT), Some(CLOSED_LIMIT), None],
            cycle_timeout_s: 5,
            pedestrian_timeout_s: 2,
            pulse_ms: 300,
            ..GateConfig::default()
        };
        ctrl.handle_command(AppCommand::ConfigureGate { index: 0, config }, 0, &mut sink)
            .unwrap();
        sink.clear();
        Self {
            ctrl,
            mailbox,
            link: MockLink::new(),
            clock: ManualClock::new(),
            sink,
        }
    }

    fn command(&mut self, command: UiCommand) -> Outcome {
        self.ctrl
            .handle_command(
                AppCommand::Gate { index: 0, command },
                self.clock.now_ms(),
                &mut self.sink,
            )
            .unwrap()
    }

    fn feedback(&mut self, source: Address, level: bool) {
        let event = BusEvent {
            source,
            kind: EventKind::DigitalInputChanged { level },
        };
        let frame = encode_event(&event, AddressingMode::Absolute).unwrap();
        assert!(self.mailbox.post(frame));
    }

    fn run_until(&mut self, t_ms: u64) {
        while self.clock.now_ms() < t_ms {
            let now = self.clock.advance(100);
            self.ctrl.tick(now, &mut self.link, &mut self.sink);
        }
    }

    fn state(&self) -> State {
        self.ctrl.gate(0).unwrap().state()
    }
}

#[test]
fn missing_feedback_times_out_into_fault() {
    let mailbox = RxMailbox::new();
    let mut rig = Rig::new(&mailbox, PROFILE_OPEN_CLOSE_IMPULSE);

    assert_eq!(rig.command(UiCommand::OpenFully), Outcome::Executed);
    assert_eq!(rig.state(), State::Opening);

    rig.run_until(4_900);
    assert_eq!(rig.state(), State::Opening);
    rig.run_until(6_000);
    assert_eq!(rig.state(), State::Fault);
    assert!(rig.sink.contains(&AppEvent::FaultRaised {
        gate: 0,
        cause: FaultCause::CycleTimeout,
    }));

    // Motion commands are refused until acknowledged.
    assert_eq!(rig.command(UiCommand::OpenFully), Outcome::Ignored);
    rig.feedback(OPEN_LIMIT, true);
    rig.run_until(6_100);
    assert_eq!(rig.state(), State::Fault, "feedback never clears a fault");

    rig.ctrl
        .handle_command(AppCommand::AcknowledgeFault { index: 0 }, 6_100, &mut rig.sink)
        .unwrap();
    assert_eq!(rig.state(), State::Undefined);
    assert!(rig.sink.contains(&AppEvent::FaultAcknowledged { gate: 0 }));
}

#[test]
fn feedback_before_timeout_clears_cycle_timer() {
    let mailbox = RxMailbox::new();
    let mut rig = Rig::new(&mailbox, PROFILE_OPEN_CLOSE_IMPULSE);

    rig.command(UiCommand::OpenFully);
    assert!(matches!(
        rig.ctrl.gate(0).unwrap().udsm().armed_timer(),
        Some((TimerKind::Cycle, 5_000))
    ));

    rig.run_until(4_000);
    rig.feedback(OPEN_LIMIT, true);
    rig.run_until(4_100);
    assert_eq!(rig.state(), State::Open);
    assert!(rig.ctrl.gate(0).unwrap().udsm().armed_timer().is_none());

    rig.run_until(10_000);
    assert_eq!(rig.state(), State::Open);
    assert!(rig.sink.contains(&AppEvent::StateChanged {
        gate: 0,
        from: State::Opening,
        to: State::Open,
    }));
}

#[test]
fn open_pulse_is_sent_then_released() {
    let mailbox = RxMailbox::new();
    let mut rig = Rig::new(&mailbox, PROFILE_OPEN_CLOSE_IMPULSE);

    rig.command(UiCommand::OpenFully);
    rig.run_until(1_000);
    // Binary frames: output 1 asserted, then released after the pulse.
    let bodies: Vec<Vec<u8>> = rig
        .link
        .sent
        .iter()
        .map(|f| f[3..f.len() - 2].to_vec())
        .collect();
    assert_eq!(bodies, vec![vec![11, 0, 1], vec![11, 0, 0]]);
}

#[test]
fn smart_toggle_walks_open_stop_close() {
    let mailbox = RxMailbox::new();
    let mut rig = Rig::new(&mailbox, PROFILE_STEP_BY_STEP);

    rig.feedback(CLOSED_LIMIT, true);
    rig.run_until(100);
    assert_eq!(rig.state(), State::Closed);

    assert_eq!(rig.command(UiCommand::SmartToggle), Outcome::Executed);
    // Leaving the closed limit is reported by the endpoint.
    rig.feedback(CLOSED_LIMIT, false);
    rig.run_until(200);
    assert_eq!(rig.state(), State::Opening);

    assert_eq!(rig.command(UiCommand::SmartToggle), Outcome::Executed);
    assert_eq!(rig.state(), State::PartiallyOpen);

    assert_eq!(rig.command(UiCommand::SmartToggle), Outcome::Executed);
    assert_eq!(rig.state(), State::Closing);
}

#[test]
fn contradictory_limits_fault() {
    let mailbox = RxMailbox::new();
    let mut rig = Rig::new(&mailbox, PROFILE_OPEN_CLOSE_IMPULSE);

    rig.feedback(OPEN_LIMIT, true);
    rig.feedback(CLOSED_LIMIT, true);
    rig.run_until(100);
    assert_eq!(rig.state(), State::Fault);
    assert_eq!(
        rig.ctrl.gate(0).unwrap().fault_cause(),
        Some(FaultCause::ContradictoryFeedback)
    );
}

#[test]
fn pedestrian_opening_closes_after_timeout() {
    let mailbox = RxMailbox::new();
    let mut rig = Rig::new(&mailbox, PROFILE_OPEN_CLOSE_IMPULSE);

    assert_eq!(rig.command(UiCommand::Pedestrian), Outcome::Executed);
    assert_eq!(rig.state(), State::Opening);
    rig.run_until(2_100);
    assert_eq!(rig.state(), State::Closing);
}

#[test]
fn display_override_cleared_by_feedback() {
    let mailbox = RxMailbox::new();
    let mut rig = Rig::new(&mailbox, PROFILE_OPEN_CLOSE_IMPULSE);

    rig.ctrl
        .handle_command(
            AppCommand::SetDisplayState {
                index: 0,
                state: State::Opening,
            },
            0,
            &mut rig.sink,
        )
        .unwrap();
    let gate = rig.ctrl.gate(0).unwrap();
    assert_eq!(gate.display_state(), State::Opening);
    assert_eq!(gate.state(), State::Undefined);

    rig.feedback(OPEN_LIMIT, true);
    rig.run_until(100);
    assert_eq!(rig.ctrl.gate(0).unwrap().display_state(), State::Open);
}

#[test]
fn corrupt_frames_are_counted_and_ignored() {
    let mailbox = RxMailbox::new();
    let mut rig = Rig::new(&mailbox, PROFILE_OPEN_CLOSE_IMPULSE);

    let event = BusEvent {
        source: OPEN_LIMIT,
        kind: EventKind::DigitalInputChanged { level: true },
    };
    let mut frame = encode_event(&event, AddressingMode::Absolute).unwrap();
    let last = frame.len() - 1;
    frame[last] ^= 0x55;
    assert!(mailbox.post(frame));
    rig.run_until(100);

    assert_eq!(rig.state(), State::Undefined);
    assert_eq!(rig.ctrl.bus_stats().decode_errors, 1);
}

//! Integration tests for the Controller: boot, persistence, bus servicing.
//!
//! These run on the host and drive the full pipeline from an `AppCommand`
//! down to frames on a mock link and bytes in a mock EEPROM.

use crate::mock_hw::{CollectSink, MockEeprom, MockLink};

use domotouch::app::commands::AppCommand;
use domotouch::app::events::AppEvent;
use domotouch::app::service::Controller;
use domotouch::bus::address::{Address, AddressingMode};
use domotouch::bus::command::CommandCategory;
use domotouch::bus::mailbox::RxMailbox;
use domotouch::config::SystemConfig;
use domotouch::devices::gate::GateConfig;
use domotouch::devices::light::{LightAction, LightConfig};
use domotouch::error::{Error, StorageError};
use domotouch::storage::record::LoadStatus;
use domotouch::storage::schema::{BootLayout, SlotId};
use domotouch::udsm::Outcome;

fn boot<'m>(
    eeprom: MockEeprom,
    mailbox: &'m RxMailbox,
    sink: &mut CollectSink,
) -> Controller<'m, MockEeprom> {
    Controller::boot(eeprom, mailbox, sink)
}

fn with_lights(ctrl: &mut Controller<'_, MockEeprom>, count: u8, sink: &mut CollectSink) {
    let config = SystemConfig {
        light_count: count,
        ..ctrl.config().clone()
    };
    ctrl.handle_command(AppCommand::ConfigureSystem(config), 0, sink)
        .unwrap();
}

fn switched_light(address: u16) -> LightConfig {
    LightConfig {
        output: Some(Address::Absolute(address)),
        ..Default::default()
    }
}

// ── Boot ──────────────────────────────────────────────────────

#[test]
fn blank_storage_formats_and_starts() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);

    assert_eq!(ctrl.layout(), BootLayout::Formatted { found: None });
    assert_eq!(ctrl.config(), &SystemConfig::default());
    assert_eq!(ctrl.gates().len(), 1);
    assert!(sink.contains(&AppEvent::Started {
        layout: BootLayout::Formatted { found: None },
        gates: 1,
        lights: 0,
    }));
}

#[test]
fn saved_configuration_survives_reboot() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);

    let system = SystemConfig {
        addressing: AddressingMode::ModuleChannel,
        gate_count: 2,
        light_count: 1,
        ..SystemConfig::default()
    };
    ctrl.handle_command(AppCommand::ConfigureSystem(system.clone()), 0, &mut sink)
        .unwrap();
    let mut gate = GateConfig::default();
    gate.set_label("Garage").unwrap();
    gate.outputs[0] = Some(Address::ModuleChannel {
        module: 7,
        channel: 1,
    });
    ctrl.handle_command(
        AppCommand::ConfigureGate {
            index: 1,
            config: gate.clone(),
        },
        0,
        &mut sink,
    )
    .unwrap();
    ctrl.handle_command(AppCommand::SaveAll, 0, &mut sink).unwrap();

    let eeprom = ctrl.into_storage();
    let mut sink = CollectSink::new();
    let ctrl = boot(eeprom, &mailbox, &mut sink);

    assert_eq!(ctrl.layout(), BootLayout::Current);
    assert_eq!(ctrl.config(), &system);
    assert_eq!(ctrl.gates().len(), 2);
    assert_eq!(ctrl.lights().len(), 1);
    assert_eq!(ctrl.gate(1).unwrap().config(), &gate);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::RecordRecovered { .. })),
        0
    );
}

#[test]
fn corrupt_record_is_recovered_then_clean() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);
    let mut gate = GateConfig::default();
    gate.set_label("Front").unwrap();
    ctrl.handle_command(AppCommand::ConfigureGate { index: 0, config: gate }, 0, &mut sink)
        .unwrap();
    ctrl.handle_command(AppCommand::SaveGate { index: 0 }, 0, &mut sink)
        .unwrap();

    let mut eeprom = ctrl.into_storage();
    let slot = usize::from(SlotId::Gate(0).address().unwrap());
    eeprom.corrupt(slot + 4);

    let mut sink = CollectSink::new();
    let ctrl = boot(eeprom, &mailbox, &mut sink);
    assert!(sink.contains(&AppEvent::RecordRecovered {
        slot: SlotId::Gate(0),
        status: LoadStatus::Recovered,
    }));
    assert_eq!(ctrl.gate(0).unwrap().config(), &GateConfig::default());

    // Defaults were written back, so the next boot is quiet.
    let eeprom = ctrl.into_storage();
    let mut sink = CollectSink::new();
    boot(eeprom, &mailbox, &mut sink);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::RecordRecovered { .. })),
        0
    );
}

#[test]
fn save_failure_is_reported_not_retried() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);
    ctrl.storage_mut().eeprom_mut().fail_writes = Some(StorageError::Timeout);
    let writes_before = ctrl.storage().eeprom().writes.len();

    let result = ctrl.handle_command(AppCommand::SaveSystem, 0, &mut sink);
    assert_eq!(result, Err(Error::Storage(StorageError::Timeout)));
    assert!(sink.contains(&AppEvent::SaveFailed {
        slot: SlotId::System,
        error: StorageError::Timeout,
    }));
    assert_eq!(ctrl.storage().eeprom().writes.len(), writes_before);
}

// ── Bus servicing ─────────────────────────────────────────────

#[test]
fn one_frame_per_tick_in_category_order() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut link = MockLink::new();
    let mut ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);
    with_lights(&mut ctrl, 2, &mut sink);
    ctrl.handle_command(
        AppCommand::ConfigureLight {
            index: 0,
            config: LightConfig {
                dimmable: true,
                ..switched_light(40)
            },
        },
        0,
        &mut sink,
    )
    .unwrap();
    ctrl.handle_command(
        AppCommand::ConfigureLight {
            index: 1,
            config: switched_light(41),
        },
        0,
        &mut sink,
    )
    .unwrap();

    // Dimmer queued first, binary second.
    for index in [0, 1] {
        let outcome = ctrl
            .handle_command(
                AppCommand::Light {
                    index,
                    action: LightAction::On,
                },
                0,
                &mut sink,
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Executed);
    }

    link.busy = true;
    ctrl.tick(10, &mut link, &mut sink);
    assert!(link.sent.is_empty(), "busy link must not be driven");

    link.busy = false;
    ctrl.tick(20, &mut link, &mut sink);
    assert_eq!(link.categories(), vec![CommandCategory::Binary as u8]);
    ctrl.tick(30, &mut link, &mut sink);
    assert_eq!(
        link.categories(),
        vec![CommandCategory::Binary as u8, CommandCategory::Dimmer as u8]
    );
    assert_eq!(ctrl.bus().pending(), 0);
    assert_eq!(ctrl.bus_stats().sent, 2);
}

#[test]
fn full_queue_drops_and_reports() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut link = MockLink {
        busy: true,
        ..MockLink::default()
    };
    let mut ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);
    with_lights(&mut ctrl, 1, &mut sink);
    ctrl.handle_command(
        AppCommand::ConfigureLight {
            index: 0,
            config: switched_light(50),
        },
        0,
        &mut sink,
    )
    .unwrap();

    let capacity = ctrl.bus().queue(CommandCategory::Binary).capacity();
    let mut dropped = 0;
    for _ in 0..capacity + 3 {
        let outcome = ctrl
            .handle_command(
                AppCommand::Light {
                    index: 0,
                    action: LightAction::Level(80),
                },
                0,
                &mut sink,
            )
            .unwrap();
        if outcome == Outcome::Dropped {
            dropped += 1;
        }
    }
    assert_eq!(dropped, 3);
    assert_eq!(ctrl.bus().queue(CommandCategory::Binary).len(), capacity);

    ctrl.tick(10, &mut link, &mut sink);
    assert!(sink.contains(&AppEvent::CommandDropped {
        category: CommandCategory::Binary,
        count: 3,
    }));

    // Reported once only.
    ctrl.tick(20, &mut link, &mut sink);
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::CommandDropped { .. })),
        1
    );
}

#[test]
fn refused_frame_is_dropped_not_requeued() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut link = MockLink {
        refuse: true,
        ..MockLink::default()
    };
    let mut ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);
    with_lights(&mut ctrl, 1, &mut sink);
    ctrl.handle_command(
        AppCommand::ConfigureLight {
            index: 0,
            config: switched_light(60),
        },
        0,
        &mut sink,
    )
    .unwrap();
    ctrl.handle_command(
        AppCommand::Light {
            index: 0,
            action: LightAction::On,
        },
        0,
        &mut sink,
    )
    .unwrap();

    ctrl.tick(10, &mut link, &mut sink);
    assert_eq!(ctrl.bus().pending(), 0);
    assert_eq!(ctrl.bus_stats().link_errors, 1);
    assert_eq!(ctrl.bus_stats().sent, 0);
}

// ── Addressing ────────────────────────────────────────────────

#[test]
fn protocol_switch_marks_addresses_stale_across_reboot() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);
    let mut gate = GateConfig::default();
    gate.outputs[0] = Some(Address::Absolute(300));
    ctrl.handle_command(AppCommand::ConfigureGate { index: 0, config: gate }, 0, &mut sink)
        .unwrap();
    ctrl.handle_command(AppCommand::SaveGate { index: 0 }, 0, &mut sink)
        .unwrap();

    ctrl.handle_command(
        AppCommand::SetAddressing(AddressingMode::ModuleChannel),
        0,
        &mut sink,
    )
    .unwrap();
    assert!(sink.contains(&AppEvent::AddressingChanged {
        from: AddressingMode::Absolute,
        to: AddressingMode::ModuleChannel,
    }));

    let eeprom = ctrl.into_storage();
    let mut sink = CollectSink::new();
    let ctrl = boot(eeprom, &mailbox, &mut sink);
    assert_eq!(ctrl.config().addressing, AddressingMode::ModuleChannel);
    assert!(sink.contains(&AppEvent::StaleAddress {
        slot: SlotId::Gate(0),
        address: Address::Absolute(300),
    }));
    // The address is kept as stored, not translated.
    assert_eq!(
        ctrl.gate(0).unwrap().config().outputs[0],
        Some(Address::Absolute(300))
    );
}

#[test]
fn removed_devices_are_no_longer_addressable() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut ctrl = boot(MockEeprom::blank(), &mailbox, &mut sink);
    with_lights(&mut ctrl, 2, &mut sink);
    assert_eq!(ctrl.lights().len(), 2);
    with_lights(&mut ctrl, 1, &mut sink);
    assert_eq!(ctrl.lights().len(), 1);
    let result = ctrl.handle_command(
        AppCommand::Light {
            index: 1,
            action: LightAction::On,
        },
        0,
        &mut sink,
    );
    assert!(result.is_err());
}

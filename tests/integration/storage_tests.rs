//! Persistence through the Controller: schema migration, small pages and
//! unwritable storage.

use crate::mock_hw::{CollectSink, MockEeprom};

use domotouch::app::commands::AppCommand;
use domotouch::app::events::AppEvent;
use domotouch::app::service::Controller;
use domotouch::bus::address::{Address, AddressingMode};
use domotouch::bus::mailbox::RxMailbox;
use domotouch::config::SystemConfig;
use domotouch::devices::gate::GateConfig;
use domotouch::devices::light::LightConfig;
use domotouch::error::StorageError;
use domotouch::storage::Storage;
use domotouch::storage::record::LoadStatus;
use domotouch::storage::schema::{BootLayout, LEGACY_SCHEMA_VERSION, SlotId};

#[test]
fn legacy_image_is_migrated_at_boot() {
    let system = SystemConfig {
        addressing: AddressingMode::ModuleChannel,
        gate_count: 1,
        light_count: 1,
        ..SystemConfig::default()
    };
    let mut gate = GateConfig::default();
    gate.set_label("Driveway").unwrap();
    gate.outputs[0] = Some(Address::ModuleChannel {
        module: 3,
        channel: 0,
    });
    let mut light = LightConfig {
        dimmable: true,
        default_level: 70,
        ..LightConfig::default()
    };
    light.set_label("Porch").unwrap();

    let mut storage = Storage::new(MockEeprom::blank());
    storage
        .save(SlotId::System.legacy_address().unwrap(), &system)
        .unwrap();
    storage
        .save(SlotId::Gate(0).legacy_address().unwrap(), &gate)
        .unwrap();
    storage
        .save(SlotId::Light(0).legacy_address().unwrap(), &light)
        .unwrap();

    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let ctrl = Controller::boot(storage.into_inner(), &mailbox, &mut sink);

    assert_eq!(
        ctrl.layout(),
        BootLayout::Migrated {
            from: LEGACY_SCHEMA_VERSION
        }
    );
    assert_eq!(ctrl.config(), &system);
    assert_eq!(ctrl.gate(0).unwrap().config(), &gate);
    assert_eq!(ctrl.light(0).unwrap().config(), &light);

    // Second boot sees the current schema.
    let eeprom = ctrl.into_storage();
    let mut sink = CollectSink::new();
    let ctrl = Controller::boot(eeprom, &mailbox, &mut sink);
    assert_eq!(ctrl.layout(), BootLayout::Current);
}

#[test]
fn records_span_small_pages() {
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut ctrl = Controller::boot(MockEeprom::new(1024, 8), &mailbox, &mut sink);
    let mut gate = GateConfig::default();
    gate.set_label("Sixteen chars ok").unwrap();
    ctrl.handle_command(
        AppCommand::ConfigureGate {
            index: 0,
            config: gate.clone(),
        },
        0,
        &mut sink,
    )
    .unwrap();
    ctrl.handle_command(AppCommand::SaveGate { index: 0 }, 0, &mut sink)
        .unwrap();

    let eeprom = ctrl.into_storage();
    assert!(eeprom.writes.iter().all(|(_, len)| *len <= 8));
    let mut sink = CollectSink::new();
    let ctrl = Controller::boot(eeprom, &mailbox, &mut sink);
    assert_eq!(ctrl.gate(0).unwrap().config(), &gate);
}

#[test]
fn unwritable_storage_still_boots_with_defaults() {
    let mut eeprom = MockEeprom::blank();
    eeprom.fail_writes = Some(StorageError::Io);

    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let ctrl = Controller::boot(eeprom, &mailbox, &mut sink);

    assert_eq!(ctrl.config(), &SystemConfig::default());
    assert_eq!(ctrl.gates().len(), 1);
    assert!(sink.contains(&AppEvent::RecordRecovered {
        slot: SlotId::System,
        status: LoadStatus::Defaulted,
    }));
}

#[test]
fn read_failure_at_boot_keeps_stored_configuration() {
    let system = SystemConfig {
        addressing: AddressingMode::ModuleChannel,
        gate_count: 3,
        ..SystemConfig::default()
    };
    let mailbox = RxMailbox::new();
    let mut sink = CollectSink::new();
    let mut ctrl = Controller::boot(MockEeprom::blank(), &mailbox, &mut sink);
    ctrl.handle_command(AppCommand::ConfigureSystem(system.clone()), 0, &mut sink)
        .unwrap();

    let mut eeprom = ctrl.into_storage();
    let writes_before = eeprom.writes.len();
    eeprom.fail_reads = Some(StorageError::Io);
    let mut sink = CollectSink::new();
    let ctrl = Controller::boot(eeprom, &mailbox, &mut sink);

    assert_eq!(ctrl.layout(), BootLayout::Unreadable);
    assert_eq!(ctrl.config(), &SystemConfig::default());
    assert!(sink.contains(&AppEvent::RecordRecovered {
        slot: SlotId::System,
        status: LoadStatus::Unreadable,
    }));

    let mut eeprom = ctrl.into_storage();
    assert_eq!(eeprom.writes.len(), writes_before, "nothing written back");
    eeprom.fail_reads = None;
    let mut sink = CollectSink::new();
    let ctrl = Controller::boot(eeprom, &mailbox, &mut sink);
    assert_eq!(ctrl.layout(), BootLayout::Current);
    assert_eq!(ctrl.config(), &system);
    assert_eq!(ctrl.gates().len(), 3);
}

#[test]
fn oversized_label_is_rejected() {
    let mut gate = GateConfig::default();
    assert!(gate.set_label("this label is far too long").is_err());
    assert!(gate.label.is_empty());
}

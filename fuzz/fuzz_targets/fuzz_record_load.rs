//! Fuzz target: record load + schema boot
//!
//! Treats the input as a raw EEPROM image and boots the storage schema on
//! it, then loads every slot.  Asserts that nothing panics and that every
//! record is valid afterwards (defaults were written back where needed).
//!
//! cargo fuzz run fuzz_record_load

#![no_main]

use domotouch::adapters::eeprom::NvsEeprom;
use domotouch::config::SystemConfig;
use domotouch::devices::gate::GateConfig;
use domotouch::devices::light::LightConfig;
use domotouch::storage::Storage;
use domotouch::storage::record::LoadStatus;
use domotouch::storage::schema::{self, MAX_GATES, MAX_LIGHTS, SlotId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut eeprom = NvsEeprom::with_geometry(1024, 16);
    eeprom.poke(0, data);
    let mut storage = Storage::new(eeprom);

    schema::prepare(&mut storage);

    let mut system = SystemConfig::default();
    storage.load_slot(SlotId::System, &mut system);
    for i in 0..MAX_GATES as u8 {
        let mut gate = GateConfig::default();
        storage.load_slot(SlotId::Gate(i), &mut gate);
    }
    for i in 0..MAX_LIGHTS as u8 {
        let mut light = LightConfig::default();
        storage.load_slot(SlotId::Light(i), &mut light);
    }

    // Everything heals in one pass.
    let mut system = SystemConfig::default();
    assert_eq!(storage.load_slot(SlotId::System, &mut system), LoadStatus::Valid);
    for i in 0..MAX_GATES as u8 {
        let mut gate = GateConfig::default();
        assert_eq!(storage.load_slot(SlotId::Gate(i), &mut gate), LoadStatus::Valid);
    }
});

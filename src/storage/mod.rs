//! Persistence: record codec, versioned slot schema, page-aware block I/O.
//!
//! ```text
//!   Device module ──▶ Storage::load_slot / save_slot
//!                          │
//!                          ├─ schema  (SlotId → fixed address)
//!                          ├─ record  (magic | payload | crc)
//!                          └─ EepromPort (page-bounded read/write)
//! ```
//!
//! Loads never fail from the caller's point of view: a missing or corrupt
//! record is replaced by factory defaults and immediately re-saved.  A failed
//! read also yields defaults but writes nothing back.  Saves
//! are synchronous and report the storage error; retry policy belongs to
//! the caller.

pub mod crc;
pub mod record;
pub mod schema;

use log::{debug, warn};

use crate::app::ports::EepromPort;
use crate::error::StorageError;
use record::{
    LoadStatus, MAX_RECORD_BYTES, RecordFault, RecordPayload, decode_record, encode_record,
    record_len,
};
use schema::SlotId;

/// Record-level access to a byte-addressable non-volatile store.
pub struct Storage<E: EepromPort> {
    eeprom: E,
}

impl<E: EepromPort> Storage<E> {
    pub fn new(eeprom: E) -> Self {
        Self { eeprom }
    }

    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    pub fn eeprom_mut(&mut self) -> &mut E {
        &mut self.eeprom
    }

    pub fn into_inner(self) -> E {
        self.eeprom
    }

    // ── Block I/O ─────────────────────────────────────────────

    /// Read `buf.len()` bytes starting at `address`.
    pub fn read_block(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check_bounds(address, buf.len())?;
        self.eeprom.read(address, buf)
    }

    /// Write `data` as one logical block, split on page boundaries so that no
    /// single device write wraps inside a page.
    pub fn write_block(&mut self, address: u16, data: &[u8]) -> Result<(), StorageError> {
        self.check_bounds(address, data.len())?;
        let page = self.eeprom.page_size().max(1);
        let mut addr = address as usize;
        let mut rest = data;
        while !rest.is_empty() {
            let room = page - addr % page;
            let n = room.min(rest.len());
            self.eeprom.write(addr as u16, &rest[..n])?;
            addr += n;
            rest = &rest[n..];
        }
        Ok(())
    }

    fn check_bounds(&self, address: u16, len: usize) -> Result<(), StorageError> {
        let end = address as usize + len;
        if end > self.eeprom.capacity() {
            return Err(StorageError::OutOfBounds);
        }
        Ok(())
    }

    // ── Records ───────────────────────────────────────────────

    /// Read and validate a record without any self-healing.
    pub fn peek<T: RecordPayload>(&mut self, address: u16) -> Result<T, RecordFault> {
        let len = record_len::<T>();
        let mut buf = [0u8; MAX_RECORD_BYTES];
        let bytes = buf.get_mut(..len).ok_or(RecordFault::Truncated)?;
        self.read_block(address, bytes).map_err(|e| {
            warn!("record @0x{address:04x} read failed: {e}");
            RecordFault::ReadFailed
        })?;
        decode_record(bytes)
    }

    /// Load the record at `address` into `out`.
    ///
    /// On any mismatch `out` becomes `T::default()` and the default is written
    /// back so storage heals before the next boot.  A read failure leaves
    /// storage untouched.
    pub fn load<T: RecordPayload>(&mut self, address: u16, out: &mut T) -> LoadStatus {
        let status = match self.peek::<T>(address) {
            Ok(value) => {
                *out = value;
                return LoadStatus::Valid;
            }
            Err(RecordFault::ReadFailed) => {
                *out = T::default();
                return LoadStatus::Unreadable;
            }
            Err(fault) => {
                warn!("record @0x{address:04x} rejected ({fault:?}), restoring defaults");
                fault.status()
            }
        };

        *out = T::default();
        if let Err(e) = self.save(address, out) {
            warn!("record @0x{address:04x} self-heal write failed: {e}");
        }
        status
    }

    /// Stamp magic + CRC and write the record as one contiguous block.
    pub fn save<T: RecordPayload>(&mut self, address: u16, value: &T) -> Result<(), StorageError> {
        let mut buf = [0u8; MAX_RECORD_BYTES];
        let n = encode_record(value, &mut buf).ok_or(StorageError::OutOfBounds)?;
        self.write_block(address, &buf[..n])?;
        debug!("record @0x{address:04x} saved ({n} bytes)");
        Ok(())
    }

    /// [`load`](Self::load) at the fixed address of `slot`.
    pub fn load_slot<T: RecordPayload>(&mut self, slot: SlotId, out: &mut T) -> LoadStatus {
        match slot.address() {
            Some(address) => self.load(address, out),
            None => {
                warn!("{slot:?} has no schema address, using defaults");
                *out = T::default();
                LoadStatus::Defaulted
            }
        }
    }

    /// [`save`](Self::save) at the fixed address of `slot`.
    pub fn save_slot<T: RecordPayload>(
        &mut self,
        slot: SlotId,
        value: &T,
    ) -> Result<(), StorageError> {
        let address = slot.address().ok_or(StorageError::OutOfBounds)?;
        self.save(address, value)
    }
}

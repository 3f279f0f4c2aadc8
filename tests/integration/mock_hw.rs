//! Mock hardware adapters for integration tests.
//!
//! Records every write and transmission so tests can assert on the full
//! history without touching real EEPROM or UART registers.

use std::cell::Cell;

use domotouch::app::events::AppEvent;
use domotouch::app::ports::{BusLink, ClockPort, EepromPort, EventSink};
use domotouch::error::StorageError;

// ── MockEeprom ────────────────────────────────────────────────

/// Page-bounded in-memory EEPROM with write fault injection.
pub struct MockEeprom {
    pub image: Vec<u8>,
    pub page_size: usize,
    /// Every accepted write as `(address, len)`.
    pub writes: Vec<(u16, usize)>,
    /// Refuse every write with this error.
    pub fail_writes: Option<StorageError>,
    /// Refuse every read with this error.
    pub fail_reads: Option<StorageError>,
}

#[allow(dead_code)]
impl MockEeprom {
    pub fn new(capacity: usize, page_size: usize) -> Self {
        Self {
            image: vec![0xFF; capacity],
            page_size,
            writes: Vec::new(),
            fail_writes: None,
            fail_reads: None,
        }
    }

    pub fn blank() -> Self {
        Self::new(1024, 16)
    }

    /// Flip one byte in place, bypassing the page model.
    pub fn corrupt(&mut self, address: usize) {
        self.image[address] ^= 0xFF;
    }

    pub fn poke(&mut self, address: usize, data: &[u8]) {
        self.image[address..address + data.len()].copy_from_slice(data);
    }
}

impl EepromPort for MockEeprom {
    fn capacity(&self) -> usize {
        self.image.len()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageError> {
        if let Some(e) = self.fail_reads {
            return Err(e);
        }
        let start = usize::from(address);
        let end = start + buf.len();
        if end > self.image.len() {
            return Err(StorageError::OutOfBounds);
        }
        buf.copy_from_slice(&self.image[start..end]);
        Ok(())
    }

    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), StorageError> {
        if let Some(e) = self.fail_writes {
            return Err(e);
        }
        let start = usize::from(address);
        let end = start + data.len();
        if end > self.image.len() {
            return Err(StorageError::OutOfBounds);
        }
        if !data.is_empty() && start / self.page_size != (end - 1) / self.page_size {
            return Err(StorageError::PageOverflow);
        }
        self.image[start..end].copy_from_slice(data);
        self.writes.push((address, data.len()));
        Ok(())
    }
}

// ── MockLink ──────────────────────────────────────────────────

#[derive(Default)]
pub struct MockLink {
    pub busy: bool,
    pub refuse: bool,
    pub sent: Vec<Vec<u8>>,
}

#[allow(dead_code)]
impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `command_type` byte of every frame sent.
    pub fn categories(&self) -> Vec<u8> {
        self.sent.iter().map(|f| f[2]).collect()
    }
}

impl BusLink for MockLink {
    type Error = &'static str;

    fn is_idle(&mut self) -> bool {
        !self.busy
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), &'static str> {
        if self.refuse {
            return Err("line fault");
        }
        self.sent.push(frame.to_vec());
        Ok(())
    }
}

// ── ManualClock ───────────────────────────────────────────────

#[derive(Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.now.set(self.now.get() + ms);
        self.now.get()
    }
}

impl ClockPort for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

// ── CollectSink ───────────────────────────────────────────────

/// Event sink that stores every event.
#[derive(Default)]
pub struct CollectSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for CollectSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (non-volatile memory, the serial bus, the clock, event
//! sinks) implement these traits.  The
//! [`Controller`](super::service::Controller) consumes them via generics, so
//! the domain core never touches hardware directly.

use crate::error::StorageError;

// ───────────────────────────────────────────────────────────────
// Non-volatile memory port (driven adapter: domain ↔ EEPROM / flash)
// ───────────────────────────────────────────────────────────────

/// Byte-addressable non-volatile store.
///
/// A single `write` must stay inside one page; callers that need larger
/// writes go through [`Storage::write_block`](crate::storage::Storage::write_block),
/// which splits on page boundaries.
pub trait EepromPort {
    /// Total addressable bytes.
    fn capacity(&self) -> usize;

    /// Write page size in bytes.
    fn page_size(&self) -> usize;

    /// Fill `buf` from `address`.
    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Write `data` at `address`.  Must not cross a page boundary.
    fn write(&mut self, address: u16, data: &[u8]) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Bus link port (driven adapter: domain → half-duplex serial bus)
// ───────────────────────────────────────────────────────────────

/// Outbound side of the shared half-duplex bus.
pub trait BusLink {
    type Error: core::fmt::Debug;

    /// `true` when no transmission is in progress and the line may be driven.
    fn is_idle(&mut self) -> bool;

    /// Start transmitting one complete frame.  Must not block on the line.
    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond time source.  All device timers are deadline
/// comparisons against this value.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, the GUI
/// status bar, a diagnostics page).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

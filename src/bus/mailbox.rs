//! Receive mailbox between the UART receive context and the main loop.
//!
//! ```text
//! ┌──────────────┐  RawFrame  ┌──────────────┐
//! │ UART RX ISR  │──────────▶│  Main loop    │
//! │ (assembler)  │            │  (tick)       │
//! └──────────────┘            └──────────────┘
//! ```
//!
//! This is the only state shared across execution contexts.  Everything
//! else is owned by the main loop.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use super::frame::RawFrame;

/// Frames buffered between ticks.
pub const MAILBOX_DEPTH: usize = 8;

pub struct RxMailbox {
    frames: Channel<CriticalSectionRawMutex, RawFrame, MAILBOX_DEPTH>,
    overruns: AtomicU32,
}

impl Default for RxMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl RxMailbox {
    /// Usable in a `static`.
    pub const fn new() -> Self {
        Self {
            frames: Channel::new(),
            overruns: AtomicU32::new(0),
        }
    }

    /// Post a complete frame.  Never blocks; a full mailbox drops the frame.
    pub fn post(&self, frame: RawFrame) -> bool {
        if self.frames.try_send(frame).is_ok() {
            return true;
        }
        self.overruns.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Take the oldest pending frame.
    pub fn take(&self) -> Option<RawFrame> {
        self.frames.try_receive().ok()
    }

    /// Frames dropped because the main loop fell behind.
    pub fn overruns(&self) -> u32 {
        self.overruns.load(Ordering::Relaxed)
    }
}

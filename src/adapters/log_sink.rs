//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! The GUI status bar implements the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events logged since boot.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            AppEvent::Started {
                layout,
                gates,
                lights,
            } => {
                info!("START | layout={layout:?} | gates={gates} lights={lights}");
            }
            AppEvent::StateChanged { gate, from, to } => {
                info!("STATE | gate {gate} | {from:?} -> {to:?}");
            }
            AppEvent::FaultRaised { gate, cause } => {
                warn!("FAULT | gate {gate} | {cause:?}");
            }
            AppEvent::FaultAcknowledged { gate } => {
                info!("FAULT | gate {gate} | acknowledged");
            }
            AppEvent::CommandIgnored {
                gate,
                command,
                outcome,
            } => {
                info!("CMD   | gate {gate} | {command:?} -> {outcome:?}");
            }
            AppEvent::CommandDropped { category, count } => {
                warn!("BUS   | {category:?} queue full, {count} dropped");
            }
            AppEvent::RecordRecovered { slot, status } => {
                warn!("NVM   | {slot:?} {status:?}, defaults restored");
            }
            AppEvent::Saved { slot } => {
                info!("NVM   | {slot:?} saved");
            }
            AppEvent::SaveFailed { slot, error } => {
                warn!("NVM   | {slot:?} save failed: {error}");
            }
            AppEvent::StaleAddress { slot, address } => {
                warn!("ADDR  | {slot:?} {address} belongs to the inactive protocol");
            }
            AppEvent::AddressingChanged { from, to } => {
                info!("ADDR  | {from:?} -> {to:?}");
            }
            AppEvent::LightLevel { light, level } => {
                info!("LIGHT | light {light} | level={level}%");
            }
        }
    }
}

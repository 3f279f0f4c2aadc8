//! Half-duplex RS-485 link adapter.
//!
//! Implements [`BusLink`] on top of a serial transmitter and the
//! transceiver's driver-enable (DE) pin.
//!
//! ```text
//!  transmit ── DE high ── write frame ──▶ (UART shifting out)
//!  is_idle  ── tx complete? ── DE low ──▶ idle
//! ```
//!
//! The line counts as idle only once DE is low again, so the next frame is
//! never started while the previous one is still on the wire.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::BusLink;

/// Transmit side of a UART.
pub trait SerialTx {
    type Error: core::fmt::Debug;

    /// Hand `frame` to the transmitter.  Must not wait for the line.
    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error>;

    /// `true` once the last byte has left the shift register.
    fn tx_complete(&mut self) -> bool;
}

/// Push `frame` through `write`, which may take only part of it per call.
/// A call that takes nothing ends the frame with `stalled()`.
pub fn write_chunks<E>(
    frame: &[u8],
    mut write: impl FnMut(&[u8]) -> Result<usize, E>,
    stalled: impl FnOnce() -> E,
) -> Result<(), E> {
    let mut rest = frame;
    while !rest.is_empty() {
        match write(rest)? {
            0 => return Err(stalled()),
            n => rest = rest.get(n..).unwrap_or_default(),
        }
    }
    Ok(())
}

#[derive(Debug)]
pub enum LinkError<P, S> {
    /// The DE pin could not be driven.
    Pin(P),
    /// The UART refused the frame.
    Serial(S),
}

pub struct HalfDuplexLink<DE, TX> {
    de: DE,
    tx: TX,
    driving: bool,
}

impl<DE: OutputPin, TX: SerialTx> HalfDuplexLink<DE, TX> {
    /// Take ownership of the pin and transmitter; DE starts low.
    pub fn new(mut de: DE, tx: TX) -> Self {
        if de.set_low().is_err() {
            warn!("RS-485 DE pin could not be released");
        }
        Self {
            de,
            tx,
            driving: false,
        }
    }

    pub fn is_driving(&self) -> bool {
        self.driving
    }

    pub fn into_parts(self) -> (DE, TX) {
        (self.de, self.tx)
    }

    fn release(&mut self) -> bool {
        if self.de.set_low().is_err() {
            warn!("RS-485 DE pin could not be released");
            return false;
        }
        self.driving = false;
        true
    }
}

impl<DE: OutputPin, TX: SerialTx> BusLink for HalfDuplexLink<DE, TX> {
    type Error = LinkError<DE::Error, TX::Error>;

    fn is_idle(&mut self) -> bool {
        if self.driving && self.tx.tx_complete() {
            self.release();
        }
        !self.driving
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        self.de.set_high().map_err(LinkError::Pin)?;
        self.driving = true;
        if let Err(e) = self.tx.write_frame(frame) {
            self.release();
            return Err(LinkError::Serial(e));
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF UART
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl SerialTx for esp_idf_hal::uart::UartTxDriver<'_> {
    type Error = esp_idf_sys::EspError;

    fn write_frame(&mut self, frame: &[u8]) -> Result<(), Self::Error> {
        write_chunks(
            frame,
            |rest| self.write(rest),
            esp_idf_sys::EspError::from_infallible::<{ esp_idf_sys::ESP_ERR_TIMEOUT }>,
        )
    }

    fn tx_complete(&mut self) -> bool {
        self.wait_done(0).is_ok()
    }
}

//! Domotouch controller firmware: main entry point.
//!
//! Cooperative single-loop design: the UART receive thread is the only
//! other context, and it only posts complete frames to the mailbox.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsEeprom      HalfDuplexLink   LogEventSink   MonotonicClock │
//! │  (EepromPort)   (BusLink)        (EventSink)    (ClockPort)    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │             Controller (pure logic)                    │    │
//! │  │  Storage · BusTransport · Gates (UDSM) · Lights        │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  UART RX thread ── FrameAssembler ──▶ RxMailbox                │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::{FreeRtos, TickType};
use esp_idf_hal::gpio::{AnyIOPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{self, UartDriver, UartRxDriver};
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use domotouch::adapters::eeprom::{DEFAULT_CAPACITY, DEFAULT_PAGE_SIZE, NvsEeprom};
use domotouch::adapters::link::HalfDuplexLink;
use domotouch::adapters::log_sink::LogEventSink;
use domotouch::adapters::time::MonotonicClock;
use domotouch::app::ports::ClockPort;
use domotouch::app::service::Controller;
use domotouch::bus::frame::FrameAssembler;
use domotouch::bus::mailbox::RxMailbox;

/// Frames from the RX thread to the main loop.
static MAILBOX: RxMailbox = RxMailbox::new();

const RX_CHUNK: usize = 64;
const RX_STACK_SIZE: usize = 4096;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Domotouch v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;

    // ── 2. Storage and controller ─────────────────────────────
    let eeprom = match NvsEeprom::new() {
        Ok(e) => e,
        Err(e) => {
            warn!("NVS init failed ({e}), running with defaults and no persistence");
            NvsEeprom::with_geometry(DEFAULT_CAPACITY, DEFAULT_PAGE_SIZE)
        }
    };
    let mut sink = LogEventSink::new();
    let mut ctrl = Controller::boot(eeprom, &MAILBOX, &mut sink);
    let baud = ctrl.config().bus_baud;
    let period_ms = u32::from(ctrl.config().loop_period_ms);

    // ── 3. RS-485 bus ─────────────────────────────────────────
    let uart_config = uart::config::Config::default().baudrate(Hertz(baud));
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    let (tx, rx) = uart.into_split();
    let de = PinDriver::output(peripherals.pins.gpio16)?;
    let mut link = HalfDuplexLink::new(de, tx);
    info!("bus up at {baud} baud");

    std::thread::Builder::new()
        .name("bus-rx".into())
        .stack_size(RX_STACK_SIZE)
        .spawn(move || receive_loop(&rx))?;

    // ── 4. Main loop ──────────────────────────────────────────
    let clock = MonotonicClock::new();
    info!("System ready. Entering main loop ({period_ms} ms).");
    loop {
        ctrl.tick(clock.now_ms(), &mut link, &mut sink);
        FreeRtos::delay_ms(period_ms);
    }
}

/// Reassemble frames from raw UART bytes and post them to the mailbox.
fn receive_loop(rx: &UartRxDriver<'_>) {
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; RX_CHUNK];
    let timeout = TickType::new_millis(20).ticks();
    loop {
        match rx.read(&mut buf, timeout) {
            Ok(0) => {}
            Ok(n) => assembler.feed(&buf[..n], |frame| {
                if !MAILBOX.post(frame) {
                    warn!("rx mailbox full, frame dropped");
                }
            }),
            Err(e) => {
                warn!("uart read failed: {e}");
                assembler.reset();
            }
        }
    }
}

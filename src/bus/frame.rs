//! Bus wire framing.
//!
//! ```text
//! outbound  ┌─────┬─────┬──────────────┬────────────────┬──────────┐
//!           │ SOF │ len │ command_type │ data[len - 1]  │ crc16 LE │
//!           └─────┴─────┴──────────────┴────────────────┴──────────┘
//! inbound   ┌─────┬─────┬────────────┬─────────┬─────────┬──────────┐
//!           │ SOF │ len │ event_kind │ address │ payload │ crc16 LE │
//!           └─────┴─────┴────────────┴─────────┴─────────┴──────────┘
//! ```
//!
//! `len` counts the bytes between itself and the CRC.  The CRC (same
//! algorithm as the storage records) covers `len` through the last payload
//! byte.  The inbound address is 2 or 3 bytes depending on the active
//! [`AddressingMode`].

use heapless::Vec;

use super::address::{Address, AddressingMode};
use super::command::{Command, MAX_COMMAND_DATA};
use crate::error::FrameError;
use crate::storage::crc::crc16_ccitt_false;

/// Start-of-frame marker.
pub const SOF: u8 = 0xA5;

/// Largest frame on the wire in either direction.
pub const MAX_FRAME: usize = 48;

/// Largest legal `len` byte.
const MAX_LEN: usize = MAX_FRAME - 4;

/// SOF + len + kind + crc.
const MIN_FRAME: usize = 5;

/// One complete frame as received or about to be sent.
pub type RawFrame = Vec<u8, MAX_FRAME>;

const KIND_DIGITAL_INPUT: u8 = 0x01;
const KIND_STATE_REPORT: u8 = 0x02;
const KIND_FIRMWARE_CHUNK: u8 = 0x10;

/// Decoded feedback from a bus endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    pub source: Address,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A digital input (limit switch, photocell) changed level.
    DigitalInputChanged { level: bool },
    /// Actuator state or brightness report.
    StateReport { value: u8 },
    /// Firmware-update data; routed like any event, owned by no core module.
    FirmwareChunk(Vec<u8, MAX_COMMAND_DATA>),
}

impl EventKind {
    pub fn code(&self) -> u8 {
        match self {
            Self::DigitalInputChanged { .. } => KIND_DIGITAL_INPUT,
            Self::StateReport { .. } => KIND_STATE_REPORT,
            Self::FirmwareChunk(_) => KIND_FIRMWARE_CHUNK,
        }
    }
}

/// Wrap `body` as `SOF | len | body | crc`.
fn seal(body: &[u8]) -> Option<RawFrame> {
    if body.is_empty() || body.len() > MAX_LEN {
        return None;
    }
    let mut out = RawFrame::new();
    out.push(SOF).ok()?;
    out.push(body.len() as u8).ok()?;
    out.extend_from_slice(body).ok()?;
    let crc = crc16_ccitt_false(&out[1..]);
    out.extend_from_slice(&crc.to_le_bytes()).ok()?;
    Some(out)
}

/// Frame an outbound command.
pub fn encode_command(cmd: &Command) -> Option<RawFrame> {
    let mut body: Vec<u8, { MAX_COMMAND_DATA + 1 }> = Vec::new();
    body.push(cmd.category as u8).ok()?;
    body.extend_from_slice(&cmd.data).ok()?;
    seal(&body)
}

/// Frame an inbound event, as an endpoint would send it.
pub fn encode_event(event: &BusEvent, mode: AddressingMode) -> Option<RawFrame> {
    let mut body: Vec<u8, MAX_LEN> = Vec::new();
    body.push(event.kind.code()).ok()?;
    event.source.write_wire(mode, &mut body).ok()?;
    match &event.kind {
        EventKind::DigitalInputChanged { level } => body.push(u8::from(*level)).ok()?,
        EventKind::StateReport { value } => body.push(*value).ok()?,
        EventKind::FirmwareChunk(chunk) => body.extend_from_slice(chunk).ok()?,
    }
    seal(&body)
}

/// Validate and decode one complete inbound frame.
pub fn decode_event(frame: &[u8], mode: AddressingMode) -> Result<BusEvent, FrameError> {
    if frame.len() < MIN_FRAME {
        return Err(FrameError::TooShort);
    }
    if frame[0] != SOF {
        return Err(FrameError::MissingSof);
    }
    if frame[1] as usize + 4 != frame.len() {
        return Err(FrameError::LengthMismatch);
    }
    let crc_at = frame.len() - 2;
    let stored = u16::from_le_bytes([frame[crc_at], frame[crc_at + 1]]);
    if crc16_ccitt_false(&frame[1..crc_at]) != stored {
        return Err(FrameError::Crc);
    }

    let kind = frame[2];
    let rest = &frame[3..crc_at];
    let source = Address::read_wire(mode, rest).ok_or(FrameError::TooShort)?;
    let payload = &rest[mode.wire_len()..];

    let kind = match kind {
        KIND_DIGITAL_INPUT => match payload {
            [0] => EventKind::DigitalInputChanged { level: false },
            [1] => EventKind::DigitalInputChanged { level: true },
            _ => return Err(FrameError::BadPayload),
        },
        KIND_STATE_REPORT => match payload {
            [value] => EventKind::StateReport { value: *value },
            _ => return Err(FrameError::BadPayload),
        },
        KIND_FIRMWARE_CHUNK => EventKind::FirmwareChunk(
            Vec::from_slice(payload).map_err(|_| FrameError::BadPayload)?,
        ),
        other => return Err(FrameError::UnknownEvent(other)),
    };
    Ok(BusEvent { source, kind })
}

// ---------------------------------------------------------------------------
// Streaming reassembly
// ---------------------------------------------------------------------------

enum AssemblerState {
    /// Discarding until SOF.
    Hunting,
    /// SOF seen, next byte is `len`.
    Length,
    /// Collecting `remaining` more bytes (body + CRC).
    Body { remaining: usize },
}

/// Rebuilds frames from arbitrary UART chunks.
///
/// Garbage before a SOF and impossible length bytes are skipped.  Integrity
/// is checked later by [`decode_event`]; the assembler only delimits.
pub struct FrameAssembler {
    state: AssemblerState,
    buf: RawFrame,
    discarded: u32,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub const fn new() -> Self {
        Self {
            state: AssemblerState::Hunting,
            buf: Vec::new(),
            discarded: 0,
        }
    }

    /// Feed one byte; returns a frame when the last CRC byte arrives.
    pub fn push(&mut self, byte: u8) -> Option<RawFrame> {
        match self.state {
            AssemblerState::Hunting => {
                if byte == SOF {
                    self.start();
                } else {
                    self.discarded = self.discarded.saturating_add(1);
                }
                None
            }
            AssemblerState::Length => {
                let len = byte as usize;
                if len == 0 || len > MAX_LEN {
                    self.discarded = self.discarded.saturating_add(2);
                    if byte == SOF {
                        self.start();
                    } else {
                        self.state = AssemblerState::Hunting;
                    }
                    return None;
                }
                self.append(byte);
                self.state = AssemblerState::Body { remaining: len + 2 };
                None
            }
            AssemblerState::Body { remaining } => {
                self.append(byte);
                if remaining > 1 {
                    self.state = AssemblerState::Body {
                        remaining: remaining - 1,
                    };
                    return None;
                }
                self.state = AssemblerState::Hunting;
                Some(core::mem::take(&mut self.buf))
            }
        }
    }

    /// Feed a chunk, calling `on_frame` for every completed frame.
    pub fn feed(&mut self, data: &[u8], mut on_frame: impl FnMut(RawFrame)) {
        for &b in data {
            if let Some(frame) = self.push(b) {
                on_frame(frame);
            }
        }
    }

    /// Bytes skipped while hunting for SOF.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    pub fn reset(&mut self) {
        self.state = AssemblerState::Hunting;
        self.buf.clear();
    }

    fn start(&mut self) {
        self.buf.clear();
        self.append(SOF);
        self.state = AssemblerState::Length;
    }

    fn append(&mut self, byte: u8) {
        // Capacity is guaranteed by the MAX_LEN check on the length byte.
        let _ = self.buf.push(byte);
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn assembler_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut asm = FrameAssembler::new();
            asm.feed(&bytes, |f| {
                assert!(f.len() <= MAX_FRAME);
                let _ = decode_event(&f, AddressingMode::Absolute);
                let _ = decode_event(&f, AddressingMode::ModuleChannel);
            });
        }

        #[test]
        fn state_report_survives_any_chunking(
            addr in 1u16..=u16::MAX,
            value in any::<u8>(),
            split in 1usize..9,
        ) {
            let e = BusEvent {
                source: Address::Absolute(addr),
                kind: EventKind::StateReport { value },
            };
            let f = encode_event(&e, AddressingMode::Absolute).unwrap();
            let mut asm = FrameAssembler::new();
            let mut got = None;
            for chunk in f.chunks(split) {
                asm.feed(chunk, |frame| got = Some(frame));
            }
            let frame = got.unwrap();
            prop_assert_eq!(decode_event(&frame, AddressingMode::Absolute), Ok(e));
        }
    }
}

//! Fixed-layout configuration record codec.
//!
//! ```text
//! ┌─────────────┬──────────────────────────┬─────────────┐
//! │ magic (2B)  │ payload (T::SIZE bytes)  │ crc (2B)    │
//! │ LE 0xABCD   │ packed, little-endian    │ LE CRC-16   │
//! └─────────────┴──────────────────────────┴─────────────┘
//! ```
//!
//! The CRC covers the whole record with the crc field zeroed.  Payloads
//! describe their own packed layout through [`RecordPayload`]; there is no
//! implicit padding and no self-describing framing.

use super::crc::crc16_ccitt_false;

/// System-wide record signature.
pub const EEPROM_MAGIC: u16 = 0xABCD;

/// Bytes added around every payload (magic + crc).
pub const RECORD_OVERHEAD: usize = 4;

/// Largest record any module may declare (payload + overhead).
pub const MAX_RECORD_BYTES: usize = 64;

/// A payload that can live inside a [`EEPROM_MAGIC`]-guarded record.
///
/// `Default` is the compiled-in factory default used on first boot and on
/// every validation failure.
pub trait RecordPayload: Default {
    /// Exact packed payload size in bytes.
    const SIZE: usize;

    /// Write exactly [`Self::SIZE`] bytes.
    fn encode(&self, w: &mut ByteWriter<'_>);

    /// Parse a payload whose checksum already verified.  Returns `None` when
    /// the bytes are well-formed but semantically invalid (bad tag, bad UTF-8).
    fn decode(r: &mut ByteReader<'_>) -> Option<Self>;
}

/// Total record length for payload `T`.
pub const fn record_len<T: RecordPayload>() -> usize {
    T::SIZE + RECORD_OVERHEAD
}

/// Outcome of a record load.  The caller always ends up with a usable value;
/// the variants only differ for logging and event reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Magic and checksum matched.
    Valid,
    /// No record present (blank or foreign storage); defaults written.
    Defaulted,
    /// Record present but corrupt; defaults written.
    Recovered,
    /// Storage could not be read.  Defaults are used in RAM only; the stored
    /// bytes are left for the next boot.
    Unreadable,
}

/// Why stored bytes were rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFault {
    BadMagic,
    BadCrc,
    BadPayload,
    Truncated,
    /// The device read itself failed; nothing is known about the bytes.
    ReadFailed,
}

impl RecordFault {
    /// Map a rejection to the load status it produces.
    pub fn status(self) -> LoadStatus {
        match self {
            Self::BadMagic => LoadStatus::Defaulted,
            Self::BadCrc | Self::BadPayload | Self::Truncated => LoadStatus::Recovered,
            Self::ReadFailed => LoadStatus::Unreadable,
        }
    }
}

/// Encode `value` as a complete record into `out`.
/// Returns the number of bytes written, or `None` if `out` is too small.
pub fn encode_record<T: RecordPayload>(value: &T, out: &mut [u8]) -> Option<usize> {
    let len = record_len::<T>();
    if out.len() < len {
        return None;
    }
    let out = &mut out[..len];

    out[..2].copy_from_slice(&EEPROM_MAGIC.to_le_bytes());
    {
        let mut w = ByteWriter::new(&mut out[2..2 + T::SIZE]);
        value.encode(&mut w);
        debug_assert_eq!(w.position(), T::SIZE, "payload layout size mismatch");
    }
    out[len - 2..].copy_from_slice(&[0, 0]);
    let crc = crc16_ccitt_false(out);
    out[len - 2..].copy_from_slice(&crc.to_le_bytes());
    Some(len)
}

/// Validate and decode a record from raw storage bytes.
pub fn decode_record<T: RecordPayload>(bytes: &[u8]) -> Result<T, RecordFault> {
    let len = record_len::<T>();
    if bytes.len() < len {
        return Err(RecordFault::Truncated);
    }
    let bytes = &bytes[..len];

    if u16::from_le_bytes([bytes[0], bytes[1]]) != EEPROM_MAGIC {
        return Err(RecordFault::BadMagic);
    }

    let stored = u16::from_le_bytes([bytes[len - 2], bytes[len - 1]]);
    let mut scratch = [0u8; MAX_RECORD_BYTES];
    let scratch = &mut scratch[..len];
    scratch.copy_from_slice(bytes);
    scratch[len - 2] = 0;
    scratch[len - 1] = 0;
    if crc16_ccitt_false(scratch) != stored {
        return Err(RecordFault::BadCrc);
    }

    let mut r = ByteReader::new(&bytes[2..2 + T::SIZE]);
    T::decode(&mut r).ok_or(RecordFault::BadPayload)
}

// ---------------------------------------------------------------------------
// Packed field cursors
// ---------------------------------------------------------------------------

/// Little-endian packed writer over a fixed slice.  Writes past the end are
/// silently discarded; [`encode_record`] asserts the final position in debug.
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put_u8(&mut self, v: u8) {
        self.put_bytes(&[v]);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.put_u8(u8::from(v));
    }

    pub fn put_u16(&mut self, v: u16) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.put_bytes(&v.to_le_bytes());
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        if let Some(dst) = self.buf.get_mut(self.pos..) {
            let n = data.len().min(dst.len());
            dst[..n].copy_from_slice(&data[..n]);
        }
        self.pos += data.len();
    }

    /// Write `s` into a NUL-padded field of exactly `width` bytes.
    pub fn put_str_fixed(&mut self, s: &str, width: usize) {
        let bytes = s.as_bytes();
        let n = bytes.len().min(width);
        self.put_bytes(&bytes[..n]);
        for _ in n..width {
            self.put_u8(0);
        }
    }
}

/// Little-endian packed reader.  Reads past the end yield `None`.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let out = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(out)
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub fn bool(&mut self) -> Option<bool> {
        match self.u8()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a NUL-padded UTF-8 field of `width` bytes.
    pub fn str_fixed<const N: usize>(&mut self, width: usize) -> Option<heapless::String<N>> {
        let raw = self.take(width)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let text = core::str::from_utf8(&raw[..end]).ok()?;
        let mut out = heapless::String::new();
        out.push_str(text).ok()?;
        Some(out)
    }
}

//! Unified error types for the Domotouch firmware.
//!
//! Every subsystem error converts into the single top-level [`Error`] so the
//! main loop can log and report failures uniformly.  All variants are `Copy`
//! so they travel through events and status returns without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Non-volatile storage could not be read or written.
    Storage(StorageError),
    /// An outbound command could not be built or queued.
    Bus(BusError),
    /// An inbound frame was malformed.
    Frame(FrameError),
    /// Configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Bus(e) => write!(f, "bus: {e}"),
            Self::Frame(e) => write!(f, "frame: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from the byte-addressable persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The requested range lies outside the device capacity.
    OutOfBounds,
    /// A single write crossed an EEPROM page boundary.
    PageOverflow,
    /// The device did not acknowledge within its write cycle.
    Timeout,
    /// Generic I/O error from the storage backend.
    Io,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds => write!(f, "address out of bounds"),
            Self::PageOverflow => write!(f, "write crosses page boundary"),
            Self::Timeout => write!(f, "write timeout"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Bus errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Command payload exceeds the category maximum.
    PayloadTooLarge,
    /// The address belongs to the addressing mode that is not active.
    AddressModeMismatch,
    /// The address is the unconfigured zero address.
    Unconfigured,
    /// Backup blob could not be (de)serialised.
    Backup,
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::AddressModeMismatch => write!(f, "address mode mismatch"),
            Self::Unconfigured => write!(f, "address not configured"),
            Self::Backup => write!(f, "address backup malformed"),
        }
    }
}

impl From<BusError> for Error {
    fn from(e: BusError) -> Self {
        Self::Bus(e)
    }
}

// ---------------------------------------------------------------------------
// Frame errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Frame shorter than the minimum header + CRC.
    TooShort,
    /// Start-of-frame byte missing.
    MissingSof,
    /// Length byte disagrees with the frame size.
    LengthMismatch,
    /// CRC check failed.
    Crc,
    /// Unknown event kind byte.
    UnknownEvent(u8),
    /// Payload does not fit the event kind.
    BadPayload,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort => write!(f, "frame too short"),
            Self::MissingSof => write!(f, "missing start of frame"),
            Self::LengthMismatch => write!(f, "length mismatch"),
            Self::Crc => write!(f, "CRC mismatch"),
            Self::UnknownEvent(k) => write!(f, "unknown event kind 0x{k:02x}"),
            Self::BadPayload => write!(f, "bad payload"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Device index is outside the installed range.
    NoSuchDevice,
    /// Label does not fit the fixed record field.
    LabelTooLong,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::NoSuchDevice => write!(f, "no such device"),
            Self::LabelTooLong => write!(f, "label too long"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_subsystem() {
        let e: Error = StorageError::Timeout.into();
        assert_eq!(e.to_string(), "storage: write timeout");
        let e: Error = FrameError::UnknownEvent(0x7f).into();
        assert_eq!(e.to_string(), "frame: unknown event kind 0x7f");
    }

    #[test]
    fn question_mark_converts() {
        fn inner() -> Result<()> {
            Err(BusError::PayloadTooLarge)?;
            Ok(())
        }
        assert_eq!(inner(), Err(Error::Bus(BusError::PayloadTooLarge)));
    }
}

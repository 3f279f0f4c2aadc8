//! Endpoint addressing for the two mutually exclusive wire protocols.
//!
//! | Mode            | Wire form              | Record field (4 B)           |
//! |-----------------|------------------------|------------------------------|
//! | `Absolute`      | `addr:u16 LE`          | `0x01 · addr:u16 LE · 0x00`  |
//! | `ModuleChannel` | `module:u16 LE · ch:u8`| `0x02 · module:u16 LE · ch`  |
//! | unconfigured    | n/a                    | `0x00 · 0x00 0x00 · 0x00`    |
//!
//! The wire form has no discriminator; it is read according to the single
//! system-wide [`AddressingMode`].  Record fields keep a tag so an address
//! written under one mode is recognised as stale under the other instead of
//! being reinterpreted.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::storage::record::{ByteReader, ByteWriter};

/// Size of one persisted address field.
pub const ADDRESS_FIELD_SIZE: usize = 4;

/// Maximum entries in an address backup blob.
pub const MAX_BACKUP_ENTRIES: usize = 32;

const TAG_NONE: u8 = 0x00;
const TAG_ABSOLUTE: u8 = 0x01;
const TAG_MODULE_CHANNEL: u8 = 0x02;

/// System-wide wire protocol selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddressingMode {
    /// One 16-bit logical address per endpoint.
    #[default]
    Absolute = TAG_ABSOLUTE,
    /// 16-bit module id plus 8-bit channel/pin.
    ModuleChannel = TAG_MODULE_CHANNEL,
}

impl AddressingMode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            TAG_ABSOLUTE => Some(Self::Absolute),
            TAG_MODULE_CHANNEL => Some(Self::ModuleChannel),
            _ => None,
        }
    }

    /// Bytes an address occupies on the wire in this mode.
    pub const fn wire_len(self) -> usize {
        match self {
            Self::Absolute => 2,
            Self::ModuleChannel => 3,
        }
    }
}

/// A bus endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    Absolute(u16),
    ModuleChannel { module: u16, channel: u8 },
}

impl Address {
    /// The protocol this address belongs to.
    pub const fn mode(self) -> AddressingMode {
        match self {
            Self::Absolute(_) => AddressingMode::Absolute,
            Self::ModuleChannel { .. } => AddressingMode::ModuleChannel,
        }
    }

    /// Zero addresses mean "not wired".
    pub const fn is_configured(self) -> bool {
        match self {
            Self::Absolute(a) => a != 0,
            Self::ModuleChannel { module, .. } => module != 0,
        }
    }

    /// Check the address is usable under `active`.
    pub fn resolve(self, active: AddressingMode) -> Result<Self, BusError> {
        if !self.is_configured() {
            return Err(BusError::Unconfigured);
        }
        if self.mode() != active {
            return Err(BusError::AddressModeMismatch);
        }
        Ok(self)
    }

    /// Append the wire form under `active`.
    pub fn write_wire<const N: usize>(
        self,
        active: AddressingMode,
        out: &mut heapless::Vec<u8, N>,
    ) -> Result<(), BusError> {
        let bytes: heapless::Vec<u8, 3> = match self.resolve(active)? {
            Self::Absolute(a) => heapless::Vec::from_slice(&a.to_le_bytes()),
            Self::ModuleChannel { module, channel } => {
                let m = module.to_le_bytes();
                heapless::Vec::from_slice(&[m[0], m[1], channel])
            }
        }
        .map_err(|_| BusError::PayloadTooLarge)?;
        out.extend_from_slice(&bytes)
            .map_err(|_| BusError::PayloadTooLarge)
    }

    /// Parse the wire form under `active` from the front of `bytes`.
    pub fn read_wire(active: AddressingMode, bytes: &[u8]) -> Option<Self> {
        match active {
            AddressingMode::Absolute => {
                let b = bytes.get(..2)?;
                Some(Self::Absolute(u16::from_le_bytes([b[0], b[1]])))
            }
            AddressingMode::ModuleChannel => {
                let b = bytes.get(..3)?;
                Some(Self::ModuleChannel {
                    module: u16::from_le_bytes([b[0], b[1]]),
                    channel: b[2],
                })
            }
        }
    }

    /// Write a tagged record field; unconfigured addresses store as empty.
    pub fn encode_field(addr: Option<Self>, w: &mut ByteWriter<'_>) {
        match addr.filter(|a| a.is_configured()) {
            None => w.put_bytes(&[TAG_NONE, 0, 0, 0]),
            Some(Self::Absolute(a)) => {
                w.put_u8(TAG_ABSOLUTE);
                w.put_u16(a);
                w.put_u8(0);
            }
            Some(Self::ModuleChannel { module, channel }) => {
                w.put_u8(TAG_MODULE_CHANNEL);
                w.put_u16(module);
                w.put_u8(channel);
            }
        }
    }

    /// Read a tagged record field.  The outer `None` means the tag is invalid.
    pub fn decode_field(r: &mut ByteReader<'_>) -> Option<Option<Self>> {
        let tag = r.u8()?;
        let word = r.u16()?;
        let extra = r.u8()?;
        let addr = match tag {
            TAG_NONE => None,
            TAG_ABSOLUTE => Some(Self::Absolute(word)),
            TAG_MODULE_CHANNEL => Some(Self::ModuleChannel {
                module: word,
                channel: extra,
            }),
            _ => return None,
        };
        Some(addr.filter(|a| a.is_configured()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(a) => write!(f, "@{a}"),
            Self::ModuleChannel { module, channel } => write!(f, "M{module}.{channel}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Mode-tagged export
// ---------------------------------------------------------------------------

/// An address paired with the mode it was captured under.  Used for backup
/// blobs that may be restored after the system mode changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedAddress {
    pub mode: AddressingMode,
    pub address: Address,
}

impl TaggedAddress {
    pub fn new(address: Address) -> Self {
        Self {
            mode: address.mode(),
            address,
        }
    }

    /// Accept the address only if it was captured under `active`.
    pub fn resolve(&self, active: AddressingMode) -> Result<Address, BusError> {
        if self.mode != active || self.address.mode() != self.mode {
            return Err(BusError::AddressModeMismatch);
        }
        self.address.resolve(active)
    }
}

/// Serialise tagged addresses into a compact postcard blob.
pub fn encode_backup(entries: &[TaggedAddress]) -> Result<Vec<u8>, BusError> {
    if entries.len() > MAX_BACKUP_ENTRIES {
        return Err(BusError::PayloadTooLarge);
    }
    postcard::to_allocvec(entries).map_err(|_| BusError::Backup)
}

/// Parse a blob produced by [`encode_backup`].
pub fn decode_backup(
    blob: &[u8],
) -> Result<heapless::Vec<TaggedAddress, MAX_BACKUP_ENTRIES>, BusError> {
    postcard::from_bytes(blob).map_err(|_| BusError::Backup)
}

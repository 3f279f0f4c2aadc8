//! Outbound bus commands and their categories.

use heapless::Vec;

use super::address::{Address, AddressingMode};
use crate::error::BusError;

/// Largest payload any category accepts.
pub const MAX_COMMAND_DATA: usize = 32;

/// Device category.  Each has its own queue; the discriminant is the
/// `command_type` byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCategory {
    Binary = 0x01,
    Dimmer = 0x02,
    Color = 0x03,
    Curtain = 0x04,
    Thermostat = 0x05,
}

impl CommandCategory {
    pub const COUNT: usize = 5;

    /// Service order for [`BusTransport::service_tick`](super::transport::BusTransport::service_tick).
    pub const ALL: [Self; Self::COUNT] = [
        Self::Binary,
        Self::Dimmer,
        Self::Color,
        Self::Curtain,
        Self::Thermostat,
    ];

    pub const fn index(self) -> usize {
        self as usize - 1
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| *c as u8 == raw)
    }

    /// Maximum `data` length including the address prefix.
    pub const fn max_payload(self) -> usize {
        match self {
            // address (≤3) + value/level/rgb/position
            Self::Binary | Self::Dimmer | Self::Color | Self::Curtain => 8,
            // address + setpoint, measured temperature, mode, labels
            Self::Thermostat => MAX_COMMAND_DATA,
        }
    }
}

/// One queued bus transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub category: CommandCategory,
    pub data: Vec<u8, MAX_COMMAND_DATA>,
}

impl Command {
    /// Wrap raw `data`.  Fails if it exceeds the category maximum.
    pub fn new(category: CommandCategory, data: &[u8]) -> Result<Self, BusError> {
        if data.len() > category.max_payload() {
            return Err(BusError::PayloadTooLarge);
        }
        let data = Vec::from_slice(data).map_err(|_| BusError::PayloadTooLarge)?;
        Ok(Self { category, data })
    }

    /// Build `address (wire form) · body` for the active mode.
    pub fn addressed(
        category: CommandCategory,
        address: Address,
        mode: AddressingMode,
        body: &[u8],
    ) -> Result<Self, BusError> {
        let mut data: Vec<u8, MAX_COMMAND_DATA> = Vec::new();
        address.write_wire(mode, &mut data)?;
        data.extend_from_slice(body)
            .map_err(|_| BusError::PayloadTooLarge)?;
        Self::new(category, &data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_index_densely() {
        for (i, c) in CommandCategory::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
            assert_eq!(CommandCategory::from_u8(*c as u8), Some(*c));
        }
        assert_eq!(CommandCategory::from_u8(0), None);
        assert_eq!(CommandCategory::from_u8(6), None);
    }

    #[test]
    fn oversized_payload_rejected() {
        assert_eq!(
            Command::new(CommandCategory::Binary, &[0u8; 9]),
            Err(BusError::PayloadTooLarge)
        );
        assert!(Command::new(CommandCategory::Thermostat, &[0u8; 32]).is_ok());
        assert!(Command::new(CommandCategory::Thermostat, &[0u8; 33]).is_err());
    }

    #[test]
    fn addressed_prefixes_wire_address() {
        let c = Command::addressed(
            CommandCategory::Binary,
            Address::ModuleChannel {
                module: 0x0010,
                channel: 2,
            },
            AddressingMode::ModuleChannel,
            &[1],
        )
        .unwrap();
        assert_eq!(c.data.as_slice(), &[0x10, 0x00, 2, 1]);
    }

    #[test]
    fn addressed_rejects_wrong_mode() {
        assert_eq!(
            Command::addressed(
                CommandCategory::Dimmer,
                Address::Absolute(7),
                AddressingMode::ModuleChannel,
                &[50],
            ),
            Err(BusError::AddressModeMismatch)
        );
    }
}

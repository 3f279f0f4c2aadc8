//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements | Connects to                    |
//! |------------|------------|--------------------------------|
//! | `eeprom`   | EepromPort | NVS blob / in-memory image     |
//! | `link`     | BusLink    | UART + RS-485 driver-enable pin|
//! | `log_sink` | EventSink  | Serial log output              |
//! | `time`     | ClockPort  | ESP32 system timer             |

pub mod eeprom;
pub mod link;
pub mod log_sink;
pub mod time;

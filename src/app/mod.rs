//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the orchestration rules for the controller:
//! boot-time record loading, routing of bus feedback to device modules,
//! device timers, command handling and persistence.
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
